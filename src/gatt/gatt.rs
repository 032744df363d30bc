//! Generic Attribute Profile ([Vol 3] Part G).
//!
//! The server engine answers requests from connected centrals against the
//! local characteristic registry. The mirror client engine subscribes to the
//! centrals' own characteristics.

pub use {char::*, client::*, consts::*, registry::*, server::*};

use crate::config::Config;
use crate::dev::DeviceTable;
use crate::event::Sink;
use crate::platform::Adapter;

mod char;
mod client;
mod consts;
mod registry;
mod server;

#[cfg(test)]
mod tests;

/// State shared by the engines while handling one event. Everything here is
/// borrowed from behind the peripheral lock.
#[derive(Debug)]
pub(crate) struct Ctx<'a> {
    pub adapter: &'a dyn Adapter,
    pub cfg: &'a Config,
    pub devs: &'a mut DeviceTable,
    pub sink: &'a Sink,
}
