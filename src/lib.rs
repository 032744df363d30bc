//! Host-side Bluetooth LE GATT peripheral.
//!
//! The crate owns the protocol state of a peripheral that advertises its
//! presence, serves one locally defined GATT service to any number of
//! connected centrals, and subscribes to the centrals' own notifications over
//! a "mirror" client connection. Radio access is delegated to a platform
//! implementation of the [`platform::Adapter`] trait. Platform callbacks are
//! fed into [`Peripheral::handle`] and observed through [`event::Events`].

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::significant_drop_tightening)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stderr)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]

pub use gatt_peripheral_const::{uuid16, CompanyId, Uuid, Uuid16, UuidType};
pub use {dev::*, peripheral::*, state::*};

pub mod adv;
pub mod command;
pub mod config;
mod dev;
pub mod event;
#[cfg(test)]
mod fake;
#[path = "gatt/gatt.rs"]
pub mod gatt;
#[path = "peripheral/peripheral.rs"]
mod peripheral;
pub mod platform;
mod state;

/// Error type returned by the peripheral API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("bluetooth is {0}")]
    Unavailable(PeripheralState),
    #[error("missing permission {0}")]
    Permission(platform::Permission),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("method not implemented: {0}")]
    NotImplemented(String),
    #[error("GATT server is already open")]
    ServerAlreadyOpen,
    #[error("advertising failed: {0}")]
    Advertising(#[from] adv::AdvFailure),
    #[error("advertising cancelled")]
    AdvertisingCancelled,
    #[error(transparent)]
    Platform(#[from] platform::PlatformError),
}

impl Error {
    /// Returns whether the error is caused by a missing radio capability or
    /// permission. These errors persist until the platform state changes.
    #[inline]
    #[must_use]
    pub const fn is_capability(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Permission(_))
    }
}

impl From<serde_json::Error> for Error {
    #[inline]
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

impl From<gatt_peripheral_const::ParseUuidError> for Error {
    #[inline]
    fn from(e: gatt_peripheral_const::ParseUuidError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

/// Common peripheral result type.
pub type Result<T> = std::result::Result<T, Error>;
