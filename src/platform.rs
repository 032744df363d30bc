//! Platform capability interfaces.
//!
//! The peripheral never talks to a radio directly. A platform integration
//! implements [`Adapter`] to provide adapter state, permission checks, and
//! the factories for server and client links, and reports everything that
//! happens on the radio back through [`crate::Peripheral::handle`].
//!
//! Most platform calls are made while the peripheral state is locked, and the
//! lock is not reentrant. Implementations must not call back into the
//! peripheral synchronously from [`ServerLink`] or [`ClientLink`] methods, or
//! from the [`Adapter`] capability queries, [`Adapter::open_server`],
//! [`Adapter::connect`], and [`Adapter::stop_advertising`]. Callbacks that
//! originate from those calls should be delivered from another thread or
//! queued through [`crate::Peripheral::event_loop`]. Only [`Adapter::enable`]
//! and [`Adapter::start_advertising`] are called without the lock held.

use std::fmt::Debug;

use futures_core::future::BoxFuture;

use crate::adv::{AdvRequest, AdvSessionId};
use crate::gatt::{RequestId, ServiceDef, Status};
use crate::{DeviceId, PeripheralState, Uuid};

/// Error reported by a platform operation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum PlatformError {
    #[error("GATT server could not be opened")]
    ServerUnavailable,
    #[error("advertiser is not available")]
    AdvertiserUnavailable,
    #[error("device {0} is not reachable")]
    DeviceUnreachable(DeviceId),
    #[error("platform error: {0}")]
    Other(String),
}

/// Adapter radio state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum RadioState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl RadioState {
    /// Returns the peripheral state implied by the radio state.
    #[must_use]
    pub const fn peripheral_state(self) -> PeripheralState {
        match self {
            Self::Unknown => PeripheralState::Unknown,
            Self::Resetting | Self::PoweredOn => PeripheralState::Idle,
            Self::Unsupported => PeripheralState::Unsupported,
            Self::Unauthorized => PeripheralState::Unauthorized,
            Self::PoweredOff => PeripheralState::PoweredOff,
        }
    }
}

/// Runtime permission that the platform may require.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum Permission {
    #[strum(serialize = "BLUETOOTH_ADVERTISE")]
    Advertise,
    #[strum(serialize = "BLUETOOTH_CONNECT")]
    Connect,
    #[strum(serialize = "ACCESS_FINE_LOCATION")]
    FineLocation,
    #[strum(serialize = "ACCESS_COARSE_LOCATION")]
    CoarseLocation,
}

/// Bluetooth adapter.
pub trait Adapter: Debug + Send + Sync {
    /// Returns the current radio state.
    fn radio_state(&self) -> RadioState;

    /// Returns whether the host supports the peripheral role.
    fn is_supported(&self) -> bool;

    /// Returns the first required runtime permission that has not been
    /// granted.
    fn missing_permission(&self) -> Option<Permission>;

    /// Turns the radio on, prompting the user if `prompt` is set. Resolves to
    /// whether the radio is on.
    fn enable(&self, prompt: bool) -> BoxFuture<'static, bool>;

    /// Opens a GATT server exposing the specified service. Called with the
    /// peripheral locked.
    fn open_server(&self, svc: &ServiceDef) -> Result<Box<dyn ServerLink>, PlatformError>;

    /// Opens a client-role connection to a connected central. Called with
    /// the peripheral locked while a server event is being handled.
    fn connect(&self, dev: &DeviceId) -> Result<Box<dyn ClientLink>, PlatformError>;

    /// Starts advertising. The outcome is reported asynchronously with
    /// [`crate::event::AdapterEvent::AdvertisingStarted`] carrying the same
    /// session `id`.
    fn start_advertising(&self, id: AdvSessionId, req: &AdvRequest) -> Result<(), PlatformError>;

    /// Stops advertising for session `id`.
    fn stop_advertising(&self, id: AdvSessionId) -> Result<(), PlatformError>;
}

/// Open GATT server.
pub trait ServerLink: Debug + Send {
    /// Answers a read or write request.
    fn send_response(
        &mut self,
        dev: &DeviceId,
        req: RequestId,
        status: Status,
        offset: u16,
        value: &[u8],
    ) -> bool;

    /// Sends a notification, or an indication if `confirm` is set.
    fn notify(&mut self, dev: &DeviceId, char: Uuid, value: &[u8], confirm: bool) -> bool;

    /// Removes all services from the server.
    fn clear_services(&mut self);

    /// Closes the server.
    fn close(&mut self);
}

/// Client-role connection to a central's GATT server.
pub trait ClientLink: Debug + Send {
    /// Starts service discovery. Completion is reported with
    /// [`crate::event::ClientEvent::ServicesDiscovered`].
    fn discover_services(&mut self) -> bool;

    /// Enables or disables local delivery of value changes.
    fn set_notify(&mut self, char: Uuid, enable: bool) -> bool;

    /// Writes a descriptor value.
    fn write_descriptor(&mut self, char: Uuid, desc: Uuid, value: &[u8]) -> bool;

    /// Closes the connection.
    fn close(&mut self);
}
