//! Platform input events and the ordered output event stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::adv::{AdvFailure, AdvSessionId, Phy};
use crate::gatt::{RemoteService, RequestId, Status};
use crate::state::StateCell;
use crate::{ConnState, DeviceId, PeripheralState, Uuid};

/// Event reported by the platform.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    Adapter(AdapterEvent),
    Server(ServerEvent),
    Client(ClientEvent),
}

impl From<AdapterEvent> for Event {
    #[inline]
    fn from(e: AdapterEvent) -> Self {
        Self::Adapter(e)
    }
}

impl From<ServerEvent> for Event {
    #[inline]
    fn from(e: ServerEvent) -> Self {
        Self::Server(e)
    }
}

impl From<ClientEvent> for Event {
    #[inline]
    fn from(e: ClientEvent) -> Self {
        Self::Client(e)
    }
}

/// Adapter-level event.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum AdapterEvent {
    /// Radio state changed.
    RadioStateChanged(crate::platform::RadioState),
    /// Outcome of [`crate::platform::Adapter::start_advertising`].
    AdvertisingStarted {
        id: AdvSessionId,
        result: Result<(), AdvFailure>,
    },
}

/// GATT server callback.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServerEvent {
    ConnectionStateChange {
        device: DeviceId,
        name: Option<String>,
        status: Status,
        new_state: ConnState,
    },
    CharacteristicReadRequest {
        device: DeviceId,
        request_id: RequestId,
        offset: u16,
        characteristic: Uuid,
    },
    CharacteristicWriteRequest {
        device: DeviceId,
        request_id: RequestId,
        characteristic: Uuid,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Vec<u8>,
    },
    DescriptorReadRequest {
        device: DeviceId,
        request_id: RequestId,
        offset: u16,
        characteristic: Uuid,
        descriptor: Uuid,
    },
    DescriptorWriteRequest {
        device: DeviceId,
        request_id: RequestId,
        characteristic: Uuid,
        descriptor: Uuid,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Vec<u8>,
    },
    ExecuteWrite {
        device: DeviceId,
        request_id: RequestId,
        execute: bool,
    },
    MtuChanged {
        device: DeviceId,
        mtu: u16,
    },
    NotificationSent {
        device: DeviceId,
        status: Status,
    },
    ServiceAdded {
        status: Status,
        service: Uuid,
    },
    PhyUpdate {
        device: DeviceId,
        tx_phy: Phy,
        rx_phy: Phy,
        status: Status,
    },
}

/// Mirror client callback.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ClientEvent {
    ConnectionStateChange {
        device: DeviceId,
        status: Status,
        new_state: ConnState,
    },
    ServicesDiscovered {
        device: DeviceId,
        status: Status,
        services: Vec<RemoteService>,
    },
    DescriptorWrite {
        device: DeviceId,
        characteristic: Uuid,
        descriptor: Uuid,
        status: Status,
    },
    CharacteristicChanged {
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Event published to the application.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PeripheralEvent {
    StateChanged(PeripheralState),
    Gatt(GattEvent),
}

/// GATT activity observed by the server and mirror client engines. The
/// serialized form is a map with an `"event"` key naming the variant.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[non_exhaustive]
#[serde(tag = "event")]
pub enum GattEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionStateChange {
        device: DeviceId,
        status: Status,
        new_state: ConnState,
    },
    #[serde(rename_all = "camelCase")]
    CharacteristicReadRequest {
        device: DeviceId,
        request_id: RequestId,
        offset: u16,
        characteristic: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    CharacteristicWriteRequest {
        device: DeviceId,
        request_id: RequestId,
        characteristic: Uuid,
        prepared_write: bool,
        response_needed: bool,
        offset: u16,
        value: Vec<u8>,
    },
    #[serde(rename_all = "camelCase")]
    NotificationReceived {
        device: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

/// Publisher side of the event stream. State changes are written to the
/// shared cell before they are published.
#[derive(Debug)]
pub(crate) struct Sink {
    tx: mpsc::UnboundedSender<PeripheralEvent>,
    state: Arc<StateCell>,
}

impl Sink {
    /// Creates a new event stream.
    pub fn new(state: Arc<StateCell>) -> (Self, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, state }, Events(rx))
    }

    /// Returns the current state.
    #[cfg(test)]
    #[inline]
    pub fn state(&self) -> PeripheralState {
        self.state.get()
    }

    /// Updates and publishes the peripheral state. Repeated values are
    /// published as well.
    pub fn set_state(&self, s: PeripheralState) {
        debug!("Peripheral state: {s}");
        self.state.set(s);
        self.send(PeripheralEvent::StateChanged(s));
    }

    /// Publishes a GATT event.
    #[inline]
    pub fn gatt(&self, e: GattEvent) {
        self.send(PeripheralEvent::Gatt(e));
    }

    fn send(&self, e: PeripheralEvent) {
        if let Err(e) = self.tx.send(e) {
            trace!("Event dropped: {:?}", e.0);
        }
    }
}

/// Receiver of peripheral events in publication order.
#[derive(Debug)]
pub struct Events(mpsc::UnboundedReceiver<PeripheralEvent>);

impl Events {
    /// Receives the next event. Returns [`None`] after the peripheral is
    /// dropped.
    #[inline]
    pub async fn recv(&mut self) -> Option<PeripheralEvent> {
        self.0.recv().await
    }

    /// Returns the next event if one is immediately available.
    #[inline]
    pub fn try_recv(&mut self) -> Option<PeripheralEvent> {
        self.0.try_recv().ok()
    }

    /// Returns all immediately available events.
    pub fn drain(&mut self) -> Vec<PeripheralEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
