use tracing::{debug, info, warn};

use crate::event::{ClientEvent, GattEvent};
use crate::platform::{Adapter, ClientLink};
use crate::{ConnState, DeviceId, Uuid};

use super::*;

/// Characteristic discovered on a central's GATT server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteChar {
    pub uuid: Uuid,
    pub props: CharProps,
    pub descriptors: Vec<Uuid>,
}

/// Service discovered on a central's GATT server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub chars: Vec<RemoteChar>,
}

/// Mirror client connection state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum MirrorState {
    Connecting,
    Connected,
    Discovering,
    Ready,
    Closing,
    Closed,
}

/// Client-role connection back to a connected central, used to subscribe to
/// the central's notifications and indications.
#[derive(Debug)]
pub struct Mirror {
    dev: DeviceId,
    link: Box<dyn ClientLink>,
    state: MirrorState,
    subscribed: Vec<Uuid>,
}

impl Mirror {
    /// Opens a mirror connection to `dev`. Failures are logged and the device
    /// is left without a mirror.
    pub(crate) fn open(adapter: &dyn Adapter, dev: &DeviceId) -> Option<Self> {
        match adapter.connect(dev) {
            Ok(link) => {
                debug!("Mirror connecting to {dev}");
                Some(Self::new(dev.clone(), link))
            }
            Err(e) => {
                warn!("Mirror connection to {dev} failed: {e}");
                None
            }
        }
    }

    /// Creates a mirror over an existing client link.
    #[inline]
    #[must_use]
    pub(crate) fn new(dev: DeviceId, link: Box<dyn ClientLink>) -> Self {
        Self {
            dev,
            link,
            state: MirrorState::Connecting,
            subscribed: Vec::new(),
        }
    }

    /// Returns the connection state.
    #[inline(always)]
    #[must_use]
    pub const fn state(&self) -> MirrorState {
        self.state
    }

    /// Returns the characteristics for which a subscription was written.
    #[inline(always)]
    #[must_use]
    pub fn subscribed(&self) -> &[Uuid] {
        &self.subscribed
    }

    /// Returns whether the mirror has been closed.
    #[inline]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, MirrorState::Closing | MirrorState::Closed)
    }

    /// Handles a mirror client callback. Events for devices that are not
    /// connected or have no open mirror are ignored.
    pub(crate) fn handle(cx: &mut Ctx<'_>, e: ClientEvent) {
        use ClientEvent::*;
        match e {
            ConnectionStateChange {
                device,
                status,
                new_state,
            } => {
                let Some(d) = cx.devs.get_mut(&device) else {
                    debug!("Mirror state change for unknown device {device}");
                    return;
                };
                if let Some(m) = d.mirror.as_mut() {
                    if !m.on_connection_state_change(status, new_state) {
                        d.mirror = None;
                    }
                }
            }
            ServicesDiscovered {
                device,
                status,
                services,
            } => {
                if let Some(m) = Self::get(cx, &device) {
                    m.on_services_discovered(status, &services);
                }
            }
            DescriptorWrite {
                device,
                characteristic,
                descriptor,
                status,
            } => {
                if let Some(m) = Self::get(cx, &device) {
                    m.on_descriptor_write(characteristic, descriptor, status);
                }
            }
            CharacteristicChanged {
                device,
                characteristic,
                value,
            } => {
                if Self::get(cx, &device).is_none() {
                    debug!("Ignoring value of {characteristic:?} from {device} without a mirror");
                    return;
                }
                cx.sink.gatt(GattEvent::NotificationReceived {
                    device,
                    characteristic,
                    value,
                });
            }
        }
    }

    /// Returns the open mirror of `dev`.
    fn get<'a>(cx: &'a mut Ctx<'_>, dev: &DeviceId) -> Option<&'a mut Self> {
        (cx.devs.get_mut(dev)?.mirror.as_mut()).filter(|m| !m.is_closed())
    }

    /// Handles a connection state change of the mirror link. Returns `false`
    /// if the mirror was closed as a result.
    pub(crate) fn on_connection_state_change(&mut self, status: Status, new_state: ConnState) -> bool {
        if self.is_closed() {
            return false;
        }
        match (status.is_ok(), new_state) {
            (true, ConnState::Connected) => {
                info!("Mirror connected to {}", self.dev);
                self.state = MirrorState::Connected;
                if self.link.discover_services() {
                    self.state = MirrorState::Discovering;
                } else {
                    warn!("Mirror service discovery on {} failed to start", self.dev);
                }
                true
            }
            (true, ConnState::Connecting | ConnState::Disconnecting) => true,
            _ => {
                info!("Mirror to {} lost [status={status}, state={new_state}]", self.dev);
                self.close();
                false
            }
        }
    }

    /// Subscribes to every characteristic that supports notifications or
    /// indications. Indications are preferred when both are supported.
    /// Characteristics without a Client Characteristic Configuration
    /// descriptor are skipped.
    pub(crate) fn on_services_discovered(&mut self, status: Status, services: &[RemoteService]) {
        if self.is_closed() {
            return;
        }
        if !status.is_ok() {
            warn!("Mirror service discovery on {} failed: {status}", self.dev);
            return;
        }
        for c in services.iter().flat_map(|s| s.chars.iter()) {
            if !c.props.can_push() {
                continue;
            }
            if !c.descriptors.contains(&CCC_UUID) {
                debug!("Mirror skipping {:?}: no CCC descriptor", c.uuid);
                continue;
            }
            if !self.link.set_notify(c.uuid, true) {
                warn!("Mirror failed to enable delivery for {:?}", c.uuid);
                continue;
            }
            let v = if c.props.contains(CharProps::INDICATE) {
                Cccd::INDICATE
            } else {
                Cccd::NOTIFY
            };
            if self.link.write_descriptor(c.uuid, CCC_UUID, &v.to_bytes()) {
                self.subscribed.push(c.uuid);
            } else {
                warn!("Mirror failed to write CCC for {:?}", c.uuid);
            }
        }
        self.state = MirrorState::Ready;
        debug!(
            "Mirror to {} ready with {} subscriptions",
            self.dev,
            self.subscribed.len()
        );
    }

    /// Logs a descriptor write completion.
    pub(crate) fn on_descriptor_write(&self, char: Uuid, desc: Uuid, status: Status) {
        if status.is_ok() {
            debug!("Mirror descriptor {desc:?} of {char:?} written on {}", self.dev);
        } else {
            warn!("Mirror descriptor {desc:?} of {char:?} write failed on {}: {status}", self.dev);
        }
    }

    /// Closes the connection. Subsequent calls have no effect.
    pub(crate) fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = MirrorState::Closing;
        self.link.close();
        self.state = MirrorState::Closed;
        debug!("Mirror to {} closed", self.dev);
    }
}
