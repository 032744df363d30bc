use tracing::{debug, info, trace, warn};

use crate::config::ResponsePolicy;
use crate::event::{GattEvent, ServerEvent};
use crate::platform::ServerLink;
use crate::{ConnState, DeviceId, PeripheralState, Uuid};

use super::*;

/// GATT server engine serving the registered characteristics to all
/// connected centrals.
#[derive(Debug, Default)]
pub struct Server {
    reg: Registry,
    link: Option<Box<dyn ServerLink>>,
}

impl Server {
    /// Returns the characteristic registry.
    #[inline(always)]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.reg
    }

    /// Returns whether a server link is open.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Registers the service and installs the platform server link. If the
    /// service contains duplicate characteristics, the link is closed and the
    /// offending UUID is returned.
    pub(crate) fn open(
        &mut self,
        svc: ServiceDef,
        mut link: Box<dyn ServerLink>,
    ) -> Result<(), Uuid> {
        if let Err(dup) = self.reg.register(svc) {
            warn!("Duplicate characteristic {dup:?}");
            link.close();
            return Err(dup);
        }
        self.link = Some(link);
        info!("GATT server open with {} characteristics", self.reg.len());
        Ok(())
    }

    /// Clears the registry and then releases the server link. Calling this
    /// when no server is open has no effect.
    pub(crate) fn close(&mut self) {
        self.reg.clear();
        if let Some(mut link) = self.link.take() {
            link.clear_services();
            link.close();
            info!("GATT server closed");
        }
    }

    /// Replaces the value of a local characteristic and pushes it to
    /// connected centrals. Returns `false` for an unknown characteristic.
    pub(crate) fn write(&mut self, cx: &Ctx<'_>, uuid: Uuid, value: Vec<u8>) -> bool {
        if !self.reg.write(uuid, value) {
            debug!("Write to unknown characteristic {uuid:?}");
            return false;
        }
        self.notify(cx, uuid);
        true
    }

    /// Sends the current value of `uuid` to every connected central, as an
    /// indication if the characteristic supports indications but not
    /// notifications. Payloads are truncated to the device MTU. Returns the
    /// number of devices that accepted the value.
    pub(crate) fn notify(&mut self, cx: &Ctx<'_>, uuid: Uuid) -> usize {
        let (Some(props), Some(value), Some(link)) =
            (self.reg.props(uuid), self.reg.read(uuid), self.link.as_mut())
        else {
            return 0;
        };
        if !props.can_push() {
            return 0;
        }
        let confirm = props.confirm();
        let mut n = 0;
        for d in cx.devs.iter() {
            let v = &value[..value.len().min(d.max_ntf_len())];
            if link.notify(&d.id, uuid, v, confirm) {
                n += 1;
            } else {
                warn!("Failed to notify {} of {uuid:?}", d.id);
            }
        }
        trace!("Notified {n} devices of {uuid:?} [confirm={confirm}]");
        n
    }

    /// Handles a server callback.
    pub(crate) fn handle(&mut self, cx: &mut Ctx<'_>, e: ServerEvent) {
        use ServerEvent::*;
        match e {
            ConnectionStateChange {
                device,
                name,
                status,
                new_state,
            } => self.on_connection_state_change(cx, device, name, status, new_state),
            MtuChanged { device, mtu } => match cx.devs.get_mut(&device) {
                Some(d) => {
                    debug!("MTU changed for {device}: {mtu}");
                    d.mtu = mtu;
                }
                None => debug!("MTU changed for unknown device {device}: {mtu}"),
            },
            NotificationSent { device, status } => {
                trace!("Notification sent to {device}: {status}");
            }
            ServiceAdded { status, service } => {
                if status.is_ok() {
                    debug!("Service added: {service}");
                } else {
                    warn!("Failed to add service {service}: {status}");
                }
            }
            PhyUpdate {
                device,
                tx_phy,
                rx_phy,
                status,
            } => debug!("PHY update for {device}: tx={tx_phy} rx={rx_phy} ({status})"),
            req => {
                if self.link.is_none() {
                    warn!("Dropping request with no open server: {req:?}");
                    return;
                }
                self.on_request(cx, req);
            }
        }
    }

    fn on_request(&mut self, cx: &mut Ctx<'_>, req: ServerEvent) {
        use ServerEvent::*;
        match req {
            CharacteristicReadRequest {
                device,
                request_id,
                offset,
                characteristic,
            } => self.on_read(cx, device, request_id, offset, characteristic),
            CharacteristicWriteRequest {
                device,
                request_id,
                characteristic,
                prepared_write,
                response_needed,
                offset,
                value,
            } => {
                let req = WriteReq {
                    device,
                    request_id,
                    characteristic,
                    prepared_write,
                    response_needed,
                    offset,
                    value,
                };
                self.on_write(cx, req);
            }
            DescriptorReadRequest {
                device,
                request_id,
                offset,
                characteristic,
                descriptor,
            } => {
                trace!("Descriptor read {descriptor:?} of {characteristic:?} from {device}");
                if descriptor == CCC_UUID {
                    let v = Cccd::empty().to_bytes();
                    match v.get(usize::from(offset)..) {
                        Some(v) => self.respond(&device, request_id, Status::Success, offset, v),
                        None => self.respond(&device, request_id, Status::InvalidOffset, offset, &[]),
                    }
                } else {
                    self.respond(&device, request_id, Status::Failure, offset, &[]);
                }
            }
            DescriptorWriteRequest {
                device,
                request_id,
                characteristic,
                descriptor,
                response_needed,
                offset,
                value,
                ..
            } => {
                debug!("Descriptor write {descriptor:?} of {characteristic:?} from {device}: {value:02X?}");
                if response_needed {
                    self.respond(&device, request_id, Status::Success, offset, &value);
                }
            }
            ExecuteWrite {
                device,
                request_id,
                execute,
            } => {
                debug!("Execute write from {device} [execute={execute}]");
                self.respond(&device, request_id, Status::Success, 0, &[]);
            }
            e => trace!("Ignoring {e:?}"),
        }
    }

    fn on_connection_state_change(
        &mut self,
        cx: &mut Ctx<'_>,
        device: DeviceId,
        name: Option<String>,
        status: Status,
        new_state: ConnState,
    ) {
        info!("Connection state change for {device}: {new_state} ({status})");
        match (status.is_ok(), new_state) {
            (true, ConnState::Connected) => {
                if cx.devs.insert(&device, name, cx.cfg.default_mtu) {
                    if cx.cfg.mirror_client {
                        let m = Mirror::open(cx.adapter, &device);
                        if let Some(d) = cx.devs.get_mut(&device) {
                            d.mirror = m;
                        }
                    }
                } else {
                    debug!("{device} is already connected");
                }
                cx.sink.set_state(PeripheralState::Connected);
            }
            (true, ConnState::Connecting | ConnState::Disconnecting) => {}
            _ => {
                if let Some(mut m) = cx.devs.remove(&device).and_then(|d| d.mirror) {
                    m.close();
                }
                if cx.devs.is_empty() {
                    cx.sink.set_state(PeripheralState::Idle);
                }
            }
        }
        cx.sink.gatt(GattEvent::ConnectionStateChange {
            device,
            status,
            new_state,
        });
    }

    fn on_read(&mut self, cx: &Ctx<'_>, device: DeviceId, request_id: RequestId, offset: u16, uuid: Uuid) {
        let Some(value) = self.reg.read(uuid) else {
            warn!("Read request from {device} for unknown characteristic {uuid:?}");
            self.respond(&device, request_id, Status::Failure, offset, &[]);
            return;
        };
        let Some(value) = value.get(usize::from(offset)..).map(<[u8]>::to_vec) else {
            debug!("Read request from {device} for {uuid:?} at invalid offset {offset}");
            self.respond(&device, request_id, Status::InvalidOffset, offset, &[]);
            return;
        };
        self.respond(&device, request_id, Status::Success, offset, &value);
        cx.sink.gatt(GattEvent::CharacteristicReadRequest {
            device,
            request_id,
            offset,
            characteristic: uuid,
        });
    }

    fn on_write(&mut self, cx: &Ctx<'_>, req: WriteReq) {
        let WriteReq {
            device,
            request_id,
            characteristic: uuid,
            prepared_write,
            response_needed,
            offset,
            value,
        } = req;
        let Some(cur) = self.reg.read(uuid) else {
            warn!("Write request from {device} for unknown characteristic {uuid:?}");
            self.respond(&device, request_id, Status::Failure, offset, &[]);
            if response_needed && cx.cfg.response_policy == ResponsePolicy::Legacy {
                self.respond(&device, request_id, Status::Success, offset, &value);
            }
            return;
        };
        let off = usize::from(offset);
        if off > cur.len() {
            debug!("Write request from {device} for {uuid:?} at invalid offset {offset}");
            self.respond(&device, request_id, Status::InvalidOffset, offset, &[]);
            return;
        }
        if !value.is_empty() {
            let mut v = Vec::with_capacity(off + value.len());
            v.extend_from_slice(&cur[..off]);
            v.extend_from_slice(&value);
            self.reg.write(uuid, v);
            if cx.cfg.notify_on_remote_write {
                self.notify(cx, uuid);
            }
            cx.sink.gatt(GattEvent::CharacteristicWriteRequest {
                device: device.clone(),
                request_id,
                characteristic: uuid,
                prepared_write,
                response_needed,
                offset,
                value: value.clone(),
            });
        }
        if response_needed {
            self.respond(&device, request_id, Status::Success, offset, &value);
        }
    }

    fn respond(&mut self, dev: &DeviceId, req: RequestId, status: Status, offset: u16, value: &[u8]) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if !link.send_response(dev, req, status, offset, value) {
            warn!("Failed to send {status} response to {dev} [request={req}]");
        }
    }
}

/// Decoded characteristic write request.
#[derive(Debug)]
struct WriteReq {
    device: DeviceId,
    request_id: RequestId,
    characteristic: Uuid,
    prepared_write: bool,
    response_needed: bool,
    offset: u16,
    value: Vec<u8>,
}
