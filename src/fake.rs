//! Recording platform used by unit tests.

use std::sync::Arc;

use futures_core::future::BoxFuture;
use parking_lot::Mutex;

use crate::adv::{AdvRequest, AdvSessionId};
use crate::gatt::{RequestId, ServiceDef, Status};
use crate::platform::{Adapter, ClientLink, Permission, PlatformError, RadioState, ServerLink};
use crate::{DeviceId, Uuid};

/// Platform call recorded by the fake.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    OpenServer(Uuid),
    Connect(DeviceId),
    StartAdvertising(AdvSessionId),
    StopAdvertising(AdvSessionId),
    Response {
        dev: DeviceId,
        req: RequestId,
        status: Status,
        offset: u16,
        value: Vec<u8>,
    },
    Notify {
        dev: DeviceId,
        char: Uuid,
        value: Vec<u8>,
        confirm: bool,
    },
    ClearServices,
    CloseServer,
    DiscoverServices(DeviceId),
    SetNotify(DeviceId, Uuid),
    WriteDescriptor(DeviceId, Uuid, Vec<u8>),
    CloseClient(DeviceId),
}

/// Adapter state controlled by the test.
#[derive(Debug)]
pub struct Knobs {
    pub radio: RadioState,
    pub supported: bool,
    pub missing: Option<Permission>,
    pub connect_fails: bool,
    pub discover_fails: bool,
    pub adv_fails: bool,
    pub set_notify_fails: Vec<Uuid>,
}

impl Default for Knobs {
    fn default() -> Self {
        Self {
            radio: RadioState::PoweredOn,
            supported: true,
            missing: None,
            connect_fails: false,
            discover_fails: false,
            adv_fails: false,
            set_notify_fails: Vec::new(),
        }
    }
}

type Log = Arc<Mutex<Vec<Call>>>;

/// Fake adapter recording every platform call.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    pub knobs: Mutex<Knobs>,
    log: Log,
}

impl FakeAdapter {
    /// Creates a powered-on adapter.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns and clears the recorded calls.
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.log.lock())
    }

    fn push(&self, c: Call) {
        self.log.lock().push(c);
    }
}

impl Adapter for FakeAdapter {
    fn radio_state(&self) -> RadioState {
        self.knobs.lock().radio
    }

    fn is_supported(&self) -> bool {
        self.knobs.lock().supported
    }

    fn missing_permission(&self) -> Option<Permission> {
        self.knobs.lock().missing
    }

    fn enable(&self, _prompt: bool) -> BoxFuture<'static, bool> {
        let on = self.knobs.lock().radio == RadioState::PoweredOn;
        Box::pin(async move { on })
    }

    fn open_server(&self, svc: &ServiceDef) -> Result<Box<dyn ServerLink>, PlatformError> {
        self.push(Call::OpenServer(svc.uuid));
        Ok(Box::new(FakeServer(Arc::clone(&self.log))))
    }

    fn connect(&self, dev: &DeviceId) -> Result<Box<dyn ClientLink>, PlatformError> {
        if self.knobs.lock().connect_fails {
            return Err(PlatformError::DeviceUnreachable(dev.clone()));
        }
        self.push(Call::Connect(dev.clone()));
        let k = self.knobs.lock();
        let c = FakeClient {
            dev: dev.clone(),
            discover_fails: k.discover_fails,
            fail: k.set_notify_fails.clone(),
            log: Arc::clone(&self.log),
        };
        Ok(Box::new(c))
    }

    fn start_advertising(&self, id: AdvSessionId, _req: &AdvRequest) -> Result<(), PlatformError> {
        if self.knobs.lock().adv_fails {
            return Err(PlatformError::AdvertiserUnavailable);
        }
        self.push(Call::StartAdvertising(id));
        Ok(())
    }

    fn stop_advertising(&self, id: AdvSessionId) -> Result<(), PlatformError> {
        self.push(Call::StopAdvertising(id));
        Ok(())
    }
}

#[derive(Debug)]
struct FakeServer(Log);

impl ServerLink for FakeServer {
    fn send_response(
        &mut self,
        dev: &DeviceId,
        req: RequestId,
        status: Status,
        offset: u16,
        value: &[u8],
    ) -> bool {
        self.0.lock().push(Call::Response {
            dev: dev.clone(),
            req,
            status,
            offset,
            value: value.to_vec(),
        });
        true
    }

    fn notify(&mut self, dev: &DeviceId, char: Uuid, value: &[u8], confirm: bool) -> bool {
        self.0.lock().push(Call::Notify {
            dev: dev.clone(),
            char,
            value: value.to_vec(),
            confirm,
        });
        true
    }

    fn clear_services(&mut self) {
        self.0.lock().push(Call::ClearServices);
    }

    fn close(&mut self) {
        self.0.lock().push(Call::CloseServer);
    }
}

#[derive(Debug)]
struct FakeClient {
    dev: DeviceId,
    discover_fails: bool,
    fail: Vec<Uuid>,
    log: Log,
}

impl ClientLink for FakeClient {
    fn discover_services(&mut self) -> bool {
        if self.discover_fails {
            return false;
        }
        self.log.lock().push(Call::DiscoverServices(self.dev.clone()));
        true
    }

    fn set_notify(&mut self, char: Uuid, _enable: bool) -> bool {
        if self.fail.contains(&char) {
            return false;
        }
        self.log.lock().push(Call::SetNotify(self.dev.clone(), char));
        true
    }

    fn write_descriptor(&mut self, char: Uuid, _desc: Uuid, value: &[u8]) -> bool {
        (self.log.lock()).push(Call::WriteDescriptor(self.dev.clone(), char, value.to_vec()));
        true
    }

    fn close(&mut self) {
        self.log.lock().push(Call::CloseClient(self.dev.clone()));
    }
}
