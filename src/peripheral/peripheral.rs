use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::adv::{self, AdvRequest};
use crate::command::Command;
use crate::config::Config;
use crate::dev::DeviceTable;
use crate::event::{AdapterEvent, Event, Events, Sink};
use crate::gatt::{self, Ctx, MirrorState, ServiceDef};
use crate::platform::{Adapter, RadioState};
use crate::state::StateCell;
use crate::{DeviceId, Error, PeripheralState, Result, Uuid};

#[cfg(test)]
mod tests;

/// GATT peripheral. Cloning returns a handle to the same peripheral.
///
/// All state is guarded by a single lock. Platform callbacks passed to
/// [`Self::handle`] and application commands are serialized through it, and
/// every resulting event is published before the lock is released, so the
/// event stream observes state changes in the order they were made.
/// [`Self::is_advertising`] and [`Self::is_connected`] do not take the lock.
#[derive(Clone, Debug)]
pub struct Peripheral(Arc<Inner>);

#[derive(Debug)]
struct Inner {
    adapter: Arc<dyn Adapter>,
    state: Arc<StateCell>,
    core: Mutex<Core>,
}

/// State guarded by the peripheral lock.
#[derive(Debug)]
struct Core {
    cfg: Config,
    srv: gatt::Server,
    devs: DeviceTable,
    adv: adv::Controller,
    sink: Sink,
}

impl Core {
    /// Splits the state into the server engine and the context shared with
    /// the other engines.
    fn split<'a>(&'a mut self, adapter: &'a dyn Adapter) -> (&'a mut gatt::Server, Ctx<'a>) {
        let cx = Ctx {
            adapter,
            cfg: &self.cfg,
            devs: &mut self.devs,
            sink: &self.sink,
        };
        (&mut self.srv, cx)
    }

    /// Handles a radio state change. When the radio becomes unavailable, the
    /// advertising session is cancelled and all connections are dropped.
    fn on_radio_state(&mut self, r: RadioState) {
        info!("Radio state: {r}");
        let mut s = r.peripheral_state();
        if s.is_unavailable() || r == RadioState::Resetting {
            // A radio reset tears down the platform advertiser
            if let Some(id) = self.adv.end() {
                debug!("Advertising session {id} cancelled");
            }
        }
        if s.is_unavailable() {
            for id in self.devs.ids() {
                if let Some(mut m) = self.devs.remove(&id).and_then(|d| d.mirror) {
                    m.close();
                }
            }
        } else if s == PeripheralState::Idle && !self.devs.is_empty() {
            s = PeripheralState::Connected;
        } else if s == PeripheralState::Idle && self.adv.is_active() {
            s = PeripheralState::Advertising;
        }
        self.sink.set_state(s);
    }
}

impl Peripheral {
    /// Creates a peripheral using the platform `adapter`. Returns the
    /// peripheral and its event stream.
    #[must_use]
    pub fn new(adapter: Arc<dyn Adapter>, cfg: Config) -> (Self, Events) {
        let state = Arc::new(StateCell::default());
        let (sink, events) = Sink::new(Arc::clone(&state));
        let core = Core {
            cfg,
            srv: gatt::Server::default(),
            devs: DeviceTable::default(),
            adv: adv::Controller::default(),
            sink,
        };
        let inner = Inner {
            adapter,
            state,
            core: Mutex::new(core),
        };
        (Self(Arc::new(inner)), events)
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> Config {
        self.0.core.lock().cfg.clone()
    }

    /// Returns the current peripheral state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> PeripheralState {
        self.0.state.get()
    }

    /// Returns whether the peripheral is advertising.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.state() == PeripheralState::Advertising
    }

    /// Returns whether at least one central is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == PeripheralState::Connected
    }

    /// Returns whether the platform supports the peripheral role.
    #[inline]
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.0.adapter.is_supported()
    }

    /// Turns the radio on, prompting the user if `prompt` is set.
    pub async fn enable(&self, prompt: bool) -> bool {
        let on = self.0.adapter.enable(prompt).await;
        debug!("Radio enable [prompt={prompt}]: {on}");
        on
    }

    /// Returns the identifiers of connected centrals.
    #[must_use]
    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.0.core.lock().devs.ids()
    }

    /// Returns the mirror connection state of a connected central.
    #[must_use]
    pub fn mirror_state(&self, dev: &DeviceId) -> Option<MirrorState> {
        let core = self.0.core.lock();
        core.devs.get(dev)?.mirror.as_ref().map(gatt::Mirror::state)
    }

    /// Opens the GATT server exposing service `svc`.
    pub fn create_server(&self, svc: ServiceDef) -> Result<()> {
        let mut core = self.0.core.lock();
        self.check(&core)?;
        if core.srv.is_open() {
            return Err(Error::ServerAlreadyOpen);
        }
        if let Some(dup) = svc.duplicate() {
            return Err(Error::InvalidArgument(format!("duplicate characteristic {dup}")));
        }
        let link = self.0.adapter.open_server(&svc).map_err(|e| {
            error!("Failed to open GATT server: {e}");
            e
        })?;
        (core.srv.open(svc, link))
            .map_err(|dup| Error::InvalidArgument(format!("duplicate characteristic {dup}")))
    }

    /// Clears all characteristics and closes the GATT server. Connected
    /// centrals remain in the device table until the platform reports their
    /// disconnection.
    pub fn close_server(&self) {
        self.0.core.lock().srv.close();
    }

    /// Replaces the value of a local characteristic and notifies connected
    /// centrals. Returns `false` if the characteristic does not exist.
    pub fn write(&self, uuid: Uuid, value: impl Into<Vec<u8>>) -> bool {
        let mut core = self.0.core.lock();
        let (srv, cx) = core.split(self.0.adapter.as_ref());
        srv.write(&cx, uuid, value.into())
    }

    /// Returns the value of a local characteristic.
    #[must_use]
    pub fn read(&self, uuid: Uuid) -> Option<Vec<u8>> {
        (self.0.core.lock().srv.registry().read(uuid)).map(<[u8]>::to_vec)
    }

    /// Starts advertising and waits for the platform to report the outcome.
    /// The state changes to [`PeripheralState::Advertising`] on success and is
    /// unchanged on failure.
    pub async fn start(&self, req: AdvRequest) -> Result<()> {
        let (id, rx) = {
            let mut core = self.0.core.lock();
            self.check(&core)?;
            core.adv.begin()?
        };
        info!("Starting advertising session {id}");
        if let Err(e) = self.0.adapter.start_advertising(id, &req) {
            error!("Failed to start advertising session {id}: {e}");
            let mut core = self.0.core.lock();
            if core.adv.current() == Some(id) {
                core.adv.end();
            }
            return Err(e.into());
        }
        match rx.await {
            Ok(r) => Ok(r?),
            Err(_) => Err(Error::AdvertisingCancelled),
        }
    }

    /// Stops advertising and sets the state to [`PeripheralState::Idle`].
    /// Calling this when advertising was never started only publishes the
    /// state.
    pub fn stop(&self) {
        let mut core = self.0.core.lock();
        match core.adv.end() {
            Some(id) => {
                info!("Stopping advertising session {id}");
                if let Err(e) = self.0.adapter.stop_advertising(id) {
                    warn!("Failed to stop advertising session {id}: {e}");
                }
            }
            None => debug!("No advertising session to stop"),
        }
        core.sink.set_state(PeripheralState::Idle);
    }

    /// Handles a platform callback.
    pub fn handle(&self, e: impl Into<Event>) {
        let e = e.into();
        trace!("Event: {e:?}");
        let mut core = self.0.core.lock();
        match e {
            Event::Adapter(AdapterEvent::RadioStateChanged(r)) => core.on_radio_state(r),
            Event::Adapter(AdapterEvent::AdvertisingStarted { id, result }) => {
                if core.adv.complete(id, result) == Some(true) {
                    info!("Advertising session {id} started");
                    core.sink.set_state(PeripheralState::Advertising);
                }
            }
            Event::Server(e) => {
                let (srv, mut cx) = core.split(self.0.adapter.as_ref());
                srv.handle(&mut cx, e);
            }
            Event::Client(e) => {
                let (_, mut cx) = core.split(self.0.adapter.as_ref());
                gatt::Mirror::handle(&mut cx, e);
            }
        }
    }

    /// Handles events from `rx` until the channel is closed.
    pub async fn event_loop(&self, mut rx: mpsc::Receiver<Event>) {
        debug!("Event loop started");
        while let Some(e) = rx.recv().await {
            self.handle(e);
        }
        debug!("Event loop terminating");
    }

    /// Decodes and executes a method call.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value> {
        let cmd = Command::decode(method, args).map_err(|e| {
            warn!("Invalid {method} call: {e}");
            e
        })?;
        self.execute(cmd).await
    }

    /// Executes a command and returns its result.
    pub async fn execute(&self, cmd: Command) -> Result<Value> {
        debug!("Command: {}", cmd.method());
        Ok(match cmd {
            Command::CreateServer(svc) => {
                self.create_server(svc)?;
                Value::Null
            }
            Command::CloseServer => {
                self.close_server();
                Value::Null
            }
            Command::WriteCharacteristic { uuid, data } => Value::Bool(self.write(uuid, data)),
            Command::ReadCharacteristic { uuid } => self.read(uuid).map_or(Value::Null, Value::from),
            Command::Start(req) => {
                self.start(req).await?;
                Value::Null
            }
            Command::Stop => {
                self.stop();
                Value::Null
            }
            Command::IsAdvertising => Value::Bool(self.is_advertising()),
            Command::IsConnected => Value::Bool(self.is_connected()),
            Command::IsSupported => Value::Bool(self.is_supported()),
            Command::Enable { prompt } => Value::Bool(self.enable(prompt).await),
        })
    }

    /// Verifies that the radio can be used. Capability failures are published
    /// as the peripheral state.
    fn check(&self, core: &Core) -> Result<()> {
        let a = self.0.adapter.as_ref();
        let unavailable = if a.is_supported() {
            Some(a.radio_state().peripheral_state()).filter(|s| s.is_unavailable())
        } else {
            Some(PeripheralState::Unsupported)
        };
        if let Some(s) = unavailable {
            error!("Bluetooth is {s}");
            core.sink.set_state(s);
            return Err(Error::Unavailable(s));
        }
        if let Some(p) = a.missing_permission() {
            error!("Missing permission {p}");
            return Err(Error::Permission(p));
        }
        Ok(())
    }
}
