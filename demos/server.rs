//! Interactive peripheral running on a simulated radio.
//!
//! Lines read from stdin play the role of the remote centrals:
//!
//! ```text
//! connect AA:BB            central connects
//! disconnect AA:BB         central disconnects
//! mtu AA:BB 185            MTU exchange
//! write AA:BB 2A3D hello   central writes a characteristic
//! read AA:BB 2A3D 0        central reads a characteristic at an offset
//! notify AA:BB 2A37 hi     central notifies one of its own characteristics
//! set 2A3D hello           local characteristic update
//! radio on|off             radio state change
//! start | stop | state     advertising control
//! ```

#![allow(unused_crate_dependencies)]
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures_core::future::BoxFuture;
use parking_lot::Mutex;
use sscanf::sscanf;
use tokio::sync::mpsc;
use tracing::{info, warn};

use gatt_peripheral::adv::{AdvData, AdvRequest, AdvSessionId};
use gatt_peripheral::config::{Config, ResponsePolicy};
use gatt_peripheral::event::{AdapterEvent, ClientEvent, Event, PeripheralEvent, ServerEvent};
use gatt_peripheral::gatt::{
    CharProps, CharacteristicDef, Perms, RemoteChar, RemoteService, RequestId, ServiceDef,
    ServiceKind, Status, CCC_UUID,
};
use gatt_peripheral::platform::{Adapter, ClientLink, Permission, PlatformError, RadioState, ServerLink};
use gatt_peripheral::*;

const HEART_RATE: Uuid = uuid16(0x180D).as_uuid();

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// Configuration file. The per-user configuration is used if omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer writes to unknown characteristics twice.
    #[arg(short, long)]
    legacy: bool,

    /// Local name to advertise.
    #[arg(short, long, default_value = "Peripheral")]
    name: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let mut cfg = match args.config {
        Some(ref path) => Config::load(path)?,
        None => Config::per_user("gatt-peripheral")?,
    };
    if args.legacy {
        cfg.response_policy = ResponsePolicy::Legacy;
    }

    let (tx, rx) = mpsc::channel(64);
    let radio = Radio::new(tx);
    let (p, mut events) = Peripheral::new(Arc::clone(&radio) as _, cfg);
    let event_loop = {
        let p = p.clone();
        tokio::task::spawn(async move { p.event_loop(rx).await })
    };
    tokio::task::spawn(async move {
        while let Some(e) = events.recv().await {
            match e {
                PeripheralEvent::StateChanged(s) => println!("state: {s}"),
                PeripheralEvent::Gatt(e) => match serde_json::to_string(&e) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("{e}"),
                },
            }
        }
    });

    p.create_server(service())?;
    let adv = AdvRequest {
        data: AdvData {
            local_name: Some(args.name.clone()),
            service_uuid: Some(HEART_RATE),
            ..AdvData::default()
        },
        ..AdvRequest::default()
    };
    if let Err(e) = p.start(adv.clone()).await {
        warn!("Advertising failed: {e}");
    }
    read_input(&p, &radio, adv).await;
    p.stop();
    p.close_server();
    event_loop.abort();
    Ok(())
}

fn service() -> ServiceDef {
    ServiceDef::new(
        HEART_RATE,
        ServiceKind::Primary,
        vec![
            CharacteristicDef::new(uuid16(0x2A37).as_uuid(), CharProps::NOTIFY, Perms::READ),
            CharacteristicDef::new(
                uuid16(0x2A3D).as_uuid(),
                CharProps::READ | CharProps::WRITE | CharProps::INDICATE,
                Perms::READ | Perms::WRITE,
            ),
        ],
    )
}

async fn read_input(p: &Peripheral, radio: &Radio, adv: AdvRequest) {
    let (ln_tx, mut ln_rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for ln in std::io::BufReader::new(std::io::stdin()).lines() {
            ln_tx.blocking_send(ln?)?;
        }
        Ok::<_, anyhow::Error>(())
    });
    let mut next_req = 0;
    loop {
        let ln: String = tokio::select! {
            ln = ln_rx.recv() => match ln {
                None => return,
                Some(ln) => ln,
            },
            _ = tokio::signal::ctrl_c() => return,
        };
        let mut tok = ln.split_ascii_whitespace();
        let Some(cmd) = tok.next() else { continue };
        next_req += 1;
        let request_id = RequestId(next_req);
        let e: Event = match (cmd, tok.collect::<Vec<&str>>().join(" ")) {
            ("connect" | "disconnect", dev) if !dev.is_empty() => ServerEvent::ConnectionStateChange {
                device: DeviceId::new(dev),
                name: None,
                status: Status::Success,
                new_state: if cmd == "connect" {
                    ConnState::Connected
                } else {
                    ConnState::Disconnected
                },
            }
            .into(),
            ("mtu", params) => {
                let Ok((dev, mtu)) = sscanf!(params, "{str} {u16}") else { continue };
                ServerEvent::MtuChanged {
                    device: DeviceId::new(dev),
                    mtu,
                }
                .into()
            }
            ("write", params) => {
                let Ok((dev, uuid, v)) = sscanf!(params, "{str} {str} {str}") else { continue };
                let Ok(uuid) = uuid.parse::<Uuid>() else { continue };
                ServerEvent::CharacteristicWriteRequest {
                    device: DeviceId::new(dev),
                    request_id,
                    characteristic: uuid,
                    prepared_write: false,
                    response_needed: true,
                    offset: 0,
                    value: v.as_bytes().to_vec(),
                }
                .into()
            }
            ("read", params) => {
                let Ok((dev, uuid, offset)) = sscanf!(params, "{str} {str} {u16}") else { continue };
                let Ok(uuid) = uuid.parse::<Uuid>() else { continue };
                ServerEvent::CharacteristicReadRequest {
                    device: DeviceId::new(dev),
                    request_id,
                    offset,
                    characteristic: uuid,
                }
                .into()
            }
            ("notify", params) => {
                let Ok((dev, uuid, v)) = sscanf!(params, "{str} {str} {str}") else { continue };
                let Ok(uuid) = uuid.parse::<Uuid>() else { continue };
                ClientEvent::CharacteristicChanged {
                    device: DeviceId::new(dev),
                    characteristic: uuid,
                    value: v.as_bytes().to_vec(),
                }
                .into()
            }
            ("set", params) => {
                let Ok((uuid, v)) = sscanf!(params, "{str} {str}") else { continue };
                let Ok(uuid) = uuid.parse::<Uuid>() else { continue };
                println!("set: {}", p.write(uuid, v));
                continue;
            }
            ("radio", params) => {
                let r = match params.as_str() {
                    "on" => RadioState::PoweredOn,
                    "off" => RadioState::PoweredOff,
                    _ => continue,
                };
                *radio.state.lock() = r;
                AdapterEvent::RadioStateChanged(r).into()
            }
            ("start", _) => {
                if let Err(e) = p.start(adv.clone()).await {
                    println!("start: {e}");
                }
                continue;
            }
            ("stop", _) => {
                p.stop();
                continue;
            }
            ("state", _) => {
                println!("{} {:?}", p.state(), p.connected_devices());
                continue;
            }
            _ => {
                eprintln!("unknown command: {ln}");
                continue;
            }
        };
        if radio.tx.send(e).await.is_err() {
            return;
        }
    }
}

/// Simulated radio that reports every operation back through the event
/// loop.
#[derive(Debug)]
struct Radio {
    state: Mutex<RadioState>,
    tx: mpsc::Sender<Event>,
}

impl Radio {
    fn new(tx: mpsc::Sender<Event>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RadioState::PoweredOn),
            tx,
        })
    }
}

fn report(tx: &mpsc::Sender<Event>, e: impl Into<Event>) {
    if let Err(e) = tx.try_send(e.into()) {
        warn!("Simulated event dropped: {e}");
    }
}

impl Adapter for Radio {
    fn radio_state(&self) -> RadioState {
        *self.state.lock()
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn missing_permission(&self) -> Option<Permission> {
        None
    }

    fn enable(&self, _prompt: bool) -> BoxFuture<'static, bool> {
        *self.state.lock() = RadioState::PoweredOn;
        report(&self.tx, AdapterEvent::RadioStateChanged(RadioState::PoweredOn));
        Box::pin(std::future::ready(true))
    }

    fn open_server(&self, svc: &ServiceDef) -> Result<Box<dyn ServerLink>, PlatformError> {
        info!("Opening server for {}", svc.uuid);
        for c in &svc.chars {
            info!("  {:?} props={:?} descriptors={:?}", c.uuid, c.props, c.descriptors());
        }
        Ok(Box::new(SimServer))
    }

    fn connect(&self, dev: &DeviceId) -> Result<Box<dyn ClientLink>, PlatformError> {
        report(
            &self.tx,
            ClientEvent::ConnectionStateChange {
                device: dev.clone(),
                status: Status::Success,
                new_state: ConnState::Connected,
            },
        );
        Ok(Box::new(SimClient {
            dev: dev.clone(),
            tx: self.tx.clone(),
        }))
    }

    fn start_advertising(&self, id: AdvSessionId, req: &AdvRequest) -> Result<(), PlatformError> {
        info!("Advertising {id}: {:?}", req.data);
        report(&self.tx, AdapterEvent::AdvertisingStarted { id, result: Ok(()) });
        Ok(())
    }

    fn stop_advertising(&self, id: AdvSessionId) -> Result<(), PlatformError> {
        info!("Advertising {id} stopped");
        Ok(())
    }
}

#[derive(Debug)]
struct SimServer;

impl ServerLink for SimServer {
    fn send_response(
        &mut self,
        dev: &DeviceId,
        req: RequestId,
        status: Status,
        offset: u16,
        value: &[u8],
    ) -> bool {
        info!("Response to {dev} [request={req}, offset={offset}]: {status} {value:02X?}");
        true
    }

    fn notify(&mut self, dev: &DeviceId, char: Uuid, value: &[u8], confirm: bool) -> bool {
        info!("Value of {char:?} sent to {dev} [confirm={confirm}]: {value:02X?}");
        true
    }

    fn clear_services(&mut self) {}

    fn close(&mut self) {
        info!("Server closed");
    }
}

#[derive(Debug)]
struct SimClient {
    dev: DeviceId,
    tx: mpsc::Sender<Event>,
}

impl ClientLink for SimClient {
    fn discover_services(&mut self) -> bool {
        let svc = RemoteService {
            uuid: HEART_RATE,
            chars: vec![RemoteChar {
                uuid: uuid16(0x2A37).as_uuid(),
                props: CharProps::NOTIFY,
                descriptors: vec![CCC_UUID],
            }],
        };
        report(
            &self.tx,
            ClientEvent::ServicesDiscovered {
                device: self.dev.clone(),
                status: Status::Success,
                services: vec![svc],
            },
        );
        true
    }

    fn set_notify(&mut self, _char: Uuid, _enable: bool) -> bool {
        true
    }

    fn write_descriptor(&mut self, char: Uuid, desc: Uuid, value: &[u8]) -> bool {
        info!("Mirror wrote {desc:?} of {char:?} on {}: {value:02X?}", self.dev);
        true
    }

    fn close(&mut self) {
        info!("Mirror to {} closed", self.dev);
    }
}
