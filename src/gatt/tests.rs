use std::sync::Arc;

use crate::config::{Config, ResponsePolicy};
use crate::dev::DeviceTable;
use crate::event::{ClientEvent, Events, GattEvent, PeripheralEvent, ServerEvent, Sink};
use crate::fake::{Call, FakeAdapter};
use crate::platform::Adapter;
use crate::state::StateCell;
use crate::{uuid16, ConnState, DeviceId, PeripheralState, Uuid};

use super::*;

const fn u(v: u16) -> Uuid {
    uuid16(v).as_uuid()
}

/// Server and mirror engines wired to a fake platform.
struct Harness {
    a: Arc<FakeAdapter>,
    cfg: Config,
    devs: DeviceTable,
    sink: Sink,
    events: Events,
    srv: Server,
}

impl Harness {
    fn new(cfg: Config) -> Self {
        let (sink, events) = Sink::new(Arc::new(StateCell::default()));
        Self {
            a: FakeAdapter::new(),
            cfg,
            devs: DeviceTable::default(),
            sink,
            events,
            srv: Server::default(),
        }
    }

    /// Creates a harness with an open server exposing characteristic 0xA1
    /// (read/write/notify) and 0xA2 (indicate).
    fn open(cfg: Config) -> Self {
        let mut h = Self::new(cfg);
        let svc = ServiceDef::new(
            u(0x180F),
            ServiceKind::Primary,
            vec![
                CharacteristicDef::new(
                    u(0xA1),
                    CharProps::READ | CharProps::WRITE | CharProps::NOTIFY,
                    Perms::READ | Perms::WRITE,
                ),
                CharacteristicDef::new(u(0xA2), CharProps::READ | CharProps::INDICATE, Perms::READ),
            ],
        );
        let link = h.a.open_server(&svc).unwrap();
        h.srv.open(svc, link).unwrap();
        h.a.take();
        h
    }

    fn with<T>(&mut self, f: impl FnOnce(&mut Server, &mut Ctx<'_>) -> T) -> T {
        let mut cx = Ctx {
            adapter: &*self.a,
            cfg: &self.cfg,
            devs: &mut self.devs,
            sink: &self.sink,
        };
        f(&mut self.srv, &mut cx)
    }

    fn server(&mut self, e: ServerEvent) {
        self.with(|s, cx| s.handle(cx, e));
    }

    fn client(&mut self, e: ClientEvent) {
        self.with(|_, cx| Mirror::handle(cx, e));
    }

    fn connect(&mut self, dev: &DeviceId, status: Status, new_state: ConnState) {
        self.server(ServerEvent::ConnectionStateChange {
            device: dev.clone(),
            name: None,
            status,
            new_state,
        });
    }

    fn read(&mut self, dev: &DeviceId, id: i32, char: Uuid, offset: u16) {
        self.server(ServerEvent::CharacteristicReadRequest {
            device: dev.clone(),
            request_id: RequestId(id),
            offset,
            characteristic: char,
        });
    }

    fn write(&mut self, dev: &DeviceId, id: i32, char: Uuid, offset: u16, v: &[u8]) {
        self.server(ServerEvent::CharacteristicWriteRequest {
            device: dev.clone(),
            request_id: RequestId(id),
            characteristic: char,
            prepared_write: false,
            response_needed: true,
            offset,
            value: v.to_vec(),
        });
    }

    fn mirror(&self, dev: &DeviceId) -> Option<&Mirror> {
        self.devs.get(dev)?.mirror.as_ref()
    }

    fn gatt(&mut self) -> Vec<GattEvent> {
        (self.events.drain().into_iter())
            .filter_map(|e| match e {
                PeripheralEvent::Gatt(e) => Some(e),
                PeripheralEvent::StateChanged(_) => None,
            })
            .collect()
    }
}

fn response(dev: &DeviceId, id: i32, status: Status, offset: u16, v: &[u8]) -> Call {
    Call::Response {
        dev: dev.clone(),
        req: RequestId(id),
        status,
        offset,
        value: v.to_vec(),
    }
}

fn no_mirror() -> Config {
    Config {
        mirror_client: false,
        ..Config::default()
    }
}

#[test]
fn registry() {
    let mut r = Registry::default();
    let dup = ServiceDef::new(
        u(0x180F),
        ServiceKind::Primary,
        vec![
            CharacteristicDef::new(u(0xA1), CharProps::READ, Perms::READ),
            CharacteristicDef::new(u(0xA1), CharProps::WRITE, Perms::WRITE),
        ],
    );
    assert_eq!(r.register(dup), Err(u(0xA1)));
    assert!(r.is_empty());

    let svc = ServiceDef::new(
        u(0x180F),
        ServiceKind::Secondary,
        vec![CharacteristicDef::new(u(0xA1), CharProps::NOTIFY, Perms::READ)],
    );
    r.register(svc).unwrap();
    assert_eq!(r.len(), 1);
    assert_eq!(r.service().unwrap().kind, ServiceKind::Secondary);
    assert_eq!(r.read(u(0xA1)), Some(&[][..]));
    assert!(r.write(u(0xA1), b"x".to_vec()));
    assert!(!r.write(u(0xA2), b"x".to_vec()));
    assert_eq!(r.read(u(0xA1)), Some(&b"x"[..]));
    assert_eq!(r.props(u(0xA1)), Some(CharProps::NOTIFY));
    r.clear();
    assert!(r.is_empty());
    assert!(r.service().is_none());
    assert_eq!(r.read(u(0xA1)), None);
}

#[test]
fn open_duplicate() {
    let mut h = Harness::new(Config::default());
    let svc = ServiceDef::new(
        u(0x180F),
        ServiceKind::Primary,
        vec![
            CharacteristicDef::new(u(0xA1), CharProps::READ, Perms::READ),
            CharacteristicDef::new(u(0xA1), CharProps::NOTIFY, Perms::READ),
        ],
    );
    let link = h.a.open_server(&svc).unwrap();
    assert_eq!(h.srv.open(svc, link), Err(u(0xA1)));
    assert!(!h.srv.is_open());
    assert!(h.srv.registry().is_empty());
    assert_eq!(h.a.take(), vec![Call::OpenServer(u(0x180F)), Call::CloseServer]);
}

#[test]
fn char_props() {
    assert!(!CharProps::READ.can_push());
    assert!(CharProps::NOTIFY.can_push());
    assert!(!CharProps::NOTIFY.confirm());
    assert!(CharProps::INDICATE.confirm());
    assert!(!(CharProps::NOTIFY | CharProps::INDICATE).confirm());
    let c = CharacteristicDef::new(u(0xA1), CharProps::INDICATE, Perms::READ);
    assert_eq!(c.descriptors(), vec![CCC_UUID]);
    let c = CharacteristicDef::new(u(0xA1), CharProps::READ, Perms::READ);
    assert!(c.descriptors().is_empty());
    assert_eq!(Cccd::INDICATE.to_bytes(), [0x02, 0x00]);
    assert_eq!(Status::from(0x0007_u16), Status::InvalidOffset);
    assert_eq!(Status::from(0x1234_u16), Status::Failure);
}

#[test]
fn connection_state() {
    let mut h = Harness::open(no_mirror());
    let (a, b) = (DeviceId::new("AA"), DeviceId::new("BB"));
    h.connect(&a, Status::Success, ConnState::Connected);
    h.connect(&b, Status::Success, ConnState::Connected);
    h.connect(&a, Status::Success, ConnState::Disconnected);
    assert_eq!(
        h.events.drain(),
        vec![
            PeripheralEvent::StateChanged(PeripheralState::Connected),
            PeripheralEvent::Gatt(GattEvent::ConnectionStateChange {
                device: a.clone(),
                status: Status::Success,
                new_state: ConnState::Connected,
            }),
            PeripheralEvent::StateChanged(PeripheralState::Connected),
            PeripheralEvent::Gatt(GattEvent::ConnectionStateChange {
                device: b.clone(),
                status: Status::Success,
                new_state: ConnState::Connected,
            }),
            PeripheralEvent::Gatt(GattEvent::ConnectionStateChange {
                device: a.clone(),
                status: Status::Success,
                new_state: ConnState::Disconnected,
            }),
        ]
    );
    assert_eq!(h.devs.ids(), vec![b.clone()]);

    // A failed status drops the device regardless of the reported state
    h.connect(&b, Status::ConnectionTimeout, ConnState::Connected);
    assert!(h.devs.is_empty());
    assert_eq!(
        h.events.drain()[0],
        PeripheralEvent::StateChanged(PeripheralState::Idle)
    );
}

#[test]
fn connection_transitional() {
    let mut h = Harness::open(no_mirror());
    let (a, b) = (DeviceId::new("AA"), DeviceId::new("BB"));
    h.connect(&a, Status::Success, ConnState::Connected);
    h.events.drain();
    h.connect(&a, Status::Success, ConnState::Disconnecting);
    h.connect(&b, Status::Success, ConnState::Connecting);
    assert_eq!(
        h.events.drain(),
        vec![
            PeripheralEvent::Gatt(GattEvent::ConnectionStateChange {
                device: a.clone(),
                status: Status::Success,
                new_state: ConnState::Disconnecting,
            }),
            PeripheralEvent::Gatt(GattEvent::ConnectionStateChange {
                device: b,
                status: Status::Success,
                new_state: ConnState::Connecting,
            }),
        ]
    );
    assert_eq!(h.devs.ids(), vec![a]);
    assert!(h.a.take().is_empty());
}

#[test]
fn read_write() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.gatt();

    h.write(&dev, 1, u(0xA1), 0, b"hello");
    assert_eq!(
        h.a.take(),
        vec![
            Call::Notify {
                dev: dev.clone(),
                char: u(0xA1),
                value: b"hello".to_vec(),
                confirm: false,
            },
            response(&dev, 1, Status::Success, 0, b"hello"),
        ]
    );
    assert_eq!(
        h.gatt(),
        vec![GattEvent::CharacteristicWriteRequest {
            device: dev.clone(),
            request_id: RequestId(1),
            characteristic: u(0xA1),
            prepared_write: false,
            response_needed: true,
            offset: 0,
            value: b"hello".to_vec(),
        }]
    );

    h.read(&dev, 2, u(0xA1), 0);
    h.read(&dev, 3, u(0xA1), 2);
    h.read(&dev, 4, u(0xA1), 5);
    h.read(&dev, 5, u(0xA1), 6);
    assert_eq!(
        h.a.take(),
        vec![
            response(&dev, 2, Status::Success, 0, b"hello"),
            response(&dev, 3, Status::Success, 2, b"llo"),
            response(&dev, 4, Status::Success, 5, b""),
            response(&dev, 5, Status::InvalidOffset, 6, b""),
        ]
    );
    assert_eq!(h.gatt().len(), 3);
}

#[test]
fn read_unknown() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.gatt();
    h.read(&dev, 1, u(0xDEAD), 0);
    assert_eq!(h.a.take(), vec![response(&dev, 1, Status::Failure, 0, b"")]);
    assert!(h.gatt().is_empty());
}

#[test]
fn write_offset() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    h.write(&dev, 1, u(0xA1), 0, b"hello");
    h.write(&dev, 2, u(0xA1), 3, b"p!");
    assert_eq!(h.srv.registry().read(u(0xA1)), Some(&b"help!"[..]));
    h.write(&dev, 3, u(0xA1), 6, b"x");
    assert_eq!(h.srv.registry().read(u(0xA1)), Some(&b"help!"[..]));

    // Empty values are acknowledged without modifying the characteristic
    h.write(&dev, 4, u(0xA1), 0, b"");
    assert_eq!(h.srv.registry().read(u(0xA1)), Some(&b"help!"[..]));
    assert_eq!(
        h.a.take(),
        vec![
            response(&dev, 1, Status::Success, 0, b"hello"),
            response(&dev, 2, Status::Success, 3, b"p!"),
            response(&dev, 3, Status::InvalidOffset, 6, b""),
            response(&dev, 4, Status::Success, 0, b""),
        ]
    );
    assert_eq!(h.gatt().len(), 2);
}

#[test]
fn write_unknown() {
    let dev = DeviceId::new("AA");
    let mut h = Harness::open(no_mirror());
    h.write(&dev, 1, u(0xDEAD), 0, b"x");
    assert_eq!(h.a.take(), vec![response(&dev, 1, Status::Failure, 0, b"")]);

    let mut h = Harness::open(Config {
        response_policy: ResponsePolicy::Legacy,
        ..no_mirror()
    });
    h.write(&dev, 1, u(0xDEAD), 0, b"x");
    assert_eq!(
        h.a.take(),
        vec![
            response(&dev, 1, Status::Failure, 0, b""),
            response(&dev, 1, Status::Success, 0, b"x"),
        ]
    );
    assert!(h.gatt().is_empty());
}

#[test]
fn notify_mtu() {
    let mut h = Harness::open(no_mirror());
    let (a, b) = (DeviceId::new("AA"), DeviceId::new("BB"));
    h.connect(&a, Status::Success, ConnState::Connected);
    h.connect(&b, Status::Success, ConnState::Connected);
    h.server(ServerEvent::MtuChanged {
        device: b.clone(),
        mtu: 5,
    });
    let v: Vec<u8> = (0..30).collect();
    assert!(h.with(|s, cx| s.write(cx, u(0xA1), v.clone())));
    assert_eq!(
        h.a.take(),
        vec![
            Call::Notify {
                dev: a,
                char: u(0xA1),
                value: v[..20].to_vec(),
                confirm: false,
            },
            Call::Notify {
                dev: b,
                char: u(0xA1),
                value: v[..2].to_vec(),
                confirm: false,
            },
        ]
    );
    assert!(!h.with(|s, cx| s.write(cx, u(0xDEAD), v)));
    assert!(h.a.take().is_empty());
}

#[test]
fn indicate() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    assert!(h.with(|s, cx| s.write(cx, u(0xA2), vec![1])));
    assert_eq!(
        h.a.take(),
        vec![Call::Notify {
            dev,
            char: u(0xA2),
            value: vec![1],
            confirm: true,
        }]
    );
}

#[test]
fn descriptors() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    for (id, desc) in [(1, CCC_UUID), (2, u(0x2901))] {
        h.server(ServerEvent::DescriptorReadRequest {
            device: dev.clone(),
            request_id: RequestId(id),
            offset: 0,
            characteristic: u(0xA1),
            descriptor: desc,
        });
    }
    h.server(ServerEvent::DescriptorWriteRequest {
        device: dev.clone(),
        request_id: RequestId(3),
        characteristic: u(0xA1),
        descriptor: CCC_UUID,
        prepared_write: false,
        response_needed: true,
        offset: 0,
        value: vec![1, 0],
    });
    h.server(ServerEvent::ExecuteWrite {
        device: dev.clone(),
        request_id: RequestId(4),
        execute: true,
    });
    assert_eq!(
        h.a.take(),
        vec![
            response(&dev, 1, Status::Success, 0, &[0, 0]),
            response(&dev, 2, Status::Failure, 0, b""),
            response(&dev, 3, Status::Success, 0, &[1, 0]),
            response(&dev, 4, Status::Success, 0, b""),
        ]
    );
}

#[test]
fn closed_server() {
    let mut h = Harness::open(no_mirror());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.srv.close();
    h.srv.close();
    assert_eq!(h.a.take(), vec![Call::ClearServices, Call::CloseServer]);
    assert!(!h.srv.is_open());
    assert!(h.srv.registry().is_empty());
    assert!(h.devs.contains(&dev));

    h.gatt();
    h.read(&dev, 1, u(0xA1), 0);
    h.write(&dev, 2, u(0xA1), 0, b"x");
    assert!(h.a.take().is_empty());
    assert!(h.gatt().is_empty());
}

fn remote(uuid: Uuid, props: CharProps, ccc: bool) -> RemoteChar {
    RemoteChar {
        uuid,
        props,
        descriptors: if ccc { vec![CCC_UUID] } else { Vec::new() },
    }
}

#[test]
fn mirror() {
    let mut h = Harness::open(Config::default());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    assert_eq!(h.a.take(), vec![Call::Connect(dev.clone())]);
    assert_eq!(h.mirror(&dev).unwrap().state(), MirrorState::Connecting);

    // A repeated connection report does not open a second mirror
    h.connect(&dev, Status::Success, ConnState::Connected);
    assert!(h.a.take().is_empty());

    h.client(ClientEvent::ConnectionStateChange {
        device: dev.clone(),
        status: Status::Success,
        new_state: ConnState::Connected,
    });
    assert_eq!(h.a.take(), vec![Call::DiscoverServices(dev.clone())]);
    assert_eq!(h.mirror(&dev).unwrap().state(), MirrorState::Discovering);

    let svc = RemoteService {
        uuid: u(0x180D),
        chars: vec![
            remote(u(0xB1), CharProps::NOTIFY | CharProps::INDICATE, true),
            remote(u(0xB2), CharProps::NOTIFY, false),
            remote(u(0xB3), CharProps::READ, true),
            remote(u(0xB4), CharProps::NOTIFY, true),
        ],
    };
    h.client(ClientEvent::ServicesDiscovered {
        device: dev.clone(),
        status: Status::Success,
        services: vec![svc],
    });
    assert_eq!(
        h.a.take(),
        vec![
            Call::SetNotify(dev.clone(), u(0xB1)),
            Call::WriteDescriptor(dev.clone(), u(0xB1), vec![2, 0]),
            Call::SetNotify(dev.clone(), u(0xB4)),
            Call::WriteDescriptor(dev.clone(), u(0xB4), vec![1, 0]),
        ]
    );
    let m = h.mirror(&dev).unwrap();
    assert_eq!(m.state(), MirrorState::Ready);
    assert_eq!(m.subscribed(), &[u(0xB1), u(0xB4)]);

    h.gatt();
    h.client(ClientEvent::CharacteristicChanged {
        device: dev.clone(),
        characteristic: u(0xB1),
        value: vec![7],
    });
    assert_eq!(
        h.gatt(),
        vec![GattEvent::NotificationReceived {
            device: dev.clone(),
            characteristic: u(0xB1),
            value: vec![7],
        }]
    );

    // Losing the mirror keeps the server connection
    h.client(ClientEvent::ConnectionStateChange {
        device: dev.clone(),
        status: Status::Success,
        new_state: ConnState::Disconnected,
    });
    assert_eq!(h.a.take(), vec![Call::CloseClient(dev.clone())]);
    assert!(h.mirror(&dev).is_none());
    assert!(h.devs.contains(&dev));
    h.client(ClientEvent::CharacteristicChanged {
        device: dev,
        characteristic: u(0xB1),
        value: vec![8],
    });
    assert!(h.gatt().is_empty());
}

#[test]
fn mirror_transitional() {
    let mut h = Harness::open(Config::default());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.a.take();
    for new_state in [ConnState::Connecting, ConnState::Disconnecting] {
        h.client(ClientEvent::ConnectionStateChange {
            device: dev.clone(),
            status: Status::Success,
            new_state,
        });
    }
    assert!(h.a.take().is_empty());
    assert_eq!(h.mirror(&dev).unwrap().state(), MirrorState::Connecting);
}

#[test]
fn mirror_discover_failure() {
    let mut h = Harness::open(Config::default());
    h.a.knobs.lock().discover_fails = true;
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.client(ClientEvent::ConnectionStateChange {
        device: dev.clone(),
        status: Status::Success,
        new_state: ConnState::Connected,
    });
    assert_eq!(h.a.take(), vec![Call::Connect(dev.clone())]);
    let m = h.mirror(&dev).unwrap();
    assert_eq!(m.state(), MirrorState::Connected);
    assert!(m.subscribed().is_empty());
}

#[test]
fn mirror_discovery_error() {
    let mut h = Harness::open(Config::default());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.client(ClientEvent::ConnectionStateChange {
        device: dev.clone(),
        status: Status::Success,
        new_state: ConnState::Connected,
    });
    h.a.take();
    h.client(ClientEvent::ServicesDiscovered {
        device: dev.clone(),
        status: Status::Failure,
        services: vec![RemoteService {
            uuid: u(0x180D),
            chars: vec![remote(u(0xB1), CharProps::NOTIFY, true)],
        }],
    });
    assert!(h.a.take().is_empty());
    let m = h.mirror(&dev).unwrap();
    assert_eq!(m.state(), MirrorState::Discovering);
    assert!(m.subscribed().is_empty());
}

#[test]
fn mirror_partial() {
    let mut h = Harness::open(Config::default());
    h.a.knobs.lock().set_notify_fails = vec![u(0xB1)];
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.a.take();
    h.client(ClientEvent::ServicesDiscovered {
        device: dev.clone(),
        status: Status::Success,
        services: vec![RemoteService {
            uuid: u(0x180D),
            chars: vec![
                remote(u(0xB1), CharProps::NOTIFY, true),
                remote(u(0xB2), CharProps::INDICATE, true),
            ],
        }],
    });
    assert_eq!(
        h.a.take(),
        vec![
            Call::SetNotify(dev.clone(), u(0xB2)),
            Call::WriteDescriptor(dev.clone(), u(0xB2), vec![2, 0]),
        ]
    );
    assert_eq!(h.mirror(&dev).unwrap().subscribed(), &[u(0xB2)]);
}

#[test]
fn mirror_disconnect() {
    let mut h = Harness::open(Config::default());
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    h.connect(&dev, Status::Success, ConnState::Disconnected);
    assert_eq!(
        h.a.take(),
        vec![Call::Connect(dev.clone()), Call::CloseClient(dev.clone())]
    );
    assert!(!h.devs.contains(&dev));

    // Events for devices that are gone are ignored
    h.client(ClientEvent::ConnectionStateChange {
        device: dev,
        status: Status::Success,
        new_state: ConnState::Connected,
    });
    assert!(h.a.take().is_empty());
}

#[test]
fn mirror_connect_failure() {
    let mut h = Harness::open(Config::default());
    h.a.knobs.lock().connect_fails = true;
    let dev = DeviceId::new("AA");
    h.connect(&dev, Status::Success, ConnState::Connected);
    assert!(h.devs.contains(&dev));
    assert!(h.mirror(&dev).is_none());
}

#[test]
fn mirror_close() {
    let (a, dev) = (FakeAdapter::new(), DeviceId::new("AA"));
    let mut m = Mirror::open(&*a, &dev).unwrap();
    m.close();
    m.close();
    assert!(m.is_closed());
    assert_eq!(m.state(), MirrorState::Closed);
    assert!(!m.on_connection_state_change(Status::Success, ConnState::Connected));
    assert_eq!(
        a.take(),
        vec![Call::Connect(dev.clone()), Call::CloseClient(dev)]
    );
}
