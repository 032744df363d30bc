//! Method-call surface used by an application transport.
//!
//! Commands arrive as a method name and JSON arguments, mirroring the
//! message format of a plugin channel. [`Command::decode`] validates the
//! arguments and [`crate::Peripheral::call`] executes the command.

use serde_json::{Map, Value};

use crate::adv::{AdvData, AdvParams, AdvRequest, AdvSetParams, AdvSettings, PeriodicParams};
use crate::gatt::{CharProps, CharacteristicDef, Perms, ServiceDef, ServiceKind};
use crate::{Error, Result, Uuid};

/// Decoded command.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Command {
    CreateServer(ServiceDef),
    CloseServer,
    WriteCharacteristic { uuid: Uuid, data: Vec<u8> },
    ReadCharacteristic { uuid: Uuid },
    Start(AdvRequest),
    Stop,
    IsAdvertising,
    IsConnected,
    IsSupported,
    Enable { prompt: bool },
}

impl Command {
    /// Decodes a method call. Returns [`Error::NotImplemented`] for unknown
    /// methods and [`Error::InvalidArgument`] for malformed arguments.
    pub fn decode(method: &str, args: Value) -> Result<Self> {
        Ok(match method {
            "server/create" => Self::CreateServer(serde_json::from_value::<CreateArgs>(args)?.try_into()?),
            "server/close" => Self::CloseServer,
            "characteristic/write" => {
                let a: WriteArgs = serde_json::from_value(args)?;
                Self::WriteCharacteristic {
                    uuid: a.uuid,
                    data: a.data.into(),
                }
            }
            "characteristic/read" => {
                let a: ReadArgs = serde_json::from_value(args)?;
                Self::ReadCharacteristic { uuid: a.uuid }
            }
            "start" => Self::Start(start_request(args)?),
            "stop" => Self::Stop,
            "isAdvertising" => Self::IsAdvertising,
            "isConnected" => Self::IsConnected,
            "isSupported" => Self::IsSupported,
            "enable" => Self::Enable {
                prompt: match args {
                    Value::Null => false,
                    Value::Bool(b) => b,
                    v => return Err(Error::InvalidArgument(format!("expected bool, got {v}"))),
                },
            },
            _ => return Err(Error::NotImplemented(method.to_owned())),
        })
    }

    /// Returns the method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match *self {
            Self::CreateServer(_) => "server/create",
            Self::CloseServer => "server/close",
            Self::WriteCharacteristic { .. } => "characteristic/write",
            Self::ReadCharacteristic { .. } => "characteristic/read",
            Self::Start(_) => "start",
            Self::Stop => "stop",
            Self::IsAdvertising => "isAdvertising",
            Self::IsConnected => "isConnected",
            Self::IsSupported => "isSupported",
            Self::Enable { .. } => "enable",
        }
    }
}

/// Characteristic value given either as UTF-8 text or as a byte array.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Payload> for Vec<u8> {
    #[inline]
    fn from(p: Payload) -> Self {
        match p {
            Payload::Text(s) => s.into_bytes(),
            Payload::Bytes(b) => b,
        }
    }
}

#[derive(serde::Deserialize)]
struct CreateArgs {
    uuid: Uuid,
    #[serde(default, rename = "type")]
    kind: ServiceKind,
    #[serde(default)]
    characteristics: Vec<CharArgs>,
}

#[derive(serde::Deserialize)]
struct CharArgs {
    uuid: Uuid,
    #[serde(default)]
    properties: u8,
    #[serde(default)]
    permissions: u16,
}

impl TryFrom<CreateArgs> for ServiceDef {
    type Error = Error;

    fn try_from(a: CreateArgs) -> Result<Self> {
        let chars = (a.characteristics.into_iter())
            .map(|c| {
                let perms = Perms::from_bits(c.permissions).ok_or_else(|| {
                    Error::InvalidArgument(format!("invalid permissions {:#06X} for {}", c.permissions, c.uuid))
                })?;
                let props = CharProps::from_bits_retain(c.properties);
                Ok(CharacteristicDef::new(c.uuid, props, perms))
            })
            .collect::<Result<Vec<_>>>()?;
        let svc = Self::new(a.uuid, a.kind, chars);
        if let Some(dup) = svc.duplicate() {
            return Err(Error::InvalidArgument(format!("duplicate characteristic {dup}")));
        }
        Ok(svc)
    }
}

#[derive(serde::Deserialize)]
struct WriteArgs {
    uuid: Uuid,
    data: Payload,
}

#[derive(serde::Deserialize)]
struct ReadArgs {
    uuid: Uuid,
}

#[derive(Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StartArgs {
    advertise_set: bool,
    periodic_transmission_power_included: bool,
    periodic_interval: Option<u16>,
}

/// Decodes `start` arguments. Advertising data keys are top-level, scan
/// response keys carry a `response` prefix, and periodic advertising data
/// keys carry a `periodic` prefix.
fn start_request(args: Value) -> Result<AdvRequest> {
    let Value::Object(m) = args else {
        return Err(Error::InvalidArgument("arguments are not a map".to_owned()));
    };
    let a: StartArgs = serde_json::from_value(Value::Object(m.clone()))?;
    let data: AdvData = serde_json::from_value(Value::Object(m.clone()))?;
    let scan_response = prefixed_data(&m, "response")?;
    let params = if a.advertise_set {
        let mut p: AdvSetParams = serde_json::from_value(Value::Object(m.clone()))?;
        p.periodic_data = prefixed_data(&m, "periodic")?;
        if p.periodic_data.is_some() {
            let dflt = PeriodicParams::default();
            p.periodic_params = Some(PeriodicParams {
                include_tx_power: a.periodic_transmission_power_included,
                interval: a.periodic_interval.unwrap_or(dflt.interval),
            });
        }
        AdvParams::Set(p)
    } else {
        AdvParams::Legacy(serde_json::from_value::<AdvSettings>(Value::Object(m))?)
    };
    Ok(AdvRequest {
        data,
        scan_response,
        params,
    })
}

/// Decodes advertising data from keys starting with `prefix`. Returns
/// [`None`] if there are no such keys.
fn prefixed_data(m: &Map<String, Value>, prefix: &str) -> Result<Option<AdvData>> {
    let sub: Map<String, Value> = (m.iter())
        .filter_map(|(k, v)| {
            let rest = k.strip_prefix(prefix)?;
            let mut c = rest.chars();
            let first = c.next()?;
            first
                .is_ascii_uppercase()
                .then(|| (first.to_ascii_lowercase().to_string() + c.as_str(), v.clone()))
        })
        .collect();
    let d: AdvData = serde_json::from_value(Value::Object(sub))?;
    Ok((!d.is_empty()).then_some(d))
}
