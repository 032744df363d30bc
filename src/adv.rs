//! Advertising requests and the advertising session controller.

use std::fmt::{Display, Formatter};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{CompanyId, Uuid};

/// Advertising failure reported by the platform.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum AdvFailure {
    #[error("advertising data too large")]
    DataTooLarge = 1,
    #[error("too many advertisers")]
    TooManyAdvertisers = 2,
    #[error("advertising already started")]
    AlreadyStarted = 3,
    #[error("internal error")]
    InternalError = 4,
    #[error("feature unsupported")]
    FeatureUnsupported = 5,
}

/// Advertising session identifier. Every call to
/// [`crate::Peripheral::start`] uses a new identifier.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct AdvSessionId(u64);

impl AdvSessionId {
    /// Returns the raw identifier.
    #[inline(always)]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for AdvSessionId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical layer ([Vol 6] Part A, Section 3).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
)]
#[repr(u8)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phy {
    #[strum(serialize = "LE 1M")]
    Le1M = 1,
    #[strum(serialize = "LE 2M")]
    Le2M = 2,
    #[strum(serialize = "LE Coded")]
    LeCoded = 3,
}

/// Advertising or scan response payload. The platform assembles the actual
/// AD structures.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvData {
    pub manufacturer_id: Option<CompanyId>,
    pub manufacturer_data: Option<Vec<u8>>,
    pub service_data_uuid: Option<Uuid>,
    pub service_data: Option<Vec<u8>>,
    #[serde(alias = "uuid")]
    pub service_uuid: Option<Uuid>,
    pub service_solicitation_uuid: Option<Uuid>,
    pub local_name: Option<String>,
    pub include_device_name: bool,
    #[serde(alias = "transmissionPowerIncluded")]
    pub include_tx_power_level: bool,
}

impl AdvData {
    /// Returns whether the payload contains no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Legacy advertising mode.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
#[serde(into = "u8", try_from = "u8")]
pub enum AdvMode {
    LowPower = 0,
    Balanced = 1,
    LowLatency = 2,
}

/// Legacy advertising TX power level.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
#[serde(into = "u8", try_from = "u8")]
pub enum TxPowerLevel {
    UltraLow = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

/// Legacy advertising settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvSettings {
    pub advertise_mode: AdvMode,
    pub connectable: bool,
    /// Advertising timeout in milliseconds. Zero means no timeout.
    pub timeout: u32,
    pub tx_power_level: TxPowerLevel,
}

impl Default for AdvSettings {
    fn default() -> Self {
        Self {
            advertise_mode: AdvMode::LowLatency,
            connectable: true,
            timeout: 0,
            tx_power_level: TxPowerLevel::High,
        }
    }
}

/// Periodic advertising parameters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeriodicParams {
    pub include_tx_power: bool,
    /// Periodic advertising interval in 1.25ms units.
    pub interval: u16,
}

/// Extended advertising set parameters.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvSetParams {
    pub anonymous: bool,
    pub connectable: bool,
    #[serde(alias = "setIncludeTxPower")]
    pub include_tx_power: bool,
    /// Advertising interval in 0.625ms units.
    pub interval: u32,
    pub legacy_mode: bool,
    pub primary_phy: Phy,
    pub secondary_phy: Phy,
    pub scannable: bool,
    /// TX power in dBm.
    pub tx_power_level: i8,
    /// Maximum number of extended advertising events. Zero means no limit.
    pub max_extended_advertising_events: u8,
    /// Advertising duration in 10ms units. Zero means no limit.
    pub duration: u16,
    pub periodic_data: Option<AdvData>,
    pub periodic_params: Option<PeriodicParams>,
}

impl Default for AdvSetParams {
    fn default() -> Self {
        Self {
            anonymous: false,
            connectable: true,
            include_tx_power: false,
            interval: 160,
            legacy_mode: false,
            primary_phy: Phy::Le1M,
            secondary_phy: Phy::Le1M,
            scannable: false,
            tx_power_level: -7,
            max_extended_advertising_events: 0,
            duration: 0,
            periodic_data: None,
            periodic_params: None,
        }
    }
}

/// Advertising parameter set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvParams {
    Legacy(AdvSettings),
    Set(AdvSetParams),
}

impl Default for AdvParams {
    #[inline]
    fn default() -> Self {
        Self::Legacy(AdvSettings::default())
    }
}

/// Complete advertising request handed to the platform.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AdvRequest {
    pub data: AdvData,
    pub scan_response: Option<AdvData>,
    pub params: AdvParams,
}

type Reply = oneshot::Sender<Result<(), AdvFailure>>;

/// Advertising session state.
#[derive(Debug)]
struct Session {
    id: AdvSessionId,
    reply: Option<Reply>,
}

/// Advertising controller owning at most one session.
#[derive(Debug, Default)]
pub(crate) struct Controller {
    last: u64,
    session: Option<Session>,
}

impl Controller {
    /// Creates a new session. Returns an error if a session already exists.
    pub fn begin(&mut self) -> Result<(AdvSessionId, oneshot::Receiver<Result<(), AdvFailure>>), AdvFailure> {
        if let Some(s) = self.session.as_ref() {
            debug!("Advertising session {} already exists", s.id);
            return Err(AdvFailure::AlreadyStarted);
        }
        self.last += 1;
        let id = AdvSessionId(self.last);
        let (tx, rx) = oneshot::channel();
        self.session = Some(Session { id, reply: Some(tx) });
        debug!("Advertising session {id} created");
        Ok((id, rx))
    }

    /// Completes a pending session start. Returns `Some(true)` if the session
    /// is now advertising, `Some(false)` if it failed and was removed, and
    /// [`None`] if the report is for a stale session.
    pub fn complete(&mut self, id: AdvSessionId, r: Result<(), AdvFailure>) -> Option<bool> {
        let Some(s) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("Ignoring result for stale advertising session {id}");
            return None;
        };
        let Some(reply) = s.reply.take() else {
            debug!("Duplicate result for advertising session {id}");
            return None;
        };
        let ok = r.is_ok();
        if let Err(e) = r {
            warn!("Advertising session {id} failed: {e}");
            self.session = None;
        }
        // The caller may have stopped waiting
        let _ = reply.send(r);
        Some(ok)
    }

    /// Removes the current session, cancelling a pending start.
    #[inline]
    pub fn end(&mut self) -> Option<AdvSessionId> {
        self.session.take().map(|s| s.id)
    }

    /// Returns the current session identifier.
    #[inline]
    pub fn current(&self) -> Option<AdvSessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Returns whether the current session has been started by the platform.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.session, Some(Session { reply: None, .. }))
    }
}
