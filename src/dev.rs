use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use tracing::debug;

use crate::gatt::Mirror;

/// Opaque identifier of a remote device, usually its address string
/// (e.g. `"00:11:22:AA:BB:CC"`).
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identifier.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier string.
    #[inline(always)]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for DeviceId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Display for DeviceId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    #[inline]
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Link-layer connection state reported by the platform.
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
pub enum ConnState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

/// Default ATT MTU ([Vol 3] Part F, Section 3.2.8).
pub const DEFAULT_MTU: u16 = 23;

/// Connected central.
#[derive(Debug)]
pub(crate) struct ConnectedDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub mtu: u16,
    pub mirror: Option<Mirror>,
}

impl ConnectedDevice {
    /// Returns the maximum notification payload size for the current MTU.
    #[inline]
    pub fn max_ntf_len(&self) -> usize {
        // [Vol 3] Part F, Section 3.4.7.1
        usize::from(self.mtu.saturating_sub(3))
    }
}

/// Currently connected centrals.
#[derive(Debug, Default)]
pub(crate) struct DeviceTable(BTreeMap<DeviceId, ConnectedDevice>);

impl DeviceTable {
    /// Adds a new device. Returns `false` if the device is already present.
    pub fn insert(&mut self, id: &DeviceId, name: Option<String>, mtu: u16) -> bool {
        if let Some(d) = self.0.get_mut(id) {
            if name.is_some() {
                d.name = name;
            }
            return false;
        }
        debug!("Adding device {id}");
        let d = ConnectedDevice {
            id: id.clone(),
            name,
            mtu,
            mirror: None,
        };
        self.0.insert(id.clone(), d);
        true
    }

    /// Removes a device, returning its state.
    #[inline]
    pub fn remove(&mut self, id: &DeviceId) -> Option<ConnectedDevice> {
        self.0.remove(id)
    }

    /// Returns the device state.
    #[inline]
    pub fn get(&self, id: &DeviceId) -> Option<&ConnectedDevice> {
        self.0.get(id)
    }

    /// Returns the mutable device state.
    #[inline]
    pub fn get_mut(&mut self, id: &DeviceId) -> Option<&mut ConnectedDevice> {
        self.0.get_mut(id)
    }

    /// Returns whether the device is connected.
    #[cfg(test)]
    #[inline]
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.0.contains_key(id)
    }

    /// Returns the number of connected devices.
    #[cfg(test)]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there are no connected devices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over connected devices in identifier order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ConnectedDevice> {
        self.0.values()
    }

    /// Returns connected device identifiers.
    #[inline]
    pub fn ids(&self) -> Vec<DeviceId> {
        self.0.keys().cloned().collect()
    }
}
