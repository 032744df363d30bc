use std::fmt::{Display, Formatter};

use bitflags::bitflags;
use gatt_peripheral_const::Descriptor;

use crate::Uuid;

/// Client Characteristic Configuration descriptor UUID.
pub const CCC_UUID: Uuid = Descriptor::ClientCharacteristicConfiguration.uuid();

/// GATT operation status. ATT error codes ([Vol 3] Part F, Section 3.4.1.1)
/// are used as-is and platform-specific codes are added above them.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::FromPrimitive,
    num_enum::IntoPrimitive,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u16)]
#[serde(from = "u16", into = "u16")]
pub enum Status {
    Success = 0x00,
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    InvalidPdu = 0x04,
    InsufficientAuthentication = 0x05,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufficientAuthorization = 0x08,
    PrepareQueueFull = 0x09,
    AttributeNotFound = 0x0A,
    AttributeNotLong = 0x0B,
    EncryptionKeySizeTooShort = 0x0C,
    InvalidAttributeValueLength = 0x0D,
    UnlikelyError = 0x0E,
    InsufficientEncryption = 0x0F,
    UnsupportedGroupType = 0x10,
    InsufficientResources = 0x11,
    ConnectionCongested = 0x8F,
    ConnectionTimeout = 0x93,
    #[num_enum(default)]
    Failure = 0x101,
}

impl Status {
    /// Returns whether status is `Success`.
    #[inline]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl Default for Status {
    #[inline]
    fn default() -> Self {
        Self::Success
    }
}

/// Platform-assigned identifier correlating a request with its response.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct RequestId(pub i32);

impl Display for RequestId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

bitflags! {
    /// Client Characteristic Configuration descriptor value
    /// ([Vol 3] Part G, Section 3.3.3.3).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Cccd: u16 {
        /// The Characteristic Value shall be notified.
        const NOTIFY = 1 << 0;
        /// The Characteristic Value shall be indicated.
        const INDICATE = 1 << 1;
    }
}

impl Cccd {
    /// Returns the little-endian descriptor value.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.bits().to_le_bytes()
    }
}
