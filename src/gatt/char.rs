use bitflags::bitflags;

use crate::Uuid;

use super::CCC_UUID;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct CharProps: u8 {
        /// Permits broadcasts of the Characteristic Value.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_WITHOUT_RESPONSE = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment. If set, the Client Characteristic Configuration
        /// Descriptor shall exist.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        /// If set, the Client Characteristic Configuration Descriptor shall
        /// exist.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const AUTHENTICATED_SIGNED_WRITES = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXTENDED_PROPERTIES = 0x80;
    }
}

impl CharProps {
    /// Returns whether the characteristic value can be pushed to a client,
    /// which requires a Client Characteristic Configuration descriptor.
    #[inline]
    #[must_use]
    pub const fn can_push(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }

    /// Returns whether value changes are sent as indications. Notifications
    /// are used whenever they are supported.
    #[inline]
    #[must_use]
    pub const fn confirm(self) -> bool {
        self.contains(Self::INDICATE) && !self.contains(Self::NOTIFY)
    }
}

bitflags! {
    /// Attribute permissions handed to the platform. These are not enforced
    /// by the server engine.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perms: u16 {
        const READ = 0x01;
        const READ_ENCRYPTED = 0x02;
        const READ_ENCRYPTED_MITM = 0x04;
        const WRITE = 0x10;
        const WRITE_ENCRYPTED = 0x20;
        const WRITE_ENCRYPTED_MITM = 0x40;
        const WRITE_SIGNED = 0x80;
        const WRITE_SIGNED_MITM = 0x100;
    }
}

/// Service type.
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
pub enum ServiceKind {
    Primary = 0,
    Secondary = 1,
}

impl Default for ServiceKind {
    #[inline]
    fn default() -> Self {
        Self::Primary
    }
}

/// Local characteristic definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CharacteristicDef {
    pub uuid: Uuid,
    pub props: CharProps,
    pub perms: Perms,
}

impl CharacteristicDef {
    /// Creates a characteristic definition.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid, props: CharProps, perms: Perms) -> Self {
        Self { uuid, props, perms }
    }

    /// Returns the descriptors that the platform must add to the
    /// characteristic.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Uuid> {
        if self.props.can_push() {
            vec![CCC_UUID]
        } else {
            Vec::new()
        }
    }
}

/// Local service definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDef {
    pub uuid: Uuid,
    pub kind: ServiceKind,
    pub chars: Vec<CharacteristicDef>,
}

impl ServiceDef {
    /// Creates a service definition.
    #[inline]
    #[must_use]
    pub const fn new(uuid: Uuid, kind: ServiceKind, chars: Vec<CharacteristicDef>) -> Self {
        Self { uuid, kind, chars }
    }

    /// Returns the first characteristic UUID that occurs more than once.
    #[must_use]
    pub fn duplicate(&self) -> Option<Uuid> {
        let mut seen = std::collections::BTreeSet::new();
        self.chars.iter().map(|c| c.uuid).find(|&u| !seen.insert(u))
    }
}
