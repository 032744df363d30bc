use std::sync::atomic::{AtomicU8, Ordering};

/// Process-wide peripheral state published to the application.
#[cfg_attr(test, derive(enum_iterator::Sequence))]
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Serialize,
    strum::Display,
)]
#[non_exhaustive]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PeripheralState {
    Unknown = 0,
    Unsupported = 1,
    Unauthorized = 2,
    PoweredOff = 3,
    Idle = 4,
    Advertising = 5,
    Connected = 6,
}

impl PeripheralState {
    /// Returns whether the state prevents any radio operation.
    #[inline]
    #[must_use]
    pub const fn is_unavailable(self) -> bool {
        matches!(
            self,
            Self::Unsupported | Self::Unauthorized | Self::PoweredOff
        )
    }
}

impl Default for PeripheralState {
    #[inline]
    fn default() -> Self {
        Self::Unknown
    }
}

/// Peripheral state that can be read without taking the engine lock.
#[derive(Debug, Default)]
#[repr(transparent)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    /// Returns the current state.
    #[inline]
    pub fn get(&self) -> PeripheralState {
        PeripheralState::try_from(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// Sets the current state.
    #[inline]
    pub fn set(&self, s: PeripheralState) {
        self.0.store(s.into(), Ordering::Release);
    }
}
