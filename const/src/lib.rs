//! Bluetooth LE UUIDs and the assigned numbers used by a GATT peripheral.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::empty_structs_with_brackets)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

use std::fmt::{Debug, Display, Formatter};

pub use uuid::*;

mod uuid;

/// Company identifier used in manufacturer-specific advertising data
/// ([Assigned Numbers] Section 7.1).
#[derive(
    Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompanyId(pub u16);

impl CompanyId {
    /// Reserved identifier for testing and interoperability work.
    pub const TEST: Self = Self(0xFFFF);

    /// Returns the raw company ID.
    #[inline(always)]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl Debug for CompanyId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CompanyId")
            .field(&format_args!("{:#06X}", self.0))
            .finish()
    }
}

impl Display for CompanyId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

impl From<CompanyId> for u16 {
    #[inline(always)]
    fn from(id: CompanyId) -> Self {
        id.raw()
    }
}

impl From<u16> for CompanyId {
    #[inline(always)]
    fn from(v: u16) -> Self {
        Self(v)
    }
}
