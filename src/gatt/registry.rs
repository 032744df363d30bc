use std::collections::BTreeMap;

use tracing::debug;

use crate::Uuid;

use super::*;

/// Local characteristics and their current values, keyed by UUID.
#[derive(Debug, Default)]
pub struct Registry {
    svc: Option<ServiceDef>,
    chars: BTreeMap<Uuid, Entry>,
}

#[derive(Debug)]
struct Entry {
    props: CharProps,
    value: Vec<u8>,
}

impl Registry {
    /// Registers the service characteristics with empty values. Returns the
    /// offending UUID if the service contains duplicate characteristics, in
    /// which case the registry is not modified.
    pub fn register(&mut self, svc: ServiceDef) -> Result<(), Uuid> {
        if let Some(dup) = svc.duplicate() {
            return Err(dup);
        }
        self.chars = (svc.chars.iter())
            .map(|c| {
                let e = Entry {
                    props: c.props,
                    value: Vec::new(),
                };
                (c.uuid, e)
            })
            .collect();
        debug!("Registered {} characteristics for {}", self.chars.len(), svc.uuid);
        self.svc = Some(svc);
        Ok(())
    }

    /// Returns the registered service definition.
    #[inline]
    #[must_use]
    pub const fn service(&self) -> Option<&ServiceDef> {
        self.svc.as_ref()
    }

    /// Returns the current value of characteristic `uuid`.
    #[inline]
    #[must_use]
    pub fn read(&self, uuid: Uuid) -> Option<&[u8]> {
        self.chars.get(&uuid).map(|e| e.value.as_slice())
    }

    /// Replaces the value of characteristic `uuid`. Returns `false` if the
    /// characteristic is not registered.
    pub fn write(&mut self, uuid: Uuid, value: Vec<u8>) -> bool {
        self.chars.get_mut(&uuid).map_or(false, |e| {
            e.value = value;
            true
        })
    }

    /// Returns the properties of characteristic `uuid`.
    #[inline]
    #[must_use]
    pub fn props(&self, uuid: Uuid) -> Option<CharProps> {
        self.chars.get(&uuid).map(|e| e.props)
    }

    /// Returns the number of registered characteristics.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Returns whether no characteristics are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Removes the service and all characteristics.
    pub fn clear(&mut self) {
        self.svc = None;
        self.chars.clear();
    }
}
