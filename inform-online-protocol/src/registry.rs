//! Device Registry
//!
//! In-memory roster of account devices keyed by device id. The registry is a
//! cheaply cloneable handle: the supervisor writes through one clone while UI
//! code reads through others.
//!
//! Loads merge into the registry: ids present in a load overwrite existing
//! entries, ids absent from a load are kept. Nothing is removed until the
//! process exits.

use crate::AccountDevice;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Shared map of device id to device
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<String, AccountDevice>>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of a device by ID
    pub fn get(&self, device_id: &str) -> Option<AccountDevice> {
        self.read().get(device_id).cloned()
    }

    /// Check if a device exists
    pub fn contains(&self, device_id: &str) -> bool {
        self.read().contains_key(device_id)
    }

    /// Get count of devices
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of every device, ordered by display name then id
    pub fn snapshot(&self) -> Vec<AccountDevice> {
        let mut devices: Vec<AccountDevice> = self.read().values().cloned().collect();
        devices.sort_by(|a, b| {
            a.display_name()
                .cmp(b.display_name())
                .then_with(|| a.id().cmp(b.id()))
        });
        devices
    }

    /// Add or replace a single device
    pub fn insert(&self, device: AccountDevice) {
        debug!("Adding/updating device: {} ({})", device.display_name(), device.id());
        self.write().insert(device.id().to_string(), device);
    }

    /// Merge a batch of devices in one critical section
    ///
    /// Readers observe either none or all of the batch.
    pub fn merge(&self, devices: impl IntoIterator<Item = AccountDevice>) -> usize {
        let mut map = self.write();
        let mut merged = 0;
        for device in devices {
            map.insert(device.id().to_string(), device);
            merged += 1;
        }
        merged
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AccountDevice>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AccountDevice>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}
