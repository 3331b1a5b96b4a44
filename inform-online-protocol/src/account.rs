//! Account State Collaborators
//!
//! The supervisor needs three things from the account layer: the server URL,
//! whether this device holds a registration, and the ability to check in with
//! that registration. It also asks for the device list to be refreshed after a
//! successful ping. Both needs are expressed as traits; [`RemoteAccount`] is
//! the HTTP-backed implementation used by the daemon.

use crate::ping::{PingResult, Transport};
use crate::{DeviceCacheStore, ProtocolError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Account-level state the supervisor consults on every probe
#[async_trait]
pub trait AccountState: Send + Sync {
    /// Base URL of the Inform Online service
    fn server_url(&self) -> String;

    /// Whether a registration is stored locally
    fn has_registration(&self) -> bool;

    /// Refresh our checkin with the stored registration
    ///
    /// Fails with [`ProtocolError::RegistrationInvalid`] when the service
    /// rejects the registration.
    async fn checkin(&self) -> Result<()>;
}

/// Source of the account's device roster
#[async_trait]
pub trait DeviceListSource: Send + Sync {
    /// Fetch the device list from the service and persist it to the cache
    async fn fetch_device_list(&self) -> Result<usize>;
}

/// Proof that this device is associated with an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Device ID assigned by the service
    pub device_id: String,

    /// Secret issued with the device ID
    pub device_key: String,

    /// When the registration was obtained
    pub registered_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(device_id: impl Into<String>, device_key: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_key: device_key.into(),
            registered_at: Utc::now(),
        }
    }

    /// Load a stored registration, `None` if no file exists
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No registration stored at {:?}", path);
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Persist the registration
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved registration to {:?}", path);
        Ok(())
    }
}

/// HTTP implementation of the account collaborators
pub struct RemoteAccount<T: Transport> {
    server_url: String,
    transport: T,
    cache: DeviceCacheStore,
    registration: RwLock<Option<Registration>>,
}

impl<T: Transport> RemoteAccount<T> {
    pub fn new(server_url: impl Into<String>, transport: T, cache: DeviceCacheStore) -> Self {
        let server_url: String = server_url.into();
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            transport,
            cache,
            registration: RwLock::new(None),
        }
    }

    pub fn with_registration(self, registration: Option<Registration>) -> Self {
        *self.registration.write().unwrap_or_else(PoisonError::into_inner) = registration;
        self
    }

    /// Currently stored registration
    pub fn registration(&self) -> Option<Registration> {
        self.registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path)
    }
}

#[async_trait]
impl<T: Transport> AccountState for RemoteAccount<T> {
    fn server_url(&self) -> String {
        self.server_url.clone()
    }

    fn has_registration(&self) -> bool {
        self.registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn checkin(&self) -> Result<()> {
        let registration = self.registration().ok_or(ProtocolError::NotRegistered)?;
        let body = json!({
            "deviceId": registration.device_id,
            "deviceKey": registration.device_key,
        });

        let reply = self.transport.post_json(&self.endpoint("checkin"), &body).await?;
        match PingResult::classify(&reply)? {
            PingResult::Ok => {
                info!("Checked in as device {}", registration.device_id);
                Ok(())
            }
            other => Err(ProtocolError::RegistrationInvalid(format!(
                "device {}: {:?}",
                registration.device_id, other
            ))),
        }
    }
}

#[async_trait]
impl<T: Transport> DeviceListSource for RemoteAccount<T> {
    async fn fetch_device_list(&self) -> Result<usize> {
        let body = self.transport.get(&self.endpoint("device/list")).await?;
        let count = self.cache.store_raw(&body)?;
        info!("Fetched {} account devices", count);
        Ok(count)
    }
}
