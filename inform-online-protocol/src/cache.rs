//! Device Cache
//!
//! The device roster is persisted to a local JSON file so that other parts of
//! the application have something to look devices up in when Inform Online
//! cannot be reached.
//!
//! ## Format
//!
//! A JSON array, one object per device:
//!
//! ```json
//! [{ "id": "d1", "alias": "null", "email": "a@b.com", "lastCheckin": "...",
//!    "pin": "1234", "status": "active", "transfer": "none" }]
//! ```
//!
//! An alias of `null` or the string `"null"` means the device has no alias.
//! Numbers and booleans are read as their text. Under [`FieldPolicy::Strict`]
//! every one of the seven keys must be present, though owner-only fields may
//! be `null`, and a single bad element fails the whole load.

use crate::{AccountDevice, DeviceRegistry, ProtocolError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Which fields a cache element must carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldPolicy {
    /// All seven keys are required
    #[default]
    Strict,
    /// `lastCheckin`, `pin`, `status` and `transfer` may be missing or null
    Lenient,
}

/// On-disk representation of one device
#[derive(Debug, Serialize)]
struct CacheEntry<'a> {
    id: &'a str,
    alias: Option<&'a str>,
    email: &'a str,
    #[serde(rename = "lastCheckin", skip_serializing_if = "Option::is_none")]
    last_checkin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pin: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(rename = "transfer", skip_serializing_if = "Option::is_none")]
    transfer_status: Option<&'a str>,
}

impl<'a> From<&'a AccountDevice> for CacheEntry<'a> {
    fn from(device: &'a AccountDevice) -> Self {
        Self {
            id: device.id(),
            alias: device.alias(),
            email: device.email(),
            last_checkin: device.last_checkin(),
            pin: device.pin(),
            status: device.status(),
            transfer_status: device.transfer_status(),
        }
    }
}

/// Loads and persists the device roster
#[derive(Debug, Clone)]
pub struct DeviceCacheStore {
    path: PathBuf,
    policy: FieldPolicy,
}

impl DeviceCacheStore {
    /// Create a store backed by `path` using the strict field policy
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: FieldPolicy::Strict,
        }
    }

    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> FieldPolicy {
        self.policy
    }

    /// Read the cache and merge every device into `registry`
    ///
    /// The whole file is parsed before the registry is touched, so on error the
    /// registry is left exactly as it was.
    pub fn load(&self, registry: &DeviceRegistry) -> Result<usize> {
        debug!("Loading device cache from {:?}", self.path);

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ProtocolError::CacheRead(format!("{}: {}", self.path.display(), e)))?;
        let devices = parse_devices(&contents, self.policy)?;
        let count = registry.merge(devices);

        info!("Loaded {} devices from cache", count);
        Ok(count)
    }

    /// Like [`load`](Self::load) but logs failures instead of returning them
    pub fn load_into(&self, registry: &DeviceRegistry) -> usize {
        match self.load(registry) {
            Ok(count) => count,
            Err(e) => {
                error!("Unable to load device cache: {}", e);
                0
            }
        }
    }

    /// Write `devices` to the cache file
    pub fn save(&self, devices: &[AccountDevice]) -> Result<()> {
        let entries: Vec<CacheEntry<'_>> = devices.iter().map(CacheEntry::from).collect();
        let json = serde_json::to_string_pretty(&entries)?;
        self.write_atomic(&json)?;
        debug!("Saved {} devices to {:?}", devices.len(), self.path);
        Ok(())
    }

    /// Validate a device list received from the service and persist it
    ///
    /// Nothing is written if the payload does not parse under the store's policy.
    pub fn store_raw(&self, body: &str) -> Result<usize> {
        let count = parse_devices(body, self.policy)?.len();
        self.write_atomic(body)?;
        debug!("Stored device list ({} devices) at {:?}", count, self.path);
        Ok(count)
    }

    fn write_atomic(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Parse a cache payload into devices
pub(crate) fn parse_devices(contents: &str, policy: FieldPolicy) -> Result<Vec<AccountDevice>> {
    let value: Value = serde_json::from_str(contents)
        .map_err(|e| ProtocolError::CacheParse(e.to_string()))?;
    let elements = value
        .as_array()
        .ok_or_else(|| ProtocolError::CacheParse("expected a JSON array of devices".into()))?;

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let object = element.as_object().ok_or_else(|| {
                ProtocolError::CacheParse(format!("device {}: expected an object", index))
            })?;
            parse_device(object, policy)
                .map_err(|msg| ProtocolError::CacheParse(format!("device {}: {}", index, msg)))
        })
        .collect()
}

fn parse_device(
    object: &Map<String, Value>,
    policy: FieldPolicy,
) -> std::result::Result<AccountDevice, String> {
    let id = required_str(object, "id")?;
    let email = required_str(object, "email")?;
    let alias = present_str(object, "alias")?;

    let mut device = AccountDevice::new(id, alias, email);

    let owner_field = |key: &str| match policy {
        FieldPolicy::Strict => present_str(object, key),
        FieldPolicy::Lenient => optional_str(object, key),
    };
    if let Some(last_checkin) = owner_field("lastCheckin")? {
        device = device.with_last_checkin(last_checkin);
    }
    if let Some(pin) = owner_field("pin")? {
        device = device.with_pin(pin);
    }
    if let Some(status) = owner_field("status")? {
        device = device.with_status(status);
    }
    if let Some(transfer) = owner_field("transfer")? {
        device = device.with_transfer_status(transfer);
    }

    Ok(device)
}

/// Text of a scalar value; `null` is no value
fn scalar_str(value: &Value, key: &str) -> std::result::Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err(format!("field `{}` is not a scalar", key)),
    }
}

/// Key must exist and carry a non-null value
fn required_str(object: &Map<String, Value>, key: &str) -> std::result::Result<String, String> {
    present_str(object, key)?.ok_or_else(|| format!("field `{}` is null", key))
}

/// Key must exist; its value may be null
fn present_str(
    object: &Map<String, Value>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match object.get(key) {
        Some(value) => scalar_str(value, key),
        None => Err(format!("missing field `{}`", key)),
    }
}

fn optional_str(
    object: &Map<String, Value>,
    key: &str,
) -> std::result::Result<Option<String>, String> {
    match object.get(key) {
        Some(value) => scalar_str(value, key),
        None => Ok(None),
    }
}
