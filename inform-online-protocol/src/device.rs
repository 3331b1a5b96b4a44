//! Account Devices and Connection State
//!
//! An [`AccountDevice`] describes one peer device registered under the same
//! Inform Online account. Everyone can see the id, alias and email; the
//! remaining fields are only populated for account or device owners.

use serde::{Deserialize, Serialize};

/// Alias value the service uses to mean "no alias set"
const NULL_ALIAS: &str = "null";

/// Service connection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No probe has completed yet
    #[default]
    Idle,
    /// A probe is in flight
    Connecting,
    /// Online and checked in
    Connected,
    /// Unreachable, unrecognized response, or not checked in
    Offline,
}

impl ConnectionState {
    /// Check if we are connected to the service
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A device registered under the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDevice {
    id: String,
    alias: Option<String>,
    email: String,
    last_checkin: Option<String>,
    pin: Option<String>,
    status: Option<String>,
    transfer_status: Option<String>,
}

impl AccountDevice {
    /// Create a device with the publicly visible fields
    ///
    /// An alias equal to the service's `"null"` marker is stored as no alias.
    pub fn new(id: impl Into<String>, alias: Option<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: alias.filter(|a| a != NULL_ALIAS),
            email: email.into(),
            last_checkin: None,
            pin: None,
            status: None,
            transfer_status: None,
        }
    }

    pub fn with_last_checkin(mut self, last_checkin: impl Into<String>) -> Self {
        self.last_checkin = Some(last_checkin.into());
        self
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_transfer_status(mut self, transfer_status: impl Into<String>) -> Self {
        self.transfer_status = Some(transfer_status.into());
        self
    }

    /// Get device ID
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Opaque timestamp of the device's last checkin (owners only)
    pub fn last_checkin(&self) -> Option<&str> {
        self.last_checkin.as_deref()
    }

    /// Device PIN (account owner and device owner only)
    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref()
    }

    /// Lifecycle status (writable by the account owner)
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Transfer status (writable by the account owner and device owner)
    pub fn transfer_status(&self) -> Option<&str> {
        self.transfer_status.as_deref()
    }

    /// Name to show in lists: the alias when set, the email otherwise
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.email)
    }
}
