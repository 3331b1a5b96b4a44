//! Error handling for the Inform Online protocol
//!
//! Every failure the supervisor can observe is represented by [`ProtocolError`].
//! None of them escape the supervisor loop: they are logged and turned into a
//! [`ConnectionState`](crate::ConnectionState) transition.
//!
//! ## Error Categories
//!
//! - **Communication**: transport unreachable, non-success status, unusable body.
//! - **Protocol parse**: the body is not the JSON structure we expect.
//! - **Registration**: checkin attempted without, or with a rejected, registration.
//! - **Cache**: the local device cache is missing, unreadable or malformed.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while talking to Inform Online or reading the cache
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (file system, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error (connect, timeout, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service could not be reached or returned an unusable response
    #[error("Communication error: {0}")]
    Communication(String),

    /// The response body is not the expected structure
    #[error("Protocol parse error: {0}")]
    ProtocolParse(String),

    /// Checkin was attempted but the stored registration was rejected
    #[error("Registration invalid: {0}")]
    RegistrationInvalid(String),

    /// No local registration is stored
    #[error("Not registered")]
    NotRegistered,

    /// The device cache file could not be read
    #[error("Cache read error: {0}")]
    CacheRead(String),

    /// The device cache file is malformed
    #[error("Cache parse error: {0}")]
    CacheParse(String),
}

impl ProtocolError {
    /// Check if this error is transient and will be retried on the next wake
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::Http(_)
                | ProtocolError::Communication(_)
                | ProtocolError::ProtocolParse(_)
        )
    }

    /// Check if this error means the service should be treated as offline
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            ProtocolError::Http(_)
                | ProtocolError::Communication(_)
                | ProtocolError::ProtocolParse(_)
                | ProtocolError::Json(_)
        )
    }
}
