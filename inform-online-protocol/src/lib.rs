//! Inform Online Protocol Implementation
//!
//! This library keeps a data-collection client's registration with the Inform
//! Online coordination service current and maintains an offline-usable roster
//! of the other devices registered under the same account.
//!
//! The [`ConnectionSupervisor`] periodically pings the service, falls back to a
//! checkin when the ping reports failure, and on success refreshes the locally
//! cached device roster into the shared [`DeviceRegistry`].

pub mod account;
pub mod cache;
pub mod device;
pub mod ping;
pub mod registry;
pub mod supervisor;

mod error;
pub use account::{AccountState, DeviceListSource, Registration, RemoteAccount};
pub use cache::{DeviceCacheStore, FieldPolicy};
pub use device::{AccountDevice, ConnectionState};
pub use error::{ProtocolError, Result};
pub use ping::{HttpTransport, PingClient, PingResult, Transport};
pub use registry::DeviceRegistry;
pub use supervisor::{ConnectionStatus, ConnectionSupervisor, ProbeOutcome, SupervisorConfig};

/// Result field value meaning "online and checked in"
pub const RESULT_OK: &str = "ok";

/// Result field value meaning "reachable but not checked in"
pub const RESULT_FAILURE: &str = "failure";
