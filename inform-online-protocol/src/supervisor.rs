//! Connection Supervisor
//!
//! Runs one background task for the lifetime of the process that keeps our
//! connection to Inform Online current:
//!
//! 1. Ping the service (unless a probe is already in flight)
//! 2. On `"ok"`: refresh the device list and load the device cache
//! 3. On `"failure"`: check in again if we hold a registration
//! 4. On anything else, a communication error or a malformed body: go offline
//! 5. Wait for the retry interval, or until [`ConnectionSupervisor::stop`]
//!
//! Errors never leave the loop. They are logged and turned into a
//! [`ConnectionState`], which readers observe through [`ConnectionStatus`].

use crate::account::{AccountState, DeviceListSource};
use crate::ping::{PingClient, PingResult, Transport};
use crate::{ConnectionState, DeviceCacheStore, DeviceRegistry, ProtocolError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Time between probes (10 minutes)
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(600);

/// Default service host
pub const DEFAULT_HOST: &str = "localhost";

/// Default service port
pub const DEFAULT_PORT: u16 = 5100;

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long to wait between probes
    pub retry_interval: Duration,

    /// Service host, reported in logs
    pub host: String,

    /// Service port, reported in logs
    pub port: u16,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// What a single call to `connect` ended with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Ping answered `"ok"`
    Connected,
    /// Ping answered `"failure"` and the checkin succeeded
    CheckedIn,
    /// Ping answered `"failure"` and there was no usable registration
    Unregistered,
    /// Unreachable, malformed or unrecognized response
    Offline,
    /// Another probe was already in flight
    Skipped,
}

/// Read-only view of the supervisor's connection state
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    rx: watch::Receiver<ConnectionState>,
}

impl ConnectionStatus {
    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Wait for the next state change
    ///
    /// Returns `None` once the supervisor has been dropped.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

/// Held for the duration of one probe; clears the in-flight flag on drop
struct ProbeGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProbeGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag })
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// State shared between the supervisor handle and its background task
struct Inner<T: Transport> {
    config: SupervisorConfig,
    ping: PingClient<T>,
    account: Arc<dyn AccountState>,
    device_source: Arc<dyn DeviceListSource>,
    cache: DeviceCacheStore,
    registry: DeviceRegistry,
    state_tx: watch::Sender<ConnectionState>,
    probing: AtomicBool,
}

impl<T: Transport> Inner<T> {
    fn is_probing(&self) -> bool {
        self.probing.load(Ordering::Acquire)
    }

    async fn connect(&self) -> ProbeOutcome {
        let Some(_guard) = ProbeGuard::acquire(&self.probing) else {
            debug!("Probe already in flight, skipping");
            return ProbeOutcome::Skipped;
        };

        self.state_tx.send_replace(ConnectionState::Connecting);
        debug!("Pinging {}:{}", self.config.host, self.config.port);

        let server_url = self.account.server_url();
        let outcome = match self.ping.ping(&server_url).await {
            Ok(PingResult::Ok) => {
                info!("Ping successful (connected and checked in)");
                self.refresh_devices().await;
                ProbeOutcome::Connected
            }
            Ok(PingResult::Failure) => {
                warn!("Ping failed, attempting checkin");
                self.checkin().await
            }
            Ok(PingResult::Unrecognized(result)) => {
                warn!("Ping failed with result {:?} (offline)", result);
                ProbeOutcome::Offline
            }
            Err(e @ ProtocolError::ProtocolParse(_)) => {
                error!("Ping response could not be parsed (offline): {}", e);
                ProbeOutcome::Offline
            }
            Err(e) if e.is_recoverable() => {
                error!(
                    "Ping error while communicating with service (offline, retrying in {}s): {}",
                    self.config.retry_interval.as_secs(),
                    e
                );
                ProbeOutcome::Offline
            }
            Err(e) => {
                error!("Ping error (offline): {}", e);
                ProbeOutcome::Offline
            }
        };

        let state = match outcome {
            ProbeOutcome::Connected | ProbeOutcome::CheckedIn => ConnectionState::Connected,
            _ => ConnectionState::Offline,
        };
        self.state_tx.send_replace(state);
        info!("Connection state: {}", state);

        outcome
    }

    async fn checkin(&self) -> ProbeOutcome {
        if !self.account.has_registration() {
            warn!("Checkin skipped: no registration stored");
            return ProbeOutcome::Unregistered;
        }

        match self.account.checkin().await {
            Ok(()) => {
                info!("Checkin successful (connected)");
                ProbeOutcome::CheckedIn
            }
            Err(e @ ProtocolError::RegistrationInvalid(_)) => {
                // No re-registration flow exists; stay disconnected until the
                // registration is replaced.
                warn!("Checkin failed: {}", e);
                ProbeOutcome::Unregistered
            }
            Err(e) if e.is_offline() => {
                error!("Checkin error while communicating with service: {}", e);
                ProbeOutcome::Unregistered
            }
            Err(e) => {
                error!("Checkin error: {}", e);
                ProbeOutcome::Unregistered
            }
        }
    }

    async fn refresh_devices(&self) {
        if let Err(e) = self.device_source.fetch_device_list().await {
            warn!("Failed to refresh device list, using cached roster: {}", e);
        }
        self.cache.load_into(&self.registry);
    }
}

/// Handle to the running background task
struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Supervises the connection to Inform Online
pub struct ConnectionSupervisor<T: Transport + 'static> {
    inner: Arc<Inner<T>>,
    worker: Mutex<Option<Worker>>,
}

impl<T: Transport + 'static> ConnectionSupervisor<T> {
    /// Create a supervisor
    ///
    /// # Arguments
    ///
    /// * `config` - Retry interval and service address
    /// * `transport` - HTTP transport used for pings
    /// * `account` - Server URL, registration and checkin
    /// * `device_source` - Remote device list refresh
    /// * `cache` - Local device cache, loaded after each successful ping
    /// * `registry` - Registry the cache is loaded into
    pub fn new(
        config: SupervisorConfig,
        transport: T,
        account: Arc<dyn AccountState>,
        device_source: Arc<dyn DeviceListSource>,
        cache: DeviceCacheStore,
        registry: DeviceRegistry,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        Self {
            inner: Arc::new(Inner {
                config,
                ping: PingClient::new(transport),
                account,
                device_source,
                cache,
                registry,
                state_tx,
                probing: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the background loop
    ///
    /// Must be called from within a Tokio runtime. Returns `false` if the loop
    /// is already running.
    pub fn start(&self) -> bool {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            debug!("Connection supervisor already running");
            return false;
        }

        info!(
            "Starting connection supervisor (retry every {}s)",
            self.inner.config.retry_interval.as_secs()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Self::run(self.inner.clone(), shutdown_rx));
        *worker = Some(Worker { shutdown_tx, task });
        true
    }

    /// Stop the background loop and wait for it to exit
    ///
    /// A pending wait is interrupted immediately. A probe already in flight is
    /// allowed to finish, but no further probe is issued.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(worker) = worker else {
            debug!("Connection supervisor not running");
            return;
        };

        info!("Stopping connection supervisor");
        let _ = worker.shutdown_tx.send(());
        if let Err(e) = worker.task.await {
            error!("Connection supervisor task failed: {}", e);
        }
    }

    /// Whether the background loop is running
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }

    /// Whether a probe is currently in flight
    pub fn is_probing(&self) -> bool {
        self.inner.is_probing()
    }

    /// Run one probe now
    ///
    /// Never fails: the result is reflected in [`state`](Self::state).
    pub async fn connect(&self) -> ProbeOutcome {
        self.inner.connect().await
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Read-only view of the connection state for other components
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            rx: self.inner.state_tx.subscribe(),
        }
    }

    /// Registry the device cache is loaded into
    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    async fn run(inner: Arc<Inner<T>>, mut shutdown_rx: oneshot::Receiver<()>) {
        loop {
            if !inner.is_probing() {
                inner.connect().await;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    info!("Connection supervisor shutting down");
                    break;
                }
                _ = tokio::time::sleep(inner.config.retry_interval) => {}
            }
        }
    }
}
