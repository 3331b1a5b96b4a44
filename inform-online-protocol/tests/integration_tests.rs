//! Integration Tests for the Inform Online Protocol
//!
//! These tests drive the connection supervisor end to end with fake
//! collaborators: a scripted transport, an in-memory account state, and a
//! device list source that writes into a temporary cache file.

use async_trait::async_trait;
use inform_online_protocol::{
    AccountDevice, AccountState, ConnectionState, ConnectionSupervisor, DeviceCacheStore,
    DeviceListSource, DeviceRegistry, ProbeOutcome, ProtocolError, Result, SupervisorConfig,
    Transport,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const CACHED_DEVICE: &str = r#"[{
    "id": "d1", "alias": "null", "email": "a@b.com",
    "lastCheckin": "2010-06-01 12:00:00", "pin": "1234",
    "status": "active", "transfer": "none"
}]"#;

/// Transport answering every ping with the same body, or failing
struct ScriptedTransport {
    body: Option<&'static str>,
    pings: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, _url: &str) -> Result<String> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.body
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::Communication("connection refused".into()))
    }

    async fn post_json(&self, _url: &str, _body: &Value) -> Result<String> {
        Err(ProtocolError::Communication("not scripted".into()))
    }
}

struct FakeAccount {
    registered: bool,
    checkin_accepted: bool,
    checkins: AtomicUsize,
}

#[async_trait]
impl AccountState for FakeAccount {
    fn server_url(&self) -> String {
        "http://inform.test".to_string()
    }

    fn has_registration(&self) -> bool {
        self.registered
    }

    async fn checkin(&self) -> Result<()> {
        self.checkins.fetch_add(1, Ordering::SeqCst);
        if self.checkin_accepted {
            Ok(())
        } else {
            Err(ProtocolError::RegistrationInvalid("device d1: Failure".into()))
        }
    }
}

/// Writes a fixed payload into the cache, like a successful remote fetch
struct FakeDeviceSource {
    cache: DeviceCacheStore,
    payload: Option<&'static str>,
    fetched: AtomicBool,
}

#[async_trait]
impl DeviceListSource for FakeDeviceSource {
    async fn fetch_device_list(&self) -> Result<usize> {
        self.fetched.store(true, Ordering::SeqCst);
        match self.payload {
            Some(payload) => self.cache.store_raw(payload),
            None => Err(ProtocolError::Communication("device list unavailable".into())),
        }
    }
}

struct Harness {
    supervisor: ConnectionSupervisor<ScriptedTransport>,
    account: Arc<FakeAccount>,
    source: Arc<FakeDeviceSource>,
    registry: DeviceRegistry,
    pings: Arc<AtomicUsize>,
    _temp_dir: TempDir,
}

fn create_harness(
    ping_body: Option<&'static str>,
    registered: bool,
    checkin_accepted: bool,
    payload: Option<&'static str>,
) -> Harness {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let cache = DeviceCacheStore::new(temp_dir.path().join("devices.json"));
    let registry = DeviceRegistry::new();
    let pings = Arc::new(AtomicUsize::new(0));

    let account = Arc::new(FakeAccount {
        registered,
        checkin_accepted,
        checkins: AtomicUsize::new(0),
    });
    let source = Arc::new(FakeDeviceSource {
        cache: cache.clone(),
        payload,
        fetched: AtomicBool::new(false),
    });

    let supervisor = ConnectionSupervisor::new(
        SupervisorConfig::default(),
        ScriptedTransport {
            body: ping_body,
            pings: pings.clone(),
        },
        account.clone(),
        source.clone(),
        cache,
        registry.clone(),
    );

    Harness {
        supervisor,
        account,
        source,
        registry,
        pings,
        _temp_dir: temp_dir,
    }
}

#[tokio::test]
async fn test_ok_loads_device_cache() {
    let harness = create_harness(Some(r#"{"result":"ok"}"#), true, true, Some(CACHED_DEVICE));

    let outcome = harness.supervisor.connect().await;

    assert_eq!(outcome, ProbeOutcome::Connected);
    assert_eq!(harness.supervisor.state(), ConnectionState::Connected);
    assert!(harness.source.fetched.load(Ordering::SeqCst));
    let device = harness.registry.get("d1").expect("device loaded");
    assert_eq!(device.display_name(), "a@b.com");
    assert_eq!(harness.account.checkins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ok_with_failed_refresh_still_connected() {
    let harness = create_harness(Some(r#"{"result":"ok"}"#), true, true, None);

    assert_eq!(harness.supervisor.connect().await, ProbeOutcome::Connected);
    assert_eq!(harness.supervisor.state(), ConnectionState::Connected);
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_malformed_body_goes_offline() {
    let harness = create_harness(Some("{"), true, true, Some(CACHED_DEVICE));
    harness
        .registry
        .insert(AccountDevice::new("d0", Some("Existing".into()), "x@y.com"));

    let outcome = harness.supervisor.connect().await;

    assert_eq!(outcome, ProbeOutcome::Offline);
    assert_eq!(harness.supervisor.state(), ConnectionState::Offline);
    assert_eq!(harness.registry.len(), 1);
    assert!(harness.registry.contains("d0"));
    assert!(!harness.source.fetched.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_failure_without_registration_skips_checkin() {
    let harness = create_harness(Some(r#"{"result":"failure"}"#), false, true, None);

    let outcome = harness.supervisor.connect().await;

    assert_eq!(outcome, ProbeOutcome::Unregistered);
    assert!(!harness.supervisor.state().is_connected());
    assert_eq!(harness.account.checkins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failure_with_registration_checks_in() {
    let harness = create_harness(Some(r#"{"result":"failure"}"#), true, true, None);

    assert_eq!(harness.supervisor.connect().await, ProbeOutcome::CheckedIn);
    assert_eq!(harness.supervisor.state(), ConnectionState::Connected);
    assert_eq!(harness.account.checkins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_with_rejected_checkin() {
    let harness = create_harness(Some(r#"{"result":"failure"}"#), true, false, None);

    assert_eq!(harness.supervisor.connect().await, ProbeOutcome::Unregistered);
    assert_eq!(harness.supervisor.state(), ConnectionState::Offline);
    assert_eq!(harness.account.checkins.load(Ordering::SeqCst), 1);
    assert!(!harness.source.fetched.load(Ordering::SeqCst));
    assert!(!harness.supervisor.is_probing());
}

#[tokio::test]
async fn test_unrecognized_result_goes_offline() {
    for body in [r#"{"result":"error"}"#, r#"{"status":"ok"}"#] {
        let harness = create_harness(Some(body), true, true, None);

        assert_eq!(harness.supervisor.connect().await, ProbeOutcome::Offline);
        assert_eq!(harness.supervisor.state(), ConnectionState::Offline);
    }
}

#[tokio::test]
async fn test_communication_error_goes_offline() {
    let harness = create_harness(None, true, true, None);

    assert_eq!(harness.supervisor.connect().await, ProbeOutcome::Offline);
    assert_eq!(harness.supervisor.state(), ConnectionState::Offline);
    assert!(!harness.supervisor.is_probing());
}

#[tokio::test]
async fn test_unreadable_cache_leaves_registry() {
    let temp_dir = TempDir::new().unwrap();
    let store = DeviceCacheStore::new(temp_dir.path().join("missing").join("devices.json"));
    let registry = DeviceRegistry::new();
    registry.insert(AccountDevice::new("d0", None, "x@y.com"));

    assert!(matches!(store.load(&registry), Err(ProtocolError::CacheRead(_))));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_last_load_wins_and_keeps_absent_ids() {
    let temp_dir = TempDir::new().unwrap();
    let store = DeviceCacheStore::new(temp_dir.path().join("devices.json"));
    let registry = DeviceRegistry::new();

    store
        .save(&[
            AccountDevice::new("d1", Some("First".into()), "a@b.com")
                .with_last_checkin("t1")
                .with_pin("1")
                .with_status("active")
                .with_transfer_status("none"),
            AccountDevice::new("d2", None, "c@d.com")
                .with_last_checkin("t1")
                .with_pin("2")
                .with_status("active")
                .with_transfer_status("none"),
        ])
        .unwrap();
    store.load(&registry).unwrap();

    store
        .save(&[AccountDevice::new("d1", Some("Second".into()), "a@b.com")
            .with_last_checkin("t2")
            .with_pin("1")
            .with_status("suspended")
            .with_transfer_status("none")])
        .unwrap();
    store.load(&registry).unwrap();

    assert_eq!(registry.len(), 2);
    let d1 = registry.get("d1").unwrap();
    assert_eq!(d1.display_name(), "Second");
    assert_eq!(d1.status(), Some("suspended"));
    assert_eq!(registry.get("d2").unwrap().display_name(), "c@d.com");
}

#[tokio::test]
async fn test_stop_interrupts_wait() {
    let harness = create_harness(Some(r#"{"result":"ok"}"#), true, true, Some(CACHED_DEVICE));
    let mut status = harness.supervisor.status();

    assert!(harness.supervisor.start());

    // Wait for the first probe to publish its final state
    tokio::time::timeout(Duration::from_secs(5), async {
        while status.changed().await != Some(ConnectionState::Connected) {}
    })
    .await
    .expect("first probe completes");

    tokio::time::timeout(Duration::from_secs(2), harness.supervisor.stop())
        .await
        .expect("stop returns well before the retry interval");

    assert!(!harness.supervisor.is_running());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.pings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_view_tracks_state() {
    let harness = create_harness(Some(r#"{"result":"ok"}"#), true, true, Some(CACHED_DEVICE));
    let status = harness.supervisor.status();

    assert_eq!(status.state(), ConnectionState::Idle);
    harness.supervisor.connect().await;
    assert!(status.is_connected());
}
