//! Integration tests for patchbay-router.
//!
//! Every test builds a router over loopback devices, injects raw bytes into
//! an input, and checks what the outputs received.

use patchbay_io::{LoopbackBackend, LoopbackDevice, PortRegistry};
use patchbay_router::{Error, Router, RouterConfig, RouterState, StatsSnapshot};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

struct Rig {
    backend: Arc<LoopbackBackend>,
    keys: LoopbackDevice,
    synth: LoopbackDevice,
    router: Router,
}

fn rig(mappings: &str) -> Rig {
    init_tracing();
    let backend = Arc::new(LoopbackBackend::new());
    let keys = backend.plug("USBKeys", 0, 1);
    let synth = backend.plug("USBSynth", 1, 0);
    let json = format!(
        r#"{{
            "devices": {{
                "KBD": {{ "name": "USBKeys", "port": 0 }},
                "SYNTH": {{ "name": "USBSynth", "port": 0 }}
            }},
            "mappings": {mappings}
        }}"#
    );
    let config = RouterConfig::from_json_str(&json).unwrap();
    let registry = Arc::new(PortRegistry::new(backend.clone()));
    let router = Router::new(registry, config);
    Rig {
        backend,
        keys,
        synth,
        router,
    }
}

fn sent_bytes(device: &LoopbackDevice) -> Vec<Vec<u8>> {
    device.take_sent().into_iter().map(|m| m.bytes).collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

// ---------------------------------------------------------------------------
// 1. End to end
// ---------------------------------------------------------------------------

#[test]
fn test_transpose_end_to_end() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"], "filters": {"transpose": {"step": 1}}}}"#);
    rig.router.init_blocking(TIMEOUT).unwrap();

    rig.keys.inject(0, &[0x90, 0x3C, 0x64]);
    assert_eq!(sent_bytes(&rig.synth), vec![vec![0x90, 0x48, 0x64]]);

    let stats = rig.router.stats();
    assert_eq!((stats.dispatched, stats.sent), (1, 1));
}

#[test]
fn test_init_reports_ready_through_callback() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"]}}"#);
    let (tx, rx) = mpsc::channel();
    rig.router.init(move |outcome| {
        let _ = tx.send(outcome.map(|report| report.mappings));
    });
    let mappings = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(mappings, vec!["M"]);
    assert_eq!(rig.router.state(), RouterState::Started);

    let (tx, rx) = mpsc::channel();
    rig.router.init(move |outcome| {
        let _ = tx.send(outcome.map(|report| report.mappings));
    });
    assert!(matches!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Err(Error::AlreadyStarted)));
}

#[test]
fn test_chord_fans_out_to_every_output() {
    init_tracing();
    let backend = Arc::new(LoopbackBackend::new());
    let keys = backend.plug("USBKeys", 0, 1);
    let synth = backend.plug("USBSynth", 2, 0);
    let config = RouterConfig::from_json_str(
        r#"{
            "devices": {
                "KBD": {"name": "USBKeys", "port": 0},
                "S1": {"name": "USBSynth", "port": 0},
                "S2": {"name": "USBSynth", "port": 1}
            },
            "mappings": {"M": {"inputs": ["KBD"], "outputs": ["S2", "S1"],
                               "filters": {"chord": {"chord": "MAJOR3"}}}}
        }"#,
    )
    .unwrap();
    let router = Router::new(Arc::new(PortRegistry::new(backend.clone())), config);
    router.init_blocking(TIMEOUT).unwrap();

    keys.inject(0, &[0x90, 60, 100]);
    let sent: Vec<(usize, u8)> = synth.take_sent().iter().map(|m| (m.port, m.bytes[1])).collect();
    assert_eq!(
        sent,
        vec![(1, 60), (0, 60), (1, 64), (0, 64), (1, 67), (0, 67)]
    );
}

// ---------------------------------------------------------------------------
// 2. Drops, pause and stop
// ---------------------------------------------------------------------------

#[test]
fn test_filtered_messages_are_counted_not_sent() {
    let rig = rig(
        r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"],
                  "filters": {"channels": {"whitelist": [1, 2]}, "messageType": {"blacklist": ["Clock"]}}}}"#,
    );
    rig.router.init_blocking(TIMEOUT).unwrap();

    rig.keys.inject(0, &[0x93, 60, 100]);
    rig.keys.inject(0, &[0xF8]);
    rig.keys.inject(0, &[0x91, 60, 100]);
    assert_eq!(sent_bytes(&rig.synth), vec![vec![0x91, 60, 100]]);

    let stats = rig.router.stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.failed, 2);

    rig.router.reset_stats();
    assert_eq!(rig.router.stats(), StatsSnapshot::default());
    rig.keys.inject(0, &[0x91, 61, 100]);
    assert_eq!(rig.router.stats().dispatched, 1);
}

#[test]
fn test_pause_suppresses_dispatch() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"]}}"#);
    rig.router.init_blocking(TIMEOUT).unwrap();

    rig.router.pause();
    rig.keys.inject(0, &[0x90, 60, 100]);
    assert!(sent_bytes(&rig.synth).is_empty());
    assert_eq!(rig.router.stats().dispatched, 0);

    rig.router.toggle();
    rig.keys.inject(0, &[0x90, 60, 100]);
    assert_eq!(sent_bytes(&rig.synth).len(), 1);
}

#[test]
fn test_paused_filter_is_transparent() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"], "filters": {"transpose": {"step": -1}}}}"#);
    rig.router.init_blocking(TIMEOUT).unwrap();
    let mapping = rig.router.mapping("M").unwrap();

    mapping.filter(0).unwrap().pause();
    rig.keys.inject(0, &[0x90, 60, 100]);
    mapping.filter(0).unwrap().unpause();
    rig.keys.inject(0, &[0x90, 60, 100]);
    assert_eq!(sent_bytes(&rig.synth), vec![vec![0x90, 60, 100], vec![0x90, 48, 100]]);
}

#[test]
fn test_stop_detaches_listeners() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"]}}"#);
    rig.router.init_blocking(TIMEOUT).unwrap();
    let input = rig.router.mapping("M").unwrap().inputs()[0].clone();
    assert_eq!(input.listener_count(), 1);

    rig.router.stop();
    assert_eq!(input.listener_count(), 0);
    rig.keys.inject(0, &[0x90, 60, 100]);
    assert!(sent_bytes(&rig.synth).is_empty());
}

// ---------------------------------------------------------------------------
// 3. Hotplug
// ---------------------------------------------------------------------------

#[test]
fn test_routing_survives_replug() {
    let rig = rig(r#"{"M": {"inputs": ["KBD"], "outputs": ["SYNTH"]}}"#);
    rig.router.init_blocking(TIMEOUT).unwrap();
    let registry = rig.router.registry().clone();
    let input = rig.router.mapping("M").unwrap().inputs()[0].clone();

    rig.backend.unplug("USBKeys");
    registry.on_device_removed("USBKeys");
    assert!(!input.is_open());
    assert!(!rig.keys.inject(0, &[0x90, 60, 100]));

    let keys = rig.backend.plug("USBKeys", 0, 1);
    registry.on_device_added("USBKeys");
    assert!(wait_until(|| input.is_open() && input.listener_count() == 1));

    keys.inject(0, &[0x90, 61, 100]);
    assert_eq!(sent_bytes(&rig.synth), vec![vec![0x90, 61, 100]]);
}

// ---------------------------------------------------------------------------
// 4. Build reporting
// ---------------------------------------------------------------------------

#[test]
fn test_missing_device_is_reported_not_fatal() {
    let rig = rig(
        r#"{"M": {"inputs": ["KBD", "PADS"], "outputs": ["SYNTH"]},
            "N": {"inputs": ["KBD"], "outputs": ["SYNTH"], "filters": {"velocity": "loud"}}}"#,
    );
    rig.backend.unplug("USBSynth");
    let report = rig.router.init_blocking(TIMEOUT).unwrap();

    assert_eq!(report.mappings, vec!["M"]);
    assert_eq!(report.unresolved, vec![("M".to_string(), "PADS".to_string())]);
    assert_eq!(report.failed_opens.len(), 1);
    assert_eq!(report.invalid_mappings.len(), 1);
    assert!(!report.is_clean());
}

#[test]
fn test_sysex_dumps() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("patch.syx");
    std::fs::write(&path, [0x00, 0xF0, 0x43, 0x10, 0xF7, 0x00]).unwrap();

    let backend = Arc::new(LoopbackBackend::new());
    let synth = backend.plug("USBSynth", 1, 0);
    let json = serde_json::json!({
        "devices": {"SYNTH": {"name": "USBSynth", "port": 0}},
        "mappings": {"M": {"outputs": ["SYNTH"]}},
        "sysex": [
            {"path": path.to_string_lossy(), "output": "SYNTH"},
            {"path": dir.path().join("missing.syx").to_string_lossy(), "output": "SYNTH"},
            {"path": path.to_string_lossy(), "output": "NOWHERE"}
        ]
    });
    let config: RouterConfig = serde_json::from_value(json).unwrap();
    let router = Router::new(Arc::new(PortRegistry::new(backend.clone())), config);
    router.init_blocking(TIMEOUT).unwrap();

    assert_eq!(router.send_sysex_dumps(), 1);
    assert_eq!(sent_bytes(&synth), vec![vec![0xF0, 0x43, 0x10, 0xF7]]);
}
