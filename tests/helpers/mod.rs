//! Shared fixtures for the root integration tests.

#![allow(dead_code)]

use patchbay::prelude::*;
use patchbay::LoopbackDevice;
use std::thread;
use std::time::Instant;

pub const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

/// The two-device rig: KBD = USBKeys port 0, SYNTH = USBSynth port 0.
pub const DEVICES: &str = r#"{
    "KBD": { "name": "USBKeys", "port": 0 },
    "SYNTH": { "name": "USBSynth", "port": 0 }
}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub struct Rig {
    pub backend: Arc<LoopbackBackend>,
    pub keys: LoopbackDevice,
    pub synth: LoopbackDevice,
    pub patchbay: Patchbay,
}

/// Plugs both devices and builds a patchbay over `mappings` plus any extra
/// top-level sections.
pub fn rig(mappings: &str, extra: &str) -> Rig {
    init_tracing();
    let backend = Arc::new(LoopbackBackend::new());
    let keys = backend.plug("USBKeys", 0, 1);
    let synth = backend.plug("USBSynth", 1, 0);
    let extra = if extra.is_empty() {
        String::new()
    } else {
        format!(", {extra}")
    };
    let json = format!(r#"{{ "devices": {DEVICES}, "mappings": {mappings}{extra} }}"#);
    let patchbay = Patchbay::builder()
        .backend(backend.clone())
        .config(RouterConfig::from_json_str(&json).expect("valid test config"))
        .open_timeout(Duration::from_secs(2))
        .build()
        .expect("patchbay builds");
    Rig {
        backend,
        keys,
        synth,
        patchbay,
    }
}

pub fn sent_bytes(device: &LoopbackDevice) -> Vec<Vec<u8>> {
    device.take_sent().into_iter().map(|m| m.bytes).collect()
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
