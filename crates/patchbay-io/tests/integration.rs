//! Integration tests for patchbay-io.
//!
//! Opens batches of controllers over loopback devices the way topology
//! construction does, and exercises hotplug against live listeners.

use patchbay_io::{
    InputController, LatchCoordinator, LoopbackBackend, MessageListener, MidiMessage,
    PortRegistry, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ---------------------------------------------------------------------------
// 1. Batch open through the latch coordinator
// ---------------------------------------------------------------------------

#[test]
fn test_batch_open_collects_every_outcome() {
    init_tracing();
    let backend = Arc::new(LoopbackBackend::new());
    backend.plug("Keys", 0, 2);
    backend.plug("Synth", 1, 0);
    let registry = PortRegistry::new(backend.clone());
    let keys_a = registry.add_port("Keys", 0, Some("A"));
    let keys_b = registry.add_port("Keys", 1, Some("B"));
    let missing = registry.add_port("Drums", 0, Some("D"));
    let synth = registry.add_port("Synth", 0, Some("S"));

    let latch: LatchCoordinator<Result<String>> = LatchCoordinator::new();
    for record in [&keys_a, &keys_b, &missing] {
        let completer = latch.completer();
        registry.open_input(record, move |r| completer.complete(r.map(|c| c.nickname())));
    }
    let completer = latch.completer();
    registry.open_output(&synth, move |r| completer.complete(r.map(|c| c.nickname())));

    let latched = latch
        .request_latches_timeout(4, Duration::from_secs(2))
        .unwrap();
    assert!(latched.is_complete());

    let mut opened: Vec<String> = latched
        .results
        .iter()
        .filter_map(|r| r.as_ref().ok().cloned())
        .collect();
    opened.sort();
    assert_eq!(opened, vec!["A", "B", "S"]);
    assert_eq!(latched.results.iter().filter(|r| r.is_err()).count(), 1);
}

// ---------------------------------------------------------------------------
// 2. Receive path: loopback bytes reach listeners through decode
// ---------------------------------------------------------------------------

#[test]
fn test_input_decodes_and_fans_out() {
    init_tracing();
    let backend = Arc::new(LoopbackBackend::new());
    let keys = backend.plug("Keys", 0, 1);
    let registry = PortRegistry::new(backend.clone());
    let record = registry.add_port("Keys", 0, None);

    let latch = LatchCoordinator::new();
    let completer = latch.completer();
    registry.open_input(&record, move |r| completer.complete(r.is_ok()));
    assert_eq!(latch.request_latches(1).unwrap(), vec![true]);

    let notes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&notes);
    let listener: Arc<dyn MessageListener> =
        Arc::new(move |_: &InputController, msg: &MidiMessage| {
            seen.fetch_add(msg.encode().len(), Ordering::SeqCst);
            false
        });
    registry.input_for(&record).unwrap().add_listener(listener);

    keys.inject(0, &[0x90, 60, 100]);
    keys.inject(0, &[0x00, 0x01]);
    keys.inject(0, &[0xF8]);
    assert_eq!(notes.load(Ordering::SeqCst), 4);
}
