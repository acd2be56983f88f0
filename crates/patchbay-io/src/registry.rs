//! Known ports and the live controllers bound to them.

use crate::backend::{DeviceInfo, MidiBackend};
use crate::controller::{InputController, OutputController};
use crate::error::{Error, Result};
use crate::port::PortRecord;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Notified when hotplug changes the set of usable controllers.
pub trait HotplugListener: Send + Sync {
    fn on_input_reopened(&self, _controller: &Arc<InputController>) {}

    fn on_output_reopened(&self, _controller: &Arc<OutputController>) {}

    fn on_device_removed(&self, _product_name: &str) {}
}

/// Owns every controller in the process.
///
/// Records are kept in insertion order and keyed by nickname. Controllers are
/// created on first open and stay bound to their record until the registry
/// is dropped, so hotplug can reopen them.
pub struct PortRegistry {
    backend: Arc<dyn MidiBackend>,
    records: RwLock<Vec<PortRecord>>,
    inputs: DashMap<PortRecord, Arc<InputController>>,
    outputs: DashMap<PortRecord, Arc<OutputController>>,
    hotplug_listeners: RwLock<Vec<Arc<dyn HotplugListener>>>,
}

impl PortRegistry {
    pub fn new(backend: Arc<dyn MidiBackend>) -> Self {
        Self {
            backend,
            records: RwLock::new(Vec::new()),
            inputs: DashMap::new(),
            outputs: DashMap::new(),
            hotplug_listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn MidiBackend> {
        &self.backend
    }

    /// Devices currently visible to the backend.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.backend.devices()
    }

    /// Registers a port. A record with the same nickname is replaced.
    pub fn add_port(&self, name: &str, port: usize, nickname: Option<&str>) -> PortRecord {
        let record = PortRecord::new(name, port, nickname);
        let mut records = self.records.write();
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.nickname() == record.nickname())
        {
            debug!("Replacing port record {} with {}", existing, record);
            *existing = record.clone();
        } else {
            debug!("Added port record {}", record);
            records.push(record.clone());
        }
        record
    }

    pub fn records(&self) -> Vec<PortRecord> {
        self.records.read().clone()
    }

    pub fn record(&self, nickname: &str) -> Option<PortRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.nickname() == nickname)
            .cloned()
    }

    /// Resolves nicknames in order, skipping the unknown ones.
    pub fn records_for<S: AsRef<str>>(&self, nicknames: &[S]) -> Vec<PortRecord> {
        nicknames
            .iter()
            .filter_map(|nickname| {
                let nickname = nickname.as_ref();
                let record = self.record(nickname);
                if record.is_none() {
                    warn!("Port resolution failed: no port named {nickname}");
                }
                record
            })
            .collect()
    }

    pub fn find_by_product_name(&self, name: &str) -> Option<PortRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.name() == name)
            .cloned()
    }

    pub fn find_exact(&self, name: &str, port: usize) -> Option<PortRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.name() == name && r.port() == port)
            .cloned()
    }

    /// Every record of a multi-port device.
    pub fn records_for_device(&self, name: &str) -> Vec<PortRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.name() == name)
            .cloned()
            .collect()
    }

    /// Changes a record's nickname, carrying its controllers over.
    pub fn rename(&self, nickname: &str, new_nickname: &str) -> Result<PortRecord> {
        let (old, renamed) = {
            let mut records = self.records.write();
            if records.iter().any(|r| r.nickname() == new_nickname) {
                return Err(Error::DuplicateNickname(new_nickname.to_string()));
            }
            let record = records
                .iter_mut()
                .find(|r| r.nickname() == nickname)
                .ok_or_else(|| Error::UnknownPort(nickname.to_string()))?;
            let renamed = record.renamed(new_nickname);
            let old = std::mem::replace(record, renamed.clone());
            (old, renamed)
        };

        if let Some((_, input)) = self.inputs.remove(&old) {
            input.set_record(renamed.clone());
            self.inputs.insert(renamed.clone(), input);
        }
        if let Some((_, output)) = self.outputs.remove(&old) {
            output.set_record(renamed.clone());
            self.outputs.insert(renamed.clone(), output);
        }
        debug!("Renamed port {} to {}", nickname, new_nickname);
        Ok(renamed)
    }

    pub fn bind_input(
        &self,
        record: &PortRecord,
        controller: Arc<InputController>,
    ) -> Option<Arc<InputController>> {
        self.inputs.insert(record.clone(), controller)
    }

    pub fn bind_output(
        &self,
        record: &PortRecord,
        controller: Arc<OutputController>,
    ) -> Option<Arc<OutputController>> {
        self.outputs.insert(record.clone(), controller)
    }

    pub fn input_for(&self, record: &PortRecord) -> Option<Arc<InputController>> {
        self.inputs.get(record).map(|c| Arc::clone(c.value()))
    }

    pub fn output_for(&self, record: &PortRecord) -> Option<Arc<OutputController>> {
        self.outputs.get(record).map(|c| Arc::clone(c.value()))
    }

    /// Opens the input bound to `record`, creating and binding it first if
    /// needed.
    pub fn open_input<F>(&self, record: &PortRecord, on_result: F)
    where
        F: FnOnce(Result<Arc<InputController>>) + Send + 'static,
    {
        let controller = {
            let entry = self.inputs.entry(record.clone()).or_insert_with(|| {
                Arc::new(InputController::new(
                    record.clone(),
                    Arc::clone(&self.backend),
                ))
            });
            Arc::clone(entry.value())
        };
        controller.open(on_result);
    }

    /// Opens the output bound to `record`, creating and binding it first if
    /// needed.
    pub fn open_output<F>(&self, record: &PortRecord, on_result: F)
    where
        F: FnOnce(Result<Arc<OutputController>>) + Send + 'static,
    {
        let controller = {
            let entry = self.outputs.entry(record.clone()).or_insert_with(|| {
                Arc::new(OutputController::new(
                    record.clone(),
                    Arc::clone(&self.backend),
                ))
            });
            Arc::clone(entry.value())
        };
        controller.open(on_result);
    }

    pub fn subscribe(&self, listener: Arc<dyn HotplugListener>) {
        self.hotplug_listeners.write().push(listener);
    }

    /// Removes a listener added with [`subscribe`](Self::subscribe). Returns
    /// false if it was not subscribed.
    pub fn unsubscribe(&self, listener: &Arc<dyn HotplugListener>) -> bool {
        let mut listeners = self.hotplug_listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.hotplug_listeners.read().len()
    }

    fn listeners(&self) -> Vec<Arc<dyn HotplugListener>> {
        self.hotplug_listeners.read().clone()
    }

    /// Reopens every bound but closed controller of the device. Failures are
    /// logged.
    pub fn on_device_added(&self, product_name: &str) {
        debug!("Device added: {product_name}");
        for record in self.records_for_device(product_name) {
            if let Some(input) = self.input_for(&record).filter(|c| !c.is_open()) {
                let listeners = self.listeners();
                input.open(move |result| match result {
                    Ok(controller) => {
                        for listener in &listeners {
                            listener.on_input_reopened(&controller);
                        }
                    }
                    Err(e) => warn!("Hotplug reopen failed: {e}"),
                });
            }
            if let Some(output) = self.output_for(&record).filter(|c| !c.is_open()) {
                let listeners = self.listeners();
                output.open(move |result| match result {
                    Ok(controller) => {
                        for listener in &listeners {
                            listener.on_output_reopened(&controller);
                        }
                    }
                    Err(e) => warn!("Hotplug reopen failed: {e}"),
                });
            }
        }
    }

    /// Closes every controller bound to the device. Failures are logged.
    pub fn on_device_removed(&self, product_name: &str) {
        debug!("Device removed: {product_name}");
        for record in self.records_for_device(product_name) {
            if let Some(input) = self.input_for(&record) {
                if let Err(e) = input.close() {
                    warn!("Failed to close {}: {}", record, e);
                }
            }
            if let Some(output) = self.output_for(&record) {
                if let Err(e) = output.close() {
                    warn!("Failed to close {}: {}", record, e);
                }
            }
        }
        for listener in self.listeners() {
            listener.on_device_removed(product_name);
        }
    }

    /// Closes every bound controller.
    pub fn close_all(&self) {
        let inputs: Vec<_> = self.inputs.iter().map(|e| Arc::clone(e.value())).collect();
        let outputs: Vec<_> = self.outputs.iter().map(|e| Arc::clone(e.value())).collect();
        for input in inputs {
            if let Err(e) = input.close() {
                warn!("Failed to close {}: {}", input.nickname(), e);
            }
        }
        for output in outputs {
            if let Err(e) = output.close() {
                warn!("Failed to close {}: {}", output.nickname(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoopbackBackend;
    use crate::controller::ControllerState;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    fn registry() -> (Arc<LoopbackBackend>, PortRegistry) {
        let backend = Arc::new(LoopbackBackend::new());
        let registry = PortRegistry::new(backend.clone());
        (backend, registry)
    }

    #[test]
    fn test_add_and_find() {
        let (_, registry) = registry();
        let a = registry.add_port("Launchpad", 0, None);
        let b = registry.add_port("Launchpad", 1, Some("LP2"));
        registry.add_port("Keys", 0, Some("KBD"));

        assert_eq!(a.nickname(), "Launchpad___0");
        assert_eq!(registry.find_by_product_name("Launchpad"), Some(a.clone()));
        assert_eq!(registry.find_exact("Launchpad", 1), Some(b.clone()));
        assert_eq!(registry.find_exact("Launchpad", 2), None);
        assert_eq!(registry.records_for_device("Launchpad"), vec![a, b]);
        assert_eq!(registry.records().len(), 3);
    }

    #[test]
    fn test_records_for_skips_unknown() {
        let (_, registry) = registry();
        registry.add_port("Keys", 0, Some("KBD"));
        registry.add_port("Synth", 0, Some("SYNTH"));

        let records = registry.records_for(&["SYNTH", "GHOST", "KBD"]);
        let nicknames: Vec<_> = records.iter().map(|r| r.nickname()).collect();
        assert_eq!(nicknames, vec!["SYNTH", "KBD"]);
    }

    #[test]
    fn test_same_nickname_replaces_record() {
        let (_, registry) = registry();
        registry.add_port("Keys", 0, Some("KBD"));
        registry.add_port("Keys", 1, Some("KBD"));
        assert_eq!(registry.records().len(), 1);
        assert_eq!(registry.record("KBD").unwrap().port(), 1);
    }

    #[test]
    fn test_rename_rekeys_controllers() {
        let (backend, registry) = registry();
        let record = registry.add_port("Keys", 0, Some("KBD"));
        registry.add_port("Synth", 0, Some("SYNTH"));
        let controller = Arc::new(InputController::new(record.clone(), backend));
        registry.bind_input(&record, Arc::clone(&controller));

        assert!(matches!(
            registry.rename("KBD", "SYNTH"),
            Err(Error::DuplicateNickname(_))
        ));
        assert!(matches!(
            registry.rename("NOPE", "X"),
            Err(Error::UnknownPort(_))
        ));

        let renamed = registry.rename("KBD", "KEYS").unwrap();
        assert!(registry.input_for(&record).is_none());
        let bound = registry.input_for(&renamed).unwrap();
        assert!(Arc::ptr_eq(&bound, &controller));
        assert_eq!(controller.nickname(), "KEYS");
    }

    #[test]
    fn test_open_binds_controller_once() {
        let (backend, registry) = registry();
        backend.plug("Synth", 1, 0);
        let record = registry.add_port("Synth", 0, None);

        let (tx, rx) = bounded(2);
        let tx2 = tx.clone();
        registry.open_output(&record, move |r| {
            let _ = tx.send(r.map(|c| Arc::as_ptr(&c) as usize));
        });
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        registry.open_output(&record, move |r| {
            let _ = tx2.send(r.map(|c| Arc::as_ptr(&c) as usize));
        });
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(first, second);
        assert!(registry.output_for(&record).unwrap().is_open());
    }

    #[test]
    fn test_hotplug_remove_closes_and_add_reopens() {
        let (backend, registry) = registry();
        let keys = backend.plug("Keys", 0, 1);
        let record = registry.add_port("Keys", 0, Some("KBD"));

        let (tx, rx) = bounded(1);
        registry.open_input(&record, move |r| {
            let _ = tx.send(r.is_ok());
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(true));
        let controller = registry.input_for(&record).unwrap();

        backend.unplug("Keys");
        registry.on_device_removed("Keys");
        assert_eq!(controller.state(), ControllerState::Closed);
        assert!(!keys.is_connected(0));

        struct Reopened(crossbeam_channel::Sender<String>);
        impl HotplugListener for Reopened {
            fn on_input_reopened(&self, controller: &Arc<InputController>) {
                let _ = self.0.send(controller.nickname());
            }
        }
        let (tx, rx) = bounded(1);
        registry.subscribe(Arc::new(Reopened(tx)));

        let keys = backend.plug("Keys", 0, 1);
        registry.on_device_added("Keys");
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)),
            Ok("KBD".to_string())
        );
        assert!(controller.is_open());
        assert!(keys.is_connected(0));
    }

    #[test]
    fn test_unsubscribed_listener_is_not_notified() {
        struct Removed(crossbeam_channel::Sender<String>);
        impl HotplugListener for Removed {
            fn on_device_removed(&self, product_name: &str) {
                let _ = self.0.send(product_name.to_string());
            }
        }

        let (_, registry) = registry();
        let (tx, rx) = bounded(4);
        let listener: Arc<dyn HotplugListener> = Arc::new(Removed(tx));
        registry.subscribe(Arc::clone(&listener));
        registry.on_device_removed("Keys");
        assert_eq!(rx.try_recv(), Ok("Keys".to_string()));

        assert!(registry.unsubscribe(&listener));
        assert!(!registry.unsubscribe(&listener));
        assert_eq!(registry.subscriber_count(), 0);
        registry.on_device_removed("Keys");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hotplug_add_without_device_is_logged_only() {
        let (_, registry) = registry();
        let record = registry.add_port("Keys", 0, Some("KBD"));
        let (tx, rx) = bounded(1);
        registry.open_input(&record, move |r| {
            let _ = tx.send(r.is_ok());
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(false));

        registry.on_device_added("Keys");
        assert!(!registry.input_for(&record).unwrap().is_open());
    }
}
