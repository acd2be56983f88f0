//! In-process virtual devices.
//!
//! Bytes injected into a device's output port reach whatever receiver is
//! connected to it; bytes sent to a device's input port are captured for
//! inspection. Device opens complete on a separate thread, like hardware.

use super::{
    DeviceCallback, DeviceInfo, DeviceInputPort, DeviceOutputPort, MidiBackend, MidiDevice,
    MidiReceiver,
};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// A message captured on one of a device's input ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub port: usize,
    pub bytes: Vec<u8>,
    pub timestamp: u64,
}

struct DeviceState {
    info: DeviceInfo,
    epoch: Instant,
    receivers: Mutex<Vec<Option<Arc<dyn MidiReceiver>>>>,
    sent: Mutex<Vec<SentMessage>>,
    refuse_open: AtomicBool,
}

/// Handle to a virtual device. Cheap to clone.
#[derive(Clone)]
pub struct LoopbackDevice {
    state: Arc<DeviceState>,
}

impl LoopbackDevice {
    fn new(info: DeviceInfo) -> Self {
        let receivers = vec![None; info.output_ports];
        Self {
            state: Arc::new(DeviceState {
                info,
                epoch: Instant::now(),
                receivers: Mutex::new(receivers),
                sent: Mutex::new(Vec::new()),
                refuse_open: AtomicBool::new(false),
            }),
        }
    }

    pub fn product_name(&self) -> &str {
        &self.state.info.product_name
    }

    /// Delivers bytes as if the device transmitted them on `port`.
    /// Returns false when nothing is connected to that port.
    pub fn inject(&self, port: usize, bytes: &[u8]) -> bool {
        let receiver = self.state.receivers.lock().get(port).cloned().flatten();
        match receiver {
            Some(receiver) => {
                let timestamp = self.state.epoch.elapsed().as_nanos() as u64;
                receiver.on_send(bytes, 0, bytes.len(), timestamp);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, port: usize) -> bool {
        matches!(self.state.receivers.lock().get(port), Some(Some(_)))
    }

    /// Everything sent to the device so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut *self.state.sent.lock())
    }

    /// Makes subsequent open requests fail with a `None` handle.
    pub fn set_refuse_open(&self, refuse: bool) {
        self.state.refuse_open.store(refuse, Ordering::SeqCst);
    }
}

impl MidiDevice for LoopbackDevice {
    fn info(&self) -> &DeviceInfo {
        &self.state.info
    }

    fn open_output_port(&self, port: usize) -> Option<Box<dyn DeviceOutputPort>> {
        (port < self.state.info.output_ports).then(|| {
            Box::new(LoopbackOutputPort {
                state: Arc::clone(&self.state),
                port,
            }) as Box<dyn DeviceOutputPort>
        })
    }

    fn open_input_port(&self, port: usize) -> Option<Arc<dyn DeviceInputPort>> {
        (port < self.state.info.input_ports).then(|| {
            Arc::new(LoopbackInputPort {
                state: Arc::clone(&self.state),
                port,
                closed: AtomicBool::new(false),
            }) as Arc<dyn DeviceInputPort>
        })
    }
}

struct LoopbackOutputPort {
    state: Arc<DeviceState>,
    port: usize,
}

impl DeviceOutputPort for LoopbackOutputPort {
    fn connect(&mut self, receiver: Arc<dyn MidiReceiver>) -> Result<()> {
        let mut receivers = self.state.receivers.lock();
        let slot = receivers
            .get_mut(self.port)
            .ok_or_else(|| Error::Port(format!("no output port {}", self.port)))?;
        *slot = Some(receiver);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(slot) = self.state.receivers.lock().get_mut(self.port) {
            *slot = None;
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.disconnect();
        Ok(())
    }
}

struct LoopbackInputPort {
    state: Arc<DeviceState>,
    port: usize,
    closed: AtomicBool,
}

impl DeviceInputPort for LoopbackInputPort {
    fn send(&self, data: &[u8], timestamp: u64) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Port(format!(
                "{} input port {} is closed",
                self.state.info.product_name, self.port
            )));
        }
        self.state.sent.lock().push(SentMessage {
            port: self.port,
            bytes: data.to_vec(),
            timestamp,
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Backend over a set of virtual devices that can be plugged and unplugged.
#[derive(Default)]
pub struct LoopbackBackend {
    devices: RwLock<Vec<LoopbackDevice>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a device visible. Replaces any device with the same product name.
    pub fn plug(
        &self,
        product_name: impl Into<String>,
        input_ports: usize,
        output_ports: usize,
    ) -> LoopbackDevice {
        let device = LoopbackDevice::new(DeviceInfo::new(product_name, input_ports, output_ports));
        let mut devices = self.devices.write();
        devices.retain(|d| d.product_name() != device.product_name());
        devices.push(device.clone());
        debug!("Loopback device plugged: {}", device.product_name());
        device
    }

    pub fn unplug(&self, product_name: &str) -> Option<LoopbackDevice> {
        let mut devices = self.devices.write();
        let index = devices.iter().position(|d| d.product_name() == product_name)?;
        debug!("Loopback device unplugged: {product_name}");
        Some(devices.remove(index))
    }

    pub fn device(&self, product_name: &str) -> Option<LoopbackDevice> {
        self.devices
            .read()
            .iter()
            .find(|d| d.product_name() == product_name)
            .cloned()
    }
}

impl MidiBackend for LoopbackBackend {
    fn devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .read()
            .iter()
            .map(|d| d.state.info.clone())
            .collect()
    }

    fn open_device(&self, info: &DeviceInfo, on_opened: DeviceCallback) {
        let device = self
            .device(&info.product_name)
            .filter(|d| !d.state.refuse_open.load(Ordering::SeqCst));
        let spawned = thread::Builder::new()
            .name("loopback-open".to_string())
            .spawn(move || {
                on_opened(device.map(|d| Arc::new(d) as Arc<dyn MidiDevice>));
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn loopback open thread: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::time::Duration;

    struct Capture(Mutex<Vec<Vec<u8>>>);

    impl MidiReceiver for Capture {
        fn on_send(&self, data: &[u8], offset: usize, count: usize, _timestamp: u64) {
            self.0.lock().push(data[offset..offset + count].to_vec());
        }
    }

    fn open(backend: &LoopbackBackend, name: &str) -> Option<Arc<dyn MidiDevice>> {
        let info = backend.find_device(name)?;
        let (tx, rx) = bounded(1);
        backend.open_device(
            &info,
            Box::new(move |device| {
                let _ = tx.send(device);
            }),
        );
        rx.recv_timeout(Duration::from_secs(2)).ok().flatten()
    }

    #[test]
    fn test_inject_reaches_connected_receiver() {
        let backend = LoopbackBackend::new();
        let keys = backend.plug("Keys", 0, 1);
        let device = open(&backend, "Keys").unwrap();

        let mut port = device.open_output_port(0).unwrap();
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        port.connect(capture.clone()).unwrap();

        assert!(keys.inject(0, &[0x90, 60, 100]));
        port.disconnect();
        assert!(!keys.inject(0, &[0x80, 60, 0]));
        assert_eq!(*capture.0.lock(), vec![vec![0x90, 60, 100]]);
    }

    #[test]
    fn test_sends_are_captured_until_close() {
        let backend = LoopbackBackend::new();
        let synth = backend.plug("Synth", 2, 0);
        let device = open(&backend, "Synth").unwrap();

        assert!(device.open_input_port(2).is_none());
        let port = device.open_input_port(1).unwrap();
        port.send(&[0xC0, 3], 7).unwrap();
        port.close().unwrap();
        assert!(port.send(&[0xC0, 4], 8).is_err());

        let sent = synth.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].port, 1);
        assert_eq!(sent[0].bytes, vec![0xC0, 3]);
        assert!(synth.sent().is_empty());
    }

    #[test]
    fn test_refused_and_unplugged_devices_open_as_none() {
        let backend = LoopbackBackend::new();
        let keys = backend.plug("Keys", 1, 1);
        let info = backend.find_device("Keys").unwrap();

        keys.set_refuse_open(true);
        assert!(open(&backend, "Keys").is_none());

        keys.set_refuse_open(false);
        backend.unplug("Keys");
        assert!(backend.find_device("Keys").is_none());

        let (tx, rx) = bounded(1);
        backend.open_device(
            &info,
            Box::new(move |device| {
                let _ = tx.send(device.is_some());
            }),
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(false));
    }
}
