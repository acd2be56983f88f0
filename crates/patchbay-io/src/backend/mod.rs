//! Hardware contract.
//!
//! The router depends only on these traits: device enumeration by product
//! name, asynchronous device open, and sub-ports that connect, send, flush and
//! close. Port names follow the device's point of view: a device *output*
//! port delivers bytes to the host, a device *input* port accepts bytes from
//! the host.

use crate::error::Result;
use std::sync::Arc;

mod loopback;
pub use loopback::{LoopbackBackend, LoopbackDevice, SentMessage};

#[cfg(feature = "midi-io")]
mod hardware;
#[cfg(feature = "midi-io")]
pub use hardware::MidirBackend;

/// An enumerable device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub product_name: String,
    /// Ports the device receives on (host → device).
    pub input_ports: usize,
    /// Ports the device transmits on (device → host).
    pub output_ports: usize,
}

impl DeviceInfo {
    pub fn new(product_name: impl Into<String>, input_ports: usize, output_ports: usize) -> Self {
        Self {
            product_name: product_name.into(),
            input_ports,
            output_ports,
        }
    }
}

/// Called once with the opened device, or `None` when the platform refused.
pub type DeviceCallback = Box<dyn FnOnce(Option<Arc<dyn MidiDevice>>) + Send>;

pub trait MidiBackend: Send + Sync {
    fn devices(&self) -> Vec<DeviceInfo>;

    fn find_device(&self, product_name: &str) -> Option<DeviceInfo> {
        self.devices()
            .into_iter()
            .find(|d| d.product_name == product_name)
    }

    /// Opens a device. `on_opened` may run on any thread, before or after
    /// this call returns.
    fn open_device(&self, info: &DeviceInfo, on_opened: DeviceCallback);
}

pub trait MidiDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Port the device transmits on; feeds an input controller.
    fn open_output_port(&self, port: usize) -> Option<Box<dyn DeviceOutputPort>>;

    /// Port the device receives on; fed by an output controller.
    fn open_input_port(&self, port: usize) -> Option<Arc<dyn DeviceInputPort>>;
}

/// Sink for bytes arriving from hardware. Runs on the backend's receive thread.
pub trait MidiReceiver: Send + Sync {
    fn on_send(&self, data: &[u8], offset: usize, count: usize, timestamp: u64);
}

pub trait DeviceOutputPort: Send {
    fn connect(&mut self, receiver: Arc<dyn MidiReceiver>) -> Result<()>;
    fn disconnect(&mut self);
    fn flush(&mut self) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

pub trait DeviceInputPort: Send + Sync {
    fn send(&self, data: &[u8], timestamp: u64) -> Result<()>;
    fn flush(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
}
