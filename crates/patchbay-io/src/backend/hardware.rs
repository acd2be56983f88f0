//! Hardware backend over midir.
//!
//! A device is the set of midir ports whose name starts with its product
//! name; port numbers index those ports in enumeration order. Sends go
//! through a dedicated output thread per port.

use super::{
    DeviceCallback, DeviceInfo, DeviceInputPort, DeviceOutputPort, MidiBackend, MidiDevice,
    MidiReceiver,
};
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use midir::{MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Product name of a platform port name, e.g. `USBKeys` for
/// `USBKeys:USBKeys MIDI 1 20:0`.
fn product_name(port_name: &str) -> &str {
    port_name.split(':').next().unwrap_or(port_name).trim()
}

pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new("patchbay")
    }
}

impl MidiBackend for MidirBackend {
    fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = Vec::new();
        let mut count = |name: &str, transmit: bool| {
            let product = product_name(name);
            let index = match devices.iter().position(|d| d.product_name == product) {
                Some(index) => index,
                None => {
                    devices.push(DeviceInfo::new(product, 0, 0));
                    devices.len() - 1
                }
            };
            if transmit {
                devices[index].output_ports += 1;
            } else {
                devices[index].input_ports += 1;
            }
        };

        match MidiInput::new(&self.client_name) {
            Ok(input) => {
                for port in input.ports() {
                    if let Ok(name) = input.port_name(&port) {
                        count(&name, true);
                    }
                }
            }
            Err(e) => warn!("Failed to enumerate MIDI inputs: {e}"),
        }
        match MidiOutput::new(&self.client_name) {
            Ok(output) => {
                for port in output.ports() {
                    if let Ok(name) = output.port_name(&port) {
                        count(&name, false);
                    }
                }
            }
            Err(e) => warn!("Failed to enumerate MIDI outputs: {e}"),
        }
        devices
    }

    fn open_device(&self, info: &DeviceInfo, on_opened: DeviceCallback) {
        // midir has no device-level handle; ports are resolved on demand.
        on_opened(Some(Arc::new(MidirDevice {
            info: info.clone(),
            client_name: self.client_name.clone(),
        })));
    }
}

struct MidirDevice {
    info: DeviceInfo,
    client_name: String,
}

impl MidiDevice for MidirDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open_output_port(&self, port: usize) -> Option<Box<dyn DeviceOutputPort>> {
        let input = match MidiInput::new(&self.client_name) {
            Ok(input) => input,
            Err(e) => {
                warn!("Failed to create MIDI input: {e}");
                return None;
            }
        };
        let target = input
            .ports()
            .into_iter()
            .filter(|p| {
                input
                    .port_name(p)
                    .map(|name| product_name(&name) == self.info.product_name)
                    .unwrap_or(false)
            })
            .nth(port)?;
        Some(Box::new(MidirSourcePort {
            input: Some(input),
            port: target,
            connection: None,
            label: format!("{}-in-{}", self.info.product_name, port),
        }))
    }

    fn open_input_port(&self, port: usize) -> Option<Arc<dyn DeviceInputPort>> {
        MidirSinkPort::spawn(&self.client_name, &self.info.product_name, port)
            .map(|sink| Arc::new(sink) as Arc<dyn DeviceInputPort>)
    }
}

struct MidirSourcePort {
    input: Option<MidiInput>,
    port: MidiInputPort,
    connection: Option<MidiInputConnection<()>>,
    label: String,
}

impl DeviceOutputPort for MidirSourcePort {
    fn connect(&mut self, receiver: Arc<dyn MidiReceiver>) -> Result<()> {
        self.disconnect();
        let input = self
            .input
            .take()
            .ok_or_else(|| Error::Port(format!("{} is already connected", self.label)))?;
        let connection = input.connect(
            &self.port,
            &self.label,
            move |timestamp, bytes, _| receiver.on_send(bytes, 0, bytes.len(), timestamp),
            (),
        );
        match connection {
            Ok(connection) => {
                debug!("Connected MIDI input {}", self.label);
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.input = Some(e.into_inner());
                Err(Error::Port(message))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let (input, ()) = connection.close();
            self.input = Some(input);
            debug!("Disconnected MIDI input {}", self.label);
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

enum SinkCommand {
    Send(Vec<u8>),
    Shutdown,
}

struct MidirSinkPort {
    commands: Sender<SinkCommand>,
    label: String,
}

impl MidirSinkPort {
    /// Connects on a dedicated thread and waits for it to report readiness.
    fn spawn(client_name: &str, product: &str, port: usize) -> Option<Self> {
        let (command_sender, command_receiver) = bounded(1024);
        let (ready_sender, ready_receiver) = bounded(1);
        let label = format!("{product}-out-{port}");
        let client_name = client_name.to_string();
        let product = product.to_string();
        let thread_label = label.clone();

        let spawned = thread::Builder::new()
            .name(format!("midi-output-{label}"))
            .spawn(move || {
                let mut connection = match Self::connect(&client_name, &product, port, &thread_label)
                {
                    Ok(connection) => {
                        let _ = ready_sender.send(true);
                        connection
                    }
                    Err(e) => {
                        warn!("Failed to open MIDI output {thread_label}: {e}");
                        let _ = ready_sender.send(false);
                        return;
                    }
                };
                while let Ok(command) = command_receiver.recv() {
                    match command {
                        SinkCommand::Send(bytes) => {
                            if let Err(e) = connection.send(&bytes) {
                                debug!("MIDI send on {thread_label} failed: {e}");
                            }
                        }
                        SinkCommand::Shutdown => break,
                    }
                }
                connection.close();
                debug!("MIDI output thread {thread_label} exited");
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn MIDI output thread: {e}");
            return None;
        }

        match ready_receiver.recv_timeout(Duration::from_secs(5)) {
            Ok(true) => Some(Self {
                commands: command_sender,
                label,
            }),
            _ => None,
        }
    }

    fn connect(
        client_name: &str,
        product: &str,
        port: usize,
        label: &str,
    ) -> Result<MidiOutputConnection> {
        let output = MidiOutput::new(client_name)?;
        let target = output
            .ports()
            .into_iter()
            .filter(|p| {
                output
                    .port_name(p)
                    .map(|name| product_name(&name) == product)
                    .unwrap_or(false)
            })
            .nth(port)
            .ok_or_else(|| Error::DeviceNotFound(format!("{product} port {port}")))?;
        Ok(output.connect(&target, label)?)
    }
}

impl DeviceInputPort for MidirSinkPort {
    fn send(&self, data: &[u8], _timestamp: u64) -> Result<()> {
        match self.commands.try_send(SinkCommand::Send(data.to_vec())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Port(format!("{} queue is full", self.label))),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::Port(format!("{} is closed", self.label)))
            }
        }
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let _ = self.commands.send(SinkCommand::Shutdown);
        Ok(())
    }
}
