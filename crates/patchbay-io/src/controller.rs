//! Per-port open/close state machine.
//!
//! [`DeviceController`] is generic over a [`ControllerKind`], which supplies
//! the direction-specific source port. An [`InputController`] opens the
//! device's *output* port and fans received messages out to its listeners;
//! an [`OutputController`] opens the device's *input* port and writes to it.

use crate::backend::{DeviceInputPort, DeviceOutputPort, MidiBackend, MidiDevice, MidiReceiver};
use crate::error::{Error, Result};
use crate::port::PortRecord;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use patchbay_midi::MidiMessage;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Closed,
    Opening,
    Open,
}

/// Receives every message decoded by an input controller.
pub trait MessageListener: Send + Sync {
    /// Return `true` when the message was handled and later listeners should
    /// not see it.
    fn on_message(&self, controller: &InputController, message: &MidiMessage) -> bool;
}

impl<F> MessageListener for F
where
    F: Fn(&InputController, &MidiMessage) -> bool + Send + Sync,
{
    fn on_message(&self, controller: &InputController, message: &MidiMessage) -> bool {
        self(controller, message)
    }
}

/// Direction-specific behavior plugged into [`DeviceController`].
pub trait ControllerKind: Default + Send + Sync + Sized + 'static {
    type Source: Send;

    const DIRECTION: Direction;

    fn open_source(
        controller: &Arc<DeviceController<Self>>,
        device: &dyn MidiDevice,
        port: usize,
    ) -> Option<Self::Source>;

    fn close_source(controller: &DeviceController<Self>, source: Self::Source) -> Result<()>;

    fn is_output() -> bool {
        Self::DIRECTION == Direction::Output
    }
}

pub type OpenCallback<K> = Box<dyn FnOnce(Result<Arc<DeviceController<K>>>) + Send>;

struct Inner<K: ControllerKind> {
    state: ControllerState,
    source: Option<K::Source>,
    device: Option<Arc<dyn MidiDevice>>,
    waiters: Vec<OpenCallback<K>>,
    /// Set by `close` while Opening; the in-flight open is torn down on arrival.
    close_requested: bool,
}

pub struct DeviceController<K: ControllerKind> {
    record: RwLock<PortRecord>,
    backend: Arc<dyn MidiBackend>,
    inner: Mutex<Inner<K>>,
    kind: K,
}

pub type InputController = DeviceController<Input>;
pub type OutputController = DeviceController<Output>;

impl<K: ControllerKind> DeviceController<K> {
    pub fn new(record: PortRecord, backend: Arc<dyn MidiBackend>) -> Self {
        Self {
            record: RwLock::new(record),
            backend,
            inner: Mutex::new(Inner {
                state: ControllerState::Closed,
                source: None,
                device: None,
                waiters: Vec::new(),
                close_requested: false,
            }),
            kind: K::default(),
        }
    }

    pub fn record(&self) -> PortRecord {
        self.record.read().clone()
    }

    pub fn nickname(&self) -> String {
        self.record.read().nickname().to_string()
    }

    pub(crate) fn set_record(&self, record: PortRecord) {
        *self.record.write() = record;
    }

    pub fn direction(&self) -> Direction {
        K::DIRECTION
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ControllerState::Open
    }

    /// Opens the port and reports the outcome through `on_result`.
    ///
    /// An already open controller reports success synchronously. A call made
    /// while an open is in flight receives that open's outcome.
    pub fn open<F>(self: &Arc<Self>, on_result: F)
    where
        F: FnOnce(Result<Arc<Self>>) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            match inner.state {
                ControllerState::Open => {
                    drop(inner);
                    on_result(Ok(Arc::clone(self)));
                    return;
                }
                ControllerState::Opening => {
                    inner.close_requested = false;
                    inner.waiters.push(Box::new(on_result));
                    return;
                }
                ControllerState::Closed => {
                    inner.state = ControllerState::Opening;
                    inner.close_requested = false;
                    inner.waiters.push(Box::new(on_result));
                }
            }
        }

        let record = self.record();
        let Some(info) = self.backend.find_device(record.name()) else {
            self.finish_open(None, Err(format!("device '{}' is not present", record.name())));
            return;
        };

        debug!("Opening {:?} controller {}", K::DIRECTION, record);
        let controller = Arc::clone(self);
        self.backend.open_device(
            &info,
            Box::new(move |device| controller.on_device(device)),
        );
    }

    fn on_device(self: &Arc<Self>, device: Option<Arc<dyn MidiDevice>>) {
        let Some(device) = device else {
            self.finish_open(None, Err("device refused to open".to_string()));
            return;
        };
        let port = self.record.read().port();
        match K::open_source(self, device.as_ref(), port) {
            Some(source) => self.finish_open(Some(device), Ok(source)),
            None => self.finish_open(
                None,
                Err(format!(
                    "device has no usable {} port {port}",
                    if K::is_output() { "input" } else { "output" }
                )),
            ),
        }
    }

    fn finish_open(
        self: &Arc<Self>,
        device: Option<Arc<dyn MidiDevice>>,
        outcome: std::result::Result<K::Source, String>,
    ) {
        let (waiters, failure, abandoned) = {
            let mut inner = self.inner.lock();
            let waiters = std::mem::take(&mut inner.waiters);
            let close_requested = std::mem::take(&mut inner.close_requested);
            match outcome {
                Ok(source) if close_requested => {
                    inner.state = ControllerState::Closed;
                    (waiters, Some("closed while opening".to_string()), Some(source))
                }
                Ok(source) => {
                    inner.source = Some(source);
                    inner.device = device;
                    inner.state = ControllerState::Open;
                    (waiters, None, None)
                }
                Err(reason) => {
                    inner.state = ControllerState::Closed;
                    (waiters, Some(reason), None)
                }
            }
        };

        let nickname = self.nickname();
        if let Some(source) = abandoned {
            if let Err(e) = K::close_source(self, source) {
                warn!("Failed to close abandoned open of {}: {}", nickname, e);
            }
        }
        match failure {
            None => {
                debug!("Opened {:?} controller {}", K::DIRECTION, nickname);
                for waiter in waiters {
                    waiter(Ok(Arc::clone(self)));
                }
            }
            Some(reason) => {
                warn!("Failed to open {}: {}", nickname, reason);
                for waiter in waiters {
                    waiter(Err(Error::DeviceOpen {
                        nickname: nickname.clone(),
                        reason: reason.clone(),
                    }));
                }
            }
        }
    }

    /// Closes the port. Closing a closed controller does nothing; closing one
    /// that is still opening makes that open fail once it lands.
    pub fn close(&self) -> Result<()> {
        let source = {
            let mut inner = self.inner.lock();
            match inner.state {
                ControllerState::Closed => return Ok(()),
                ControllerState::Opening => {
                    debug!("Close requested while opening {}", self.nickname());
                    inner.close_requested = true;
                    return Ok(());
                }
                ControllerState::Open => {}
            }
            inner.state = ControllerState::Closed;
            inner.device = None;
            inner.source.take()
        };
        debug!("Closing {:?} controller {}", K::DIRECTION, self.nickname());
        match source {
            Some(source) => K::close_source(self, source),
            None => Ok(()),
        }
    }
}

impl<K: ControllerKind> fmt::Debug for DeviceController<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceController")
            .field("direction", &K::DIRECTION)
            .field("record", &*self.record.read())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

pub struct Input {
    listeners: ArcSwap<Vec<Arc<dyn MessageListener>>>,
    write_lock: Mutex<()>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }
}

fn same_listener(a: &Arc<dyn MessageListener>, b: &Arc<dyn MessageListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct InputReceiver {
    controller: Weak<InputController>,
}

impl MidiReceiver for InputReceiver {
    fn on_send(&self, data: &[u8], offset: usize, count: usize, timestamp: u64) {
        let Some(controller) = self.controller.upgrade() else {
            return;
        };
        match MidiMessage::decode(data, offset, count, timestamp) {
            Ok(message) => controller.dispatch(&message),
            Err(e) => debug!(
                "Discarding undecodable input on {}: {}",
                controller.nickname(),
                e
            ),
        }
    }
}

impl ControllerKind for Input {
    type Source = Box<dyn DeviceOutputPort>;

    const DIRECTION: Direction = Direction::Input;

    fn open_source(
        controller: &Arc<InputController>,
        device: &dyn MidiDevice,
        port: usize,
    ) -> Option<Self::Source> {
        let mut source = device.open_output_port(port)?;
        let receiver = Arc::new(InputReceiver {
            controller: Arc::downgrade(controller),
        });
        if let Err(e) = source.connect(receiver) {
            warn!("Failed to connect receiver for {}: {}", controller.nickname(), e);
            return None;
        }
        Some(source)
    }

    fn close_source(controller: &InputController, mut source: Self::Source) -> Result<()> {
        source.disconnect();
        let flushed = source.flush();
        controller.clear_listeners();
        let closed = source.close();
        flushed.and(closed)
    }
}

impl DeviceController<Input> {
    /// Registers a listener. Returns false if it is already registered.
    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) -> bool {
        let _guard = self.kind.write_lock.lock();
        let current = self.kind.listeners.load();
        if current.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        let mut listeners = (**current).clone();
        listeners.push(listener);
        self.kind.listeners.store(Arc::new(listeners));
        true
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let _guard = self.kind.write_lock.lock();
        let current = self.kind.listeners.load();
        let Some(index) = current.iter().position(|l| same_listener(l, listener)) else {
            return false;
        };
        let mut listeners = (**current).clone();
        listeners.remove(index);
        self.kind.listeners.store(Arc::new(listeners));
        true
    }

    pub fn has_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        self.kind
            .listeners
            .load()
            .iter()
            .any(|l| same_listener(l, listener))
    }

    pub fn listener_count(&self) -> usize {
        self.kind.listeners.load().len()
    }

    fn clear_listeners(&self) {
        let _guard = self.kind.write_lock.lock();
        self.kind.listeners.store(Arc::new(Vec::new()));
    }

    /// Hands a message to each listener in registration order until one
    /// reports it handled.
    pub fn dispatch(&self, message: &MidiMessage) {
        let listeners = self.kind.listeners.load_full();
        for listener in listeners.iter() {
            if listener.on_message(self, message) {
                trace!("{} handled early on {}", message, self.nickname());
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Output;

impl ControllerKind for Output {
    type Source = Arc<dyn DeviceInputPort>;

    const DIRECTION: Direction = Direction::Output;

    fn open_source(
        _controller: &Arc<OutputController>,
        device: &dyn MidiDevice,
        port: usize,
    ) -> Option<Self::Source> {
        device.open_input_port(port)
    }

    fn close_source(_controller: &OutputController, source: Self::Source) -> Result<()> {
        let flushed = source.flush();
        let closed = source.close();
        flushed.and(closed)
    }
}

impl DeviceController<Output> {
    /// Encodes and writes a message. Does nothing unless the port is open.
    pub fn send(&self, message: &MidiMessage) -> Result<()> {
        let port = {
            let inner = self.inner.lock();
            if inner.state != ControllerState::Open {
                return Ok(());
            }
            inner.source.clone()
        };
        match port {
            Some(port) => port.send(&message.encode(), message.timestamp()),
            None => Ok(()),
        }
    }
}
