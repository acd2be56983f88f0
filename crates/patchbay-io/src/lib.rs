//! MIDI port I/O for patchbay.
//!
//! Provides the hardware contract, per-port device controllers, the port
//! registry with hotplug handling, and the coordinators that turn
//! callback-based device opens into blocking calls.
//!
//! Feature gates: `midi-io` (hardware backend over midir).

pub mod error;
pub use error::{Error, Result};

pub mod backend;
pub use backend::{
    DeviceCallback, DeviceInfo, DeviceInputPort, DeviceOutputPort, LoopbackBackend,
    LoopbackDevice, MidiBackend, MidiDevice, MidiReceiver, SentMessage,
};

#[cfg(feature = "midi-io")]
pub use backend::MidirBackend;

mod controller;
pub use controller::{
    ControllerKind, ControllerState, DeviceController, Direction, Input, InputController,
    MessageListener, OpenCallback, Output, OutputController,
};

mod port;
pub use port::PortRecord;

mod registry;
pub use registry::{HotplugListener, PortRegistry};

pub mod sync;
pub use sync::{Completer, LatchCoordinator, Latched, ParkCoordinator, Unparker, Wakeup};

pub use patchbay_midi::MidiMessage;
