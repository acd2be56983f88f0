//! # Patchbay - Embedded MIDI Router
//!
//! Routes MIDI between class-compliant USB devices through per-route filter
//! pipelines, with ports coming and going at runtime.
//!
//! ## Architecture
//!
//! Patchbay is an umbrella crate that coordinates:
//! - **patchbay-midi** - Message model (decode, encode, named properties)
//! - **patchbay-io** - Port registry, device controllers, hotplug, sync primitives
//! - **patchbay-router** - Filters, mappings, router lifecycle, topology building
//!
//! ## Quick Start
//!
//! ```ignore
//! use patchbay::prelude::*;
//!
//! let patchbay = Patchbay::builder()
//!     .config_path("patchbay.json")
//!     .build()?;
//! patchbay.start_blocking(None)?;
//!
//! // Forward hotplug events from the platform
//! patchbay.device_added("USBKeys");
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Loopback backend only
//! - `midi-io` - Hardware MIDI through midir

mod builder;
mod engine;
mod error;

pub use builder::PatchbayBuilder;
pub use engine::Patchbay;
pub use error::{Error, Result};

/// Re-export of patchbay-midi for direct access
pub use patchbay_midi as midi;
/// Re-export of patchbay-io for direct access
pub use patchbay_io as io;
/// Re-export of patchbay-router for direct access
pub use patchbay_router as router;

pub use patchbay_midi::{MessageType, MidiMessage, Property};

pub use patchbay_io::{
    InputController, LoopbackBackend, LoopbackDevice, MidiBackend, OutputController, PortRecord,
    PortRegistry,
};

#[cfg(feature = "midi-io")]
pub use patchbay_io::MidirBackend;

pub use patchbay_router::{
    Filter, FilterKind, Router, RouterConfig, RouterMapping, RouterResult, RouterState,
    TopologyReport,
};

pub mod prelude {
    pub use crate::{
        LoopbackBackend, MidiMessage, Patchbay, PatchbayBuilder, Router, RouterConfig, RouterState,
    };
    pub use std::sync::Arc;
    pub use std::time::Duration;
}
