//! Message routing for patchbay.
//!
//! A [`Router`] turns a [`RouterConfig`] into live [`RouterMapping`]s: each
//! mapping listens on its inputs, runs messages through an ordered filter
//! pipeline and broadcasts the results to its outputs.
//!
//! # Example
//!
//! ```
//! use patchbay_io::{LoopbackBackend, PortRegistry};
//! use patchbay_router::{Router, RouterConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let backend = Arc::new(LoopbackBackend::new());
//! let keys = backend.plug("USBKeys", 0, 1);
//! let synth = backend.plug("USBSynth", 1, 0);
//!
//! let config = RouterConfig::from_json_str(r#"{
//!     "devices": {
//!         "KBD": { "name": "USBKeys", "port": 0 },
//!         "SYNTH": { "name": "USBSynth", "port": 0 }
//!     },
//!     "mappings": {
//!         "M": { "inputs": ["KBD"], "outputs": ["SYNTH"],
//!                "filters": { "transpose": { "step": 1 } } }
//!     }
//! }"#)?;
//!
//! let router = Router::new(Arc::new(PortRegistry::new(backend)), config);
//! router.init_blocking(Some(Duration::from_secs(5)))?;
//!
//! keys.inject(0, &[0x90, 0x3C, 0x64]);
//! assert_eq!(synth.take_sent()[0].bytes, vec![0x90, 0x48, 0x64]);
//! # Ok::<(), patchbay_router::Error>(())
//! ```

pub mod config;
pub use config::{DeviceConfig, MappingConfig, Options, RouterConfig, SysexEntry};

pub mod error;
pub use error::{Error, Result};

pub mod filter;
pub use filter::{Filter, FilterKind};

mod configurator;
pub use configurator::{BuildOptions, Configurator, Topology, TopologyReport};

mod mapping;
pub use mapping::{MappingHandler, RouterMapping};

mod result;
pub use result::{Batch, RouterResult};

mod router;
pub use router::{ReadyCallback, Router, RouterState};

mod stats;
pub use stats::{RouterStats, StatsSnapshot};
