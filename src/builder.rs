//! Builder for configuring and constructing a [`Patchbay`].

use crate::{Patchbay, Result};
use patchbay_io::MidiBackend;
use patchbay_router::{BuildOptions, RouterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Without an explicit backend, `build` uses midir when the `midi-io`
/// feature is compiled and an empty loopback backend otherwise.
///
/// # Example
///
/// ```ignore
/// use patchbay::prelude::*;
///
/// let patchbay = Patchbay::builder()
///     .config_path("/boot/patchbay.json")
///     .open_timeout(Duration::from_secs(3))
///     .build()?;
/// patchbay.start_blocking(None)?;
/// ```
#[derive(Default)]
pub struct PatchbayBuilder {
    backend: Option<Arc<dyn MidiBackend>>,
    config: Option<RouterConfig>,
    config_path: Option<PathBuf>,
    open_timeout: Option<Duration>,
}

impl PatchbayBuilder {
    pub fn backend(mut self, backend: Arc<dyn MidiBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Read at `build` time. Ignored when `config` is also set.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Upper bound on each mapping's port-open wait. Default: none
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Patchbay> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => RouterConfig::from_path(&path)?,
            (None, None) => {
                warn!("No configuration given, starting with an empty topology");
                RouterConfig::default()
            }
        };
        let backend = self.backend.unwrap_or_else(default_backend);
        let options = BuildOptions {
            open_timeout: self.open_timeout,
        };
        Ok(Patchbay::from_parts(backend, config, options))
    }
}

#[cfg(feature = "midi-io")]
fn default_backend() -> Arc<dyn MidiBackend> {
    Arc::new(patchbay_io::MidirBackend::default())
}

#[cfg(not(feature = "midi-io"))]
fn default_backend() -> Arc<dyn MidiBackend> {
    warn!("Built without midi-io, using an empty loopback backend");
    Arc::new(patchbay_io::LoopbackBackend::new())
}
