//! Patchbay that owns the port registry and the router.

use crate::Result;
use patchbay_io::{MidiBackend, PortRegistry};
use patchbay_router::{BuildOptions, Router, RouterConfig, RouterState, TopologyReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Owns the hardware backend, the port registry and the router for the
/// lifetime of the process.
///
/// # Example
///
/// ```
/// use patchbay::{LoopbackBackend, Patchbay, RouterConfig};
/// use std::sync::Arc;
///
/// let backend = Arc::new(LoopbackBackend::new());
/// backend.plug("USBKeys", 0, 1);
///
/// let patchbay = Patchbay::builder()
///     .backend(backend)
///     .config(RouterConfig::default())
///     .build()?;
/// let report = patchbay.start_blocking(None)?;
/// assert!(report.mappings.is_empty());
/// # Ok::<(), patchbay::Error>(())
/// ```
pub struct Patchbay {
    registry: Arc<PortRegistry>,
    router: Router,
    ignore: Vec<String>,
    hotplug: bool,
}

impl Patchbay {
    pub fn builder() -> crate::PatchbayBuilder {
        crate::PatchbayBuilder::default()
    }

    pub(crate) fn from_parts(
        backend: Arc<dyn MidiBackend>,
        config: RouterConfig,
        options: BuildOptions,
    ) -> Self {
        let registry = Arc::new(PortRegistry::new(backend));
        let ignore = config.ignore.clone();
        let hotplug = config.options().hotplug;
        let router = Router::with_options(Arc::clone(&registry), config, options);
        Self {
            registry,
            router,
            ignore,
            hotplug,
        }
    }

    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &RouterConfig {
        self.router.config()
    }

    /// Builds the topology in the background; `on_ready` runs once with the
    /// outcome.
    pub fn start<F>(&self, on_ready: F)
    where
        F: FnOnce(patchbay_router::Result<TopologyReport>) + Send + 'static,
    {
        self.router.init(on_ready);
    }

    /// Builds the topology and waits for it.
    pub fn start_blocking(&self, timeout: Option<Duration>) -> Result<TopologyReport> {
        let report = self.router.init_blocking(timeout)?;
        info!("Patchbay ready: {report}");
        Ok(report)
    }

    pub fn state(&self) -> RouterState {
        self.router.state()
    }

    /// Forwards a hotplug arrival to the registry. Returns false when the
    /// device is ignored or hotplug is disabled.
    pub fn device_added(&self, product_name: &str) -> bool {
        if !self.accepts_hotplug(product_name) {
            return false;
        }
        self.registry.on_device_added(product_name);
        true
    }

    /// Forwards a hotplug removal to the registry. Returns false when the
    /// device is ignored or hotplug is disabled.
    pub fn device_removed(&self, product_name: &str) -> bool {
        if !self.accepts_hotplug(product_name) {
            return false;
        }
        self.registry.on_device_removed(product_name);
        true
    }

    fn accepts_hotplug(&self, product_name: &str) -> bool {
        if !self.hotplug {
            debug!("Hotplug disabled, ignoring {product_name}");
            return false;
        }
        if self.ignore.iter().any(|ignored| ignored == product_name) {
            debug!("Ignoring hotplug for {product_name}");
            return false;
        }
        true
    }

    /// Stops routing and closes every port.
    pub fn shutdown(&self) {
        self.router.stop();
        self.router.detach_hotplug();
        self.registry.close_all();
        info!("Patchbay shut down");
    }
}
