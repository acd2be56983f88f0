//! Router lifecycle and message dispatch.
//!
//! ```text
//! Stopped --init()--> Starting --topology built--> Started --stop()--> Stopped
//!                        |
//!                        +--build failed--> Stopped
//! ```
//!
//! Building runs on a `patchbay-topology` worker thread and reports exactly
//! once through the `init` callback. Dispatch happens on the receive thread
//! of each input and never blocks.

use crate::config::RouterConfig;
use crate::configurator::{BuildOptions, Configurator, TopologyReport};
use crate::error::{Error, Result};
use crate::mapping::{MappingHandler, RouterMapping};
use crate::result::RouterResult;
use crate::stats::{RouterStats, StatsSnapshot};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use patchbay_io::{
    HotplugListener, InputController, ParkCoordinator, PortRegistry, Wakeup,
};
use patchbay_midi::MidiMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Stopped,
    Starting,
    Started,
}

pub type ReadyCallback = Box<dyn FnOnce(Result<TopologyReport>) + Send>;

struct RouterInner {
    registry: Arc<PortRegistry>,
    config: RouterConfig,
    configurator: Configurator,
    state: Mutex<RouterState>,
    /// Mirrors `state == Started` for the dispatch path.
    running: AtomicBool,
    paused: AtomicBool,
    verbose: bool,
    mappings: ArcSwap<Vec<Arc<RouterMapping>>>,
    stats: RouterStats,
}

/// Routes messages between ports according to a [`RouterConfig`].
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
    hotplug: Arc<dyn HotplugListener>,
}

impl Router {
    pub fn new(registry: Arc<PortRegistry>, config: RouterConfig) -> Self {
        Self::with_options(registry, config, BuildOptions::default())
    }

    /// Registers every configured device with the registry and subscribes to
    /// its hotplug notifications.
    pub fn with_options(
        registry: Arc<PortRegistry>,
        config: RouterConfig,
        options: BuildOptions,
    ) -> Self {
        for (nickname, device) in &config.devices {
            registry.add_port(&device.name, device.port, Some(nickname));
        }
        let verbose = config.options().verbose;
        let inner = Arc::new(RouterInner {
            configurator: Configurator::new(Arc::clone(&registry), options),
            registry,
            config,
            state: Mutex::new(RouterState::Stopped),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            verbose,
            mappings: ArcSwap::from_pointee(Vec::new()),
            stats: RouterStats::default(),
        });
        let hotplug: Arc<dyn HotplugListener> = Arc::new(HotplugAdapter {
            router: Arc::downgrade(&inner),
        });
        inner.registry.subscribe(Arc::clone(&hotplug));
        Self { inner, hotplug }
    }

    /// Stops following registry hotplug events. Returns false if already
    /// detached.
    pub fn detach_hotplug(&self) -> bool {
        self.inner.registry.unsubscribe(&self.hotplug)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.inner.registry
    }

    /// Builds the topology in the background and reports the outcome once.
    ///
    /// Calling this while starting or started reports `AlreadyStarted`
    /// without rebuilding.
    pub fn init<F>(&self, on_done: F)
    where
        F: FnOnce(Result<TopologyReport>) + Send + 'static,
    {
        {
            let mut state = self.inner.state.lock();
            if *state != RouterState::Stopped {
                drop(state);
                on_done(Err(Error::AlreadyStarted));
                return;
            }
            self.inner.configurator.clear_interrupt();
            *state = RouterState::Starting;
        }

        let callback: Arc<Mutex<Option<ReadyCallback>>> =
            Arc::new(Mutex::new(Some(Box::new(on_done))));
        let worker_callback = Arc::clone(&callback);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("patchbay-topology".into())
            .spawn(move || {
                let outcome = inner.build();
                if let Some(on_done) = worker_callback.lock().take() {
                    on_done(outcome);
                }
            });

        if let Err(e) = spawned {
            warn!("Failed to spawn topology worker: {e}");
            *self.inner.state.lock() = RouterState::Stopped;
            if let Some(on_done) = callback.lock().take() {
                on_done(Err(Error::Worker(e.to_string())));
            }
        }
    }

    /// Like [`init`](Self::init), but blocks the caller until the topology
    /// is built or `timeout` elapses. A timed-out build keeps running.
    pub fn init_blocking(&self, timeout: Option<Duration>) -> Result<TopologyReport> {
        let park: ParkCoordinator<Result<TopologyReport>> = ParkCoordinator::new();
        let launch = |unparker: patchbay_io::Unparker<Result<TopologyReport>>| {
            self.init(move |outcome| {
                unparker.unpark(outcome);
            });
        };
        let wakeup = match timeout {
            Some(timeout) => park.park_and_exec_timeout(timeout, launch)?,
            None => park.park_and_exec(launch)?,
        };
        match wakeup {
            Wakeup::Unparked(outcome) => outcome,
            Wakeup::TimedOut => Err(Error::Worker("topology build timed out".into())),
            Wakeup::AlreadyParked => Err(Error::AlreadyStarted),
        }
    }

    /// Interrupts an in-progress build, which then fails with
    /// `InterruptedWait`. Does nothing unless the router is starting.
    pub fn interrupt_build(&self) {
        let state = self.inner.state.lock();
        if *state == RouterState::Starting {
            self.inner.configurator.interrupt();
        }
    }

    /// Deactivates every mapping and returns to `Stopped`. Controllers stay
    /// open in the registry.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if *state != RouterState::Started {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        let mappings = self.inner.mappings.swap(Arc::new(Vec::new()));
        for mapping in mappings.iter() {
            mapping.deactivate();
        }
        *state = RouterState::Stopped;
        info!("Router stopped");
    }

    pub fn state(&self) -> RouterState {
        *self.inner.state.lock()
    }

    pub fn is_started(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Suppresses all dispatch without tearing anything down.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn unpause(&self) {
        self.inner.paused.store(false, Ordering::Release);
    }

    /// Flips the paused flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.inner.paused.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    pub fn mappings(&self) -> Vec<Arc<RouterMapping>> {
        self.inner.mappings.load().iter().cloned().collect()
    }

    pub fn mapping(&self, name: &str) -> Option<Arc<RouterMapping>> {
        self.inner
            .mappings
            .load()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Zeroes the dispatch counters.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Sends each configured sysex dump to its output. Entries whose output
    /// is not open or whose file cannot be read are logged and skipped.
    /// Returns the number of dumps sent.
    pub fn send_sysex_dumps(&self) -> usize {
        let mut sent = 0;
        for entry in self.inner.config.sysex_entries() {
            let Some(output) = self
                .inner
                .registry
                .record(&entry.output)
                .and_then(|record| self.inner.registry.output_for(&record))
                .filter(|output| output.is_open())
            else {
                warn!("Sysex dump {}: output '{}' is not open", entry.path, entry.output);
                continue;
            };
            let message = match MidiMessage::from_sysex_file(&entry.path) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Sysex dump {}: {}", entry.path, e);
                    continue;
                }
            };
            match output.send(&message) {
                Ok(()) => {
                    debug!("Sent {} to {}", message, entry.output);
                    sent += 1;
                }
                Err(e) => warn!("Sysex dump {} to {}: {}", entry.path, entry.output, e),
            }
        }
        sent
    }
}

impl RouterInner {
    fn build(self: &Arc<Self>) -> Result<TopologyReport> {
        let topology = match self.configurator.build(&self.config) {
            Ok(topology) => topology,
            Err(e) => {
                warn!("Topology build failed: {e}");
                *self.state.lock() = RouterState::Stopped;
                return Err(e);
            }
        };

        let handler: Weak<dyn MappingHandler> = Arc::downgrade(self) as Weak<dyn MappingHandler>;
        let mut state = self.state.lock();
        for mapping in &topology.mappings {
            mapping.activate(handler.clone());
        }
        self.mappings.store(Arc::new(topology.mappings));
        self.running.store(true, Ordering::Release);
        *state = RouterState::Started;
        info!("Router started: {}", topology.report);
        Ok(topology.report)
    }
}

impl MappingHandler for RouterInner {
    fn on_message(
        &self,
        input: &InputController,
        message: &MidiMessage,
        mapping: &RouterMapping,
    ) -> bool {
        if self.paused.load(Ordering::Acquire) || !self.running.load(Ordering::Acquire) {
            return false;
        }
        self.stats.record_dispatch();
        if self.verbose {
            debug!("{} <- {}: {}", mapping.name(), input.nickname(), message);
        }
        match mapping.process(message.clone()) {
            RouterResult::Produced(batch) => {
                let sent = mapping.broadcast(&batch);
                self.stats.record_sent(sent);
                false
            }
            RouterResult::Failed => {
                self.stats.record_failed();
                trace!("{} dropped {}", mapping.name(), message);
                false
            }
            RouterResult::Consumed => {
                self.stats.record_consumed();
                true
            }
        }
    }
}

/// Re-registers dispatch on inputs that come back after a hotplug.
struct HotplugAdapter {
    router: Weak<RouterInner>,
}

impl HotplugListener for HotplugAdapter {
    fn on_input_reopened(&self, controller: &Arc<InputController>) {
        let Some(router) = self.router.upgrade() else {
            return;
        };
        if !router.running.load(Ordering::Acquire) {
            return;
        }
        for mapping in router.mappings.load().iter() {
            if mapping.reattach(controller) {
                debug!("Mapping '{}' reattached to {}", mapping.name(), controller.nickname());
            }
        }
    }

    fn on_device_removed(&self, product_name: &str) {
        debug!("Routing paused for ports of {product_name} until it returns");
    }
}
