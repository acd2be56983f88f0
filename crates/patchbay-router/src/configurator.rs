//! Builds the live topology from a [`RouterConfig`].
//!
//! Runs on the router's worker thread. Every port of a mapping is opened at
//! once and the worker blocks on a [`LatchCoordinator`] until all of them
//! report back, so the caller never waits on hardware.

use crate::config::{MappingConfig, RouterConfig};
use crate::error::Result;
use crate::filter::Filter;
use crate::mapping::RouterMapping;
use patchbay_io::{
    InputController, LatchCoordinator, OutputController, PortRecord, PortRegistry,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Upper bound on each mapping's open wait. `None` waits indefinitely.
    pub open_timeout: Option<Duration>,
}

/// What happened while building, reported once through the ready callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyReport {
    /// Mappings that were built, in configuration order.
    pub mappings: Vec<String>,
    /// `(mapping, nickname)` pairs with no registered port.
    pub unresolved: Vec<(String, String)>,
    /// `(mapping, reason)` for every port that failed to open.
    pub failed_opens: Vec<(String, String)>,
    /// `(mapping, count)` of opens still outstanding when the wait timed out.
    pub timed_out: Vec<(String, usize)>,
    /// `(mapping, reason)` for mappings skipped because of bad filter settings.
    pub invalid_mappings: Vec<(String, String)>,
}

impl TopologyReport {
    /// True when every configured port resolved and opened.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
            && self.failed_opens.is_empty()
            && self.timed_out.is_empty()
            && self.invalid_mappings.is_empty()
    }
}

impl fmt::Display for TopologyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mapping(s) built, {} unresolved port(s), {} failed open(s), {} timed out, {} invalid mapping(s)",
            self.mappings.len(),
            self.unresolved.len(),
            self.failed_opens.len(),
            self.timed_out.iter().map(|(_, n)| n).sum::<usize>(),
            self.invalid_mappings.len()
        )
    }
}

pub struct Topology {
    pub mappings: Vec<Arc<RouterMapping>>,
    pub report: TopologyReport,
}

enum Opened {
    Input(Arc<InputController>),
    Output(Arc<OutputController>),
}

/// Tagged with the port's position in the mapping's configuration.
type OpenOutcome = (usize, patchbay_io::Result<Opened>);

pub struct Configurator {
    registry: Arc<PortRegistry>,
    latch: LatchCoordinator<OpenOutcome>,
    interrupted: AtomicBool,
    options: BuildOptions,
}

impl Configurator {
    pub fn new(registry: Arc<PortRegistry>, options: BuildOptions) -> Self {
        Self {
            registry,
            latch: LatchCoordinator::new(),
            interrupted: AtomicBool::new(false),
            options,
        }
    }

    /// Aborts the build in progress, or the next one if none is running.
    /// The flag is cleared when a build finishes.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.latch.interrupt();
    }

    pub(crate) fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    /// Builds every mapping. Only an interrupt aborts the build; everything
    /// else is recorded in the report.
    pub fn build(&self, config: &RouterConfig) -> Result<Topology> {
        let outcome = self.build_all(config);
        self.clear_interrupt();
        outcome
    }

    fn build_all(&self, config: &RouterConfig) -> Result<Topology> {
        let mut report = TopologyReport::default();
        let mut mappings = Vec::with_capacity(config.mappings.len());
        for (name, mapping) in &config.mappings {
            self.check_interrupted()?;
            if let Some(built) = self.build_mapping(name, mapping, &mut report)? {
                report.mappings.push(name.clone());
                mappings.push(Arc::new(built));
            }
        }
        self.check_interrupted()?;
        debug!("Topology built: {report}");
        Ok(Topology { mappings, report })
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Err(patchbay_io::Error::InterruptedWait.into());
        }
        Ok(())
    }

    fn build_mapping(
        &self,
        name: &str,
        config: &MappingConfig,
        report: &mut TopologyReport,
    ) -> Result<Option<RouterMapping>> {
        let filters = match collect_filters(&config.filters) {
            Ok(filters) => filters,
            Err(e) => {
                warn!("Skipping mapping '{name}': {e}");
                report.invalid_mappings.push((name.to_string(), e.to_string()));
                return Ok(None);
            }
        };

        let inputs = self.resolve(name, &config.inputs, report);
        let outputs = self.resolve(name, &config.outputs, report);
        let total = inputs.len() + outputs.len();

        for (index, record) in inputs.iter().enumerate() {
            let completer = self.latch.completer();
            self.registry.open_input(record, move |result| {
                completer.complete((index, result.map(Opened::Input)));
            });
        }
        for (offset, record) in outputs.iter().enumerate() {
            let completer = self.latch.completer();
            let index = inputs.len() + offset;
            self.registry.open_output(record, move |result| {
                completer.complete((index, result.map(Opened::Output)));
            });
        }

        let mut outcomes = match self.options.open_timeout {
            Some(timeout) => {
                let latched = self.latch.request_latches_timeout(total, timeout)?;
                if !latched.is_complete() {
                    warn!(
                        "Mapping '{name}': {} port(s) did not open within {:?}",
                        latched.missing, timeout
                    );
                    report.timed_out.push((name.to_string(), latched.missing));
                }
                latched.results
            }
            None => self.latch.request_latches(total)?,
        };
        outcomes.sort_by_key(|(index, _)| *index);

        let mut opened_inputs = Vec::with_capacity(inputs.len());
        let mut opened_outputs = Vec::with_capacity(outputs.len());
        for (_, outcome) in outcomes {
            match outcome {
                Ok(Opened::Input(controller)) => opened_inputs.push(controller),
                Ok(Opened::Output(controller)) => opened_outputs.push(controller),
                Err(e) => {
                    warn!("Mapping '{name}': {e}");
                    report.failed_opens.push((name.to_string(), e.to_string()));
                }
            }
        }

        debug!(
            "Mapping '{name}': {} input(s), {} output(s), {} filter(s)",
            opened_inputs.len(),
            opened_outputs.len(),
            filters.len()
        );
        Ok(Some(RouterMapping::new(name, opened_inputs, opened_outputs, filters)))
    }

    fn resolve(&self, mapping: &str, nicknames: &[String], report: &mut TopologyReport) -> Vec<PortRecord> {
        nicknames
            .iter()
            .filter_map(|nickname| {
                let record = self.registry.record(nickname);
                if record.is_none() {
                    debug!("Mapping '{mapping}': no port named '{nickname}', skipped");
                    report.unresolved.push((mapping.to_string(), nickname.clone()));
                }
                record
            })
            .collect()
    }
}

fn collect_filters(configs: &[(String, serde_json::Value)]) -> Result<Vec<Filter>> {
    let mut filters = Vec::with_capacity(configs.len());
    for (key, settings) in configs {
        if let Some(filter) = Filter::from_config(key, settings)? {
            filters.push(filter);
        }
    }
    Ok(filters)
}
