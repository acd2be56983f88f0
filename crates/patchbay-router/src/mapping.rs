//! A named route: inputs, an ordered filter pipeline, and outputs.

use crate::filter::Filter;
use crate::result::{Batch, RouterResult};
use parking_lot::Mutex;
use patchbay_io::{InputController, MessageListener, OutputController};
use patchbay_midi::MidiMessage;
use smallvec::smallvec;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Receives messages arriving on an active mapping's inputs.
pub trait MappingHandler: Send + Sync {
    /// Return `true` to stop later listeners on the input from seeing the message.
    fn on_message(
        &self,
        input: &InputController,
        message: &MidiMessage,
        mapping: &RouterMapping,
    ) -> bool;
}

pub struct RouterMapping {
    name: String,
    inputs: Vec<Arc<InputController>>,
    outputs: Vec<Arc<OutputController>>,
    filters: Vec<Filter>,
    listener: Mutex<Option<Arc<dyn MessageListener>>>,
}

/// Registered on every input of an active mapping.
struct MappingListener {
    mapping: Weak<RouterMapping>,
    handler: Weak<dyn MappingHandler>,
}

impl MessageListener for MappingListener {
    fn on_message(&self, input: &InputController, message: &MidiMessage) -> bool {
        let (Some(mapping), Some(handler)) = (self.mapping.upgrade(), self.handler.upgrade()) else {
            return false;
        };
        handler.on_message(input, message, &mapping)
    }
}

impl RouterMapping {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Arc<InputController>>,
        outputs: Vec<Arc<OutputController>>,
        filters: Vec<Filter>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            filters,
            listener: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Arc<InputController>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<OutputController>] {
        &self.outputs
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Filter at `index` in pipeline order.
    pub fn filter(&self, index: usize) -> Option<&Filter> {
        self.filters.get(index)
    }

    /// Folds a message through the filters in order.
    ///
    /// Every live message of a stage goes through the current filter. If any
    /// of them fails or is consumed, the whole batch ends with that result.
    pub fn process(&self, message: MidiMessage) -> RouterResult {
        let mut live: Batch = smallvec![message];
        for filter in &self.filters {
            if live.is_empty() {
                break;
            }
            let mut next = Batch::new();
            for message in live {
                match filter.process(message) {
                    RouterResult::Produced(out) => next.extend(out),
                    terminal => return terminal,
                }
            }
            live = next;
        }
        RouterResult::Produced(live)
    }

    /// Sends each message to every output in configuration order. Returns the
    /// number of successful sends.
    pub fn broadcast(&self, messages: &[MidiMessage]) -> usize {
        let mut sent = 0;
        for message in messages {
            for output in &self.outputs {
                match output.send(message) {
                    Ok(()) => sent += 1,
                    Err(e) => warn!("Send to {} failed: {}", output.nickname(), e),
                }
            }
        }
        sent
    }

    /// Registers a listener on every input that forwards to `handler`.
    /// Returns false if the mapping is already active.
    pub fn activate(self: &Arc<Self>, handler: Weak<dyn MappingHandler>) -> bool {
        let mut slot = self.listener.lock();
        if slot.is_some() {
            return false;
        }
        let listener: Arc<dyn MessageListener> = Arc::new(MappingListener {
            mapping: Arc::downgrade(self),
            handler,
        });
        for input in &self.inputs {
            input.add_listener(Arc::clone(&listener));
        }
        *slot = Some(listener);
        debug!("Activated mapping '{}'", self.name);
        true
    }

    /// Removes the listener from every input. Returns false if inactive.
    pub fn deactivate(&self) -> bool {
        let Some(listener) = self.listener.lock().take() else {
            return false;
        };
        for input in &self.inputs {
            input.remove_listener(&listener);
        }
        debug!("Deactivated mapping '{}'", self.name);
        true
    }

    pub fn is_active(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub fn has_input(&self, input: &InputController) -> bool {
        self.inputs.iter().any(|i| std::ptr::eq(Arc::as_ptr(i), input))
    }

    /// Puts the listener back on `input` after it was reopened, which clears
    /// its listeners. Returns true if it was re-registered.
    pub fn reattach(&self, input: &InputController) -> bool {
        if !self.has_input(input) {
            return false;
        }
        match self.listener.lock().as_ref() {
            Some(listener) => input.add_listener(Arc::clone(listener)),
            None => false,
        }
    }
}

impl fmt::Debug for RouterMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self.inputs.iter().map(|c| c.nickname()).collect();
        let outputs: Vec<String> = self.outputs.iter().map(|c| c.nickname()).collect();
        f.debug_struct("RouterMapping")
            .field("name", &self.name)
            .field("inputs", &inputs)
            .field("outputs", &outputs)
            .field("filters", &self.filters.len())
            .field("active", &self.is_active())
            .finish()
    }
}
