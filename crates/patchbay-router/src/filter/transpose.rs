//! Octave transposition.

use super::{int_field, settings_object};
use crate::error::Result;
use crate::result::RouterResult;
use patchbay_midi::{clip, MidiMessage, Property};
use serde_json::{json, Value};
use tracing::{trace, warn};

pub const STEP_MIN: i32 = -10;
pub const STEP_MAX: i32 = 10;
const SEMITONES_PER_STEP: i32 = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransposeFilter {
    step: i32,
}

impl TransposeFilter {
    /// Steps outside `-10..=10` reset to 0.
    pub fn new(step: i32) -> Self {
        let mut filter = Self::default();
        filter.set_step(step);
        filter
    }

    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = settings_object(super::KEY_TRANSPOSE, settings)?;
        let step = int_field(super::KEY_TRANSPOSE, settings, "step")?.unwrap_or(0);
        Ok(Self::new(i32::try_from(step).unwrap_or(i32::MAX)))
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn set_step(&mut self, step: i32) {
        self.step = if (STEP_MIN..=STEP_MAX).contains(&step) {
            step
        } else {
            warn!("Transpose step {step} out of range, using 0");
            0
        };
    }

    pub fn process(&self, mut message: MidiMessage) -> RouterResult {
        if self.step != 0 {
            if let Ok(note) = message.get(Property::Note) {
                let target = clip(note + self.step * SEMITONES_PER_STEP);
                if let Err(e) = message.set(Property::Note, target) {
                    trace!("Transpose skipped: {e}");
                }
            }
        }
        RouterResult::single(message)
    }

    pub fn settings(&self) -> Value {
        json!({ "step": self.step })
    }
}
