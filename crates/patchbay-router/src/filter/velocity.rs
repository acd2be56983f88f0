//! Velocity clipping, gating and rescaling.

use super::{int_field, invalid, settings_object};
use crate::error::Result;
use crate::result::RouterResult;
use patchbay_midi::note::DATA_MAX;
use patchbay_midi::{MidiMessage, Property};
use serde_json::{json, Value};
use std::fmt;

const KEY: &str = super::KEY_VELOCITY;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VelocityMode {
    /// Clamp into `[min, max]`.
    #[default]
    Clip,
    /// Reject velocities outside `[min, max]`.
    Drop,
    /// Map `0..=127` linearly onto `[min, max]`.
    Scaled,
}

impl VelocityMode {
    /// Case-insensitive; unknown names fall back to `Clip`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Self::Drop,
            "scaled" | "scale" => Self::Scaled,
            _ => Self::Clip,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::Drop => "drop",
            Self::Scaled => "scaled",
        }
    }
}

impl fmt::Display for VelocityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VelocityFilter {
    min: i32,
    max: i32,
    mode: VelocityMode,
    scale: f32,
}

impl Default for VelocityFilter {
    fn default() -> Self {
        Self::new(0, DATA_MAX, VelocityMode::Clip)
    }
}

impl VelocityFilter {
    pub fn new(min: i32, max: i32, mode: VelocityMode) -> Self {
        let mut filter = Self {
            min: 0,
            max: DATA_MAX,
            mode,
            scale: 1.0,
        };
        filter.set_min(min);
        filter.set_max(max);
        filter
    }

    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = settings_object(KEY, settings)?;
        let min = int_field(KEY, settings, "min")?.unwrap_or(0);
        let max = int_field(KEY, settings, "max")?.unwrap_or(i64::from(DATA_MAX));
        let mode = match settings.and_then(|s| s.get("mode")) {
            None | Some(Value::Null) => VelocityMode::Clip,
            Some(Value::String(name)) => VelocityMode::from_name(name),
            Some(other) => return Err(invalid(KEY, format!("'mode' is not a name: {other}"))),
        };
        Ok(Self::new(saturate(min), saturate(max), mode))
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn mode(&self) -> VelocityMode {
        self.mode
    }

    /// Clamped to `0..=127`; `max` is raised to stay at or above it.
    pub fn set_min(&mut self, min: i32) {
        self.min = min.clamp(0, DATA_MAX);
        self.max = self.max.max(self.min);
        self.update_scale();
    }

    /// Clamped to `min..=127`.
    pub fn set_max(&mut self, max: i32) {
        self.max = max.clamp(self.min, DATA_MAX);
        self.update_scale();
    }

    pub fn set_mode(&mut self, mode: VelocityMode) {
        self.mode = mode;
        self.update_scale();
    }

    fn update_scale(&mut self) {
        self.scale = (self.max - self.min + 1) as f32 / (DATA_MAX + 1) as f32;
    }

    /// New velocity, or `None` when the message should be dropped.
    fn transform(&self, velocity: i32) -> Option<i32> {
        match self.mode {
            VelocityMode::Clip => Some(velocity.clamp(self.min, self.max)),
            VelocityMode::Drop => (self.min..=self.max).contains(&velocity).then_some(velocity),
            VelocityMode::Scaled => {
                let scaled = (velocity as f32 * self.scale).round() as i32 + self.min;
                Some(scaled.min(self.max))
            }
        }
    }

    pub fn process(&self, mut message: MidiMessage) -> RouterResult {
        let Ok(velocity) = message.get(Property::Velocity) else {
            return RouterResult::single(message);
        };
        match self.transform(velocity) {
            Some(v) => match message.set(Property::Velocity, v) {
                Ok(_) => RouterResult::single(message),
                Err(_) => RouterResult::Failed,
            },
            None => RouterResult::Failed,
        }
    }

    pub fn settings(&self) -> Value {
        json!({
            "min": self.min,
            "max": self.max,
            "mode": self.mode.as_str(),
        })
    }
}

fn saturate(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
