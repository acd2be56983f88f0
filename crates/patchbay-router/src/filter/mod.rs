//! Per-mapping message filters.
//!
//! A [`Filter`] wraps one of a closed set of [`FilterKind`]s selected by its
//! configuration key. Settings can be replaced while messages flow: the kind
//! lives behind an `ArcSwap`, so `process` never takes a lock.

mod channel;
mod chord;
mod message_type;
mod transpose;
mod velocity;

pub use channel::ChannelFilter;
pub use chord::{Chord, ChordFilter};
pub use message_type::MessageTypeFilter;
pub use transpose::TransposeFilter;
pub use velocity::{VelocityFilter, VelocityMode};

use crate::error::{Error, Result};
use crate::result::RouterResult;
use arc_swap::ArcSwap;
use patchbay_midi::MidiMessage;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub const KEY_CHANNELS: &str = "channels";
pub const KEY_CHORD: &str = "chord";
pub const KEY_MESSAGE_TYPE: &str = "messageType";
pub const KEY_TRANSPOSE: &str = "transpose";
pub const KEY_VELOCITY: &str = "velocity";

#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    Channel(ChannelFilter),
    Chord(ChordFilter),
    MessageType(MessageTypeFilter),
    Transpose(TransposeFilter),
    Velocity(VelocityFilter),
}

impl FilterKind {
    /// Builds the kind registered under `key`, `Ok(None)` for unknown keys.
    pub fn from_settings(key: &str, settings: &Value) -> Result<Option<Self>> {
        let kind = match key {
            KEY_CHANNELS => Self::Channel(ChannelFilter::from_settings(settings)?),
            KEY_CHORD => Self::Chord(ChordFilter::from_settings(settings)?),
            KEY_MESSAGE_TYPE => Self::MessageType(MessageTypeFilter::from_settings(settings)?),
            KEY_TRANSPOSE => Self::Transpose(TransposeFilter::from_settings(settings)?),
            KEY_VELOCITY => Self::Velocity(VelocityFilter::from_settings(settings)?),
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    pub fn process(&self, message: MidiMessage) -> RouterResult {
        match self {
            Self::Channel(f) => f.process(message),
            Self::Chord(f) => f.process(message),
            Self::MessageType(f) => f.process(message),
            Self::Transpose(f) => f.process(message),
            Self::Velocity(f) => f.process(message),
        }
    }

    pub fn settings(&self) -> Value {
        match self {
            Self::Channel(f) => f.settings(),
            Self::Chord(f) => f.settings(),
            Self::MessageType(f) => f.settings(),
            Self::Transpose(f) => f.settings(),
            Self::Velocity(f) => f.settings(),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Channel(_) => KEY_CHANNELS,
            Self::Chord(_) => KEY_CHORD,
            Self::MessageType(_) => KEY_MESSAGE_TYPE,
            Self::Transpose(_) => KEY_TRANSPOSE,
            Self::Velocity(_) => KEY_VELOCITY,
        }
    }
}

/// A configured filter instance inside a mapping.
pub struct Filter {
    kind: ArcSwap<FilterKind>,
    paused: AtomicBool,
}

impl Filter {
    pub fn new(kind: FilterKind) -> Self {
        Self {
            kind: ArcSwap::from_pointee(kind),
            paused: AtomicBool::new(false),
        }
    }

    /// Builds a filter from a configuration entry.
    ///
    /// Unknown keys are logged and yield `Ok(None)`; malformed settings for a
    /// known key are an error.
    pub fn from_config(key: &str, settings: &Value) -> Result<Option<Self>> {
        match FilterKind::from_settings(key, settings)? {
            Some(kind) => Ok(Some(Self::new(kind))),
            None => {
                warn!("Skipping unknown filter '{key}'");
                Ok(None)
            }
        }
    }

    pub fn key(&self) -> &'static str {
        self.kind.load().key()
    }

    pub fn kind(&self) -> Arc<FilterKind> {
        self.kind.load_full()
    }

    /// Runs one message through the filter. A paused filter passes it through.
    pub fn process(&self, message: MidiMessage) -> RouterResult {
        if self.is_paused() {
            return RouterResult::single(message);
        }
        self.kind.load().process(message)
    }

    pub fn settings(&self) -> Value {
        self.kind.load().settings()
    }

    /// Replaces the settings. On error the previous settings stay in effect.
    pub fn apply_settings(&self, settings: &Value) -> Result<()> {
        let key = self.key();
        let kind = FilterKind::from_settings(key, settings)?.ok_or_else(|| Error::InvalidFilter {
            key: key.to_string(),
            reason: "unknown filter".to_string(),
        })?;
        self.kind.store(Arc::new(kind));
        Ok(())
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Flips the paused flag and returns the new value.
    pub fn toggle(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("kind", &*self.kind.load())
            .field("paused", &self.is_paused())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

fn invalid(key: &str, reason: impl Into<String>) -> Error {
    Error::InvalidFilter {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Settings must be a JSON object; `null` counts as an empty one.
fn settings_object<'a>(key: &str, settings: &'a Value) -> Result<Option<&'a Map<String, Value>>> {
    match settings {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(invalid(key, format!("expected an object, got {other}"))),
    }
}

/// Reads an optional integer field. Floats are truncated, strings are parsed.
fn int_field(key: &str, settings: Option<&Map<String, Value>>, field: &str) -> Result<Option<i64>> {
    let Some(value) = settings.and_then(|s| s.get(field)) else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        other => as_int(other)
            .map(Some)
            .ok_or_else(|| invalid(key, format!("'{field}' is not a number: {other}"))),
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads an optional array field.
fn array_field<'a>(
    key: &str,
    settings: Option<&'a Map<String, Value>>,
    field: &str,
) -> Result<&'a [Value]> {
    match settings.and_then(|s| s.get(field)) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(invalid(key, format!("'{field}' is not a list: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note_on(note: u8) -> MidiMessage {
        MidiMessage::from_bytes(&[0x90, note, 100]).unwrap()
    }

    #[test]
    fn test_from_config_selects_kind() {
        for key in [KEY_CHANNELS, KEY_CHORD, KEY_MESSAGE_TYPE, KEY_TRANSPOSE, KEY_VELOCITY] {
            let filter = Filter::from_config(key, &json!({})).unwrap().unwrap();
            assert_eq!(filter.key(), key);
        }
        assert!(Filter::from_config("arpeggio", &json!({})).unwrap().is_none());
    }

    #[test]
    fn test_malformed_settings_are_rejected() {
        assert!(matches!(
            Filter::from_config(KEY_TRANSPOSE, &json!([1, 2])),
            Err(Error::InvalidFilter { .. })
        ));
        assert!(Filter::from_config(KEY_CHANNELS, &json!({"whitelist": 3})).is_err());
    }

    #[test]
    fn test_paused_filter_passes_through() {
        let filter = Filter::from_config(KEY_TRANSPOSE, &json!({"step": 1})).unwrap().unwrap();
        assert!(filter.toggle());
        assert!(filter.is_paused());
        assert_eq!(filter.process(note_on(60)).messages()[0].encode(), vec![0x90, 60, 100]);

        filter.unpause();
        assert_eq!(filter.process(note_on(60)).messages()[0].encode(), vec![0x90, 72, 100]);
        filter.pause();
        assert!(!filter.toggle());
    }

    #[test]
    fn test_apply_settings_swaps_behavior() {
        let filter = Filter::from_config(KEY_TRANSPOSE, &json!({"step": 1})).unwrap().unwrap();
        filter.apply_settings(&json!({"step": -2})).unwrap();
        assert_eq!(filter.process(note_on(60)).messages()[0].encode(), vec![0x90, 36, 100]);

        assert!(filter.apply_settings(&json!("bogus")).is_err());
        assert_eq!(filter.settings(), json!({"step": -2}));
    }
}
