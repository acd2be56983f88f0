//! Channel whitelist, blacklist and remapping.
//!
//! Channels are the raw status nibble, 0..=15.

use super::{array_field, as_int, invalid, settings_object};
use crate::error::Result;
use crate::result::RouterResult;
use patchbay_midi::MidiMessage;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const KEY: &str = super::KEY_CHANNELS;
const CHANNEL_MAX: i64 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelFilter {
    map: BTreeMap<u8, u8>,
    whitelist: BTreeSet<u8>,
    blacklist: BTreeSet<u8>,
}

impl ChannelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = settings_object(KEY, settings)?;
        let mut filter = Self::new();

        match settings.and_then(|s| s.get("map")) {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (from, to) in map {
                    let from = from
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| invalid(KEY, format!("map key '{from}' is not a channel")))?;
                    let to = as_int(to)
                        .ok_or_else(|| invalid(KEY, format!("map value {to} is not a channel")))?;
                    filter.map.insert(channel(from)?, channel(to)?);
                }
            }
            Some(other) => return Err(invalid(KEY, format!("'map' is not an object: {other}"))),
        }

        filter.whitelist = channel_set(settings, "whitelist")?;
        filter.blacklist = channel_set(settings, "blacklist")?;
        Ok(filter)
    }

    pub fn with_map(mut self, from: u8, to: u8) -> Self {
        self.map.insert(from & 0x0F, to & 0x0F);
        self
    }

    pub fn with_whitelist(mut self, channels: impl IntoIterator<Item = u8>) -> Self {
        self.whitelist = channels.into_iter().map(|c| c & 0x0F).collect();
        self
    }

    pub fn with_blacklist(mut self, channels: impl IntoIterator<Item = u8>) -> Self {
        self.blacklist = channels.into_iter().map(|c| c & 0x0F).collect();
        self
    }

    pub fn process(&self, mut message: MidiMessage) -> RouterResult {
        let Some(channel) = message.channel() else {
            return RouterResult::single(message);
        };
        if !self.whitelist.is_empty() {
            if !self.whitelist.contains(&channel) {
                return RouterResult::Failed;
            }
        } else if self.blacklist.contains(&channel) {
            return RouterResult::Failed;
        }
        if let Some(&to) = self.map.get(&channel) {
            if let Err(e) = message.set_channel(to) {
                warn!("Channel remap failed: {e}");
                return RouterResult::Failed;
            }
        }
        RouterResult::single(message)
    }

    pub fn settings(&self) -> Value {
        let map: Map<String, Value> = self
            .map
            .iter()
            .map(|(from, to)| (from.to_string(), json!(to)))
            .collect();
        json!({
            "map": map,
            "whitelist": self.whitelist,
            "blacklist": self.blacklist,
        })
    }
}

fn channel(value: i64) -> Result<u8> {
    if (0..=CHANNEL_MAX).contains(&value) {
        Ok(value as u8)
    } else {
        Err(invalid(KEY, format!("channel {value} is out of range 0..=15")))
    }
}

fn channel_set(settings: Option<&Map<String, Value>>, field: &str) -> Result<BTreeSet<u8>> {
    array_field(KEY, settings, field)?
        .iter()
        .map(|item| {
            as_int(item)
                .ok_or_else(|| invalid(KEY, format!("{field} entry {item} is not a channel")))
                .and_then(channel)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(channel: u8) -> MidiMessage {
        MidiMessage::from_bytes(&[0x90 | channel, 60, 100]).unwrap()
    }

    #[test]
    fn test_whitelist_rejects_absent_channel() {
        let filter = ChannelFilter::new().with_whitelist([1, 2]);
        assert!(filter.process(note_on(3)).is_failed());
        assert_eq!(filter.process(note_on(2)).messages().len(), 1);
    }

    #[test]
    fn test_blacklist_rejects_listed_channel() {
        let filter = ChannelFilter::new().with_blacklist([3]);
        assert!(filter.process(note_on(3)).is_failed());
        assert!(!filter.process(note_on(4)).is_failed());
    }

    #[test]
    fn test_whitelist_takes_precedence_over_blacklist() {
        let filter = ChannelFilter::new().with_whitelist([3]).with_blacklist([3]);
        assert!(!filter.process(note_on(3)).is_failed());
    }

    #[test]
    fn test_map_rewrites_channel() {
        let filter = ChannelFilter::new().with_map(1, 5);
        let result = filter.process(note_on(1));
        assert_eq!(result.messages()[0].channel(), Some(5));
        assert_eq!(result.messages()[0].encode(), vec![0x95, 60, 100]);
        assert_eq!(filter.process(note_on(2)).messages()[0].channel(), Some(2));
    }

    #[test]
    fn test_system_messages_pass() {
        let filter = ChannelFilter::new().with_whitelist([0]);
        let clock = MidiMessage::from_bytes(&[0xF8]).unwrap();
        assert_eq!(filter.process(clock).messages().len(), 1);
    }

    #[test]
    fn test_settings_parse() {
        let filter = ChannelFilter::from_settings(&json!({
            "map": {"1": 5, "2": "6"},
            "whitelist": [1, 2],
        }))
        .unwrap();
        assert_eq!(filter, ChannelFilter::new().with_map(1, 5).with_map(2, 6).with_whitelist([1, 2]));

        assert!(ChannelFilter::from_settings(&json!({"map": {"x": 1}})).is_err());
        assert!(ChannelFilter::from_settings(&json!({"blacklist": [16]})).is_err());
        assert!(ChannelFilter::from_settings(&Value::Null).unwrap() == ChannelFilter::new());
    }

    #[test]
    fn test_settings_round_trip() {
        let filter = ChannelFilter::new().with_map(1, 5).with_blacklist([9, 3]);
        assert_eq!(
            filter.settings(),
            json!({"map": {"1": 5}, "whitelist": [], "blacklist": [3, 9]})
        );
        assert_eq!(ChannelFilter::from_settings(&filter.settings()).unwrap(), filter);
    }
}
