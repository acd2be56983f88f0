//! Whitelist / blacklist over message type codes.

use super::{array_field, invalid, settings_object};
use crate::error::Result;
use crate::result::RouterResult;
use patchbay_midi::{MessageType, MidiMessage};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

const KEY: &str = super::KEY_MESSAGE_TYPE;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTypeFilter {
    whitelist: BTreeSet<u8>,
    blacklist: BTreeSet<u8>,
}

impl MessageTypeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// List entries may be numeric type codes or type names; unknown entries
    /// are skipped with a warning.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = settings_object(KEY, settings)?;
        Ok(Self {
            whitelist: code_set(settings, "whitelist")?,
            blacklist: code_set(settings, "blacklist")?,
        })
    }

    pub fn with_whitelist(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.whitelist = types.into_iter().map(MessageType::code).collect();
        self
    }

    pub fn with_blacklist(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.blacklist = types.into_iter().map(MessageType::code).collect();
        self
    }

    pub fn process(&self, message: MidiMessage) -> RouterResult {
        let code = message.message_type().code();
        if !self.whitelist.is_empty() {
            if !self.whitelist.contains(&code) {
                return RouterResult::Failed;
            }
        } else if self.blacklist.contains(&code) {
            return RouterResult::Failed;
        }
        RouterResult::single(message)
    }

    pub fn settings(&self) -> Value {
        let names = |codes: &BTreeSet<u8>| -> Vec<&'static str> {
            codes
                .iter()
                .filter_map(|c| MessageType::from_code(*c))
                .map(MessageType::as_str)
                .collect()
        };
        json!({
            "whitelist": names(&self.whitelist),
            "blacklist": names(&self.blacklist),
        })
    }
}

fn code_set(settings: Option<&Map<String, Value>>, field: &str) -> Result<BTreeSet<u8>> {
    let mut codes = BTreeSet::new();
    for item in array_field(KEY, settings, field)? {
        let message_type = match item {
            Value::Number(n) => n
                .as_u64()
                .and_then(|c| u8::try_from(c).ok())
                .and_then(MessageType::from_code),
            Value::String(name) => name.parse::<MessageType>().ok(),
            other => return Err(invalid(KEY, format!("{field} entry {other} is not a type"))),
        };
        match message_type {
            Some(t) => {
                codes.insert(t.code());
            }
            None => warn!("Skipping unknown message type {item} in {field}"),
        }
    }
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bytes: &[u8]) -> MidiMessage {
        MidiMessage::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_whitelist() {
        let filter = MessageTypeFilter::new().with_whitelist([MessageType::NoteOn, MessageType::NoteOff]);
        assert!(!filter.process(msg(&[0x93, 60, 1])).is_failed());
        assert!(filter.process(msg(&[0xB0, 7, 1])).is_failed());
        assert!(filter.process(msg(&[0xF8])).is_failed());
    }

    #[test]
    fn test_blacklist_only_without_whitelist() {
        let filter = MessageTypeFilter::new().with_blacklist([MessageType::Clock]);
        assert!(filter.process(msg(&[0xF8])).is_failed());
        assert!(!filter.process(msg(&[0xFA])).is_failed());

        let both = filter.with_whitelist([MessageType::Clock]);
        assert!(!both.process(msg(&[0xF8])).is_failed());
    }

    #[test]
    fn test_settings_accept_codes_and_names() {
        let filter = MessageTypeFilter::from_settings(&json!({
            "blacklist": [248, "cc", "NoSuchType", 300],
        }))
        .unwrap();
        assert_eq!(filter, MessageTypeFilter::new().with_blacklist([MessageType::Clock, MessageType::Cc]));
        assert!(MessageTypeFilter::from_settings(&json!({"whitelist": [true]})).is_err());

        insta::assert_yaml_snapshot!(filter.settings(), @r"
        blacklist:
          - CC
          - Clock
        whitelist: []
        ");
    }
}
