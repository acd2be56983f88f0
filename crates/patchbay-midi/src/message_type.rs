//! MIDI message types and their status-byte codes.
//!
//! Channel-voice types are identified by the high nibble of the status byte,
//! system types by the full status byte.

use crate::error::Error;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which half of the status-byte space a type lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSet {
    ChannelVoice,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NoteOff,
    NoteOn,
    PolyAftertouch,
    Cc,
    Program,
    ChannelAftertouch,
    Pitch,
    Sysex,
    Mtc,
    Position,
    Select,
    Tune,
    SysexEnd,
    Clock,
    Start,
    Continue,
    Stop,
    Reset,
}

impl MessageType {
    pub const ALL: [MessageType; 18] = [
        MessageType::NoteOff,
        MessageType::NoteOn,
        MessageType::PolyAftertouch,
        MessageType::Cc,
        MessageType::Program,
        MessageType::ChannelAftertouch,
        MessageType::Pitch,
        MessageType::Sysex,
        MessageType::Mtc,
        MessageType::Position,
        MessageType::Select,
        MessageType::Tune,
        MessageType::SysexEnd,
        MessageType::Clock,
        MessageType::Start,
        MessageType::Continue,
        MessageType::Stop,
        MessageType::Reset,
    ];

    /// Numeric type code: the status nibble for channel-voice types, the
    /// full status byte for system types.
    pub const fn code(self) -> u8 {
        match self {
            MessageType::NoteOff => 0x8,
            MessageType::NoteOn => 0x9,
            MessageType::PolyAftertouch => 0xA,
            MessageType::Cc => 0xB,
            MessageType::Program => 0xC,
            MessageType::ChannelAftertouch => 0xD,
            MessageType::Pitch => 0xE,
            MessageType::Sysex => 0xF0,
            MessageType::Mtc => 0xF1,
            MessageType::Position => 0xF2,
            MessageType::Select => 0xF3,
            MessageType::Tune => 0xF6,
            MessageType::SysexEnd => 0xF7,
            MessageType::Clock => 0xF8,
            MessageType::Start => 0xFA,
            MessageType::Continue => 0xFB,
            MessageType::Stop => 0xFC,
            MessageType::Reset => 0xFF,
        }
    }

    pub const fn set(self) -> MessageSet {
        if self.code() < 0xF0 {
            MessageSet::ChannelVoice
        } else {
            MessageSet::System
        }
    }

    #[inline]
    pub const fn is_channel_voice(self) -> bool {
        matches!(self.set(), MessageSet::ChannelVoice)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MessageType::NoteOff => "NoteOff",
            MessageType::NoteOn => "NoteOn",
            MessageType::PolyAftertouch => "PolyAftertouch",
            MessageType::Cc => "CC",
            MessageType::Program => "Program",
            MessageType::ChannelAftertouch => "ChannelAftertouch",
            MessageType::Pitch => "Pitch",
            MessageType::Sysex => "Sysex",
            MessageType::Mtc => "MTC",
            MessageType::Position => "Position",
            MessageType::Select => "Select",
            MessageType::Tune => "Tune",
            MessageType::SysexEnd => "SysexEnd",
            MessageType::Clock => "Clock",
            MessageType::Start => "Start",
            MessageType::Continue => "Continue",
            MessageType::Stop => "Stop",
            MessageType::Reset => "Reset",
        }
    }

    /// Wire length of a complete message, `None` for variable-length sysex.
    pub const fn expected_len(self) -> Option<usize> {
        match self {
            MessageType::NoteOff
            | MessageType::NoteOn
            | MessageType::PolyAftertouch
            | MessageType::Cc
            | MessageType::Pitch
            | MessageType::Position => Some(3),
            MessageType::Program
            | MessageType::ChannelAftertouch
            | MessageType::Mtc
            | MessageType::Select => Some(2),
            MessageType::Sysex => None,
            _ => Some(1),
        }
    }

    /// Matches a raw status byte: bytes `>= 0xF0` match system types exactly,
    /// lower bytes match channel-voice types by high nibble.
    pub fn from_status(status: u8) -> Option<Self> {
        if status >= 0xF0 {
            Self::from_code(status)
        } else if status >= 0x80 {
            Self::from_code(status >> 4)
        } else {
            None
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Status byte for this type; `channel` only applies to channel-voice types.
    pub fn status_byte(self, channel: u8) -> u8 {
        if self.is_channel_voice() {
            (self.code() << 4) | (channel & 0x0F)
        } else {
            self.code()
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Case-insensitive; separators are ignored, so `NOTE_ON`, `note-on` and
/// `NoteOn` all parse.
impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Self::ALL
            .iter()
            .copied()
            .find(|t| normalize(t.as_str()) == wanted)
            .ok_or_else(|| Error::UnknownMessageType(s.to_string()))
    }
}

impl Serialize for MessageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

struct MessageTypeVisitor;

impl Visitor<'_> for MessageTypeVisitor {
    type Value = MessageType;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a message type name or numeric type code")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MessageType, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MessageType, E> {
        u8::try_from(v)
            .ok()
            .and_then(MessageType::from_code)
            .ok_or_else(|| E::custom(format!("unknown message type code {v}")))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MessageType, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!("unknown message type code {v}"))),
        }
    }
}

/// Accepts either a type name or a numeric type code.
impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MessageTypeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_voice_matches_high_nibble() {
        for status in 0x80..=0xEFu8 {
            let t = MessageType::from_status(status).unwrap();
            assert_eq!(t.set(), MessageSet::ChannelVoice);
            assert_eq!(t.code(), status >> 4);
        }
    }

    #[test]
    fn test_system_matches_full_byte() {
        assert_eq!(MessageType::from_status(0xF8), Some(MessageType::Clock));
        assert_eq!(MessageType::from_status(0xF4), None);
        assert_eq!(MessageType::from_status(0xF5), None);
        assert_eq!(MessageType::from_status(0xF9), None);
        assert_eq!(MessageType::from_status(0xFE), None);
        assert_eq!(MessageType::from_status(0x3C), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("NOTE_ON".parse::<MessageType>().unwrap(), MessageType::NoteOn);
        assert_eq!("cc".parse::<MessageType>().unwrap(), MessageType::Cc);
        assert_eq!(
            "sysex_end".parse::<MessageType>().unwrap(),
            MessageType::SysexEnd
        );
        assert!("bogus".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_status_byte() {
        assert_eq!(MessageType::NoteOn.status_byte(3), 0x93);
        assert_eq!(MessageType::Clock.status_byte(3), 0xF8);
    }

    #[test]
    fn test_deserialize_name_or_code() {
        let types: Vec<MessageType> = serde_json::from_str(r#"["noteOn", 11, 248]"#).unwrap();
        assert_eq!(
            types,
            vec![MessageType::NoteOn, MessageType::Cc, MessageType::Clock]
        );
        assert!(serde_json::from_str::<MessageType>("300").is_err());
    }
}
