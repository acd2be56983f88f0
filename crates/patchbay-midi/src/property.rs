//! Named numeric properties and where each message type stores them.

use crate::error::Error;
use crate::message_type::MessageType;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Note,
    Velocity,
    Octave,
    Pressure,
    Controller,
    Value,
    Number,
    MtcType,
    Song,
    Channel,
}

impl Property {
    pub const ALL: [Property; 10] = [
        Property::Note,
        Property::Velocity,
        Property::Octave,
        Property::Pressure,
        Property::Controller,
        Property::Value,
        Property::Number,
        Property::MtcType,
        Property::Song,
        Property::Channel,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Property::Note => "note",
            Property::Velocity => "velocity",
            Property::Octave => "octave",
            Property::Pressure => "pressure",
            Property::Controller => "controller",
            Property::Value => "value",
            Property::Number => "number",
            Property::MtcType => "mtc_type",
            Property::Song => "song",
            Property::Channel => "channel",
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Property {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownProperty(s.to_string()))
    }
}

/// Storage location of a property inside the message bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Seven-bit data byte at this index.
    Byte(usize),
    /// Derived from the note byte: `note / 12 - 1`.
    Octave,
    /// Bytes 1 (lsb) and 2 (msb).
    FourteenBit,
    /// Bits 4..7 of byte 1.
    MtcType,
    /// Bits 0..4 of byte 1.
    MtcValue,
    /// Low nibble of the status byte.
    Channel,
}

pub(crate) fn slot(message_type: MessageType, property: Property) -> Option<Slot> {
    use MessageType as T;
    use Property as P;

    let slot = match (message_type, property) {
        (T::NoteOff | T::NoteOn | T::PolyAftertouch, P::Note) => Slot::Byte(1),
        (T::NoteOff | T::NoteOn | T::PolyAftertouch, P::Octave) => Slot::Octave,
        (T::NoteOff | T::NoteOn, P::Velocity) => Slot::Byte(2),
        (T::PolyAftertouch, P::Pressure) => Slot::Byte(2),
        (T::Cc, P::Controller) => Slot::Byte(1),
        (T::Cc, P::Value) => Slot::Byte(2),
        (T::Program, P::Number) => Slot::Byte(1),
        (T::ChannelAftertouch, P::Pressure) => Slot::Byte(1),
        (T::Pitch | T::Position, P::Value) => Slot::FourteenBit,
        (T::Mtc, P::MtcType) => Slot::MtcType,
        (T::Mtc, P::Value) => Slot::MtcValue,
        (T::Select, P::Song) => Slot::Byte(1),
        (t, P::Channel) if t.is_channel_voice() => Slot::Channel,
        _ => return None,
    };
    Some(slot)
}

/// Properties defined for a message type, in a stable display order.
pub fn properties_of(message_type: MessageType) -> Vec<Property> {
    Property::ALL
        .iter()
        .copied()
        .filter(|p| slot(message_type, *p).is_some())
        .collect()
}
