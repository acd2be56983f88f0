//! The MIDI message value: raw bytes plus typed property access.

use crate::error::{Error, Result};
use crate::message_type::MessageType;
use crate::note::{note_in_octave, note_name, octave_of};
use crate::property::{properties_of, slot, Property, Slot};
use smallvec::SmallVec;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// A decoded MIDI message.
///
/// Identity (type, byte layout) is fixed at construction; the named
/// properties are mutable in place. The message owns a copy of the buffer it
/// was decoded from and exposes the `offset..offset + count` view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiMessage {
    message_type: MessageType,
    buffer: SmallVec<[u8; 3]>,
    offset: usize,
    count: usize,
    timestamp: u64,
}

impl MidiMessage {
    /// Decodes the message whose status byte sits at `bytes[offset]`.
    pub fn decode(bytes: &[u8], offset: usize, count: usize, timestamp: u64) -> Result<Self> {
        if count == 0 {
            return Err(Error::Empty);
        }
        let end = offset.checked_add(count).filter(|end| *end <= bytes.len());
        if end.is_none() {
            return Err(Error::OutOfBounds {
                offset,
                count,
                len: bytes.len(),
            });
        }

        let status = bytes[offset];
        let message_type =
            MessageType::from_status(status).ok_or(Error::UnrecognizedStatusByte(status))?;

        if let Some(expected) = message_type.expected_len() {
            if count < expected {
                return Err(Error::Truncated {
                    message_type,
                    expected,
                    actual: count,
                });
            }
        }

        Ok(Self {
            message_type,
            buffer: SmallVec::from_slice(bytes),
            offset,
            count,
            timestamp,
        })
    }

    /// Decodes a whole slice with a zero timestamp.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(bytes, 0, bytes.len(), 0)
    }

    /// Builds a message from a type and a list of property values.
    ///
    /// `channel` is ignored for system types.
    pub fn synthesize(
        message_type: MessageType,
        channel: Option<u8>,
        properties: &[(Property, i32)],
    ) -> Result<Self> {
        let mut buffer: SmallVec<[u8; 3]> = match message_type.expected_len() {
            Some(len) => SmallVec::from_elem(0, len),
            None => SmallVec::from_slice(&[0xF0, 0xF7]),
        };
        buffer[0] = message_type.status_byte(channel.unwrap_or(0));

        let count = buffer.len();
        let mut message = Self {
            message_type,
            buffer,
            offset: 0,
            count,
            timestamp: 0,
        };
        for &(property, value) in properties {
            message.set(property, value)?;
        }
        Ok(message)
    }

    /// Wraps a sysex dump, trimming anything before the first `0xF0` and
    /// after the last `0xF7`.
    pub fn from_sysex_bytes(bytes: &[u8]) -> Result<Self> {
        let start = bytes.iter().position(|b| *b == 0xF0);
        let end = bytes.iter().rposition(|b| *b == 0xF7);
        match (start, end) {
            (Some(start), Some(end)) if start < end => {
                if start > 0 || end + 1 < bytes.len() {
                    debug!(
                        "Trimmed sysex dump from {} to {} bytes",
                        bytes.len(),
                        end + 1 - start
                    );
                }
                let body = &bytes[start..=end];
                Ok(Self {
                    message_type: MessageType::Sysex,
                    buffer: SmallVec::from_slice(body),
                    offset: 0,
                    count: body.len(),
                    timestamp: 0,
                })
            }
            (None, _) => Err(Error::MalformedSysex("no 0xF0 start byte".into())),
            _ => Err(Error::MalformedSysex("no 0xF7 end byte after start".into())),
        }
    }

    /// Reads a sysex dump from disk. See [`MidiMessage::from_sysex_bytes`].
    pub fn from_sysex_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_sysex_bytes(&bytes)
    }

    /// Defensive copy of the message bytes honoring offset and count.
    pub fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.count]
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Channel 0..=15 for channel-voice messages, `None` for system messages.
    pub fn channel(&self) -> Option<u8> {
        self.message_type
            .is_channel_voice()
            .then(|| self.byte(0) & 0x0F)
    }

    pub fn set_channel(&mut self, channel: u8) -> Result<bool> {
        self.set(Property::Channel, i32::from(channel))
    }

    pub fn has_property(&self, property: Property) -> bool {
        slot(self.message_type, property).is_some()
    }

    pub fn property_names(&self) -> Vec<&'static str> {
        properties_of(self.message_type)
            .into_iter()
            .map(Property::as_str)
            .collect()
    }

    pub fn properties(&self) -> Vec<(Property, i32)> {
        properties_of(self.message_type)
            .into_iter()
            .filter_map(|p| self.get(p).ok().map(|v| (p, v)))
            .collect()
    }

    pub fn get(&self, property: Property) -> Result<i32> {
        let value = match self.slot(property)? {
            Slot::Byte(index) => i32::from(self.byte(index)),
            Slot::Octave => octave_of(i32::from(self.byte(1))),
            Slot::FourteenBit => i32::from(self.byte(1)) | (i32::from(self.byte(2)) << 7),
            Slot::MtcType => i32::from((self.byte(1) >> 4) & 0x07),
            Slot::MtcValue => i32::from(self.byte(1) & 0x0F),
            Slot::Channel => i32::from(self.byte(0) & 0x0F),
        };
        Ok(value)
    }

    /// Writes a property; returns `false` when the stored value did not change.
    ///
    /// Values are masked to the width of their field, range policy belongs to
    /// the caller. Octave is the exception: it is clamped to -1..=9 and the
    /// resulting note to 127.
    pub fn set(&mut self, property: Property, value: i32) -> Result<bool> {
        let slot = self.slot(property)?;
        let before = self.get(property)?;
        if before == value {
            return Ok(false);
        }

        match slot {
            Slot::Byte(index) => self.write(index, (value & 0x7F) as u8),
            Slot::Octave => {
                let pitch_class = i32::from(self.byte(1)) % 12;
                self.write(1, note_in_octave(value, pitch_class) as u8);
            }
            Slot::FourteenBit => {
                self.write(1, (value & 0x7F) as u8);
                self.write(2, ((value >> 7) & 0x7F) as u8);
            }
            Slot::MtcType => {
                let b1 = self.byte(1);
                self.write(1, (((value & 0x07) as u8) << 4) | (b1 & 0x0F));
            }
            Slot::MtcValue => {
                let b1 = self.byte(1);
                self.write(1, (b1 & 0x70) | ((value & 0x0F) as u8));
            }
            Slot::Channel => {
                let b0 = self.byte(0);
                self.write(0, (b0 & 0xF0) | ((value & 0x0F) as u8));
            }
        }
        Ok(self.get(property)? != before)
    }

    pub fn get_named(&self, name: &str) -> Result<i32> {
        self.get(name.parse()?)
    }

    pub fn set_named(&mut self, name: &str, value: i32) -> Result<bool> {
        self.set(name.parse()?, value)
    }

    /// Pitch name of the `note` property, if the type has one.
    pub fn note_name(&self) -> Option<String> {
        self.get(Property::Note)
            .ok()
            .map(|note| note_name(note as u8))
    }

    fn slot(&self, property: Property) -> Result<Slot> {
        slot(self.message_type, property).ok_or(Error::PropertyUndefined {
            property,
            message_type: self.message_type,
        })
    }

    #[inline]
    fn byte(&self, index: usize) -> u8 {
        self.buffer[self.offset + index]
    }

    #[inline]
    fn write(&mut self, index: usize, value: u8) {
        self.buffer[self.offset + index] = value;
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_type)?;
        if self.message_type == MessageType::Sysex {
            return write!(f, " [{} bytes]", self.count);
        }
        for (property, value) in self.properties() {
            write!(f, " {property}={value}")?;
        }
        if let Some(name) = self.note_name() {
            write!(f, " ({name})")?;
        }
        Ok(())
    }
}
