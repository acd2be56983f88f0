//! MIDI message model for patchbay.
//!
//! Decodes raw MIDI 1.0 byte sequences into [`MidiMessage`] values with
//! named, type-specific numeric properties, and encodes them back.
//!
//! # Example
//!
//! ```
//! use patchbay_midi::{MessageType, MidiMessage, Property};
//!
//! let mut msg = MidiMessage::from_bytes(&[0x90, 0x3C, 0x64])?;
//! assert_eq!(msg.message_type(), MessageType::NoteOn);
//! assert!(msg.set(Property::Note, 72)?);
//! assert_eq!(msg.encode(), vec![0x90, 0x48, 0x64]);
//! # Ok::<(), patchbay_midi::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

mod message;
mod message_type;
pub mod note;
mod property;

pub use message::MidiMessage;
pub use message_type::{MessageSet, MessageType};
pub use note::{clip, note_in_octave, note_name, octave_of};
pub use property::{properties_of, Property};
