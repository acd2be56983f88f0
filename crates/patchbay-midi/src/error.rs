//! Error types for the MIDI message model.

use crate::message_type::MessageType;
use crate::property::Property;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Empty MIDI message")]
    Empty,

    #[error("Unrecognized status byte: 0x{0:02X}")]
    UnrecognizedStatusByte(u8),

    #[error("{message_type} message needs {expected} bytes, got {actual}")]
    Truncated {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },

    #[error("View {offset}+{count} exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },

    #[error("Property '{property}' is undefined for {message_type}")]
    PropertyUndefined {
        property: Property,
        message_type: MessageType,
    },

    #[error("Unknown property name: {0}")]
    UnknownProperty(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Malformed sysex dump: {0}")]
    MalformedSysex(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
