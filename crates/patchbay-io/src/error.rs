//! Error types for the port I/O subsystem.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] patchbay_midi::Error),

    #[error("MIDI device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open {nickname}: {reason}")]
    DeviceOpen { nickname: String, reason: String },

    #[error("MIDI port error: {0}")]
    Port(String),

    #[error("Unknown port nickname: {0}")]
    UnknownPort(String),

    #[error("Nickname already in use: {0}")]
    DuplicateNickname(String),

    #[error("Wait interrupted")]
    InterruptedWait,

    #[error("Latches already requested by another waiter")]
    AlreadyLatched,

    #[error("MIDI device error: {0}")]
    MidiDevice(String),
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::MidiDevice(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::Port(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Port(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::Port(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
