//! Error types for routing and topology construction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Port I/O: {0}")]
    Port(#[from] patchbay_io::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] patchbay_midi::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid settings for filter '{key}': {reason}")]
    InvalidFilter { key: String, reason: String },

    #[error("Router already started")]
    AlreadyStarted,

    #[error("Router worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, Error>;
