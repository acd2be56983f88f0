//! Centralized error type for the patchbay umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MIDI: {0}")]
    Midi(#[from] patchbay_midi::Error),

    #[error("Port: {0}")]
    Port(#[from] patchbay_io::Error),

    #[error("Router: {0}")]
    Router(#[from] patchbay_router::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
