//! Outcome of running a message through a filter or a whole pipeline.

use patchbay_midi::MidiMessage;
use smallvec::{smallvec, SmallVec};

/// Messages produced by one stage. Most stages emit a single message.
pub type Batch = SmallVec<[MidiMessage; 1]>;

#[derive(Debug, Clone, PartialEq)]
pub enum RouterResult {
    /// Rejected; nothing is broadcast.
    Failed,
    /// Intentionally silenced; nothing is broadcast and input dispatch stops.
    Consumed,
    /// Zero or more messages to broadcast.
    Produced(Batch),
}

impl RouterResult {
    pub fn single(message: MidiMessage) -> Self {
        Self::Produced(smallvec![message])
    }

    pub fn empty() -> Self {
        Self::Produced(Batch::new())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed)
    }

    /// True for `Failed` and `Consumed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Produced(_))
    }

    pub fn messages(&self) -> &[MidiMessage] {
        match self {
            Self::Produced(batch) => batch,
            _ => &[],
        }
    }

    pub fn into_messages(self) -> Batch {
        match self {
            Self::Produced(batch) => batch,
            _ => Batch::new(),
        }
    }
}

impl From<MidiMessage> for RouterResult {
    fn from(message: MidiMessage) -> Self {
        Self::single(message)
    }
}
