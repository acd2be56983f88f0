//! Chord generation: one input note fans out into a set of intervals.

use super::{invalid, settings_object};
use crate::error::Result;
use crate::result::{Batch, RouterResult};
use patchbay_midi::note::DATA_MAX;
use patchbay_midi::{MidiMessage, Property};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, warn};

macro_rules! chords {
    ($($variant:ident => $name:literal [$($offset:literal),*]),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum Chord {
            #[default]
            $($variant),+
        }

        impl Chord {
            pub const ALL: &'static [Chord] = &[$(Chord::$variant),+];

            /// Semitone offsets from the played note.
            pub const fn intervals(self) -> &'static [i32] {
                match self {
                    $(Chord::$variant => &[$($offset),*]),+
                }
            }

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Chord::$variant => $name),+
                }
            }
        }
    };
}

chords! {
    Disabled => "DISABLED" [],
    Major3 => "MAJOR3" [0, 4, 7],
    Minor3 => "MINOR3" [0, 3, 7],
    Major3Lo => "MAJOR3_LO" [-5, 0, 4],
    Minor3Lo => "MINOR3_LO" [-5, 0, 3],
    Major2 => "MAJOR2" [0, 4],
    Minor2 => "MINOR2" [0, 3],
    Dim => "DIM" [0, 3, 6, 9],
    Aug => "AUG" [0, 4, 8, 10],
    Sus2 => "SUS2" [0, 2, 7],
    Sus4 => "SUS4" [0, 5, 7],
    SevenSus2 => "7SUS2" [0, 2, 7, 10],
    SevenSus4 => "7SUS4" [0, 5, 7, 10],
    Sixth => "6TH" [0, 4, 7, 9],
    Seventh => "7TH" [0, 4, 7, 10],
    Ninth => "9TH" [0, 4, 7, 10, 14],
    Major7th => "MAJOR7TH" [0, 4, 7, 11],
    Major9th => "MAJOR9TH" [0, 4, 7, 11, 14],
    Major11th => "MAJOR11TH" [0, 4, 7, 14, 17],
    Minor6th => "MINOR6TH" [0, 3, 7, 9],
    Minor7th => "MINOR7TH" [0, 3, 7, 10],
    Minor9th => "MINOR9TH" [0, 3, 7, 10, 14],
    Minor11th => "MINOR11TH" [0, 3, 7, 14, 17],
    Power2 => "POWER2" [0, 7],
    Power3 => "POWER3" [0, 7, 12],
    Octave2 => "OCTAVE2" [0, 12],
    Octave3 => "OCTAVE3" [0, 12, 24],
}

impl Chord {
    /// Looks up a chord by its exact name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    pub fn is_disabled(self) -> bool {
        self.intervals().is_empty()
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChordFilter {
    chord: Chord,
}

impl ChordFilter {
    pub fn new(chord: Chord) -> Self {
        Self { chord }
    }

    /// Unknown or missing chord names disable the filter.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = settings_object(super::KEY_CHORD, settings)?;
        let chord = match settings.and_then(|s| s.get("chord")) {
            None | Some(Value::Null) => Chord::Disabled,
            Some(Value::String(name)) => Chord::from_name(name).unwrap_or_else(|| {
                warn!("Unknown chord '{name}', disabling chord filter");
                Chord::Disabled
            }),
            Some(other) => {
                return Err(invalid(
                    super::KEY_CHORD,
                    format!("'chord' is not a name: {other}"),
                ))
            }
        };
        Ok(Self { chord })
    }

    pub fn chord(&self) -> Chord {
        self.chord
    }

    pub fn process(&self, message: MidiMessage) -> RouterResult {
        if self.chord.is_disabled() {
            return RouterResult::single(message);
        }
        let Ok(note) = message.get(Property::Note) else {
            return RouterResult::single(message);
        };

        let mut batch = Batch::new();
        for offset in self.chord.intervals() {
            let target = note + offset;
            if !(0..=DATA_MAX).contains(&target) {
                debug!("Chord note {target} out of range, skipped");
                continue;
            }
            let mut voice = message.clone();
            if voice.set(Property::Note, target).is_ok() {
                batch.push(voice);
            }
        }
        RouterResult::Produced(batch)
    }

    pub fn settings(&self) -> Value {
        json!({ "chord": self.chord.as_str() })
    }
}
