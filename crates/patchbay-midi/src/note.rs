//! Note-number helpers.
//!
//! Middle C (MIDI 60) is `C4`, so octaves run from -1 to 9.

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Highest value a seven-bit data byte can hold.
pub const DATA_MAX: i32 = 127;

/// Octave of note 0.
pub const OCTAVE_MIN: i32 = -1;

/// Octave of note 127.
pub const OCTAVE_MAX: i32 = 9;

/// Note number for `octave` and `pitch_class`. The octave is clamped to
/// `OCTAVE_MIN..=OCTAVE_MAX` and the result to the data range, so G9 and
/// above land on 127.
pub fn note_in_octave(octave: i32, pitch_class: i32) -> i32 {
    let octave = octave.clamp(OCTAVE_MIN, OCTAVE_MAX);
    clip((octave + 1) * 12 + pitch_class.rem_euclid(12))
}

/// Octave of a note number: `note / 12 - 1`.
#[inline]
pub fn octave_of(note: i32) -> i32 {
    note / 12 - 1
}

/// Scientific pitch name, e.g. `C4` for 60 and `A#-1` for 10.
pub fn note_name(note: u8) -> String {
    let note = note.min(127);
    format!(
        "{}{}",
        NOTE_NAMES[usize::from(note % 12)],
        octave_of(i32::from(note))
    )
}

/// Clamps a value into the seven-bit data range.
#[inline]
pub fn clip(value: i32) -> i32 {
    value.clamp(0, DATA_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_note_in_octave_clamps() {
        assert_eq!(note_in_octave(4, 0), 60);
        assert_eq!(note_in_octave(-1, 11), 11);
        assert_eq!(note_in_octave(9, 7), 127);
        assert_eq!(note_in_octave(9, 11), 127);
        assert_eq!(note_in_octave(i32::MAX, 0), 120);
        assert_eq!(note_in_octave(i32::MIN, 3), 3);
    }

    #[test]
    fn test_octave() {
        assert_eq!(octave_of(60), 4);
        assert_eq!(octave_of(11), -1);
        assert_eq!(octave_of(12), 0);
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip(-4), 0);
        assert_eq!(clip(200), 127);
        assert_eq!(clip(64), 64);
    }
}
