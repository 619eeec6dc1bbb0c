// Reverie
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Scales, keys and pitch helpers.
//!
//! The generative engine thinks in scale degrees and only turns them into MIDI pitches at the
//! last moment. A [`Key`] couples a [`Mode`] with a root pitch class and provides the conversions
//! in both directions, plus [`Key::snap`] for pulling arbitrary pitches back into the scale after
//! a mutation.
//!
//! # Examples
//!
//! ```
//! use reverie::theory::{Key, Mode};
//!
//! let key = Key::new(9, Mode::Aeolian); // A minor
//! assert_eq!(key.pitch(0, 4), 69);
//! assert_eq!(key.pitch(2, 4), 72);
//! assert_eq!(key.snap(70), 69);
//! ```

use serde::{Deserialize, Serialize};

/// A scale shape, described by its semitone offsets from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    MinorPentatonic,
    MajorPentatonic,
}

impl Mode {
    /// Semitone offsets from the root for each scale degree.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Mode::Ionian => &[0, 2, 4, 5, 7, 9, 11],
            Mode::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Mode::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Mode::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Mode::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Mode::Aeolian => &[0, 2, 3, 5, 7, 8, 10],
            Mode::MinorPentatonic => &[0, 3, 5, 7, 10],
            Mode::MajorPentatonic => &[0, 2, 4, 7, 9],
        }
    }

    /// Number of degrees in one octave of this mode.
    pub fn len(self) -> usize {
        self.intervals().len()
    }
}

/// A mode rooted on a pitch class (0 = C, 9 = A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub root: u8,
    pub mode: Mode,
}

impl Key {
    pub fn new(root: u8, mode: Mode) -> Key {
        Key {
            root: root % 12,
            mode,
        }
    }

    /// Returns the MIDI pitch of a scale degree in a given octave.
    ///
    /// Degrees may be negative or exceed the mode length; they wrap into neighbouring octaves.
    /// Octave 4 holds middle C (MIDI 60).
    pub fn pitch(&self, degree: i32, octave: i32) -> u8 {
        let len = self.mode.len() as i32;
        let octave = octave + degree.div_euclid(len);
        let index = degree.rem_euclid(len) as usize;
        let pitch = (octave + 1) * 12 + self.root as i32 + self.mode.intervals()[index] as i32;
        fold_into_range(pitch)
    }

    /// Returns the absolute degree (octave aware, relative to C-1) of the scale note nearest to
    /// `pitch`.
    pub fn degree_of(&self, pitch: u8) -> i32 {
        let len = self.mode.len() as i32;
        let snapped = self.snap(pitch) as i32;
        let relative = snapped - self.root as i32;
        let octave = relative.div_euclid(12);
        let pc = relative.rem_euclid(12) as u8;
        let index = self
            .mode
            .intervals()
            .iter()
            .position(|&interval| interval == pc)
            .unwrap_or(0) as i32;
        octave * len + index
    }

    /// Converts an absolute degree produced by [`Key::degree_of`] back into a pitch.
    pub fn pitch_of_degree(&self, degree: i32) -> u8 {
        self.pitch(degree, -1)
    }

    /// Moves `pitch` by `steps` scale degrees, snapping it into the scale first.
    pub fn step(&self, pitch: u8, steps: i32) -> u8 {
        self.pitch_of_degree(self.degree_of(pitch) + steps)
    }

    /// Returns the in-scale pitch nearest to `pitch`. Ties resolve downward. Only pitches inside
    /// the MIDI range are considered.
    pub fn snap(&self, pitch: u8) -> u8 {
        let pc = (pitch as i32 - self.root as i32).rem_euclid(12);
        let mut best = None;
        for &interval in self.mode.intervals() {
            for candidate in [interval as i32 - 12, interval as i32, interval as i32 + 12] {
                let snapped = pitch as i32 + candidate - pc;
                if !(0..=127).contains(&snapped) {
                    continue;
                }
                let distance = (candidate - pc).abs();
                best = match best {
                    Some((best_distance, best_pitch))
                        if best_distance < distance
                            || (best_distance == distance && best_pitch < snapped) =>
                    {
                        Some((best_distance, best_pitch))
                    }
                    _ => Some((distance, snapped)),
                };
            }
        }
        best.map_or(pitch, |(_, snapped)| snapped as u8)
    }

    pub fn contains(&self, pitch: u8) -> bool {
        let pc = (pitch as i32 - self.root as i32).rem_euclid(12) as u8;
        self.mode.intervals().contains(&pc)
    }
}

/// Converts a MIDI pitch into a frequency in Hz (A4 = 440 Hz).
pub fn midi_to_hz(pitch: f64) -> f64 {
    440.0 * 2f64.powf((pitch - 69.0) / 12.0)
}

/// Moves `pitch` by whole octaves until it is a valid MIDI pitch, keeping its pitch class.
fn fold_into_range(pitch: i32) -> u8 {
    if pitch < 0 {
        (pitch.rem_euclid(12)) as u8
    } else if pitch > 127 {
        (pitch - ((pitch - 127 + 11) / 12) * 12) as u8
    } else {
        pitch as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_wraps_degrees_across_octaves() {
        let key = Key::new(0, Mode::Ionian);
        assert_eq!(key.pitch(0, 4), 60);
        assert_eq!(key.pitch(7, 4), 72);
        assert_eq!(key.pitch(-1, 4), 59);
    }

    #[test]
    fn snap_pulls_pitches_into_scale() {
        let key = Key::new(0, Mode::MajorPentatonic);
        for pitch in 30..100 {
            assert!(key.contains(key.snap(pitch)), "pitch {} snapped out of scale", pitch);
        }
        assert_eq!(key.snap(64), 64);
    }

    #[test]
    fn snap_stays_in_scale_at_the_edges_of_the_midi_range() {
        for root in 0..12 {
            for mode in [Mode::Ionian, Mode::Phrygian, Mode::MinorPentatonic].iter() {
                let key = Key::new(root, *mode);
                for pitch in (0..6).chain(122..=127) {
                    let snapped = key.snap(pitch);
                    assert!(key.contains(snapped), "{} snapped to {}", pitch, snapped);
                    assert!(snapped <= 127);
                }
            }
        }
        assert_eq!(Key::new(1, Mode::Phrygian).snap(0), 1);
        assert_eq!(Key::new(8, Mode::MajorPentatonic).snap(127), 125);
    }

    #[test]
    fn degrees_beyond_the_midi_range_fold_back_into_the_scale() {
        let key = Key::new(0, Mode::Ionian);
        assert!(key.contains(key.pitch(6, 10)));
        assert!(key.pitch(6, 10) <= 127);
        assert!(key.contains(key.pitch(-3, -1)));
    }

    #[test]
    fn degree_round_trip_is_stable_for_scale_pitches() {
        let key = Key::new(2, Mode::Dorian);
        for degree in 10..40 {
            let pitch = key.pitch_of_degree(degree);
            assert_eq!(key.degree_of(pitch), degree);
        }
    }

    #[test]
    fn step_moves_by_scale_degrees() {
        let key = Key::new(9, Mode::Aeolian);
        assert_eq!(key.step(69, 1), 71);
        assert_eq!(key.step(69, -1), 67);
        assert_eq!(key.step(69, 7), 81);
    }

    #[test]
    fn midi_to_hz_matches_concert_pitch() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-9);
        assert!((midi_to_hz(57.0) - 220.0).abs() < 1e-9);
    }
}
