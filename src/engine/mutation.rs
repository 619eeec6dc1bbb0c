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

//! In-place phrase mutations.
//!
//! Each mutation changes one aspect of a phrase and leaves it normalized: pitches stay inside the
//! key and the register, every time stays inside the bar and the durations never sum to more
//! than a bar.
//!
//! ```
//! use reverie::engine::mutation::rhythmic_variation;
//! use reverie::event::{phrase_duration, Event, Role};
//!
//! let mut phrase = vec![
//!     Event::new(Role::Melody, 60, 0.0, 1.0),
//!     Event::new(Role::Melody, 62, 1.0, 1.0),
//!     Event::new(Role::Melody, 64, 2.0, 1.0),
//!     Event::new(Role::Melody, 65, 3.0, 1.5),
//! ];
//! rhythmic_variation(&mut phrase, 1, 2.0);
//! assert!(phrase_duration(&phrase) <= 4.0);
//! ```

use crate::{
    event::{normalize_phrase, phrase_duration, Event, Technique, BEATS_PER_BAR, HAT},
    seed::Rng,
    theory::Key,
};
use rand::Rng as _;
use serde::{Deserialize, Serialize};

/// Probability that a bar mutates the role's current branch.
pub const MUTATION_PROBABILITY: f64 = 0.7;

/// Shortest note that ornamentation will split.
pub const MIN_ORNAMENT_SOURCE: f64 = 0.5;

/// Length of an inserted grace or passing note.
pub const ORNAMENT_LENGTH: f64 = 0.25;

/// The kinds of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Transpose,
    RhythmicVariation,
    Inversion,
    Ornamentation,
}

/// The pitch range a mutated phrase must stay inside, inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchRange {
    pub low: u8,
    pub high: u8,
}

impl PitchRange {
    fn contains(&self, pitch: i32) -> bool {
        pitch >= self.low as i32 && pitch <= self.high as i32
    }

    fn clamp(&self, key: &Key, pitch: i32) -> u8 {
        let mut pitch = key.snap(pitch.clamp(0, 127) as u8);
        while pitch > self.high && pitch >= 12 {
            pitch -= 12;
        }
        while pitch < self.low && pitch <= 115 {
            pitch += 12;
        }
        pitch
    }
}

/// Applies exactly one randomly chosen mutation to a phrase.
///
/// Pitched phrases may take any mutation. Unpitched phrases only take rhythmic variation and
/// ornamentation. Returns the mutation that was applied, or `None` when none of the candidates
/// fit the phrase (for example an empty phrase).
pub fn mutate(
    events: &mut Vec<Event>,
    pitched: bool,
    key: &Key,
    range: PitchRange,
    rng: &mut Rng,
) -> Option<Mutation> {
    let mut candidates = if pitched {
        vec![
            Mutation::Transpose,
            Mutation::RhythmicVariation,
            Mutation::Inversion,
            Mutation::Ornamentation,
        ]
    } else {
        vec![Mutation::RhythmicVariation, Mutation::Ornamentation]
    };

    while !candidates.is_empty() {
        let mutation = candidates.swap_remove(rng.random_range(0..candidates.len()));
        let applied = match mutation {
            Mutation::Transpose => {
                let delta = [-2, -1, 1, 2][rng.random_range(0..4)];
                transpose(events, key, delta, range)
            }
            Mutation::RhythmicVariation => {
                if events.is_empty() {
                    false
                } else {
                    let index = rng.random_range(0..events.len());
                    rhythmic_variation(events, index, rng.random_range(0.5..=2.0))
                }
            }
            Mutation::Inversion => {
                if events.len() < 3 {
                    false
                } else {
                    let length = rng.random_range(3..=events.len().min(4));
                    let start = rng.random_range(0..=events.len() - length);
                    invert(events, start, length, key, range)
                }
            }
            Mutation::Ornamentation if pitched => ornament(events, key, rng),
            Mutation::Ornamentation => ghost_note(events, rng),
        };
        if applied {
            normalize_phrase(events);
            return Some(mutation);
        }
    }
    None
}

/// Moves every pitch by `delta` scale degrees.
///
/// When the shifted phrase would leave `range` the direction is flipped, and any pitch still
/// outside the range is folded back by octaves.
pub fn transpose(events: &mut [Event], key: &Key, delta: i32, range: PitchRange) -> bool {
    if events.is_empty() || delta == 0 {
        return false;
    }
    let shifted = |delta: i32| {
        events
            .iter()
            .map(|event| key.step(event.pitch, delta) as i32)
            .collect::<Vec<_>>()
    };
    let mut pitches = shifted(delta);
    if !pitches.iter().all(|&pitch| range.contains(pitch)) {
        pitches = shifted(-delta);
    }
    for (event, pitch) in events.iter_mut().zip(pitches) {
        event.pitch = range.clamp(key, pitch);
    }
    true
}

/// Stretches or compresses one note by `factor`.
///
/// Every other note keeps its onset. When the stretched note would ring past the end of the
/// bar, the whole phrase is scaled around its first onset so that it ends on the bar line, and
/// notes that started together still start together.
pub fn rhythmic_variation(events: &mut Vec<Event>, index: usize, factor: f64) -> bool {
    if index >= events.len() || !factor.is_finite() || factor <= 0.0 {
        return false;
    }
    normalize_phrase(events);
    if index >= events.len() {
        return false;
    }

    events[index].duration *= factor;
    let start = events[0].time;
    let end = events
        .iter()
        .map(Event::end)
        .fold(f64::NEG_INFINITY, f64::max);
    let scale = ((BEATS_PER_BAR - start) / (end - start)).min(1.0);
    if scale < 1.0 {
        for event in events.iter_mut() {
            event.time = start + (event.time - start) * scale;
            event.duration *= scale;
        }
    }
    normalize_phrase(events);
    true
}

/// Mirrors the contour of `length` notes starting at `start` around the first of them.
pub fn invert(
    events: &mut [Event],
    start: usize,
    length: usize,
    key: &Key,
    range: PitchRange,
) -> bool {
    if length < 2 || start + length > events.len() {
        return false;
    }
    let fragment = &mut events[start..start + length];
    let pivot = key.degree_of(fragment[0].pitch);
    let mut changed = false;
    for event in fragment.iter_mut().skip(1) {
        let degree = key.degree_of(event.pitch);
        let mirrored = range.clamp(key, key.pitch_of_degree(2 * pivot - degree) as i32);
        changed |= mirrored != event.pitch;
        event.pitch = mirrored;
    }
    changed
}

/// Splits a long enough note so that its tail becomes a passing or grace note.
///
/// The new note steps towards the following note when there is one, and otherwise acts as an
/// upper neighbour. The total duration of the phrase does not change.
pub fn ornament(events: &mut Vec<Event>, key: &Key, rng: &mut Rng) -> bool {
    let candidates = events
        .iter()
        .enumerate()
        .filter(|(_, event)| event.duration >= MIN_ORNAMENT_SOURCE)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return false;
    }
    let index = candidates[rng.random_range(0..candidates.len())];

    let source = events[index];
    let direction = match events.get(index + 1) {
        Some(next) if next.pitch < source.pitch => -1,
        Some(next) if next.pitch > source.pitch => 1,
        _ => 1,
    };
    let mut grace = source;
    grace.pitch = key.step(source.pitch, direction);
    grace.time = source.end() - ORNAMENT_LENGTH;
    grace.duration = ORNAMENT_LENGTH;
    grace.velocity = source.velocity * 0.8;
    grace.hint.glide = false;

    events[index].duration -= ORNAMENT_LENGTH;
    events.insert(index + 1, grace);
    true
}

/// Adds a quiet hi-hat on a free sixteenth.
pub fn ghost_note(events: &mut Vec<Event>, rng: &mut Rng) -> bool {
    if events.is_empty() {
        return false;
    }
    let role = events[0].role;
    let length = events[0].duration.min(ORNAMENT_LENGTH);
    if phrase_duration(events) + length > BEATS_PER_BAR {
        return false;
    }
    let free = (0..16)
        .map(|step| step as f64 * 0.25)
        .filter(|&time| {
            events
                .iter()
                .all(|event| (event.time - time).abs() > f64::EPSILON)
        })
        .collect::<Vec<_>>();
    if free.is_empty() {
        return false;
    }
    let time = free[rng.random_range(0..free.len())];
    events.push(
        Event::new(role, HAT, time, length)
            .velocity(0.25)
            .technique(Technique::Ghost),
    );
    true
}
