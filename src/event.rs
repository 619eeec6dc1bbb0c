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

//! Musical events and phrases.
//!
//! An [`Event`] is one note of one [`Role`] inside a bar. Times and durations are expressed in
//! beats relative to the start of the bar, and a bar is always [`BEATS_PER_BAR`] beats long. Only
//! whatever turns events into sound decides how long a beat actually is, which lets the composer
//! run without knowing anything about the render clock.
//!
//! A phrase is simply the list of events one role plays in one bar. [`normalize_phrase`] enforces
//! the phrase invariants: every time lies in `[0, 4)` and the sum of all durations is at most
//! four beats.
//!
//! # Examples
//!
//! ```
//! use reverie::event::{normalize_phrase, Event, Role};
//!
//! let mut phrase = vec![
//!     Event::new(Role::Bass, 45, 0.0, 3.0),
//!     Event::new(Role::Bass, 48, 3.0, 3.0),
//! ];
//! normalize_phrase(&mut phrase);
//!
//! let total: f64 = phrase.iter().map(|event| event.duration).sum();
//! assert!(total <= 4.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Number of beats in every bar.
pub const BEATS_PER_BAR: f64 = 4.0;

/// Tolerance used when comparing beat positions.
pub const BEAT_EPSILON: f64 = 1e-9;

/// General MIDI bass drum, used as the pitch of kick events.
pub const KICK: u8 = 36;
/// General MIDI acoustic snare.
pub const SNARE: u8 = 38;
/// General MIDI closed hi-hat.
pub const HAT: u8 = 42;

/// A musical function with its own independent per-bar event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Bass,
    Melody,
    Accompaniment,
    Harmony,
    Drums,
    Sfx,
}

impl Role {
    /// Every role, in the order the engine evolves them.
    pub const ALL: [Role; 6] = [
        Role::Bass,
        Role::Accompaniment,
        Role::Harmony,
        Role::Melody,
        Role::Drums,
        Role::Sfx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Bass => "bass",
            Role::Melody => "melody",
            Role::Accompaniment => "accompaniment",
            Role::Harmony => "harmony",
            Role::Drums => "drums",
            Role::Sfx => "sfx",
        }
    }

    /// Whether pitches of this role are scale notes (as opposed to drum-kit note numbers).
    pub fn is_pitched(self) -> bool {
        !matches!(self, Role::Drums)
    }

    pub(crate) fn index(self) -> u64 {
        match self {
            Role::Bass => 0,
            Role::Melody => 1,
            Role::Accompaniment => 2,
            Role::Harmony => 3,
            Role::Drums => 4,
            Role::Sfx => 5,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a note should be articulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Plain sustained note.
    Sustain,
    /// Plucked or struck: decays naturally after the attack.
    Pluck,
    /// A drum hit.
    Hit,
    /// Short retriggered arpeggio around the held note.
    Pulse,
    /// Quiet ornamental note.
    Ghost,
    /// Fill: rapid repeated hits.
    Roll,
    /// Fill: rising dynamics.
    Crescendo,
    /// Fill: opening filter.
    FilterSweep,
    /// Fill: rising texture into the next part.
    Riser,
}

impl Technique {
    pub fn is_percussive(self) -> bool {
        matches!(self, Technique::Pluck | Technique::Hit | Technique::Ghost | Technique::Roll)
    }
}

/// Per-note synthesis hints. Instruments map these onto their own parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthHint {
    /// 0 is dark, 1 is fully open.
    pub brightness: f64,
    /// 0 is clean, 1 is heavily driven.
    pub drive: f64,
    /// Glide into this note from the previous one.
    pub glide: bool,
}

impl Default for SynthHint {
    fn default() -> SynthHint {
        SynthHint {
            brightness: 0.5,
            drive: 0.0,
            glide: false,
        }
    }
}

/// One note of one role inside a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub role: Role,
    /// MIDI pitch, or a General MIDI drum note for [`Role::Drums`].
    pub pitch: u8,
    /// Beat offset inside the bar, `0 <= time < 4`.
    pub time: f64,
    /// Length in beats.
    pub duration: f64,
    /// Loudness between 0 and 1.
    pub velocity: f64,
    pub technique: Technique,
    pub hint: SynthHint,
}

impl Event {
    /// Creates a sustained event with a medium velocity.
    pub fn new(role: Role, pitch: u8, time: f64, duration: f64) -> Event {
        Event {
            role,
            pitch,
            time,
            duration,
            velocity: 0.7,
            technique: Technique::Sustain,
            hint: SynthHint::default(),
        }
    }

    pub fn velocity(mut self, velocity: f64) -> Event {
        self.velocity = velocity;
        self
    }

    pub fn technique(mut self, technique: Technique) -> Event {
        self.technique = technique;
        self
    }

    pub fn hint(mut self, hint: SynthHint) -> Event {
        self.hint = hint;
        self
    }

    /// The beat at which this event stops sounding.
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    fn is_finite(&self) -> bool {
        self.time.is_finite() && self.duration.is_finite() && self.velocity.is_finite()
    }
}

/// Brings a phrase back within the bar.
///
/// Non-finite and zero-length events are removed, events are sorted by time, events starting at
/// or after the end of the bar are dropped, velocities are clamped into `[0, 1]` and, when the sum
/// of durations exceeds [`BEATS_PER_BAR`], every duration is scaled down by the same factor.
pub fn normalize_phrase(events: &mut Vec<Event>) {
    events.retain(|event| event.is_finite() && event.duration > 0.0);
    for event in events.iter_mut() {
        if event.time < 0.0 {
            event.time = 0.0;
        }
        event.velocity = event.velocity.clamp(0.0, 1.0);
    }
    events.retain(|event| event.time < BEATS_PER_BAR - BEAT_EPSILON);
    events.sort_by(|a, b| a.time.total_cmp(&b.time));

    let total = phrase_duration(events);
    if total > BEATS_PER_BAR {
        let factor = BEATS_PER_BAR / total;
        for event in events.iter_mut() {
            event.duration *= factor;
        }
    }
}

/// Sum of the durations of every event in a phrase.
pub fn phrase_duration(events: &[Event]) -> f64 {
    events.iter().map(|event| event.duration).sum()
}

/// Hashes the musical content of a phrase.
///
/// Only pitch, rhythm and technique take part, so two phrases that would sound the same hash the
/// same regardless of velocity jitter.
pub fn phrase_hash(events: &[Event]) -> u64 {
    let mut hasher = Xxh3::new();
    for event in events {
        hasher.update(&[event.pitch]);
        hasher.update(&quantize(event.time).to_le_bytes());
        hasher.update(&quantize(event.duration).to_le_bytes());
        hasher.update(&[event.technique as u8]);
    }
    hasher.digest()
}

fn quantize(beats: f64) -> i64 {
    (beats * 960.0).round() as i64
}
