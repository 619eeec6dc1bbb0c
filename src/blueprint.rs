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

//! Declarative song structure.
//!
//! A [`Blueprint`] describes the form of one composition: the key it is in, the tempo range it
//! is comfortable at, and an ordered list of [`BlueprintPart`]s. Each part gets a share of the
//! composition's total length and a set of per-role rules that tell the engine how busy each role
//! should be, where in the register it sits, and which kind of generator feeds it.
//!
//! Blueprints are picked by `(genre, mood)` from a [`Library`]. Resolution never fails: when no
//! blueprint matches exactly the library falls back to the mood's blueprint in the default genre
//! ([`DEFAULT_GENRE`]) and finally to a built-in default blueprint.
//!
//! Parts are built with a small [builder interface]:
//!
//! ```
//! use reverie::blueprint::{BlueprintPart, FillTechnique, PatternKind, Register};
//! use reverie::event::Role;
//!
//! let part = BlueprintPart::new("intro", 20.0, 0.2)
//!     .rule(Role::Bass, PatternKind::Drone, Register::Low, (0.2, 0.4))
//!     .rule(Role::Accompaniment, PatternKind::Drone, Register::Mid, (0.1, 0.3))
//!     .fill(FillTechnique::Riser, &[Role::Sfx]);
//!
//! assert!(part.rules.contains_key(&Role::Bass));
//! ```
//!
//! [builder interface]: https://rust-unofficial.github.io/patterns/patterns/builder.html

use crate::{
    event::Role,
    settings::{Genre, InstrumentChoice, Mood},
    theory::Key,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod library;
pub mod navigator;

/// Genre searched when a mood has no blueprint in the requested genre.
pub const DEFAULT_GENRE: Genre = Genre::Ambient;

/// Where in its range a role should sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Register {
    Low,
    Mid,
    High,
}

impl Register {
    /// The octave a role's phrases are centred on.
    pub fn octave(self, role: Role) -> i32 {
        let base = match role {
            Role::Bass => 2,
            Role::Accompaniment => 3,
            Role::Harmony | Role::Melody => 4,
            Role::Sfx => 5,
            Role::Drums => 0,
        };
        match self {
            Register::Low => base - 1,
            Register::Mid => base,
            Register::High => base + 1,
        }
    }
}

/// The family of generator that originates new phrases for a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Long held tones.
    Drone,
    /// Stepwise random walk through the scale.
    Walk,
    /// A short motif and its answer.
    Motif,
    /// A looped figure from the riff table.
    Riff,
    /// Broken chord.
    Arpeggio,
    /// Drum groove from the settings' drum pattern.
    Beat,
    /// Sparse, high, atmospheric events.
    Texture,
}

/// How one role behaves inside one part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoleRule {
    /// Density range. The session density setting picks a point inside it.
    pub density: (f64, f64),
    pub register: Register,
    pub pattern: PatternKind,
}

/// A weighted instrument candidate for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentOption {
    pub role: Role,
    pub choice: InstrumentChoice,
    pub weight: f64,
}

/// The technique used on the final bar of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTechnique {
    Roll,
    Crescendo,
    FilterSweep,
    Riser,
    /// The role falls silent for the last bar.
    DropOut,
}

/// What happens when a part is about to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillSpec {
    pub technique: FillTechnique,
    pub roles: Vec<Role>,
}

/// A named structural segment of a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlueprintPart {
    pub id: String,
    /// Share of the total length, as a percentage. Shares are normalized, so they need not sum
    /// to exactly 100.
    pub percent: f64,
    /// Baseline tension of this part between 0 and 1.
    pub tension: f64,
    /// Roles without a rule are silent in this part.
    pub rules: BTreeMap<Role, RoleRule>,
    pub instruments: Vec<InstrumentOption>,
    pub fill: Option<FillSpec>,
}

impl BlueprintPart {
    pub fn new(id: impl Into<String>, percent: f64, tension: f64) -> BlueprintPart {
        BlueprintPart {
            id: id.into(),
            percent,
            tension,
            rules: BTreeMap::new(),
            instruments: Vec::new(),
            fill: None,
        }
    }

    pub fn rule(
        mut self,
        role: Role,
        pattern: PatternKind,
        register: Register,
        density: (f64, f64),
    ) -> BlueprintPart {
        self.rules.insert(
            role,
            RoleRule {
                density,
                register,
                pattern,
            },
        );
        self
    }

    pub fn instrument(mut self, role: Role, choice: InstrumentChoice, weight: f64) -> BlueprintPart {
        self.instruments.push(InstrumentOption {
            role,
            choice,
            weight,
        });
        self
    }

    pub fn fill(mut self, technique: FillTechnique, roles: &[Role]) -> BlueprintPart {
        self.fill = Some(FillSpec {
            technique,
            roles: roles.to_vec(),
        });
        self
    }

    /// The instrument candidates for one role.
    pub fn instrument_options(&self, role: Role) -> impl Iterator<Item = &InstrumentOption> {
        self.instruments
            .iter()
            .filter(move |option| option.role == role)
    }
}

/// The structural description of a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub name: String,
    pub genre: Genre,
    pub mood: Mood,
    pub key: Key,
    /// Comfortable tempo range in BPM. Sessions without an explicit tempo use its midpoint.
    pub tempo: (f64, f64),
    /// Range the total length in bars is picked from.
    pub bars: (u32, u32),
    pub parts: Vec<BlueprintPart>,
}

impl Blueprint {
    pub fn default_tempo(&self) -> f64 {
        (self.tempo.0 + self.tempo.1) / 2.0
    }
}

/// How closely a resolved blueprint matches the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Genre and mood both matched.
    Exact,
    /// The mood matched in [`DEFAULT_GENRE`].
    MoodDefault,
    /// Nothing matched; the built-in default blueprint was used.
    Fallback,
}

/// A collection of blueprints searchable by genre and mood.
#[derive(Debug, Clone, Default)]
pub struct Library {
    blueprints: Vec<Blueprint>,
}

impl Library {
    /// An empty library. Every lookup resolves to the default blueprint.
    pub fn empty() -> Library {
        Library::default()
    }

    /// The library of built-in blueprints.
    pub fn builtin() -> Library {
        Library {
            blueprints: library::builtin(),
        }
    }

    /// Adds a blueprint. Blueprints added later win over earlier ones with the same genre and
    /// mood.
    pub fn insert(&mut self, blueprint: Blueprint) {
        self.blueprints.push(blueprint);
    }

    pub fn len(&self) -> usize {
        self.blueprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blueprints.is_empty()
    }

    /// Finds the blueprint for a genre and mood, falling back as described in the [module
    /// level documentation](self).
    pub fn resolve(&self, genre: Genre, mood: Mood) -> (Blueprint, Resolution) {
        if let Some(blueprint) = self.find(genre, mood) {
            return (blueprint.clone(), Resolution::Exact);
        }
        if let Some(blueprint) = self.find(DEFAULT_GENRE, mood) {
            log::debug!(
                "no blueprint for {:?}/{:?}, using {:?} {:?}",
                genre,
                mood,
                DEFAULT_GENRE,
                mood
            );
            return (blueprint.clone(), Resolution::MoodDefault);
        }
        log::debug!(
            "no blueprint for {:?}/{:?}, using the default blueprint",
            genre,
            mood
        );
        (library::default_blueprint(), Resolution::Fallback)
    }

    fn find(&self, genre: Genre, mood: Mood) -> Option<&Blueprint> {
        self.blueprints
            .iter()
            .rev()
            .find(|blueprint| blueprint.genre == genre && blueprint.mood == mood)
            .filter(|blueprint| is_usable(blueprint))
    }
}

fn is_usable(blueprint: &Blueprint) -> bool {
    !blueprint.parts.is_empty()
        && blueprint
            .parts
            .iter()
            .all(|part| part.percent.is_finite() && part.percent >= 0.0)
        && blueprint.parts.iter().any(|part| part.percent > 0.0)
        && blueprint.bars.0 <= blueprint.bars.1
}
