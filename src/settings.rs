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

//! Session settings.
//!
//! [`Settings`] is the snapshot a host hands to the composer. It is deliberately plain data so it
//! can be loaded from JSON, stored by the host, and diffed. [`SettingsUpdate`] is the partial
//! variant used while a session is running; [`Settings::apply`] merges one in and reports which
//! aspects changed so the composer can decide between reconfiguring the live engine and starting
//! over.
//!
//! # Examples
//!
//! ```
//! use reverie::settings::{Genre, Mood, Settings, SettingsUpdate};
//!
//! let mut settings = Settings::from_json(r#"{"mood": "melancholic", "tempo": 75, "seed": 42}"#)?;
//! assert_eq!(settings.mood, Mood::Melancholic);
//! assert_eq!(settings.genre, Genre::Ambient);
//!
//! let changes = settings.apply(&SettingsUpdate::from_json(r#"{"density": 0.8}"#)?)?;
//! assert!(changes.density);
//! assert!(!changes.is_structural());
//! # reverie::settings::Result::Ok(())
//! ```

use crate::event::Role;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, path::Path, path::PathBuf};
use thiserror::Error;

/// Lowest accepted tempo in beats per minute.
pub const MIN_TEMPO: f64 = 20.0;

/// Highest accepted tempo in beats per minute.
pub const MAX_TEMPO: f64 = 300.0;

/// Longest accepted intro, in bars.
pub const MAX_INTRO_BARS: u32 = 64;

/// A specialized [`Result`] type for settings operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned when settings cannot be loaded or are out of range.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tempo must be a finite value between 20 and 300 BPM, got {0}")]
    InvalidTempo(f64),
    #[error("density must be between 0 and 1, got {0}")]
    InvalidDensity(f64),
    #[error("intro may be at most 64 bars, got {0}")]
    InvalidIntroBars(u32),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read settings from {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// The emotional colour of a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Calm,
    Melancholic,
    Dark,
    Dreamy,
    Uplifting,
    Mysterious,
    Epic,
}

impl Mood {
    pub const ALL: [Mood; 7] = [
        Mood::Calm,
        Mood::Melancholic,
        Mood::Dark,
        Mood::Dreamy,
        Mood::Uplifting,
        Mood::Mysterious,
        Mood::Epic,
    ];
}

/// The stylistic family a composition is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Ambient,
    Lofi,
    Trance,
    Cinematic,
    Progressive,
}

impl Genre {
    pub const ALL: [Genre; 5] = [
        Genre::Ambient,
        Genre::Lofi,
        Genre::Trance,
        Genre::Cinematic,
        Genre::Progressive,
    ];
}

/// Which rhythm family the drum role plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumPattern {
    /// No drums at all.
    Off,
    /// A heartbeat kick and little else.
    Sparse,
    Downtempo,
    FourOnTheFloor,
    Breakbeat,
}

/// Built-in synthesizer patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Patch {
    Pad,
    Pluck,
    Bass,
    SubBass,
    Lead,
    Bell,
    Organ,
    Drone,
    Kit,
    Wash,
}

/// What should play a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentChoice {
    /// Let the blueprint pick.
    Auto,
    /// Mute the role.
    Silent,
    /// One of the built-in synthesizer patches.
    Synth(Patch),
    /// A sample instrument, identified by a name the host's sample loader understands.
    Sample(String),
}

impl Default for InstrumentChoice {
    fn default() -> InstrumentChoice {
        InstrumentChoice::Auto
    }
}

/// Optional layers of the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Textures {
    /// Sound effect layer.
    pub sfx: bool,
    /// Harmony layer above the accompaniment.
    pub harmony: bool,
    /// Let accompaniment and melody use the pulse arpeggiator.
    pub pulse: bool,
}

impl Default for Textures {
    fn default() -> Textures {
        Textures {
            sfx: true,
            harmony: true,
            pulse: true,
        }
    }
}

/// A snapshot of everything the composer needs to know about a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mood: Mood,
    pub genre: Genre,
    /// Beats per minute. `None` lets the blueprint choose.
    pub tempo: Option<f64>,
    /// Overall note density between 0 and 1.
    pub density: f64,
    /// Per-role instrument choice. Missing roles default to [`InstrumentChoice::Auto`].
    pub instruments: BTreeMap<Role, InstrumentChoice>,
    pub drum_pattern: DrumPattern,
    pub textures: Textures,
    pub seed: u64,
    /// Length of the build-up intro in bars. Zero lets the blueprint decide.
    pub intro_bars: u32,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            mood: Mood::Calm,
            genre: Genre::Ambient,
            tempo: None,
            density: 0.5,
            instruments: BTreeMap::new(),
            drum_pattern: DrumPattern::Sparse,
            textures: Textures::default(),
            seed: 1,
            intro_bars: 4,
        }
    }
}

impl Settings {
    /// Parses and validates settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Settings> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads and validates settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        Settings::from_json(&json)
    }

    /// Checks that every numeric field is within range.
    pub fn validate(&self) -> Result<()> {
        if let Some(tempo) = self.tempo {
            validate_tempo(tempo)?;
        }
        validate_density(self.density)?;
        if self.intro_bars > MAX_INTRO_BARS {
            return Err(Error::InvalidIntroBars(self.intro_bars));
        }
        Ok(())
    }

    /// The instrument choice for a role.
    pub fn instrument(&self, role: Role) -> &InstrumentChoice {
        const AUTO: &InstrumentChoice = &InstrumentChoice::Auto;
        self.instruments.get(&role).unwrap_or(AUTO)
    }

    /// Merges a partial update into these settings.
    ///
    /// The update is validated before anything is changed, so on error the settings are left
    /// untouched. Fields that are present but equal to the current value are not reported as
    /// changed.
    pub fn apply(&mut self, update: &SettingsUpdate) -> Result<Changes> {
        if let Some(Some(tempo)) = update.tempo {
            validate_tempo(tempo)?;
        }
        if let Some(density) = update.density {
            validate_density(density)?;
        }
        if let Some(intro_bars) = update.intro_bars {
            if intro_bars > MAX_INTRO_BARS {
                return Err(Error::InvalidIntroBars(intro_bars));
            }
        }

        let mut changes = Changes {
            mood: replace(&mut self.mood, update.mood),
            genre: replace(&mut self.genre, update.genre),
            seed: replace(&mut self.seed, update.seed),
            intro_bars: replace(&mut self.intro_bars, update.intro_bars),
            tempo: replace(&mut self.tempo, update.tempo),
            density: replace(&mut self.density, update.density),
            drum_pattern: replace(&mut self.drum_pattern, update.drum_pattern),
            textures: replace(&mut self.textures, update.textures),
            instruments: false,
        };
        if let Some(instruments) = &update.instruments {
            for (role, choice) in instruments {
                if self.instruments.get(role) != Some(choice) {
                    self.instruments.insert(*role, choice.clone());
                    changes.instruments = true;
                }
            }
        }
        Ok(changes)
    }
}

/// A partial settings change. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub mood: Option<Mood>,
    pub genre: Option<Genre>,
    /// `Some(None)` hands the tempo back to the blueprint.
    #[serde(deserialize_with = "present")]
    pub tempo: Option<Option<f64>>,
    pub density: Option<f64>,
    /// Roles listed here are changed; other roles keep their choice.
    pub instruments: Option<BTreeMap<Role, InstrumentChoice>>,
    pub drum_pattern: Option<DrumPattern>,
    pub textures: Option<Textures>,
    pub seed: Option<u64>,
    pub intro_bars: Option<u32>,
}

impl SettingsUpdate {
    pub fn from_json(json: &str) -> Result<SettingsUpdate> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn mood(mut self, mood: Mood) -> SettingsUpdate {
        self.mood = Some(mood);
        self
    }

    pub fn genre(mut self, genre: Genre) -> SettingsUpdate {
        self.genre = Some(genre);
        self
    }

    pub fn tempo(mut self, tempo: f64) -> SettingsUpdate {
        self.tempo = Some(Some(tempo));
        self
    }

    pub fn density(mut self, density: f64) -> SettingsUpdate {
        self.density = Some(density);
        self
    }

    pub fn instrument(mut self, role: Role, choice: InstrumentChoice) -> SettingsUpdate {
        self.instruments
            .get_or_insert_with(BTreeMap::new)
            .insert(role, choice);
        self
    }

    pub fn seed(mut self, seed: u64) -> SettingsUpdate {
        self.seed = Some(seed);
        self
    }
}

/// Which aspects of the settings an update actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub mood: bool,
    pub genre: bool,
    pub seed: bool,
    pub intro_bars: bool,
    pub tempo: bool,
    pub density: bool,
    pub instruments: bool,
    pub drum_pattern: bool,
    pub textures: bool,
}

impl Changes {
    /// Changes that invalidate the current composition and require starting a new one.
    pub fn is_structural(&self) -> bool {
        self.mood || self.genre || self.seed || self.intro_bars
    }

    pub fn is_empty(&self) -> bool {
        *self == Changes::default()
    }
}

fn replace<T: PartialEq>(current: &mut T, update: Option<T>) -> bool {
    match update {
        Some(value) if *current != value => {
            *current = value;
            true
        }
        _ => false,
    }
}

fn validate_tempo(tempo: f64) -> Result<()> {
    if tempo.is_finite() && (MIN_TEMPO..=MAX_TEMPO).contains(&tempo) {
        Ok(())
    } else {
        Err(Error::InvalidTempo(tempo))
    }
}

fn validate_density(density: f64) -> Result<()> {
    if (0.0..=1.0).contains(&density) {
        Ok(())
    } else {
        Err(Error::InvalidDensity(density))
    }
}

// Distinguishes `"tempo": null` (reset to the blueprint tempo) from an absent field.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn rejects_out_of_range_tempo() {
        let err = Settings::from_json(r#"{"tempo": 900}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidTempo(_)));
    }

    #[test]
    fn instrument_choices_round_trip_through_json() {
        let settings = Settings::from_json(
            r#"{"instruments": {"bass": {"synth": "sub_bass"}, "melody": {"sample": "felt-piano"}}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.instrument(Role::Bass),
            &InstrumentChoice::Synth(Patch::SubBass)
        );
        assert_eq!(
            settings.instrument(Role::Melody),
            &InstrumentChoice::Sample("felt-piano".to_owned())
        );
        assert_eq!(settings.instrument(Role::Drums), &InstrumentChoice::Auto);
    }

    #[test]
    fn apply_reports_only_real_changes() {
        let mut settings = Settings::default();
        let changes = settings
            .apply(&SettingsUpdate::default().mood(Mood::Calm).tempo(90.0))
            .unwrap();
        assert!(!changes.mood);
        assert!(changes.tempo);
        assert!(!changes.is_structural());
        assert_eq!(settings.tempo, Some(90.0));
    }

    #[test]
    fn mood_change_is_structural() {
        let mut settings = Settings::default();
        let changes = settings
            .apply(&SettingsUpdate::default().mood(Mood::Dark))
            .unwrap();
        assert!(changes.is_structural());
    }

    #[test]
    fn invalid_update_leaves_settings_untouched() {
        let mut settings = Settings::default();
        let update = SettingsUpdate::default().mood(Mood::Epic).density(3.0);
        assert!(settings.apply(&update).is_err());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn null_tempo_hands_control_back_to_the_blueprint() {
        let mut settings = Settings::default();
        settings.tempo = Some(100.0);
        let update = SettingsUpdate::from_json(r#"{"tempo": null}"#).unwrap();
        assert_eq!(update.tempo, Some(None));
        assert!(settings.apply(&update).unwrap().tempo);
        assert_eq!(settings.tempo, None);
    }
}
