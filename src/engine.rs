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

//! The generative composition engine.
//!
//! An [`Engine`] writes one bar at a time. For every [`Role`] independently it either plays an
//! existing candidate phrase again (usually mutated a little), or originates a new one, following
//! the rules of whichever blueprint part the bar falls in:
//!
//! 1. The role's [pool](branch::Pool) ages by one bar. Branches that have decayed below the
//!    weight floor are dropped.
//! 2. On most bars the branch the role played last is [mutated](mutation) in place.
//! 3. A branch is selected at random in proportion to its weight. Branches whose content was
//!    played recently weigh nothing. When nothing is left to select a
//!    [generator](generator::originate) originates a fresh branch.
//! 4. On the last bar of a part the roles named by the part's fill play the
//!    [fill](fill::apply) instead.
//!
//! Every random decision is drawn from a generator seeded by the session seed, the bar and the
//! role, so two engines with the same settings write the same music.
//!
//! # Examples
//!
//! ```
//! use reverie::blueprint::Library;
//! use reverie::engine::Engine;
//! use reverie::event::Role;
//! use reverie::settings::{Genre, Mood, Settings};
//!
//! let settings = Settings {
//!     mood: Mood::Melancholic,
//!     genre: Genre::Ambient,
//!     tempo: Some(75.0),
//!     seed: 42,
//!     ..Settings::default()
//! };
//! let mut engine = Engine::new(settings, &Library::builtin());
//!
//! let bar = engine.evolve(engine.bar_duration(), 0)?;
//! assert!(bar
//!     .events
//!     .iter()
//!     .any(|event| event.role == Role::Bass && event.time == 0.0));
//! # reverie::engine::Result::Ok(())
//! ```

use crate::{
    blueprint::{
        navigator::{NavigationInfo, Navigator},
        FillTechnique, Library, Register, RoleRule,
    },
    event::{Event, Role, BEATS_PER_BAR},
    seed::{self, Rng, Stream},
    settings::{DrumPattern, InstrumentChoice, Patch, Settings},
};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod branch;
pub mod fill;
pub mod generator;
pub mod mutation;

use branch::{Branch, Pool};
use generator::Context;
use mutation::{Mutation, PitchRange, MUTATION_PROBABILITY};

/// A specialized [`Result`] type for engine errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Engine::evolve`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bar duration {0}, must be a positive number of seconds")]
    InvalidBarDuration(f64),
}

/// Where a role's phrase for a bar came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// An existing branch was selected.
    Selected,
    /// A new branch was originated.
    Originated,
    /// The role has no rule in this part and only plays the part's fill.
    Fill,
}

/// What one role played in a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseInfo {
    /// The branch that was played, if any.
    pub phrase_id: Option<u64>,
    /// The mutation applied to the played branch this bar.
    pub mutation: Option<Mutation>,
    pub origin: Origin,
    pub fill: Option<FillTechnique>,
}

/// Everything the engine wrote for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarOutput {
    /// Events of every role, grouped by role.
    pub events: Vec<Event>,
    /// The instrument each role should be played with.
    pub instrument_hints: BTreeMap<Role, InstrumentChoice>,
    pub nav: NavigationInfo,
    pub tension: f64,
    pub phrases: BTreeMap<Role, PhraseInfo>,
}

impl BarOutput {
    /// The events of one role.
    pub fn role_events(&self, role: Role) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |event| event.role == role)
    }
}

#[derive(Debug, Clone, Default)]
struct RoleState {
    pool: Pool,
    rule: Option<RoleRule>,
}

/// Writes bars for one composition.
#[derive(Debug, Clone)]
pub struct Engine {
    settings: Settings,
    navigator: Navigator,
    seed: u64,
    roles: BTreeMap<Role, RoleState>,
    next_id: u64,
}

impl Engine {
    /// Creates an engine for the blueprint matching the settings' genre and mood, seeded with
    /// the settings' seed.
    pub fn new(settings: Settings, library: &Library) -> Engine {
        let seed = settings.seed;
        Engine::with_seed(settings, library, seed)
    }

    /// Creates an engine with an explicit seed. Used when a composition regenerates itself
    /// without the settings changing.
    pub fn with_seed(settings: Settings, library: &Library, seed: u64) -> Engine {
        let (blueprint, resolution) = library.resolve(settings.genre, settings.mood);
        log::info!(
            "composing {:?} ({:?} {:?}, {:?}) with seed {}",
            blueprint.name,
            blueprint.genre,
            blueprint.mood,
            resolution,
            seed
        );
        let navigator = Navigator::new(blueprint, resolution, seed, settings.intro_bars);
        Engine {
            settings,
            navigator,
            seed,
            roles: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn total_bars(&self) -> u32 {
        self.navigator.total_bars()
    }

    /// The tempo in BPM: the settings' tempo or the middle of the blueprint's tempo range.
    pub fn tempo(&self) -> f64 {
        self.settings
            .tempo
            .unwrap_or_else(|| self.navigator.blueprint().default_tempo())
    }

    /// Length of one bar in seconds at the current tempo.
    pub fn bar_duration(&self) -> f64 {
        60.0 / self.tempo() * BEATS_PER_BAR
    }

    /// Swaps in new settings without restarting the composition.
    ///
    /// Meant for tempo, density, instrument, drum pattern and texture changes. The blueprint,
    /// seed and bar layout stay as they are.
    pub fn reconfigure(&mut self, settings: Settings) {
        if settings.drum_pattern != self.settings.drum_pattern {
            if let Some(state) = self.roles.get_mut(&Role::Drums) {
                state.pool.clear();
            }
        }
        self.settings = settings;
        log::debug!("engine reconfigured");
    }

    /// The candidate pool of a role, once the role has played.
    pub fn pool(&self, role: Role) -> Option<&Pool> {
        self.roles.get(&role).map(|state| &state.pool)
    }

    /// Marks a phrase hash as recently played for a role, so that branches with that content
    /// are not selected until it leaves the history.
    pub fn suppress(&mut self, role: Role, hash: u64) {
        self.roles
            .entry(role)
            .or_default()
            .pool
            .history_mut()
            .push(hash);
    }

    /// Writes bar number `bar_count`.
    ///
    /// Fails only when `bar_duration` is not a positive number of seconds.
    pub fn evolve(&mut self, bar_duration: f64, bar_count: u32) -> Result<BarOutput> {
        if !bar_duration.is_finite() || bar_duration <= 0.0 {
            return Err(Error::InvalidBarDuration(bar_duration));
        }

        let nav = self.navigator.locate(bar_count);
        let tension = self.navigator.tension(bar_count);
        let part = self.navigator.blueprint().parts[nav.part_index].clone();
        let beat_seconds = bar_duration / BEATS_PER_BAR;
        let instrument_hints = self.instrument_hints(nav.part_index);

        let mut events = Vec::new();
        let mut phrases = BTreeMap::new();
        for &role in Role::ALL.iter() {
            if !self.is_enabled(role, &instrument_hints) {
                continue;
            }
            let rule = part.rules.get(&role).copied();
            let context = self.context(role, rule.as_ref(), tension, beat_seconds);
            let mut rng = seed::rng(self.seed, Stream::Phrase, bar_count as u64, role.index());

            let (mut phrase, mut info) = match rule {
                Some(rule) if has_entered(role, &nav) => {
                    let (phrase, info) = self.play(role, rule, &context, &mut rng);
                    (phrase, Some(info))
                }
                _ => (Vec::new(), None),
            };

            let fill = part
                .fill
                .as_ref()
                .filter(|fill| nav.is_last_bar_of_part && fill.roles.contains(&role))
                .map(|fill| fill.technique);
            if let Some(technique) = fill {
                phrase = fill::apply(technique, &context, phrase);
                let info = info.get_or_insert(PhraseInfo {
                    phrase_id: None,
                    mutation: None,
                    origin: Origin::Fill,
                    fill: None,
                });
                info.fill = Some(technique);
            }

            if let Some(info) = info {
                events.extend(phrase);
                phrases.insert(role, info);
            }
        }

        log::debug!(
            "bar {}/{} in {:?} (tension {:.2}): {} events from {} roles",
            bar_count,
            nav.total_bars,
            nav.part_id,
            tension,
            events.len(),
            phrases.len()
        );

        Ok(BarOutput {
            events,
            instrument_hints,
            nav,
            tension,
            phrases,
        })
    }

    fn play(
        &mut self,
        role: Role,
        rule: RoleRule,
        context: &Context,
        rng: &mut Rng,
    ) -> (Vec<Event>, PhraseInfo) {
        let state = self.roles.entry(role).or_default();
        if state.rule != Some(rule) {
            if state.rule.is_some() {
                log::debug!("{} switches to {:?}", role, rule.pattern);
            }
            state.pool.clear();
            state.rule = Some(rule);
        }
        state.pool.age();

        let mut mutated = None;
        if rng.random_bool(MUTATION_PROBABILITY) {
            if let Some(branch) = state.pool.current_mut() {
                let range = pitch_range(context);
                let mutation = mutation::mutate(
                    &mut branch.events,
                    role.is_pitched(),
                    &context.key,
                    range,
                    rng,
                );
                if let Some(mutation) = mutation {
                    branch.refresh();
                    mutated = Some((branch.id, mutation));
                }
            }
        }

        let (id, origin) = match state.pool.select(rng) {
            Some(id) => (id, Origin::Selected),
            None => {
                let id = self.next_id;
                self.next_id += 1;
                let events = generator::originate(rule.pattern, context, rng);
                state.pool.insert(Branch::new(id, role, events, 1.0));
                (id, Origin::Originated)
            }
        };
        state.pool.played(id);

        let events = state
            .pool
            .get(id)
            .map(|branch| branch.events.clone())
            .unwrap_or_default();
        let mutation = mutated
            .filter(|&(mutated_id, _)| mutated_id == id)
            .map(|(_, mutation)| mutation);
        let info = PhraseInfo {
            phrase_id: Some(id),
            mutation,
            origin,
            fill: None,
        };
        (events, info)
    }

    fn context(
        &self,
        role: Role,
        rule: Option<&RoleRule>,
        tension: f64,
        beat_seconds: f64,
    ) -> Context {
        let register = rule.map(|rule| rule.register).unwrap_or(Register::Mid);
        let (low, high) = rule.map(|rule| rule.density).unwrap_or((0.4, 0.6));
        let density = low + (high - low) * self.settings.density;
        Context {
            role,
            key: self.navigator.blueprint().key,
            octave: register.octave(role),
            density: (density * (0.7 + 0.6 * tension)).clamp(0.0, 1.0),
            tension,
            drum_pattern: self.settings.drum_pattern,
            pulse: self.settings.textures.pulse,
            beat_seconds,
        }
    }

    fn is_enabled(&self, role: Role, hints: &BTreeMap<Role, InstrumentChoice>) -> bool {
        if hints.get(&role) == Some(&InstrumentChoice::Silent) {
            return false;
        }
        match role {
            Role::Drums => self.settings.drum_pattern != DrumPattern::Off,
            Role::Sfx => self.settings.textures.sfx,
            Role::Harmony => self.settings.textures.harmony,
            _ => true,
        }
    }

    fn instrument_hints(&self, part_index: usize) -> BTreeMap<Role, InstrumentChoice> {
        let part = &self.navigator.blueprint().parts[part_index];
        Role::ALL
            .iter()
            .map(|&role| {
                let choice = match self.settings.instrument(role) {
                    InstrumentChoice::Auto => {
                        let options = part
                            .instrument_options(role)
                            .filter(|option| option.weight.is_finite() && option.weight > 0.0)
                            .collect::<Vec<_>>();
                        let total: f64 = options.iter().map(|option| option.weight).sum();
                        if options.is_empty() || total <= 0.0 {
                            InstrumentChoice::Synth(default_patch(role))
                        } else {
                            let mut rng = seed::rng(
                                self.seed,
                                Stream::Instrument,
                                part_index as u64,
                                role.index(),
                            );
                            let mut target = rng.random_range(0.0..total);
                            let mut choice = &options[options.len() - 1].choice;
                            for option in options.iter() {
                                if target < option.weight {
                                    choice = &option.choice;
                                    break;
                                }
                                target -= option.weight;
                            }
                            choice.clone()
                        }
                    }
                    other => other.clone(),
                };
                (role, choice)
            })
            .collect()
    }
}

/// The part progress at which a role joins in during the first part.
fn entry_point(role: Role) -> f64 {
    match role {
        Role::Bass | Role::Accompaniment => 0.0,
        Role::Harmony => 0.25,
        Role::Melody => 0.5,
        Role::Drums => 0.75,
        Role::Sfx => 0.875,
    }
}

fn has_entered(role: Role, nav: &NavigationInfo) -> bool {
    nav.part_index > 0 || nav.part_progress + 1e-9 >= entry_point(role)
}

fn pitch_range(context: &Context) -> PitchRange {
    PitchRange {
        low: context.key.pitch(-4, context.octave),
        high: context.key.pitch(11, context.octave),
    }
}

/// The patch a role plays when nothing else is chosen for it.
pub fn default_patch(role: Role) -> Patch {
    match role {
        Role::Bass => Patch::SubBass,
        Role::Accompaniment | Role::Harmony => Patch::Pad,
        Role::Melody => Patch::Bell,
        Role::Drums => Patch::Kit,
        Role::Sfx => Patch::Wash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{phrase_duration, Technique, BEAT_EPSILON};
    use crate::settings::{Genre, Mood};

    fn settings(seed: u64) -> Settings {
        Settings {
            mood: Mood::Melancholic,
            genre: Genre::Ambient,
            tempo: Some(75.0),
            seed,
            ..Settings::default()
        }
    }

    fn engine(settings: Settings) -> Engine {
        Engine::new(settings, &Library::builtin())
    }

    #[test]
    fn first_bass_phrase_starts_on_the_downbeat() {
        let mut engine = engine(settings(42));
        let bar = engine.evolve(engine.bar_duration(), 0).unwrap();
        assert!(bar
            .role_events(Role::Bass)
            .any(|event| event.time == 0.0));
    }

    #[test]
    fn rejects_invalid_bar_durations() {
        let mut engine = engine(settings(1));
        for &duration in &[0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.evolve(duration, 0),
                Err(Error::InvalidBarDuration(_))
            ));
        }
    }

    #[test]
    fn phrases_respect_the_bar_budget() {
        for &genre in Genre::ALL.iter() {
            for &mood in Mood::ALL.iter() {
                for seed in 0..3 {
                    let settings = Settings {
                        genre,
                        mood,
                        seed,
                        density: 1.0,
                        drum_pattern: DrumPattern::Breakbeat,
                        ..Settings::default()
                    };
                    let mut engine = engine(settings);
                    for bar in 0..engine.total_bars() {
                        let output = engine.evolve(engine.bar_duration(), bar).unwrap();
                        for &role in Role::ALL.iter() {
                            let events = output.role_events(role).cloned().collect::<Vec<_>>();
                            assert!(
                                phrase_duration(&events) <= BEATS_PER_BAR + BEAT_EPSILON,
                                "{:?}/{:?} bar {} {}",
                                genre,
                                mood,
                                bar,
                                role
                            );
                            assert!(events
                                .iter()
                                .all(|event| event.time >= 0.0 && event.time < BEATS_PER_BAR));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn same_settings_same_music() {
        let mut a = engine(settings(7));
        let mut b = engine(settings(7));
        for bar in 0..32 {
            assert_eq!(
                a.evolve(a.bar_duration(), bar).unwrap(),
                b.evolve(b.bar_duration(), bar).unwrap()
            );
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = engine(settings(7));
        let mut b = engine(settings(8));
        let differs = (0..16).any(|bar| {
            a.evolve(a.bar_duration(), bar).unwrap().events
                != b.evolve(b.bar_duration(), bar).unwrap().events
        });
        assert!(differs);
    }

    #[test]
    fn suppressed_branches_are_not_selected_again() {
        let mut reference = engine(settings(3));
        let mut found = None;
        for bar in 0..48 {
            let output = reference.evolve(reference.bar_duration(), bar).unwrap();
            let selected = output
                .phrases
                .iter()
                .find(|(_, info)| info.origin == Origin::Selected)
                .map(|(&role, info)| (role, info.phrase_id));
            if let Some((role, Some(id))) = selected {
                let hash = reference.pool(role).unwrap().get(id).unwrap().hash;
                found = Some((bar, role, id, hash));
                break;
            }
        }
        let (bar, role, id, hash) = found.expect("no branch was ever selected twice");

        let mut engine = engine(settings(3));
        for earlier in 0..bar {
            engine.evolve(engine.bar_duration(), earlier).unwrap();
        }
        engine.suppress(role, hash);
        let output = engine.evolve(engine.bar_duration(), bar).unwrap();
        let info = &output.phrases[&role];
        assert_ne!(info.phrase_id, Some(id));
    }

    #[test]
    fn roles_enter_one_by_one() {
        let mut engine = engine(settings(5));
        let first = engine.evolve(engine.bar_duration(), 0).unwrap();
        assert!(first.phrases.contains_key(&Role::Bass));
        assert!(!first.phrases.contains_key(&Role::Sfx));
    }

    #[test]
    fn part_endings_play_fills() {
        let mut engine = engine(settings(5));
        let last_intro_bar = engine.navigator().ranges()[0].end - 1;
        for bar in 0..last_intro_bar {
            engine.evolve(engine.bar_duration(), bar).unwrap();
        }
        let output = engine.evolve(engine.bar_duration(), last_intro_bar).unwrap();
        assert_eq!(output.phrases[&Role::Sfx].fill, Some(FillTechnique::Riser));
        assert!(output
            .role_events(Role::Sfx)
            .any(|event| event.technique == Technique::Riser));
    }

    #[test]
    fn silent_roles_play_nothing() {
        let mut settings = settings(9);
        settings
            .instruments
            .insert(Role::Bass, InstrumentChoice::Silent);
        let mut engine = engine(settings);
        for bar in 0..8 {
            let output = engine.evolve(engine.bar_duration(), bar).unwrap();
            assert_eq!(output.role_events(Role::Bass).count(), 0);
            assert_eq!(output.instrument_hints[&Role::Bass], InstrumentChoice::Silent);
        }
    }

    #[test]
    fn auto_instruments_come_from_the_blueprint() {
        let mut engine = engine(settings(9));
        let output = engine.evolve(engine.bar_duration(), 0).unwrap();
        for &role in Role::ALL.iter() {
            assert_ne!(output.instrument_hints[&role], InstrumentChoice::Auto);
        }
    }

    #[test]
    fn tempo_falls_back_to_the_blueprint() {
        let settings = Settings {
            tempo: None,
            ..settings(1)
        };
        let engine = engine(settings);
        assert_eq!(engine.tempo(), engine.navigator().blueprint().default_tempo());
    }
}
