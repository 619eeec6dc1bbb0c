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

//! The built-in blueprints.
//!
//! Each genre has one form template; moods vary the key, the tempo and a few rules on top of it.

use super::{Blueprint, BlueprintPart};
use crate::{
    event::Role,
    settings::{Genre, InstrumentChoice, Mood, Patch},
    theory::{Key, Mode},
};

use super::FillTechnique::*;
use super::PatternKind::*;
use super::Register::*;

/// The blueprint used when nothing else matches. Always valid.
pub fn default_blueprint() -> Blueprint {
    ambient("default", Mood::Calm, Key::new(2, Mode::Dorian), (60.0, 80.0))
}

pub(super) fn builtin() -> Vec<Blueprint> {
    vec![
        ambient("still water", Mood::Calm, Key::new(0, Mode::Lydian), (58.0, 76.0)),
        ambient("grey hours", Mood::Melancholic, Key::new(9, Mode::Aeolian), (64.0, 82.0)),
        ambient("undertow", Mood::Dark, Key::new(4, Mode::Phrygian), (54.0, 70.0)),
        ambient("glass clouds", Mood::Dreamy, Key::new(5, Mode::Lydian), (60.0, 78.0)),
        ambient("lanterns", Mood::Mysterious, Key::new(2, Mode::Dorian), (60.0, 74.0)),
        lofi("tea steam", Mood::Calm, Key::new(5, Mode::MajorPentatonic), (72.0, 86.0)),
        lofi("rain on tin", Mood::Melancholic, Key::new(4, Mode::Dorian), (70.0, 84.0)),
        trance("first light", Mood::Uplifting, Key::new(7, Mode::Mixolydian), (128.0, 138.0)),
        trance("summit", Mood::Epic, Key::new(9, Mode::Aeolian), (132.0, 140.0)),
        cinematic("monolith", Mood::Epic, Key::new(2, Mode::Aeolian), (80.0, 100.0)),
        cinematic("catacombs", Mood::Dark, Key::new(11, Mode::Phrygian), (70.0, 90.0)),
        progressive("night market", Mood::Mysterious, Key::new(1, Mode::Dorian), (112.0, 124.0)),
        progressive("open road", Mood::Uplifting, Key::new(2, Mode::Ionian), (116.0, 126.0)),
    ]
}

fn ambient(name: &str, mood: Mood, key: Key, tempo: (f64, f64)) -> Blueprint {
    let melody = if matches!(mood, Mood::Dark | Mood::Mysterious) {
        Walk
    } else {
        Motif
    };
    let parts = vec![
        pads(BlueprintPart::new("intro", 15.0, 0.15))
            .rule(Role::Bass, Drone, Low, (0.1, 0.3))
            .rule(Role::Accompaniment, Drone, Mid, (0.1, 0.3))
            .rule(Role::Sfx, Texture, High, (0.05, 0.15))
            .fill(Riser, &[Role::Sfx]),
        pads(BlueprintPart::new("bloom", 30.0, 0.4))
            .rule(Role::Bass, Drone, Low, (0.2, 0.4))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.3, 0.6))
            .rule(Role::Harmony, Drone, Mid, (0.1, 0.3))
            .rule(Role::Melody, melody, Mid, (0.2, 0.5))
            .rule(Role::Drums, Beat, Mid, (0.1, 0.3))
            .fill(FilterSweep, &[Role::Accompaniment]),
        pads(BlueprintPart::new("drift", 35.0, 0.6))
            .rule(Role::Bass, Walk, Low, (0.2, 0.5))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.4, 0.7))
            .rule(Role::Harmony, Drone, High, (0.2, 0.4))
            .rule(Role::Melody, Walk, High, (0.3, 0.6))
            .rule(Role::Drums, Beat, Mid, (0.2, 0.4))
            .rule(Role::Sfx, Texture, High, (0.1, 0.2))
            .fill(Crescendo, &[Role::Melody, Role::Harmony]),
        pads(BlueprintPart::new("fade", 20.0, 0.2))
            .rule(Role::Bass, Drone, Low, (0.1, 0.2))
            .rule(Role::Accompaniment, Drone, Mid, (0.1, 0.3))
            .rule(Role::Sfx, Texture, High, (0.05, 0.15))
            .fill(DropOut, &[Role::Accompaniment]),
    ];
    Blueprint {
        name: name.to_owned(),
        genre: Genre::Ambient,
        mood,
        key,
        tempo,
        bars: (32, 56),
        parts,
    }
}

fn lofi(name: &str, mood: Mood, key: Key, tempo: (f64, f64)) -> Blueprint {
    let parts = vec![
        keys(BlueprintPart::new("intro", 12.0, 0.2))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.3, 0.5))
            .rule(Role::Bass, Riff, Low, (0.2, 0.4))
            .fill(Roll, &[Role::Drums]),
        keys(BlueprintPart::new("verse", 30.0, 0.45))
            .rule(Role::Bass, Riff, Low, (0.4, 0.6))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.4, 0.6))
            .rule(Role::Melody, Motif, Mid, (0.3, 0.5))
            .rule(Role::Drums, Beat, Mid, (0.5, 0.8))
            .rule(Role::Sfx, Texture, High, (0.05, 0.1))
            .fill(Roll, &[Role::Drums]),
        keys(BlueprintPart::new("bridge", 20.0, 0.55))
            .rule(Role::Bass, Walk, Low, (0.3, 0.5))
            .rule(Role::Accompaniment, Drone, Mid, (0.2, 0.4))
            .rule(Role::Harmony, Drone, Mid, (0.2, 0.3))
            .rule(Role::Melody, Walk, High, (0.3, 0.6))
            .rule(Role::Drums, Beat, Mid, (0.3, 0.5))
            .fill(FilterSweep, &[Role::Accompaniment]),
        keys(BlueprintPart::new("verse again", 28.0, 0.5))
            .rule(Role::Bass, Riff, Low, (0.4, 0.6))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.4, 0.6))
            .rule(Role::Melody, Motif, High, (0.4, 0.6))
            .rule(Role::Drums, Beat, Mid, (0.5, 0.8))
            .fill(DropOut, &[Role::Drums]),
        keys(BlueprintPart::new("outro", 10.0, 0.2))
            .rule(Role::Bass, Drone, Low, (0.1, 0.3))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.2, 0.4)),
    ];
    Blueprint {
        name: name.to_owned(),
        genre: Genre::Lofi,
        mood,
        key,
        tempo,
        bars: (32, 48),
        parts,
    }
}

fn trance(name: &str, mood: Mood, key: Key, tempo: (f64, f64)) -> Blueprint {
    let parts = vec![
        leads(BlueprintPart::new("intro", 15.0, 0.3))
            .rule(Role::Drums, Beat, Mid, (0.6, 0.8))
            .rule(Role::Bass, Riff, Low, (0.5, 0.7))
            .fill(Roll, &[Role::Drums]),
        leads(BlueprintPart::new("build", 20.0, 0.6))
            .rule(Role::Drums, Beat, Mid, (0.7, 0.9))
            .rule(Role::Bass, Riff, Low, (0.6, 0.8))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.6, 0.9))
            .rule(Role::Sfx, Texture, High, (0.1, 0.2))
            .fill(Crescendo, &[Role::Accompaniment, Role::Sfx]),
        leads(BlueprintPart::new("peak", 30.0, 0.9))
            .rule(Role::Drums, Beat, Mid, (0.8, 1.0))
            .rule(Role::Bass, Riff, Low, (0.7, 0.9))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.7, 1.0))
            .rule(Role::Harmony, Drone, High, (0.3, 0.5))
            .rule(Role::Melody, Motif, High, (0.5, 0.8))
            .fill(FilterSweep, &[Role::Accompaniment]),
        leads(BlueprintPart::new("breakdown", 20.0, 0.4))
            .rule(Role::Accompaniment, Drone, Mid, (0.2, 0.4))
            .rule(Role::Harmony, Drone, Mid, (0.2, 0.4))
            .rule(Role::Melody, Motif, Mid, (0.3, 0.5))
            .rule(Role::Sfx, Texture, High, (0.1, 0.3))
            .fill(Riser, &[Role::Sfx]),
        leads(BlueprintPart::new("outro", 15.0, 0.3))
            .rule(Role::Drums, Beat, Mid, (0.5, 0.7))
            .rule(Role::Bass, Riff, Low, (0.4, 0.6))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.3, 0.5)),
    ];
    Blueprint {
        name: name.to_owned(),
        genre: Genre::Trance,
        mood,
        key,
        tempo,
        bars: (48, 72),
        parts,
    }
}

fn cinematic(name: &str, mood: Mood, key: Key, tempo: (f64, f64)) -> Blueprint {
    let parts = vec![
        pads(BlueprintPart::new("prologue", 20.0, 0.2))
            .rule(Role::Bass, Drone, Low, (0.1, 0.3))
            .rule(Role::Harmony, Drone, Mid, (0.1, 0.2))
            .rule(Role::Sfx, Texture, Mid, (0.1, 0.2)),
        pads(BlueprintPart::new("rising", 30.0, 0.55))
            .rule(Role::Bass, Walk, Low, (0.3, 0.5))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.4, 0.7))
            .rule(Role::Harmony, Drone, Mid, (0.2, 0.4))
            .rule(Role::Melody, Motif, Mid, (0.3, 0.5))
            .rule(Role::Drums, Beat, Low, (0.2, 0.4))
            .fill(Roll, &[Role::Drums]),
        pads(BlueprintPart::new("climax", 30.0, 0.95))
            .rule(Role::Bass, Riff, Low, (0.5, 0.8))
            .rule(Role::Accompaniment, Arpeggio, High, (0.6, 0.9))
            .rule(Role::Harmony, Drone, High, (0.3, 0.5))
            .rule(Role::Melody, Motif, High, (0.5, 0.7))
            .rule(Role::Drums, Beat, Mid, (0.5, 0.8))
            .fill(Crescendo, &[Role::Melody, Role::Accompaniment]),
        pads(BlueprintPart::new("epilogue", 20.0, 0.25))
            .rule(Role::Bass, Drone, Low, (0.1, 0.2))
            .rule(Role::Harmony, Drone, Mid, (0.1, 0.3))
            .rule(Role::Melody, Walk, Mid, (0.1, 0.3))
            .fill(DropOut, &[Role::Melody]),
    ];
    Blueprint {
        name: name.to_owned(),
        genre: Genre::Cinematic,
        mood,
        key,
        tempo,
        bars: (32, 48),
        parts,
    }
}

fn progressive(name: &str, mood: Mood, key: Key, tempo: (f64, f64)) -> Blueprint {
    let parts = vec![
        leads(BlueprintPart::new("groove", 20.0, 0.3))
            .rule(Role::Drums, Beat, Mid, (0.5, 0.7))
            .rule(Role::Bass, Riff, Low, (0.4, 0.6))
            .rule(Role::Sfx, Texture, High, (0.05, 0.1)),
        leads(BlueprintPart::new("layers", 25.0, 0.5))
            .rule(Role::Drums, Beat, Mid, (0.6, 0.8))
            .rule(Role::Bass, Riff, Low, (0.5, 0.7))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.5, 0.8))
            .rule(Role::Melody, Walk, Mid, (0.2, 0.4))
            .fill(FilterSweep, &[Role::Accompaniment]),
        leads(BlueprintPart::new("journey", 35.0, 0.75))
            .rule(Role::Drums, Beat, Mid, (0.6, 0.9))
            .rule(Role::Bass, Walk, Low, (0.5, 0.7))
            .rule(Role::Accompaniment, Arpeggio, Mid, (0.6, 0.9))
            .rule(Role::Harmony, Drone, High, (0.2, 0.4))
            .rule(Role::Melody, Motif, High, (0.4, 0.7))
            .fill(Roll, &[Role::Drums]),
        leads(BlueprintPart::new("landing", 20.0, 0.35))
            .rule(Role::Drums, Beat, Mid, (0.4, 0.6))
            .rule(Role::Bass, Riff, Low, (0.3, 0.5))
            .rule(Role::Accompaniment, Drone, Mid, (0.2, 0.4)),
    ];
    Blueprint {
        name: name.to_owned(),
        genre: Genre::Progressive,
        mood,
        key,
        tempo,
        bars: (48, 64),
        parts,
    }
}

fn pads(part: BlueprintPart) -> BlueprintPart {
    part.instrument(Role::Bass, synth(Patch::SubBass), 2.0)
        .instrument(Role::Bass, synth(Patch::Drone), 1.0)
        .instrument(Role::Accompaniment, synth(Patch::Pad), 3.0)
        .instrument(Role::Accompaniment, synth(Patch::Organ), 1.0)
        .instrument(Role::Harmony, synth(Patch::Pad), 1.0)
        .instrument(Role::Melody, synth(Patch::Bell), 2.0)
        .instrument(Role::Melody, synth(Patch::Pluck), 1.0)
        .instrument(Role::Drums, synth(Patch::Kit), 1.0)
        .instrument(Role::Sfx, synth(Patch::Wash), 1.0)
}

fn keys(part: BlueprintPart) -> BlueprintPart {
    part.instrument(Role::Bass, synth(Patch::Bass), 1.0)
        .instrument(Role::Accompaniment, InstrumentChoice::Sample("rhodes".to_owned()), 2.0)
        .instrument(Role::Accompaniment, synth(Patch::Organ), 1.0)
        .instrument(Role::Harmony, synth(Patch::Pad), 1.0)
        .instrument(Role::Melody, InstrumentChoice::Sample("felt-piano".to_owned()), 1.0)
        .instrument(Role::Melody, synth(Patch::Pluck), 1.0)
        .instrument(Role::Drums, synth(Patch::Kit), 1.0)
        .instrument(Role::Sfx, synth(Patch::Wash), 1.0)
}

fn leads(part: BlueprintPart) -> BlueprintPart {
    part.instrument(Role::Bass, synth(Patch::Bass), 2.0)
        .instrument(Role::Bass, synth(Patch::SubBass), 1.0)
        .instrument(Role::Accompaniment, synth(Patch::Pluck), 2.0)
        .instrument(Role::Accompaniment, synth(Patch::Pad), 1.0)
        .instrument(Role::Harmony, synth(Patch::Pad), 1.0)
        .instrument(Role::Melody, synth(Patch::Lead), 3.0)
        .instrument(Role::Melody, synth(Patch::Bell), 1.0)
        .instrument(Role::Drums, synth(Patch::Kit), 1.0)
        .instrument(Role::Sfx, synth(Patch::Wash), 1.0)
}

fn synth(patch: Patch) -> InstrumentChoice {
    InstrumentChoice::Synth(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_blueprints_are_well_formed() {
        for blueprint in builtin().into_iter().chain(Some(default_blueprint())) {
            assert!(!blueprint.parts.is_empty(), "{}", blueprint.name);
            assert!(blueprint.bars.0 as usize >= blueprint.parts.len());
            assert!(blueprint.tempo.0 < blueprint.tempo.1);
            for part in blueprint.parts.iter() {
                assert!(part.percent > 0.0);
                assert!((0.0..=1.0).contains(&part.tension));
                for rule in part.rules.values() {
                    assert!(rule.density.0 <= rule.density.1);
                }
            }
        }
    }

    #[test]
    fn ambient_intro_starts_with_bass() {
        for blueprint in builtin()
            .into_iter()
            .filter(|blueprint| blueprint.genre == Genre::Ambient)
        {
            assert!(blueprint.parts[0].rules.contains_key(&Role::Bass));
        }
    }
}
