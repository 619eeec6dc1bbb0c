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

//! Fills for the last bar of a part.

use super::generator::{Context, HIT_LENGTH};
use crate::{
    blueprint::FillTechnique,
    event::{normalize_phrase, Event, Role, Technique, BEATS_PER_BAR, SNARE},
};

/// Rewrites a role's phrase for the last bar of a part.
///
/// `phrase` is what the role would otherwise have played. It may be empty when the role has no
/// rule in the part, in which case the fill brings its own material.
pub fn apply(technique: FillTechnique, context: &Context, phrase: Vec<Event>) -> Vec<Event> {
    let mut events = match technique {
        FillTechnique::Roll => roll(context, phrase),
        FillTechnique::Crescendo => crescendo(context, phrase),
        FillTechnique::FilterSweep => sweep(context, phrase),
        FillTechnique::Riser => riser(context),
        FillTechnique::DropOut => Vec::new(),
    };
    normalize_phrase(&mut events);
    events
}

fn held(context: &Context, technique: Technique) -> Event {
    let pitch = if context.role.is_pitched() {
        context.key.pitch(0, context.octave)
    } else {
        SNARE
    };
    Event::new(context.role, pitch, 0.0, BEATS_PER_BAR)
        .velocity(0.5)
        .technique(technique)
}

/// Keeps the first half of the phrase and rolls through the second with rising velocity.
fn roll(context: &Context, phrase: Vec<Event>) -> Vec<Event> {
    let (pitch, step) = if context.role.is_pitched() {
        (context.key.pitch(0, context.octave), 0.5)
    } else {
        (SNARE, 0.25)
    };
    let length = if context.role.is_pitched() {
        step * 0.5
    } else {
        HIT_LENGTH
    };

    let mut events = phrase
        .into_iter()
        .filter(|event| event.time < 2.0)
        .collect::<Vec<_>>();
    let hits = (2.0 / step) as usize;
    for i in 0..hits {
        let progress = i as f64 / hits as f64;
        events.push(
            Event::new(context.role, pitch, 2.0 + i as f64 * step, length)
                .velocity(0.4 + 0.5 * progress)
                .technique(Technique::Roll),
        );
    }
    events
}

fn crescendo(context: &Context, phrase: Vec<Event>) -> Vec<Event> {
    let mut events = if phrase.is_empty() {
        vec![held(context, Technique::Crescendo)]
    } else {
        phrase
    };
    for event in events.iter_mut() {
        let progress = event.time / BEATS_PER_BAR;
        event.velocity = (event.velocity * (0.5 + 0.7 * progress)).min(1.0);
        event.technique = Technique::Crescendo;
    }
    events
}

fn sweep(context: &Context, phrase: Vec<Event>) -> Vec<Event> {
    let mut events = if phrase.is_empty() {
        vec![held(context, Technique::FilterSweep)]
    } else {
        phrase
    };
    for event in events.iter_mut() {
        event.hint.brightness = 0.1 + 0.9 * (event.end() / BEATS_PER_BAR).min(1.0);
        event.technique = Technique::FilterSweep;
    }
    events
}

fn riser(context: &Context) -> Vec<Event> {
    let mut event = held(context, Technique::Riser);
    if context.role.is_pitched() {
        event.pitch = context.key.pitch(0, context.octave + 1);
    }
    event.hint.brightness = 1.0;
    if context.role == Role::Drums {
        event.velocity = 0.4;
    }
    vec![event]
}
