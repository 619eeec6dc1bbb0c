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

//! Phrase generators.
//!
//! Generators originate brand new one-bar phrases when no existing branch of a role is fit enough
//! to be played again. They are pure functions of their [`Context`] and the random generator they
//! are handed, so a seeded generator always originates the same phrase.

use crate::{
    blueprint::PatternKind,
    event::{normalize_phrase, Event, Role, SynthHint, Technique, BEATS_PER_BAR, HAT, KICK, SNARE},
    seed::Rng,
    settings::DrumPattern,
    theory::Key,
};
use rand::Rng as _;

/// Length of a single drum hit in beats.
pub const HIT_LENGTH: f64 = 0.125;

/// Everything a generator needs to know about the bar it writes for.
#[derive(Debug, Clone)]
pub struct Context {
    pub role: Role,
    pub key: Key,
    /// Octave the phrase is centred on.
    pub octave: i32,
    /// How busy the phrase should be, between 0 and 1.
    pub density: f64,
    pub tension: f64,
    pub drum_pattern: DrumPattern,
    /// Whether the pulse technique may be used.
    pub pulse: bool,
    /// Length of one beat in seconds.
    pub beat_seconds: f64,
}

impl Context {
    fn velocity(&self, rng: &mut Rng) -> f64 {
        (0.45 + 0.35 * self.tension + rng.random_range(-0.05..0.05)).clamp(0.05, 1.0)
    }

    fn hint(&self) -> SynthHint {
        SynthHint {
            brightness: (0.25 + 0.6 * self.tension).clamp(0.0, 1.0),
            drive: if self.role == Role::Bass {
                0.2 * self.tension
            } else {
                0.0
            },
            glide: false,
        }
    }

    fn note(&self, degree: i32, time: f64, duration: f64, rng: &mut Rng) -> Event {
        Event::new(self.role, self.key.pitch(degree, self.octave), time, duration)
            .velocity(self.velocity(rng))
            .hint(self.hint())
    }
}

/// Originates a phrase with the generator family `kind`.
///
/// The result is always a normalized phrase. Bass phrases always start on the downbeat.
pub fn originate(kind: PatternKind, context: &Context, rng: &mut Rng) -> Vec<Event> {
    let mut events = match kind {
        PatternKind::Drone => drone(context, rng),
        PatternKind::Walk => walk(context, rng),
        PatternKind::Motif => motif(context, rng),
        PatternKind::Riff => riff(context, rng),
        PatternKind::Arpeggio => arpeggio(context, rng),
        PatternKind::Beat => beat(context, rng),
        PatternKind::Texture => texture(context, rng),
    };
    normalize_phrase(&mut events);
    if context.role == Role::Bass {
        anchor_downbeat(context, &mut events, rng);
    }
    log::debug!(
        "originated {:?} phrase for {} with {} events",
        kind,
        context.role,
        events.len()
    );
    events
}

fn anchor_downbeat(context: &Context, events: &mut Vec<Event>, rng: &mut Rng) {
    match events.first_mut() {
        Some(first) if first.time > 0.0 => {
            first.duration += first.time;
            first.time = 0.0;
            normalize_phrase(events);
        }
        Some(_) => {}
        None => events.push(context.note(0, 0.0, BEATS_PER_BAR, rng)),
    }
}

fn pick<T: Copy>(options: &[T], rng: &mut Rng) -> T {
    options[rng.random_range(0..options.len())]
}

fn drone(context: &Context, rng: &mut Rng) -> Vec<Event> {
    let degrees: &[i32] = if context.role == Role::Bass {
        &[0, 0, 0, 4]
    } else {
        &[0, 2, 4]
    };
    let first = pick(degrees, rng);
    if context.density < 0.4 {
        return vec![context.note(first, 0.0, BEATS_PER_BAR, rng)];
    }
    let second = pick(degrees, rng);
    vec![
        context.note(first, 0.0, 2.0, rng),
        context.note(second, 2.0, 2.0, rng),
    ]
}

fn walk(context: &Context, rng: &mut Rng) -> Vec<Event> {
    const STEPS: [i32; 6] = [-2, -1, -1, 1, 1, 2];

    let count = 2 + (context.density * 6.0).round() as usize;
    let slot = BEATS_PER_BAR / count as f64;
    let legato = rng.random_range(0.6..0.95);
    let glide = context.role != Role::Bass && context.beat_seconds > 0.6;
    let first = if context.role == Role::Bass || rng.random_bool(0.7) {
        0
    } else {
        1
    };

    let mut degree = pick(&[0, 2, 4], rng);
    let mut events = Vec::with_capacity(count);
    for i in first..count {
        let mut step = 0;
        if i > first {
            step = pick(&STEPS, rng);
            degree = (degree + step).clamp(-3, 9);
        }
        let mut event = context.note(degree, i as f64 * slot, slot * legato, rng);
        event.hint.glide = glide && step.abs() == 1;
        events.push(event);
    }
    events
}

fn motif(context: &Context, rng: &mut Rng) -> Vec<Event> {
    const CELLS: [&[f64]; 6] = [
        &[2.0],
        &[1.0, 1.0],
        &[1.5, 0.5],
        &[1.0, 0.5, 0.5],
        &[0.5, 1.0, 0.5],
        &[0.5, 0.5, 0.5, 0.5],
    ];

    let longest = 1 + (context.density * 3.5) as usize;
    let cells = CELLS
        .iter()
        .filter(|cell| cell.len() <= longest)
        .collect::<Vec<_>>();
    let cell = *cells[rng.random_range(0..cells.len())];

    // Statement in the first half of the bar.
    let mut degrees = Vec::with_capacity(cell.len());
    let mut degree = pick(&[0, 2, 4], rng);
    for i in 0..cell.len() {
        if i > 0 {
            degree += pick(&[-2, -1, 1, 2], rng);
        }
        degrees.push(degree);
    }

    // The answer repeats the rhythm a step away and resolves onto a chord tone.
    let shift = pick(&[-2, -1, 1, 2], rng);
    let mut answer = degrees.iter().map(|degree| degree + shift).collect::<Vec<_>>();
    if let Some(last) = answer.last_mut() {
        *last = pick(&[0, 2, 4], rng);
    }

    let mut events = Vec::with_capacity(cell.len() * 2);
    for (half, degrees) in [degrees, answer].iter().enumerate() {
        let mut time = half as f64 * 2.0;
        for (&length, &degree) in cell.iter().zip(degrees.iter()) {
            events.push(context.note(degree, time, length * 0.9, rng));
            time += length;
        }
    }

    if context.density < 0.3 && events.len() > 2 {
        let rest = rng.random_range(1..events.len());
        events.remove(rest);
    }
    events
}

/// Looped figures as `(degree, time, duration)`.
const RIFFS: [&[(i32, f64, f64)]; 5] = [
    &[(0, 0.0, 2.0), (-2, 2.0, 1.0), (-1, 3.0, 1.0)],
    &[(0, 0.0, 1.5), (0, 1.5, 0.5), (4, 2.0, 1.0), (3, 3.0, 1.0)],
    &[
        (0, 0.0, 0.5),
        (0, 0.75, 0.25),
        (2, 1.0, 1.0),
        (4, 2.0, 0.5),
        (2, 2.5, 0.5),
        (0, 3.0, 1.0),
    ],
    &[
        (0, 0.0, 0.75),
        (4, 0.75, 0.75),
        (5, 1.5, 0.5),
        (4, 2.0, 1.0),
        (0, 3.0, 0.5),
        (-1, 3.5, 0.5),
    ],
    &[
        (0, 0.0, 0.5),
        (0, 0.5, 0.5),
        (0, 1.0, 0.5),
        (2, 1.5, 0.5),
        (0, 2.0, 0.5),
        (0, 2.5, 0.5),
        (4, 3.0, 0.5),
        (3, 3.5, 0.5),
    ],
];

fn riff(context: &Context, rng: &mut Rng) -> Vec<Event> {
    let busiest = 3 + (context.density * 6.0) as usize;
    let candidates = RIFFS
        .iter()
        .filter(|riff| riff.len() <= busiest)
        .collect::<Vec<_>>();
    let riff = candidates[rng.random_range(0..candidates.len())];
    riff.iter()
        .map(|&(degree, time, duration)| {
            context
                .note(degree, time, duration * 0.95, rng)
                .technique(Technique::Pluck)
        })
        .collect()
}

fn arpeggio(context: &Context, rng: &mut Rng) -> Vec<Event> {
    const SHAPES: [&[i32]; 4] = [&[0, 2, 4, 7], &[0, 4, 7, 4], &[0, 2, 4, 2], &[7, 4, 2, 0]];

    if context.pulse && rng.random_bool(0.25) {
        let second = pick(&[2, 4], rng);
        return vec![
            context.note(0, 0.0, 2.0, rng).technique(Technique::Pulse),
            context.note(second, 2.0, 2.0, rng).technique(Technique::Pulse),
        ];
    }

    let step = if context.density > 0.65 {
        0.25
    } else if context.density > 0.35 {
        0.5
    } else {
        1.0
    };
    let shape = pick(&SHAPES, rng);
    let count = (BEATS_PER_BAR / step) as usize;
    let mut events = Vec::with_capacity(count);
    for i in 0..count {
        let degree = shape[i % shape.len()];
        events.push(
            context
                .note(degree, i as f64 * step, step * 0.8, rng)
                .technique(Technique::Pluck),
        );
    }
    events
}

/// A drum groove on a sixteen step grid. `X` is an accent, `x` a normal hit and `o` a ghost note.
struct Groove {
    kick: &'static str,
    snare: &'static str,
    hat: &'static str,
}

fn groove(pattern: DrumPattern) -> Option<Groove> {
    let groove = match pattern {
        DrumPattern::Off => return None,
        DrumPattern::Sparse => Groove {
            kick: "X.........x.....",
            snare: "................",
            hat: "........o.......",
        },
        DrumPattern::Downtempo => Groove {
            kick: "X......x..x.....",
            snare: "....X.......X...",
            hat: "x.o.x.o.x.o.x.o.",
        },
        DrumPattern::FourOnTheFloor => Groove {
            kick: "X...x...X...x...",
            snare: "....x.......x...",
            hat: "..x...x...x...x.",
        },
        DrumPattern::Breakbeat => Groove {
            kick: "X.....x...x.....",
            snare: "....X..o....X..o",
            hat: "x.x.x.x.x.x.x.x.",
        },
    };
    Some(groove)
}

fn beat(context: &Context, rng: &mut Rng) -> Vec<Event> {
    let groove = match groove(context.drum_pattern) {
        Some(groove) => groove,
        None => return Vec::new(),
    };

    let mut events = Vec::new();
    for (pitch, line) in [(KICK, groove.kick), (SNARE, groove.snare), (HAT, groove.hat)] {
        for (step, symbol) in line.chars().enumerate() {
            let velocity = match symbol {
                'X' => 0.9,
                'x' => 0.7,
                'o' => 0.35,
                _ => continue,
            };
            // Sparse settings thin out the unaccented hats.
            if pitch == HAT && symbol != 'X' && !rng.random_bool(0.5 + 0.5 * context.density) {
                continue;
            }
            let technique = if symbol == 'o' {
                Technique::Ghost
            } else {
                Technique::Hit
            };
            events.push(
                Event::new(Role::Drums, pitch, step as f64 * 0.25, HIT_LENGTH)
                    .velocity(velocity * (0.85 + 0.3 * context.tension).min(1.1))
                    .technique(technique),
            );
        }
    }
    events
}

fn texture(context: &Context, rng: &mut Rng) -> Vec<Event> {
    let count = 1 + (context.density * 3.0) as usize;
    let segment = BEATS_PER_BAR / count as f64;
    let mut events = Vec::with_capacity(count);
    for i in 0..count {
        if i > 0 && rng.random_bool(0.3) {
            continue;
        }
        let offset = if segment > 1.0 {
            pick(&[0.0, 0.5], rng)
        } else {
            0.0
        };
        let degree = pick(&[0, 4, 7, 9, 11], rng);
        let mut event = context
            .note(degree, i as f64 * segment + offset, (segment - offset) * 0.9, rng)
            .velocity(0.3 + 0.2 * context.tension);
        event.hint.brightness = 0.8;
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{phrase_duration, BEAT_EPSILON};
    use crate::seed::{self, Stream};
    use crate::theory::Mode;

    fn context(role: Role, density: f64) -> Context {
        Context {
            role,
            key: Key::new(9, Mode::Aeolian),
            octave: 3,
            density,
            tension: 0.5,
            drum_pattern: DrumPattern::Breakbeat,
            pulse: true,
            beat_seconds: 0.8,
        }
    }

    const KINDS: [PatternKind; 7] = [
        PatternKind::Drone,
        PatternKind::Walk,
        PatternKind::Motif,
        PatternKind::Riff,
        PatternKind::Arpeggio,
        PatternKind::Beat,
        PatternKind::Texture,
    ];

    #[test]
    fn phrases_fit_in_one_bar() {
        for &kind in KINDS.iter() {
            for seed in 0..40 {
                for &density in &[0.0, 0.3, 0.7, 1.0] {
                    let role = if kind == PatternKind::Beat {
                        Role::Drums
                    } else {
                        Role::Melody
                    };
                    let mut rng = seed::rng(seed, Stream::Phrase, 0, 0);
                    let events = originate(kind, &context(role, density), &mut rng);
                    assert!(phrase_duration(&events) <= BEATS_PER_BAR + BEAT_EPSILON);
                    assert!(events
                        .iter()
                        .all(|event| event.time >= 0.0 && event.time < BEATS_PER_BAR));
                }
            }
        }
    }

    #[test]
    fn bass_starts_on_the_downbeat() {
        for &kind in KINDS.iter() {
            for seed in 0..20 {
                let mut rng = seed::rng(seed, Stream::Phrase, 0, 0);
                let events = originate(kind, &context(Role::Bass, 0.5), &mut rng);
                assert_eq!(events[0].time, 0.0, "{:?}", kind);
            }
        }
    }

    #[test]
    fn pitched_generators_stay_in_key() {
        let context = context(Role::Melody, 0.6);
        for &kind in &[PatternKind::Walk, PatternKind::Motif, PatternKind::Arpeggio] {
            let mut rng = seed::rng(5, Stream::Phrase, 0, 0);
            let events = originate(kind, &context, &mut rng);
            assert!(events.iter().all(|event| context.key.contains(event.pitch)));
        }
    }

    #[test]
    fn drums_follow_the_pattern() {
        let mut context = context(Role::Drums, 1.0);
        context.drum_pattern = DrumPattern::FourOnTheFloor;
        let mut rng = seed::rng(1, Stream::Phrase, 0, 0);
        let events = originate(PatternKind::Beat, &context, &mut rng);
        let kicks = events
            .iter()
            .filter(|event| event.pitch == KICK)
            .map(|event| event.time)
            .collect::<Vec<_>>();
        assert_eq!(kicks, vec![0.0, 1.0, 2.0, 3.0]);

        context.drum_pattern = DrumPattern::Off;
        assert!(originate(PatternKind::Beat, &context, &mut rng).is_empty());
    }

    #[test]
    fn same_seed_same_phrase() {
        let context = context(Role::Melody, 0.5);
        let a = originate(
            PatternKind::Motif,
            &context,
            &mut seed::rng(9, Stream::Phrase, 2, 1),
        );
        let b = originate(
            PatternKind::Motif,
            &context,
            &mut seed::rng(9, Stream::Phrase, 2, 1),
        );
        assert_eq!(a, b);
    }
}
