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

//! A single sounding note.
//!
//! A voice waits in [`Stage::Scheduled`] until the render clock reaches its note on, ramps up
//! during [`Stage::Attack`], holds in [`Stage::Sustain`] and fades out in [`Stage::Release`] once
//! its note off is due. It is finished once its gain falls below [`SILENCE`] during the release.

use crate::synth::{
    control::{NoteParams, VoiceTechnique},
    envelope::{Envelope, Stage},
    filter::{soft_clip, LowPass},
    oscillator::Stack,
};
use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Gain below which a releasing voice is removed.
pub const SILENCE: f32 = 1e-4;

/// Frequency ratios a pulsing voice steps through: root, fifth, octave, fifth.
pub const PULSE_RATIOS: [f32; 4] = [1.0, 1.5, 2.0, 1.5];

/// Seconds each pulse takes to reach full level.
const PULSE_ATTACK: f32 = 0.002;

/// The outcome of rendering one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Sample(f32),
    /// The voice is silent for good and can be removed.
    Finished,
    /// The voice produced a value that is not a number and must be removed.
    Fault,
}

#[derive(Debug, Clone, Copy)]
struct Glide {
    from: f32,
    samples: u32,
    elapsed: u32,
}

#[derive(Debug, Clone)]
pub struct Voice {
    note_id: u64,
    group: u8,
    on_at: u64,
    off_at: Option<u64>,
    released_at: Option<u64>,
    target: f32,
    glide_time: f32,
    glide: Option<Glide>,
    velocity: f32,
    technique: VoiceTechnique,
    drive: f32,
    pulse_samples: u32,
    pulse_attack: u32,
    played: u64,
    envelope: Envelope,
    stack: Stack,
    filter: LowPass,
    noise: Pcg32,
    sample_rate: f32,
}

impl Voice {
    /// Creates a voice that starts at sample `on_at`. `params` must have been validated.
    pub fn new(
        note_id: u64,
        on_at: u64,
        frequency: f32,
        velocity: f32,
        params: &NoteParams,
        sample_rate: f32,
    ) -> Voice {
        Voice {
            note_id,
            group: params.group,
            on_at,
            off_at: None,
            released_at: None,
            target: frequency,
            glide_time: params.glide,
            glide: None,
            velocity: velocity.clamp(0.0, 1.0),
            technique: params.technique,
            drive: params.distortion,
            pulse_samples: ((params.pulse_interval * sample_rate).round() as u32).max(1),
            pulse_attack: ((PULSE_ATTACK * sample_rate).round() as u32).max(1),
            played: 0,
            envelope: Envelope::new(params.attack, params.release, sample_rate),
            stack: Stack::new(params.waveform, params.oscillators, params.detune),
            filter: LowPass::new(params.cutoff, params.resonance, sample_rate),
            noise: Pcg32::seed_from_u64(note_id),
            sample_rate,
        }
    }

    pub fn note_id(&self) -> u64 {
        self.note_id
    }

    pub fn group(&self) -> u8 {
        self.group
    }

    pub fn stage(&self) -> Stage {
        self.envelope.stage()
    }

    /// The frequency the voice is heading to.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the voice is due to leave [`Stage::Scheduled`] at sample `position`.
    pub fn is_due(&self, position: u64) -> bool {
        self.stage() == Stage::Scheduled && position >= self.on_at
    }

    /// Whether the voice is audible and not on its way out.
    pub fn is_held(&self) -> bool {
        matches!(self.stage(), Stage::Attack | Stage::Sustain)
    }

    /// Whether the voice is fading out or done.
    pub fn is_releasing(&self) -> bool {
        matches!(self.stage(), Stage::Release | Stage::Finished)
    }

    /// Sample at which the release started, if it has.
    pub fn released_at(&self) -> Option<u64> {
        self.released_at
    }

    /// Glides from `previous` to the voice's frequency, if the voice has a glide time.
    pub fn glide_from(&mut self, previous: f32) {
        if self.glide_time <= 0.0 || !previous.is_finite() || previous <= 0.0 {
            return;
        }
        if (previous - self.target).abs() <= f32::EPSILON {
            return;
        }
        self.glide = Some(Glide {
            from: previous,
            samples: ((self.glide_time * self.sample_rate).round() as u32).max(1),
            elapsed: 0,
        });
    }

    /// Schedules the release for sample `off_at`. An earlier release wins.
    pub fn release_at(&mut self, off_at: u64) {
        self.off_at = Some(self.off_at.map_or(off_at, |current| current.min(off_at)));
    }

    /// Starts the release at sample `position`, regardless of the scheduled note off.
    pub fn release_now(&mut self, position: u64) {
        if !self.is_releasing() {
            self.released_at = Some(position);
        }
        self.envelope.release();
    }

    /// Instantaneous oscillator frequency.
    pub fn frequency(&self) -> f32 {
        let base = match self.glide {
            Some(glide) if glide.elapsed < glide.samples => {
                let x = glide.elapsed as f32 / glide.samples as f32;
                let eased = x * x * (3.0 - 2.0 * x);
                let (from, to) = (glide.from.ln(), self.target.ln());
                (from + (to - from) * eased).exp()
            }
            _ => self.target,
        };
        if self.technique == VoiceTechnique::Pulse {
            let step = (self.played / self.pulse_samples as u64) as usize % PULSE_RATIOS.len();
            base * PULSE_RATIOS[step]
        } else {
            base
        }
    }

    /// Renders the sample at render clock `position`.
    pub fn next(&mut self, position: u64) -> Tick {
        if self.stage() == Stage::Scheduled {
            if position < self.on_at {
                return Tick::Sample(0.0);
            }
            self.envelope.trigger();
        }
        if let Some(off_at) = self.off_at {
            if position >= off_at {
                self.release_now(position);
            }
        }

        let gain = self.envelope.next();
        if self.technique == VoiceTechnique::Percussive && self.stage() == Stage::Sustain {
            self.release_now(position);
        }
        match self.stage() {
            Stage::Finished => return Tick::Finished,
            Stage::Release if gain < SILENCE => return Tick::Finished,
            _ => {}
        }

        let frequency = self.frequency();
        let raw = self.stack.next(frequency, self.sample_rate, &mut self.noise);
        let shaped = soft_clip(self.filter.process(raw), self.drive);
        let mut sample = shaped * gain * self.velocity;
        if self.technique == VoiceTechnique::Pulse {
            sample *= self.pulse_gain();
        }

        self.played += 1;
        if let Some(glide) = self.glide.as_mut() {
            glide.elapsed = glide.elapsed.saturating_add(1);
        }

        if sample.is_finite() {
            Tick::Sample(sample)
        } else {
            Tick::Fault
        }
    }

    fn pulse_gain(&self) -> f32 {
        let local = (self.played % self.pulse_samples as u64) as f32;
        let attack = (local / self.pulse_attack as f32).min(1.0);
        let decay = 1.0 - local / self.pulse_samples as f32;
        attack * decay * decay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::control::Waveform;

    const RATE: f32 = 1_000.0;

    fn params() -> NoteParams {
        NoteParams {
            attack: 0.01,
            release: 0.05,
            ..NoteParams::default()
        }
    }

    fn run(voice: &mut Voice, from: u64, to: u64) -> Vec<Tick> {
        (from..to).map(|position| voice.next(position)).collect()
    }

    #[test]
    fn waits_for_its_note_on() {
        let mut voice = Voice::new(1, 10, 100.0, 1.0, &params(), RATE);
        assert!(run(&mut voice, 0, 10)
            .iter()
            .all(|tick| *tick == Tick::Sample(0.0)));
        assert_eq!(voice.stage(), Stage::Scheduled);
        voice.next(10);
        assert_eq!(voice.stage(), Stage::Attack);
    }

    #[test]
    fn moves_through_its_stages() {
        let mut voice = Voice::new(1, 0, 100.0, 1.0, &params(), RATE);
        voice.release_at(100);
        run(&mut voice, 0, 20);
        assert_eq!(voice.stage(), Stage::Sustain);
        run(&mut voice, 20, 101);
        assert_eq!(voice.stage(), Stage::Release);
        assert_eq!(voice.released_at(), Some(100));
        let ticks = run(&mut voice, 101, 160);
        assert!(ticks.contains(&Tick::Finished));
    }

    #[test]
    fn percussive_voices_decay_without_a_note_off() {
        let params = NoteParams {
            technique: VoiceTechnique::Percussive,
            ..params()
        };
        let mut voice = Voice::new(1, 0, 100.0, 1.0, &params, RATE);
        let ticks = run(&mut voice, 0, 100);
        assert!(ticks.contains(&Tick::Finished));
    }

    #[test]
    fn glide_passes_between_the_frequencies() {
        let params = NoteParams {
            glide: 0.1,
            ..params()
        };
        let mut voice = Voice::new(1, 0, 440.0, 1.0, &params, RATE);
        voice.glide_from(220.0);
        assert!((voice.frequency() - 220.0).abs() < 1e-3);
        run(&mut voice, 0, 50);
        let middle = voice.frequency();
        assert!(middle > 220.0 && middle < 440.0, "{}", middle);
        run(&mut voice, 50, 100);
        assert_eq!(voice.frequency(), 440.0);
    }

    #[test]
    fn no_glide_without_a_glide_time() {
        let mut voice = Voice::new(1, 0, 440.0, 1.0, &params(), RATE);
        voice.glide_from(220.0);
        assert_eq!(voice.frequency(), 440.0);
    }

    #[test]
    fn pulses_step_through_the_pattern() {
        let params = NoteParams {
            technique: VoiceTechnique::Pulse,
            pulse_interval: 0.01,
            ..params()
        };
        let mut voice = Voice::new(1, 0, 100.0, 1.0, &params, RATE);
        let mut frequencies = Vec::new();
        for step in 0..5 {
            frequencies.push(voice.frequency());
            run(&mut voice, step * 10, step * 10 + 10);
        }
        assert_eq!(frequencies, vec![100.0, 150.0, 200.0, 150.0, 100.0]);
    }

    #[test]
    fn stays_bounded_with_heavy_settings() {
        let params = NoteParams {
            attack: 0.0,
            resonance: 1.0,
            distortion: 20.0,
            waveform: Waveform::Square,
            oscillators: 4,
            detune: 30.0,
            ..params()
        };
        let mut voice = Voice::new(1, 0, 110.0, 1.0, &params, 48_000.0);
        for position in 0..48_000 {
            match voice.next(position) {
                Tick::Sample(sample) => assert!(sample.abs() <= (1.0 + 20.0) / 20.0),
                tick => panic!("unexpected {:?}", tick),
            }
        }
    }
}
