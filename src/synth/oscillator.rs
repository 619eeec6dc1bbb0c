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

//! Band-limited oscillators.

use crate::synth::control::{Waveform, MAX_OSCILLATORS};
use rand::Rng;
use rand_pcg::Pcg32;
use std::f32::consts::TAU;

/// Detune of the outer sines of a [`Waveform::Fat`] oscillator, in cents.
pub const FAT_SPREAD: f32 = 8.0;

/// Frequency ratio of an interval in cents.
pub fn cents_ratio(cents: f32) -> f32 {
    (cents / 1200.0).exp2()
}

/// A single oscillator. A fat oscillator runs three phases.
#[derive(Debug, Clone, Copy)]
pub struct Oscillator {
    waveform: Waveform,
    phases: [f32; 3],
    ratios: [f32; 3],
}

impl Oscillator {
    pub fn new(waveform: Waveform) -> Oscillator {
        Oscillator {
            waveform,
            phases: [0.0, 1.0 / 3.0, 2.0 / 3.0],
            ratios: [cents_ratio(-FAT_SPREAD), 1.0, cents_ratio(FAT_SPREAD)],
        }
    }

    /// Produces one sample between -1 and 1 and advances the phase.
    pub fn next(&mut self, frequency: f32, sample_rate: f32, noise: &mut Pcg32) -> f32 {
        let dt = (frequency / sample_rate).clamp(0.0, 0.5);
        match self.waveform {
            Waveform::Fat => {
                let mut sum = 0.0;
                for (phase, ratio) in self.phases.iter_mut().zip(self.ratios.iter()) {
                    sum += (TAU * *phase).sin();
                    *phase = advance(*phase, dt * ratio);
                }
                sum / self.phases.len() as f32
            }
            Waveform::Noise => noise.random::<f32>() * 2.0 - 1.0,
            waveform => {
                let phase = self.phases[0];
                self.phases[0] = advance(phase, dt);
                match waveform {
                    Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
                    Waveform::Saw => 2.0 * phase - 1.0 - poly_blep(phase, dt),
                    Waveform::Square => {
                        let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                        naive + poly_blep(phase, dt) - poly_blep((phase + 0.5) % 1.0, dt)
                    }
                    _ => (TAU * phase).sin(),
                }
            }
        }
    }
}

fn advance(phase: f32, dt: f32) -> f32 {
    let phase = phase + dt;
    if phase >= 1.0 {
        phase - 1.0
    } else {
        phase
    }
}

/// Smooths the discontinuity of a naive waveform around phase 0.
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// A stack of detuned oscillators, summed and normalized by their count.
#[derive(Debug, Clone, Copy)]
pub struct Stack {
    oscillators: [Oscillator; MAX_OSCILLATORS as usize],
    ratios: [f32; MAX_OSCILLATORS as usize],
    count: usize,
}

impl Stack {
    /// Spreads `count` oscillators evenly across `detune` cents around the played frequency.
    pub fn new(waveform: Waveform, count: u8, detune: f32) -> Stack {
        let count = count.clamp(1, MAX_OSCILLATORS) as usize;
        let mut ratios = [1.0; MAX_OSCILLATORS as usize];
        if count > 1 {
            for (index, ratio) in ratios.iter_mut().take(count).enumerate() {
                let position = index as f32 / (count - 1) as f32 * 2.0 - 1.0;
                *ratio = cents_ratio(position * detune / 2.0);
            }
        }
        Stack {
            oscillators: [Oscillator::new(waveform); MAX_OSCILLATORS as usize],
            ratios,
            count,
        }
    }

    pub fn next(&mut self, frequency: f32, sample_rate: f32, noise: &mut Pcg32) -> f32 {
        let mut sum = 0.0;
        for (oscillator, ratio) in self
            .oscillators
            .iter_mut()
            .zip(self.ratios.iter())
            .take(self.count)
        {
            sum += oscillator.next(frequency * ratio, sample_rate, noise);
        }
        sum / self.count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    const WAVEFORMS: [Waveform; 6] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Square,
        Waveform::Noise,
        Waveform::Fat,
    ];

    #[test]
    fn stays_within_unit_range() {
        let mut noise = Pcg32::seed_from_u64(1);
        for waveform in WAVEFORMS.iter() {
            let mut stack = Stack::new(*waveform, 3, 20.0);
            for _ in 0..4_800 {
                let sample = stack.next(440.0, 48_000.0, &mut noise);
                assert!(sample.is_finite());
                assert!(sample.abs() <= 1.0 + 1e-4, "{:?} {}", waveform, sample);
            }
        }
    }

    #[test]
    fn sine_completes_a_cycle() {
        let mut noise = Pcg32::seed_from_u64(1);
        let mut oscillator = Oscillator::new(Waveform::Sine);
        let samples: Vec<f32> = (0..4)
            .map(|_| oscillator.next(250.0, 1_000.0, &mut noise))
            .collect();
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[1] - 1.0).abs() < 1e-6);
        assert!(samples[2].abs() < 1e-5);
        assert!((samples[3] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn detune_is_symmetric() {
        let stack = Stack::new(Waveform::Saw, 2, 10.0);
        assert!((stack.ratios[0] * stack.ratios[1] - 1.0).abs() < 1e-6);
        assert!(stack.ratios[0] < 1.0);
        let single = Stack::new(Waveform::Saw, 1, 10.0);
        assert_eq!(single.ratios[0], 1.0);
    }

    #[test]
    fn fat_sines_spread_around_the_pitch() {
        let oscillator = Oscillator::new(Waveform::Fat);
        assert!(oscillator.ratios[0] < 1.0 && oscillator.ratios[2] > 1.0);
        assert!((oscillator.ratios[0] * oscillator.ratios[2] - 1.0).abs() < 1e-6);
    }
}
