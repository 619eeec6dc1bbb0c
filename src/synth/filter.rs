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

//! Low-pass filters and waveshaping.

use std::f32::consts::PI;

/// Q of the resonant filter at resonance 0 and 1.
const MIN_Q: f32 = 0.707;
const MAX_Q: f32 = 10.0;

/// A low-pass filter. Zero resonance selects a one-pole filter, anything else a two-pole
/// state-variable filter.
///
/// Both are topology-preserving transform designs, which stay stable for any cutoff below
/// Nyquist.
#[derive(Debug, Clone, Copy)]
pub enum LowPass {
    OnePole {
        gain: f32,
        state: f32,
    },
    StateVariable {
        k: f32,
        a1: f32,
        a2: f32,
        a3: f32,
        ic1eq: f32,
        ic2eq: f32,
    },
}

impl LowPass {
    /// `resonance` runs from 0 to 1.
    pub fn new(cutoff: f32, resonance: f32, sample_rate: f32) -> LowPass {
        let cutoff = cutoff.max(20.0).min(sample_rate * 0.49);
        let g = (PI * cutoff / sample_rate).tan();
        if resonance <= 0.0 {
            return LowPass::OnePole {
                gain: g / (1.0 + g),
                state: 0.0,
            };
        }

        let q = MIN_Q + (MAX_Q - MIN_Q) * resonance.min(1.0);
        let k = 1.0 / q;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        LowPass::StateVariable {
            k,
            a1,
            a2,
            a3,
            ic1eq: 0.0,
            ic2eq: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        match self {
            LowPass::OnePole { gain, state } => {
                let v = (input - *state) * *gain;
                let output = v + *state;
                *state = output + v;
                output
            }
            LowPass::StateVariable {
                a1,
                a2,
                a3,
                ic1eq,
                ic2eq,
                ..
            } => {
                let v3 = input - *ic2eq;
                let v1 = *a1 * *ic1eq + *a2 * v3;
                let v2 = *ic2eq + *a2 * *ic1eq + *a3 * v3;
                *ic1eq = 2.0 * v1 - *ic1eq;
                *ic2eq = 2.0 * v2 - *ic2eq;
                v2
            }
        }
    }

    /// Damping of the two-pole filter, `None` for the one-pole filter.
    pub fn damping(&self) -> Option<f32> {
        match self {
            LowPass::OnePole { .. } => None,
            LowPass::StateVariable { k, .. } => Some(*k),
        }
    }
}

/// Soft clips `x` with drive `k`: `(1 + k) x / (1 + k |x|)`.
///
/// Zero drive passes the signal through. Inputs within -1 to 1 stay within -1 to 1.
pub fn soft_clip(x: f32, k: f32) -> f32 {
    (1.0 + k) * x / (1.0 + k * x.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    fn noise(count: usize) -> Vec<f32> {
        let mut rng = Pcg32::seed_from_u64(9);
        (0..count).map(|_| rng.random_range(-1.0..=1.0)).collect()
    }

    #[test]
    fn zero_resonance_is_one_pole() {
        assert_eq!(LowPass::new(1_000.0, 0.0, 48_000.0).damping(), None);
        let damping = LowPass::new(1_000.0, 1.0, 48_000.0).damping().unwrap();
        assert!((damping - 1.0 / MAX_Q).abs() < 1e-6);
    }

    #[test]
    fn passes_dc() {
        for resonance in [0.0, 0.5].iter() {
            let mut filter = LowPass::new(500.0, *resonance, 48_000.0);
            let mut output = 0.0;
            for _ in 0..48_000 {
                output = filter.process(0.5);
            }
            assert!((output - 0.5).abs() < 1e-3, "{}", output);
        }
    }

    #[test]
    fn stays_bounded() {
        let input = noise(48_000);
        for cutoff in [20.0, 1_000.0, 30_000.0].iter() {
            let mut one_pole = LowPass::new(*cutoff, 0.0, 48_000.0);
            let mut resonant = LowPass::new(*cutoff, 1.0, 48_000.0);
            for x in input.iter() {
                let y = one_pole.process(*x);
                assert!(y.is_finite() && y.abs() <= 2.0);
                let y = resonant.process(*x);
                assert!(y.is_finite() && y.abs() <= 4.0 * MAX_Q);
            }
        }
    }

    #[test]
    fn low_sample_rates_keep_the_cutoff_below_nyquist() {
        for sample_rate in [1.0, 30.0, 40.0].iter() {
            let mut filter = LowPass::new(1_000.0, 0.5, *sample_rate);
            for x in noise(1_000) {
                assert!(filter.process(x).is_finite());
            }
        }
    }

    #[test]
    fn soft_clip_is_bounded() {
        assert_eq!(soft_clip(0.3, 0.0), 0.3);
        for k in [0.5, 2.0, 10.0].iter() {
            for x in noise(1_000) {
                assert!(soft_clip(x, *k).abs() <= 1.0 + 1e-6);
            }
            assert!(soft_clip(1_000.0, *k) < (1.0 + k) / k);
            assert!((soft_clip(1.0, *k) - 1.0).abs() < 1e-6);
            assert_eq!(soft_clip(-0.4, *k), -soft_clip(0.4, *k));
        }
    }
}
