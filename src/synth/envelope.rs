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

//! Gain envelopes.
//!
//! [`Envelope`] is an attack/sustain/release envelope evaluated one sample at a time. Its
//! segments are shaped by a [`Curve`]: the attack ramps linearly and the release decays along a
//! negative curvature, which sounds like a natural decay.
//!
//! ```
//! use reverie::synth::envelope::{Envelope, Stage};
//!
//! let mut envelope = Envelope::new(0.01, 0.1, 1_000.0);
//! envelope.trigger();
//! for _ in 0..10 {
//!     envelope.next();
//! }
//! assert_eq!(envelope.stage(), Stage::Sustain);
//! envelope.release();
//! for _ in 0..100 {
//!     envelope.next();
//! }
//! assert_eq!(envelope.stage(), Stage::Finished);
//! ```

/// Curvature used for release segments.
pub const RELEASE_CURVE: Curve = Curve::Curve(-4.0);

/// The shape of an envelope segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Linear,
    /// A curvature value. 0 means linear, positive and negative numbers curve the segment up and
    /// down.
    Curve(f32),
}

impl Curve {
    /// Level at position `x` (0 to 1) of a segment going from `start` to `end`.
    pub fn interpolate(self, start: f32, end: f32, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Curve::Linear => start + (end - start) * x,
            Curve::Curve(curvature) if curvature.abs() < 0.001 => {
                Curve::Linear.interpolate(start, end, x)
            }
            Curve::Curve(curvature) => {
                let scale = (1.0 - (curvature * x).exp()) / (1.0 - curvature.exp());
                start + (end - start) * scale
            }
        }
    }
}

/// Where an [`Envelope`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Not triggered yet.
    Scheduled,
    Attack,
    Sustain,
    Release,
    /// Silent for good.
    Finished,
}

/// An attack/sustain/release gain envelope.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    attack: u32,
    release: u32,
    stage: Stage,
    level: f32,
    from: f32,
    elapsed: u32,
}

impl Envelope {
    /// Creates an envelope from segment times in seconds.
    pub fn new(attack: f32, release: f32, sample_rate: f32) -> Envelope {
        Envelope {
            attack: samples(attack, sample_rate),
            release: samples(release, sample_rate),
            stage: Stage::Scheduled,
            level: 0.0,
            from: 0.0,
            elapsed: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The most recent output.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Starts the attack from the current level. Retriggering a sounding envelope does not click.
    pub fn trigger(&mut self) {
        self.from = self.level;
        self.elapsed = 0;
        self.stage = Stage::Attack;
    }

    /// Starts the release from the current level. Does nothing once released.
    pub fn release(&mut self) {
        match self.stage {
            Stage::Release | Stage::Finished => {}
            Stage::Scheduled => {
                self.level = 0.0;
                self.stage = Stage::Finished;
            }
            Stage::Attack | Stage::Sustain => {
                self.from = self.level;
                self.elapsed = 0;
                self.stage = Stage::Release;
            }
        }
    }

    /// Advances by one sample and returns the new level.
    pub fn next(&mut self) -> f32 {
        match self.stage {
            Stage::Scheduled | Stage::Finished => self.level = 0.0,
            Stage::Sustain => self.level = 1.0,
            Stage::Attack => {
                self.elapsed += 1;
                if self.elapsed >= self.attack {
                    self.level = 1.0;
                    self.stage = Stage::Sustain;
                } else {
                    let x = self.elapsed as f32 / self.attack as f32;
                    self.level = Curve::Linear.interpolate(self.from, 1.0, x);
                }
            }
            Stage::Release => {
                self.elapsed += 1;
                if self.elapsed >= self.release {
                    self.level = 0.0;
                    self.stage = Stage::Finished;
                } else {
                    let x = self.elapsed as f32 / self.release as f32;
                    self.level = RELEASE_CURVE.interpolate(self.from, 0.0, x);
                }
            }
        }
        self.level
    }
}

fn samples(seconds: f32, sample_rate: f32) -> u32 {
    (seconds.max(0.0) * sample_rate).round().min(u32::MAX as f32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [Curve; 4] = [
        Curve::Linear,
        Curve::Curve(0.0),
        Curve::Curve(-4.0),
        Curve::Curve(3.0),
    ];

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn curves_end_at_the_end_level() {
        for curve in CURVES.iter() {
            assert!(close(curve.interpolate(0.5, 1.0, 1.0), 1.0), "{:?}", curve);
            assert!(close(curve.interpolate(1.0, 0.25, 1.0), 0.25), "{:?}", curve);
        }
    }

    #[test]
    fn curves_start_at_the_start_level() {
        for curve in CURVES.iter() {
            assert!(close(curve.interpolate(0.5, 1.0, 0.0), 0.5), "{:?}", curve);
        }
    }

    #[test]
    fn negative_curvature_decays_fast_then_slow() {
        let early = RELEASE_CURVE.interpolate(1.0, 0.0, 0.25);
        let late = RELEASE_CURVE.interpolate(1.0, 0.0, 0.75);
        assert!(early < 0.5);
        assert!(early - late > late);
    }

    #[test]
    fn attack_ramps_linearly() {
        let mut envelope = Envelope::new(0.004, 0.1, 1_000.0);
        envelope.trigger();
        let levels: Vec<f32> = (0..4).map(|_| envelope.next()).collect();
        assert_eq!(levels, vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(envelope.stage(), Stage::Sustain);
    }

    #[test]
    fn release_finishes_within_the_release_time() {
        let mut envelope = Envelope::new(0.0, 0.05, 1_000.0);
        envelope.trigger();
        envelope.next();
        envelope.release();
        let mut previous = envelope.level();
        for _ in 0..50 {
            let level = envelope.next();
            assert!(level <= previous);
            previous = level;
        }
        assert_eq!(envelope.stage(), Stage::Finished);
        assert_eq!(envelope.level(), 0.0);
    }

    #[test]
    fn releasing_an_untriggered_envelope_finishes_it() {
        let mut envelope = Envelope::new(0.1, 0.1, 1_000.0);
        envelope.release();
        assert_eq!(envelope.stage(), Stage::Finished);
    }
}
