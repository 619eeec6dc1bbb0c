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

//! Messages that drive the synthesizer.
//!
//! Every message carries an absolute timestamp in render clock seconds. Messages are `Copy` so
//! that they can cross into the render callback through a ring buffer without allocating.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest number of oscillators a single voice may stack.
pub const MAX_OSCILLATORS: u8 = 4;

/// Number of portamento groups. Voices in the same group glide from each other.
pub const GROUPS: u8 = 16;

/// An instruction for the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Starts a voice at `when`.
    NoteOn {
        #[serde(rename = "noteId")]
        note_id: u64,
        when: f64,
        frequency: f32,
        velocity: f32,
        params: NoteParams,
    },
    /// Releases the voice started by the note on with the same id.
    NoteOff {
        #[serde(rename = "noteId")]
        note_id: u64,
        when: f64,
    },
    /// Releases every voice as soon as it is received, whatever `when` says.
    Clear { when: f64 },
}

impl ControlMessage {
    /// Render clock time of the message, in seconds.
    pub fn when(&self) -> f64 {
        match *self {
            ControlMessage::NoteOn { when, .. } => when,
            ControlMessage::NoteOff { when, .. } => when,
            ControlMessage::Clear { when } => when,
        }
    }

    /// Checks that the synthesizer can act on this message.
    pub fn validate(&self) -> Result<(), Invalid> {
        let when = self.when();
        if !when.is_finite() {
            return Err(Invalid::NonFinite("when"));
        }
        if when < 0.0 {
            return Err(Invalid::OutOfRange("when"));
        }
        if let ControlMessage::NoteOn {
            frequency,
            velocity,
            params,
            ..
        } = self
        {
            finite("frequency", *frequency)?;
            finite("velocity", *velocity)?;
            if *frequency <= 0.0 {
                return Err(Invalid::OutOfRange("frequency"));
            }
            params.validate()?;
        }
        Ok(())
    }
}

/// Why a [`ControlMessage`] was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Invalid {
    #[error("{0} is not finite")]
    NonFinite(&'static str),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

fn finite(name: &'static str, value: f32) -> Result<(), Invalid> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Invalid::NonFinite(name))
    }
}

fn at_least(name: &'static str, value: f32, min: f32) -> Result<(), Invalid> {
    finite(name, value)?;
    if value < min {
        Err(Invalid::OutOfRange(name))
    } else {
        Ok(())
    }
}

/// The oscillator shape of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Triangle,
    Saw,
    Square,
    Noise,
    /// Three detuned sines per oscillator.
    Fat,
}

/// How a voice moves through its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTechnique {
    /// Holds after the attack until the note off.
    Sustain,
    /// Decays right after the attack.
    Percussive,
    /// Retriggers a short envelope every `pulse_interval`, stepping through root, fifth, octave
    /// and fifth.
    Pulse,
}

/// Sound of a single voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteParams {
    /// Seconds from silence to full level.
    pub attack: f32,
    /// Seconds from the note off to silence.
    pub release: f32,
    /// Low-pass cutoff in Hz.
    pub cutoff: f32,
    /// Filter resonance from 0 to 1. Zero uses a gentler one-pole filter.
    pub resonance: f32,
    /// Soft clip drive. Zero leaves the signal untouched.
    pub distortion: f32,
    pub waveform: Waveform,
    /// Number of stacked oscillators, from 1 to [`MAX_OSCILLATORS`].
    pub oscillators: u8,
    /// Spread of the stacked oscillators in cents.
    pub detune: f32,
    /// Portamento time in seconds.
    pub glide: f32,
    pub technique: VoiceTechnique,
    /// Seconds between pulse retriggers.
    pub pulse_interval: f32,
    /// Portamento group, below [`GROUPS`].
    pub group: u8,
}

impl Default for NoteParams {
    fn default() -> NoteParams {
        NoteParams {
            attack: 0.05,
            release: 0.5,
            cutoff: 2_000.0,
            resonance: 0.0,
            distortion: 0.0,
            waveform: Waveform::Sine,
            oscillators: 1,
            detune: 0.0,
            glide: 0.0,
            technique: VoiceTechnique::Sustain,
            pulse_interval: 0.125,
            group: 0,
        }
    }
}

impl NoteParams {
    pub fn validate(&self) -> Result<(), Invalid> {
        at_least("attack", self.attack, 0.0)?;
        at_least("release", self.release, 0.0)?;
        at_least("cutoff", self.cutoff, f32::MIN_POSITIVE)?;
        at_least("resonance", self.resonance, 0.0)?;
        if self.resonance > 1.0 {
            return Err(Invalid::OutOfRange("resonance"));
        }
        at_least("distortion", self.distortion, 0.0)?;
        finite("detune", self.detune)?;
        at_least("glide", self.glide, 0.0)?;
        finite("pulse_interval", self.pulse_interval)?;
        if self.technique == VoiceTechnique::Pulse && self.pulse_interval <= 0.0 {
            return Err(Invalid::OutOfRange("pulse_interval"));
        }
        if self.oscillators == 0 || self.oscillators > MAX_OSCILLATORS {
            return Err(Invalid::OutOfRange("oscillators"));
        }
        if self.group >= GROUPS {
            return Err(Invalid::OutOfRange("group"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note_on(frequency: f32, params: NoteParams) -> ControlMessage {
        ControlMessage::NoteOn {
            note_id: 1,
            when: 0.5,
            frequency,
            velocity: 0.8,
            params,
        }
    }

    #[test]
    fn default_params_are_valid() {
        assert_eq!(note_on(440.0, NoteParams::default()).validate(), Ok(()));
    }

    #[test]
    fn rejects_non_finite_values() {
        assert_eq!(
            note_on(f32::NAN, NoteParams::default()).validate(),
            Err(Invalid::NonFinite("frequency"))
        );
        assert_eq!(
            ControlMessage::NoteOff {
                note_id: 1,
                when: f64::INFINITY
            }
            .validate(),
            Err(Invalid::NonFinite("when"))
        );
        let params = NoteParams {
            cutoff: f32::INFINITY,
            ..NoteParams::default()
        };
        assert_eq!(
            note_on(440.0, params).validate(),
            Err(Invalid::NonFinite("cutoff"))
        );
    }

    #[test]
    fn rejects_unusable_params() {
        let params = NoteParams {
            oscillators: 0,
            ..NoteParams::default()
        };
        assert_eq!(
            note_on(440.0, params).validate(),
            Err(Invalid::OutOfRange("oscillators"))
        );
        let params = NoteParams {
            technique: VoiceTechnique::Pulse,
            pulse_interval: 0.0,
            ..NoteParams::default()
        };
        assert_eq!(
            note_on(440.0, params).validate(),
            Err(Invalid::OutOfRange("pulse_interval"))
        );
        assert_eq!(
            note_on(-1.0, NoteParams::default()).validate(),
            Err(Invalid::OutOfRange("frequency"))
        );
    }

    #[test]
    fn serializes_with_a_type_tag() {
        let json = serde_json::to_value(ControlMessage::NoteOff {
            note_id: 7,
            when: 1.5,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "noteOff", "noteId": 7, "when": 1.5})
        );
        let clear: ControlMessage = serde_json::from_str(r#"{"type":"clear","when":0.0}"#).unwrap();
        assert_eq!(clear, ControlMessage::Clear { when: 0.0 });
    }
}
