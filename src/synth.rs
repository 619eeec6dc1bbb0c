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

//! A real-time polyphonic synthesizer.
//!
//! [`Synth::render`] is meant to be called from an audio callback. It never blocks, never
//! allocates after construction and always leaves a valid buffer behind, even when it is fed
//! garbage. [`ControlMessage`]s reach it through a lock-free single-producer single-consumer ring
//! created with [`control_channel`].
//!
//! Every message carries an absolute time on the render clock. Note ons create a voice that
//! waits until its time comes, note offs schedule the release of their voice, and a
//! [`ControlMessage::Clear`] releases every voice as soon as it is received. How far the render
//! clock has advanced is published through a [`RenderClock`], which other threads use to decide
//! when notes should play.
//!
//! ```
//! use reverie::synth::{control_channel, Synth};
//! use reverie::synth::control::{ControlMessage, NoteParams};
//!
//! let (mut sender, receiver) = control_channel(64);
//! let mut synth = Synth::new(48_000.0, receiver);
//! sender.send(ControlMessage::NoteOn {
//!     note_id: 1,
//!     when: 0.0,
//!     frequency: 220.0,
//!     velocity: 0.8,
//!     params: NoteParams::default(),
//! })?;
//!
//! let mut buffer = [0.0; 256];
//! synth.render(&mut buffer);
//! assert_eq!(synth.active_voices(), 1);
//! assert!(buffer.iter().any(|sample| *sample != 0.0));
//! # Ok::<(), reverie::synth::Full>(())
//! ```

use crate::synth::{
    control::{ControlMessage, GROUPS},
    voice::{Tick, Voice},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

pub mod control;
pub mod envelope;
pub mod filter;
pub mod osc;
pub mod oscillator;
pub mod voice;

/// Most voices that can exist at once.
pub const MAX_VOICES: usize = 64;

/// Most note offs that can wait for their note on.
pub const MAX_PARKED: usize = 64;

/// Lowest sample rate a [`Synth`] renders at.
pub const MIN_SAMPLE_RATE: f32 = 1_000.0;

/// Gain applied to the mix of all voices.
pub const MASTER_GAIN: f32 = 0.25;

/// Creates a ring buffer for control messages that holds up to `capacity` messages.
pub fn control_channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity);
    (ControlSender { producer }, ControlReceiver { consumer })
}

/// Returned when the control ring buffer has no room left.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("control ring buffer is full")]
pub struct Full(pub ControlMessage);

/// The sending half of a [`control_channel`].
#[derive(Debug)]
pub struct ControlSender {
    producer: rtrb::Producer<ControlMessage>,
}

impl ControlSender {
    /// Queues a message without blocking.
    pub fn send(&mut self, message: ControlMessage) -> Result<(), Full> {
        self.producer.push(message).map_err(|error| match error {
            rtrb::PushError::Full(message) => Full(message),
        })
    }

    /// Number of messages that can be sent before the ring is full.
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }

    /// Whether the synthesizer has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// The receiving half of a [`control_channel`], usually owned by a [`Synth`].
#[derive(Debug)]
pub struct ControlReceiver {
    consumer: rtrb::Consumer<ControlMessage>,
}

impl ControlReceiver {
    /// Takes the next message without blocking.
    ///
    /// For hosts that forward control messages elsewhere instead of rendering them, for
    /// example as [`osc`] packets.
    pub fn pop(&mut self) -> Option<ControlMessage> {
        self.consumer.pop().ok()
    }
}

/// How far the synthesizer has rendered.
///
/// Written by the render thread after every buffer and read by anyone holding a clone.
#[derive(Debug, Clone)]
pub struct RenderClock {
    frames: Arc<AtomicU64>,
    sample_rate: f32,
}

impl RenderClock {
    fn new(sample_rate: f32) -> RenderClock {
        RenderClock {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    /// Number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Rendered time in seconds.
    pub fn seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn publish(&self, frames: u64) {
        self.frames.store(frames, Ordering::Release);
    }
}

/// A polyphonic synthesizer driven by [`ControlMessage`]s.
#[derive(Debug)]
pub struct Synth {
    sample_rate: f32,
    receiver: ControlReceiver,
    voices: Vec<Voice>,
    parked: Vec<(u64, u64)>,
    previous: [Option<f32>; GROUPS as usize],
    position: u64,
    clock: RenderClock,
}

impl Synth {
    /// Creates a synthesizer rendering mono audio at `sample_rate`, raised to
    /// [`MIN_SAMPLE_RATE`] if lower.
    pub fn new(sample_rate: f32, receiver: ControlReceiver) -> Synth {
        let sample_rate = if sample_rate.is_finite() {
            sample_rate.max(MIN_SAMPLE_RATE)
        } else {
            48_000.0
        };
        Synth {
            sample_rate,
            receiver,
            voices: Vec::with_capacity(MAX_VOICES),
            parked: Vec::with_capacity(MAX_PARKED),
            previous: [None; GROUPS as usize],
            position: 0,
            clock: RenderClock::new(sample_rate),
        }
    }

    /// A handle for reading the render position from other threads.
    pub fn clock(&self) -> RenderClock {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// The next frame to be rendered.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of voices that are scheduled or sounding and have not been released.
    pub fn active_voices(&self) -> usize {
        self.voices
            .iter()
            .filter(|voice| !voice.is_releasing())
            .count()
    }

    /// Number of voices that exist, including the ones fading out.
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    /// Applies pending control messages and renders the next `out.len()` frames into `out`,
    /// overwriting what was there.
    pub fn render(&mut self, out: &mut [f32]) {
        while let Some(message) = self.receiver.pop() {
            self.apply(message);
        }

        for frame in out.iter_mut() {
            self.start_due_voices();

            let mut mix = 0.0;
            let mut index = 0;
            while index < self.voices.len() {
                match self.voices[index].next(self.position) {
                    Tick::Sample(sample) => {
                        mix += sample;
                        index += 1;
                    }
                    Tick::Finished => {
                        self.voices.swap_remove(index);
                    }
                    Tick::Fault => {
                        log::warn!(
                            "removing voice {}: non-finite output",
                            self.voices[index].note_id()
                        );
                        self.voices.swap_remove(index);
                    }
                }
            }

            let mix = mix * MASTER_GAIN;
            *frame = if mix.is_finite() { mix } else { 0.0 };
            self.position += 1;
        }

        self.clock.publish(self.position);
    }

    fn start_due_voices(&mut self) {
        let position = self.position;
        for index in 0..self.voices.len() {
            if !self.voices[index].is_due(position) {
                continue;
            }
            let group = self.voices[index].group();
            let sounding = self
                .voices
                .iter()
                .enumerate()
                .any(|(other, voice)| other != index && voice.group() == group && voice.is_held());
            let slot = &mut self.previous[group as usize % GROUPS as usize];
            if sounding {
                if let Some(previous) = *slot {
                    self.voices[index].glide_from(previous);
                }
            }
            *slot = Some(self.voices[index].target());
        }
    }

    fn apply(&mut self, message: ControlMessage) {
        if let Err(reason) = message.validate() {
            log::warn!("dropping control message: {}", reason);
            return;
        }

        match message {
            ControlMessage::NoteOn {
                note_id,
                when,
                frequency,
                velocity,
                params,
            } => {
                for voice in self.voices.iter_mut() {
                    if voice.note_id() == note_id {
                        voice.release_now(self.position);
                    }
                }
                if self.voices.len() >= MAX_VOICES && !self.steal() {
                    log::warn!("dropping note {}: all {} voices busy", note_id, MAX_VOICES);
                    return;
                }

                let mut voice = Voice::new(
                    note_id,
                    self.frame(when),
                    frequency,
                    velocity,
                    &params,
                    self.sample_rate,
                );
                if let Some(index) = self.parked.iter().position(|(id, _)| *id == note_id) {
                    let (_, off_at) = self.parked.swap_remove(index);
                    voice.release_at(off_at);
                }
                self.voices.push(voice);
            }
            ControlMessage::NoteOff { note_id, when } => {
                let off_at = self.frame(when);
                let mut found = false;
                for voice in self.voices.iter_mut() {
                    if voice.note_id() == note_id && !voice.is_releasing() {
                        voice.release_at(off_at);
                        found = true;
                    }
                }
                if !found {
                    if self.parked.len() >= MAX_PARKED {
                        log::warn!("too many early note offs, forgetting the oldest");
                        self.parked.remove(0);
                    }
                    self.parked.push((note_id, off_at));
                }
            }
            ControlMessage::Clear { .. } => {
                for voice in self.voices.iter_mut() {
                    voice.release_now(self.position);
                }
                self.parked.clear();
            }
        }
    }

    /// Frees a slot by removing the voice that has been releasing the longest.
    fn steal(&mut self) -> bool {
        let oldest = self
            .voices
            .iter()
            .enumerate()
            .filter_map(|(index, voice)| voice.released_at().map(|at| (index, at)))
            .min_by_key(|(_, at)| *at)
            .map(|(index, _)| index);
        match oldest {
            Some(index) => {
                self.voices.swap_remove(index);
                true
            }
            None => false,
        }
    }

    fn frame(&self, when: f64) -> u64 {
        (when * self.sample_rate as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::control::{NoteParams, VoiceTechnique};

    const RATE: f32 = 1_000.0;

    fn synth() -> (ControlSender, Synth) {
        let (sender, receiver) = control_channel(256);
        (sender, Synth::new(RATE, receiver))
    }

    fn note_on(note_id: u64, when: f64, params: NoteParams) -> ControlMessage {
        ControlMessage::NoteOn {
            note_id,
            when,
            frequency: 220.0,
            velocity: 0.8,
            params,
        }
    }

    fn render(synth: &mut Synth, frames: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; frames];
        synth.render(&mut buffer);
        buffer
    }

    #[test]
    fn voices_wait_for_their_time() {
        let (mut sender, mut synth) = synth();
        sender.send(note_on(1, 0.1, NoteParams::default())).unwrap();
        let buffer = render(&mut synth, 100);
        assert!(buffer.iter().all(|sample| *sample == 0.0));
        assert_eq!(synth.voice_count(), 1);
        let buffer = render(&mut synth, 100);
        assert!(buffer.iter().any(|sample| *sample != 0.0));
    }

    #[test]
    fn voices_are_removed_after_their_release() {
        let params = NoteParams {
            attack: 0.02,
            release: 0.1,
            ..NoteParams::default()
        };
        for duration in [0.01, 0.02, 0.3].iter() {
            let (mut sender, mut synth) = synth();
            sender.send(note_on(1, 0.0, params)).unwrap();
            sender
                .send(ControlMessage::NoteOff {
                    note_id: 1,
                    when: *duration,
                })
                .unwrap();
            let limit = (duration.max(params.attack as f64) + params.release as f64) * RATE as f64;
            render(&mut synth, limit as usize + 2);
            assert_eq!(synth.voice_count(), 0, "duration {}", duration);
        }
    }

    #[test]
    fn note_offs_may_arrive_first() {
        let (mut sender, mut synth) = synth();
        sender
            .send(ControlMessage::NoteOff {
                note_id: 3,
                when: 0.05,
            })
            .unwrap();
        render(&mut synth, 10);
        sender.send(note_on(3, 0.0, NoteParams::default())).unwrap();
        render(&mut synth, 1_000);
        assert_eq!(synth.voice_count(), 0);
    }

    #[test]
    fn clear_releases_every_voice() {
        let (mut sender, mut synth) = synth();
        for note_id in 0..5 {
            sender.send(note_on(note_id, 0.0, NoteParams::default())).unwrap();
        }
        render(&mut synth, 64);
        assert_eq!(synth.active_voices(), 5);

        sender.send(ControlMessage::Clear { when: 100.0 }).unwrap();
        render(&mut synth, 64);
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn clear_forgets_parked_note_offs() {
        let (mut sender, mut synth) = synth();
        sender
            .send(ControlMessage::NoteOff {
                note_id: 3,
                when: 0.0,
            })
            .unwrap();
        sender.send(ControlMessage::Clear { when: 0.0 }).unwrap();
        sender.send(note_on(3, 0.0, NoteParams::default())).unwrap();
        render(&mut synth, 100);
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let (mut sender, mut synth) = synth();
        sender
            .send(ControlMessage::NoteOn {
                note_id: 1,
                when: f64::NAN,
                frequency: 220.0,
                velocity: 1.0,
                params: NoteParams::default(),
            })
            .unwrap();
        sender
            .send(ControlMessage::NoteOn {
                note_id: 2,
                when: 0.0,
                frequency: f32::INFINITY,
                velocity: 1.0,
                params: NoteParams::default(),
            })
            .unwrap();
        sender.send(note_on(3, 0.0, NoteParams::default())).unwrap();
        let buffer = render(&mut synth, 64);
        assert_eq!(synth.voice_count(), 1);
        assert!(buffer.iter().all(|sample| sample.is_finite()));
    }

    #[test]
    fn polyphony_is_capped() {
        let (mut sender, mut synth) = synth();
        for note_id in 0..MAX_VOICES as u64 + 4 {
            sender.send(note_on(note_id, 0.0, NoteParams::default())).unwrap();
        }
        render(&mut synth, 1);
        assert_eq!(synth.voice_count(), MAX_VOICES);
    }

    #[test]
    fn releasing_voices_are_stolen_first() {
        let (mut sender, mut synth) = synth();
        let params = NoteParams {
            release: 10.0,
            ..NoteParams::default()
        };
        for note_id in 0..MAX_VOICES as u64 {
            sender.send(note_on(note_id, 0.0, params)).unwrap();
        }
        sender
            .send(ControlMessage::NoteOff {
                note_id: 7,
                when: 0.005,
            })
            .unwrap();
        render(&mut synth, 10);
        assert_eq!(synth.active_voices(), MAX_VOICES - 1);
        sender.send(note_on(100, 0.0, params)).unwrap();
        render(&mut synth, 1);
        assert_eq!(synth.voice_count(), MAX_VOICES);
        assert!(synth.voices().any(|voice| voice.note_id() == 100));
        assert!(!synth.voices().any(|voice| voice.note_id() == 7));
    }

    #[test]
    fn notes_in_a_group_glide() {
        let (mut sender, mut synth) = synth();
        let params = NoteParams {
            glide: 0.2,
            ..NoteParams::default()
        };
        sender.send(note_on(1, 0.0, params)).unwrap();
        sender
            .send(ControlMessage::NoteOn {
                note_id: 2,
                when: 0.1,
                frequency: 440.0,
                velocity: 0.8,
                params,
            })
            .unwrap();
        render(&mut synth, 200);
        let gliding = synth
            .voices()
            .find(|voice| voice.note_id() == 2)
            .unwrap()
            .frequency();
        assert!(gliding > 220.0 && gliding < 440.0, "{}", gliding);
    }

    #[test]
    fn clock_tracks_rendered_frames() {
        let (_, mut synth) = synth();
        let clock = synth.clock();
        render(&mut synth, 250);
        assert_eq!(clock.frames(), 250);
        assert_eq!(clock.seconds(), 0.25);
    }

    #[test]
    fn tiny_sample_rates_are_raised() {
        let (mut sender, receiver) = control_channel(16);
        let mut synth = Synth::new(30.0, receiver);
        assert_eq!(synth.sample_rate(), MIN_SAMPLE_RATE);
        let params = NoteParams {
            cutoff: 20_000.0,
            resonance: 0.8,
            ..NoteParams::default()
        };
        sender.send(note_on(1, 0.0, params)).unwrap();
        let output = render(&mut synth, 100);
        assert!(output.iter().all(|sample| sample.is_finite()));
        assert!(output.iter().any(|sample| *sample != 0.0));
    }

    #[test]
    fn percussive_notes_end_on_their_own() {
        let (mut sender, mut synth) = synth();
        let params = NoteParams {
            attack: 0.001,
            release: 0.05,
            technique: VoiceTechnique::Percussive,
            ..NoteParams::default()
        };
        sender.send(note_on(1, 0.0, params)).unwrap();
        render(&mut synth, 100);
        assert_eq!(synth.voice_count(), 0);
    }
}
