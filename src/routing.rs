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

//! Sends scheduled notes to the instrument playing each role.
//!
//! Every role is played by an [`Instrument`]. A [`Synthesized`] instrument turns notes into
//! [`ControlMessage`]s for the [`Synth`](crate::synth::Synth), shaping a patch preset with the
//! note's technique and synthesis hints. A [`SampleBacked`] instrument hands notes to the host
//! through a [`SampleLoader`]; loading and decoding samples is the host's business.
//!
//! A [`Router`] keeps the instrument of every role and swaps it out when a bar asks for a
//! different one. An [`Orchestrator`] ties everything on the receiving side of a
//! [`bar_channel`](crate::channel::bar_channel) together: it maps bars onto the render clock with
//! a [`Timeline`] and routes the resulting notes.
//!
//! ```
//! use reverie::blueprint::Library;
//! use reverie::channel::bar_channel;
//! use reverie::composer::Composition;
//! use reverie::routing::{Orchestrator, Router};
//! use reverie::settings::Settings;
//! use reverie::synth::{control_channel, Synth};
//!
//! let settings = Settings::default();
//! let (control, receiver) = control_channel(1024);
//! let synth = Synth::new(48_000.0, receiver);
//! let (mut sender, bars) = bar_channel();
//!
//! let router = Router::new(control, &settings, None);
//! let mut orchestrator = Orchestrator::new(bars, router, synth.clock());
//!
//! let mut composition = Composition::new(settings, Library::builtin());
//! composition.tick(&mut sender);
//! assert_eq!(orchestrator.pump()?, 1);
//! # reverie::routing::Result::Ok(())
//! ```

use crate::{
    channel::{BarMessage, BarReceiver, Disconnected, ScheduledNote, Timeline},
    composer::{BarReady, Report},
    engine::default_patch,
    event::{Event, Role, Technique, BEATS_PER_BAR, HAT, KICK, SNARE},
    settings::{InstrumentChoice, Patch, Settings},
    synth::{
        self,
        control::{ControlMessage, NoteParams, VoiceTechnique, Waveform},
        ControlSender, RenderClock,
    },
    theory::midi_to_hz,
};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error;

/// A specialized [`Result`] type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What a [`SampleLoader`] returns when it cannot schedule a note.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by routing operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("control ring buffer is full")]
    Full,
    #[error("the synthesizer has been dropped")]
    Abandoned,
    #[error("scheduling sample {sample:?}: {source}")]
    Sample {
        sample: String,
        #[source]
        source: LoaderError,
    },
    #[error("the composer hung up")]
    Hangup,
}

impl From<synth::Full> for Error {
    fn from(_: synth::Full) -> Error {
        Error::Full
    }
}

/// Host-provided sample playback.
pub trait SampleLoader: Send + Sync {
    /// Plays `sample` for `note`. Times are render clock seconds.
    fn schedule(&self, sample: &str, note: &ScheduledNote)
        -> std::result::Result<(), LoaderError>;

    /// Stops everything that is playing or scheduled from `when` on.
    fn stop_all(&self, _when: f64) {}
}

/// Plays the notes of one role.
pub trait Instrument: Send + fmt::Debug {
    /// Plays one note.
    fn play(&mut self, note: &ScheduledNote, dispatch: &mut Dispatch) -> Result<()>;

    /// Stops whatever the instrument is playing outside the synthesizer.
    fn stop_all(&mut self, _when: f64) {}

    /// The choice this instrument was built from.
    fn choice(&self) -> InstrumentChoice;
}

/// Sends voices to the synthesizer and hands out note ids.
#[derive(Debug)]
pub struct Dispatch {
    control: ControlSender,
    next_id: u64,
    beat: f64,
}

impl Dispatch {
    fn new(control: ControlSender) -> Dispatch {
        Dispatch {
            control,
            next_id: 1,
            beat: 0.5,
        }
    }

    /// Seconds per beat of the bar being dispatched.
    pub fn beat(&self) -> f64 {
        self.beat
    }

    /// Sends a note on and its note off. Returns the note id.
    pub fn voice(
        &mut self,
        note: &ScheduledNote,
        frequency: f32,
        velocity: f32,
        params: NoteParams,
    ) -> Result<u64> {
        if self.control.is_abandoned() {
            return Err(Error::Abandoned);
        }
        if self.control.slots() < 2 {
            return Err(Error::Full);
        }
        let note_id = self.next_id;
        self.next_id += 1;
        self.control.send(ControlMessage::NoteOn {
            note_id,
            when: note.on,
            frequency,
            velocity,
            params,
        })?;
        self.control.send(ControlMessage::NoteOff {
            note_id,
            when: note.off,
        })?;
        Ok(note_id)
    }

    fn clear(&mut self, when: f64) -> Result<()> {
        if self.control.is_abandoned() {
            return Err(Error::Abandoned);
        }
        self.control.send(ControlMessage::Clear { when })?;
        Ok(())
    }
}

/// Plays a role on the built-in synthesizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synthesized {
    role: Role,
    patch: Patch,
}

impl Synthesized {
    pub fn new(role: Role, patch: Patch) -> Synthesized {
        Synthesized { role, patch }
    }

    /// Frequency and voice parameters for an event.
    pub fn voice_for(&self, event: &Event, length: f64, beat: f64) -> (f32, NoteParams) {
        let (frequency, mut params) = if self.role == Role::Drums || self.patch == Patch::Kit {
            drum(event.pitch)
        } else {
            (midi_to_hz(event.pitch as f64) as f32, preset(self.patch))
        };

        if self.role == Role::Drums {
            params.technique = VoiceTechnique::Percussive;
        } else if event.technique == Technique::Pulse {
            params.technique = VoiceTechnique::Pulse;
            params.pulse_interval = (beat / 4.0).max(0.01) as f32;
        } else if event.technique.is_percussive() {
            params.technique = VoiceTechnique::Percussive;
        }
        if event.technique == Technique::Riser {
            params.attack = params.attack.max((length * 0.8) as f32);
        }

        params.cutoff *= ((event.hint.brightness.clamp(0.0, 1.0) - 0.5) * 4.0).exp2() as f32;
        params.distortion += (event.hint.drive.clamp(0.0, 1.0) * 6.0) as f32;
        if event.hint.glide {
            params.glide = (beat * 0.5).min(0.25) as f32;
        }
        params.group = self.role.index() as u8;
        (frequency, params)
    }
}

impl Instrument for Synthesized {
    fn play(&mut self, note: &ScheduledNote, dispatch: &mut Dispatch) -> Result<()> {
        let (frequency, params) = self.voice_for(&note.event, note.off - note.on, dispatch.beat);
        dispatch.voice(note, frequency, note.event.velocity as f32, params)?;
        Ok(())
    }

    fn choice(&self) -> InstrumentChoice {
        InstrumentChoice::Synth(self.patch)
    }
}

/// Plays a role with samples through the host's [`SampleLoader`].
pub struct SampleBacked {
    sample: String,
    loader: Arc<dyn SampleLoader>,
}

impl SampleBacked {
    pub fn new(sample: impl Into<String>, loader: Arc<dyn SampleLoader>) -> SampleBacked {
        SampleBacked {
            sample: sample.into(),
            loader,
        }
    }
}

impl fmt::Debug for SampleBacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBacked")
            .field("sample", &self.sample)
            .finish()
    }
}

impl Instrument for SampleBacked {
    fn play(&mut self, note: &ScheduledNote, _: &mut Dispatch) -> Result<()> {
        self.loader
            .schedule(&self.sample, note)
            .map_err(|source| Error::Sample {
                sample: self.sample.clone(),
                source,
            })
    }

    fn stop_all(&mut self, when: f64) {
        self.loader.stop_all(when);
    }

    fn choice(&self) -> InstrumentChoice {
        InstrumentChoice::Sample(self.sample.clone())
    }
}

/// The preset of a patch.
pub fn preset(patch: Patch) -> NoteParams {
    let base = NoteParams::default();
    match patch {
        Patch::Pad => NoteParams {
            attack: 0.8,
            release: 2.0,
            cutoff: 1_200.0,
            resonance: 0.1,
            waveform: Waveform::Fat,
            oscillators: 2,
            detune: 12.0,
            ..base
        },
        Patch::Pluck => NoteParams {
            attack: 0.005,
            release: 0.4,
            cutoff: 2_500.0,
            waveform: Waveform::Triangle,
            technique: VoiceTechnique::Percussive,
            ..base
        },
        Patch::Bass => NoteParams {
            attack: 0.01,
            release: 0.25,
            cutoff: 600.0,
            resonance: 0.3,
            distortion: 0.5,
            waveform: Waveform::Saw,
            ..base
        },
        Patch::SubBass => NoteParams {
            attack: 0.03,
            release: 0.4,
            cutoff: 300.0,
            ..base
        },
        Patch::Lead => NoteParams {
            attack: 0.02,
            release: 0.3,
            cutoff: 3_000.0,
            resonance: 0.2,
            waveform: Waveform::Square,
            oscillators: 2,
            detune: 8.0,
            ..base
        },
        Patch::Bell => NoteParams {
            attack: 0.002,
            release: 1.5,
            cutoff: 5_000.0,
            waveform: Waveform::Triangle,
            technique: VoiceTechnique::Percussive,
            ..base
        },
        Patch::Organ => NoteParams {
            attack: 0.02,
            release: 0.15,
            cutoff: 2_500.0,
            waveform: Waveform::Fat,
            ..base
        },
        Patch::Drone => NoteParams {
            attack: 2.0,
            release: 3.0,
            cutoff: 500.0,
            resonance: 0.15,
            waveform: Waveform::Saw,
            oscillators: 3,
            detune: 15.0,
            ..base
        },
        Patch::Kit => NoteParams {
            attack: 0.001,
            release: 0.1,
            cutoff: 6_000.0,
            waveform: Waveform::Noise,
            technique: VoiceTechnique::Percussive,
            ..base
        },
        Patch::Wash => NoteParams {
            attack: 1.5,
            release: 2.5,
            cutoff: 900.0,
            resonance: 0.4,
            waveform: Waveform::Noise,
            ..base
        },
    }
}

/// Frequency and voice parameters for a drum note.
fn drum(pitch: u8) -> (f32, NoteParams) {
    let kit = preset(Patch::Kit);
    match pitch {
        KICK => (
            55.0,
            NoteParams {
                release: 0.35,
                cutoff: 180.0,
                distortion: 1.5,
                waveform: Waveform::Sine,
                ..kit
            },
        ),
        SNARE => (
            180.0,
            NoteParams {
                release: 0.18,
                cutoff: 3_500.0,
                resonance: 0.2,
                ..kit
            },
        ),
        HAT => (
            8_000.0,
            NoteParams {
                release: 0.05,
                cutoff: 12_000.0,
                ..kit
            },
        ),
        pitch => (midi_to_hz(pitch as f64) as f32, kit),
    }
}

/// How a call to [`Router::dispatch`] went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatched {
    pub played: usize,
    pub dropped: usize,
}

#[derive(Debug)]
struct Slot {
    choice: InstrumentChoice,
    instrument: Option<Box<dyn Instrument>>,
}

/// Keeps the instrument of every role.
pub struct Router {
    dispatch: Dispatch,
    loader: Option<Arc<dyn SampleLoader>>,
    slots: BTreeMap<Role, Slot>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("dispatch", &self.dispatch)
            .field("loader", &self.loader.is_some())
            .field("slots", &self.slots)
            .finish()
    }
}

impl Router {
    /// Creates a router playing the instruments chosen in `settings`.
    ///
    /// Without a `loader`, roles that ask for samples play their default synthesizer patch.
    pub fn new(
        control: ControlSender,
        settings: &Settings,
        loader: Option<Arc<dyn SampleLoader>>,
    ) -> Router {
        let mut router = Router {
            dispatch: Dispatch::new(control),
            loader,
            slots: BTreeMap::new(),
        };
        for &role in Role::ALL.iter() {
            router.route(role, settings.instrument(role));
        }
        router
    }

    /// Makes `choice` play `role`. Returns whether the instrument changed.
    pub fn route(&mut self, role: Role, choice: &InstrumentChoice) -> bool {
        if let Some(slot) = self.slots.get(&role) {
            if slot.choice == *choice {
                return false;
            }
        }
        let instrument = self.build(role, choice);
        log::debug!("{} plays {:?}", role, instrument);
        self.slots.insert(
            role,
            Slot {
                choice: choice.clone(),
                instrument,
            },
        );
        true
    }

    fn build(&self, role: Role, choice: &InstrumentChoice) -> Option<Box<dyn Instrument>> {
        match choice {
            InstrumentChoice::Silent => None,
            InstrumentChoice::Auto => Some(Box::new(Synthesized::new(role, default_patch(role)))),
            InstrumentChoice::Synth(patch) => Some(Box::new(Synthesized::new(role, *patch))),
            InstrumentChoice::Sample(sample) => match &self.loader {
                Some(loader) => Some(Box::new(SampleBacked::new(sample.clone(), loader.clone()))),
                None => {
                    log::warn!(
                        "no sample loader for {:?}, {} falls back to the synthesizer",
                        sample,
                        role
                    );
                    Some(Box::new(Synthesized::new(role, default_patch(role))))
                }
            },
        }
    }

    /// The instrument playing `role`, if the role is not silent.
    pub fn instrument(&self, role: Role) -> Option<&dyn Instrument> {
        self.slots
            .get(&role)
            .and_then(|slot| slot.instrument.as_deref())
    }

    /// Plays the notes of a bar lasting `bar_duration` seconds.
    ///
    /// Notes that cannot be delivered are dropped with a warning. Only losing the synthesizer
    /// altogether is an error.
    pub fn dispatch(&mut self, bar_duration: f64, notes: &[ScheduledNote]) -> Result<Dispatched> {
        self.dispatch.beat = bar_duration / BEATS_PER_BAR;
        let mut dispatched = Dispatched::default();
        for note in notes {
            let slot = match self.slots.get_mut(&note.event.role) {
                Some(slot) => slot,
                None => continue,
            };
            let instrument = match slot.instrument.as_mut() {
                Some(instrument) => instrument,
                None => continue,
            };
            match instrument.play(note, &mut self.dispatch) {
                Ok(()) => dispatched.played += 1,
                Err(Error::Abandoned) => return Err(Error::Abandoned),
                Err(error) => {
                    log::warn!(
                        "dropping {} note {}: {}",
                        note.event.role,
                        note.event.pitch,
                        error
                    );
                    dispatched.dropped += 1;
                }
            }
        }
        Ok(dispatched)
    }

    /// Releases every voice right away and stops every sample instrument from `when` on.
    pub fn all_notes_off(&mut self, when: f64) -> Result<()> {
        for slot in self.slots.values_mut() {
            if let Some(instrument) = slot.instrument.as_mut() {
                instrument.stop_all(when);
            }
        }
        self.dispatch.clear(when)
    }
}

/// Drives a [`Router`] from a [`bar_channel`](crate::channel::bar_channel).
#[derive(Debug)]
pub struct Orchestrator {
    bars: BarReceiver,
    timeline: Timeline,
    router: Router,
    clock: RenderClock,
}

impl Orchestrator {
    pub fn new(bars: BarReceiver, router: Router, clock: RenderClock) -> Orchestrator {
        Orchestrator {
            bars,
            timeline: Timeline::default(),
            router,
            clock,
        }
    }

    /// Replaces the default [`Timeline`].
    pub fn timeline(mut self, timeline: Timeline) -> Orchestrator {
        self.timeline = timeline;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handles every bar that has arrived, without blocking. Returns the number of bars.
    ///
    /// Returns [`Error::Hangup`] once the composer is gone and every bar has been handled.
    pub fn pump(&mut self) -> Result<usize> {
        let mut bars = 0;
        loop {
            match self.bars.try_recv() {
                Ok(Some(message)) => {
                    if self.handle(message)? {
                        bars += 1;
                    }
                }
                Ok(None) => return Ok(bars),
                Err(Disconnected) if bars > 0 => return Ok(bars),
                Err(Disconnected) => return Err(Error::Hangup),
            }
        }
    }

    /// Handles bars as they arrive until the composer hangs up.
    pub fn run(&mut self) -> Result<()> {
        while let Some(message) = self.bars.recv() {
            self.handle(message)?;
        }
        Ok(())
    }

    /// Releases every voice and re-anchors the timeline.
    pub fn all_notes_off(&mut self) -> Result<()> {
        self.timeline.reset();
        self.router.all_notes_off(self.clock.seconds())
    }

    fn handle(&mut self, message: BarMessage) -> Result<bool> {
        match message {
            BarMessage::Bar(bar) => {
                self.play(&bar)?;
                Ok(true)
            }
            BarMessage::Report(Report::Stopped { .. }) => {
                self.timeline.reset();
                Ok(false)
            }
            BarMessage::Report(_) => Ok(false),
        }
    }

    fn play(&mut self, bar: &BarReady) -> Result<()> {
        for (role, choice) in bar.instrument_hints.iter() {
            self.router.route(*role, choice);
        }
        let notes = self.timeline.map_bar(bar, self.clock.seconds());
        let dispatched = self.router.dispatch(bar.bar_duration, &notes)?;
        log::debug!(
            "bar {}: {} notes played, {} dropped",
            bar.bar_count,
            dispatched.played,
            dispatched.dropped
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::bar_channel,
        event::SynthHint,
        synth::{control_channel, ControlReceiver},
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        scheduled: Mutex<Vec<(String, f64)>>,
        stopped: Mutex<Vec<f64>>,
    }

    impl SampleLoader for Recorder {
        fn schedule(
            &self,
            sample: &str,
            note: &ScheduledNote,
        ) -> std::result::Result<(), LoaderError> {
            self.scheduled
                .lock()
                .unwrap()
                .push((sample.to_owned(), note.on));
            Ok(())
        }

        fn stop_all(&self, when: f64) {
            self.stopped.lock().unwrap().push(when);
        }
    }

    fn note(role: Role, pitch: u8, on: f64) -> ScheduledNote {
        ScheduledNote {
            event: Event::new(role, pitch, 0.0, 1.0),
            on,
            off: on + 0.5,
        }
    }

    fn drain(receiver: &mut ControlReceiver) -> Vec<ControlMessage> {
        std::iter::from_fn(|| receiver.pop()).collect()
    }

    #[test]
    fn synthesized_notes_become_voice_pairs() {
        let (control, mut receiver) = control_channel(64);
        let mut router = Router::new(control, &Settings::default(), None);
        let dispatched = router
            .dispatch(2.0, &[note(Role::Bass, 45, 1.0), note(Role::Melody, 69, 1.5)])
            .unwrap();
        assert_eq!(
            dispatched,
            Dispatched {
                played: 2,
                dropped: 0
            }
        );

        let messages = drain(&mut receiver);
        assert_eq!(messages.len(), 4);
        match messages[2] {
            ControlMessage::NoteOn {
                note_id,
                when,
                frequency,
                ..
            } => {
                assert_eq!(note_id, 2);
                assert_eq!(when, 1.5);
                assert!((frequency - 440.0).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            messages[3],
            ControlMessage::NoteOff {
                note_id: 2,
                when: 2.0
            }
        );
    }

    #[test]
    fn drum_notes_use_kit_voices() {
        let synthesized = Synthesized::new(Role::Drums, Patch::Kit);
        let event = Event::new(Role::Drums, KICK, 0.0, 0.125);
        let (frequency, kick) = synthesized.voice_for(&event, 0.1, 0.5);
        assert_eq!(frequency, 55.0);
        assert_eq!(kick.waveform, Waveform::Sine);
        assert_eq!(kick.technique, VoiceTechnique::Percussive);

        let (_, snare) = synthesized.voice_for(&Event::new(Role::Drums, SNARE, 0.0, 0.1), 0.1, 0.5);
        let (_, hat) = synthesized.voice_for(&Event::new(Role::Drums, HAT, 0.0, 0.1), 0.1, 0.5);
        assert_eq!(snare.waveform, Waveform::Noise);
        assert!(hat.release < snare.release);
    }

    #[test]
    fn techniques_and_hints_shape_the_voice() {
        let synthesized = Synthesized::new(Role::Accompaniment, Patch::Pad);
        let pulse = Event::new(Role::Accompaniment, 60, 0.0, 2.0).technique(Technique::Pulse);
        let (_, params) = synthesized.voice_for(&pulse, 1.0, 0.5);
        assert_eq!(params.technique, VoiceTechnique::Pulse);
        assert_eq!(params.pulse_interval, 0.125);

        let bright = Event::new(Role::Accompaniment, 60, 0.0, 2.0).hint(SynthHint {
            brightness: 1.0,
            drive: 0.5,
            glide: true,
        });
        let (_, params) = synthesized.voice_for(&bright, 1.0, 0.5);
        let pad = preset(Patch::Pad);
        assert_eq!(params.cutoff, pad.cutoff * 4.0);
        assert_eq!(params.distortion, pad.distortion + 3.0);
        assert_eq!(params.glide, 0.25);
        assert_eq!(params.group, Role::Accompaniment.index() as u8);
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn every_preset_is_valid() {
        let patches = [
            Patch::Pad,
            Patch::Pluck,
            Patch::Bass,
            Patch::SubBass,
            Patch::Lead,
            Patch::Bell,
            Patch::Organ,
            Patch::Drone,
            Patch::Kit,
            Patch::Wash,
        ];
        for patch in patches.iter() {
            assert_eq!(preset(*patch).validate(), Ok(()), "{:?}", patch);
        }
    }

    #[test]
    fn sample_roles_go_to_the_loader() {
        let loader = Arc::new(Recorder::default());
        let mut settings = Settings::default();
        settings
            .instruments
            .insert(Role::Melody, InstrumentChoice::Sample("piano".to_owned()));
        let (control, mut receiver) = control_channel(64);
        let mut router = Router::new(control, &settings, Some(loader.clone()));

        router
            .dispatch(2.0, &[note(Role::Melody, 72, 3.0)])
            .unwrap();
        assert_eq!(
            *loader.scheduled.lock().unwrap(),
            vec![("piano".to_owned(), 3.0)]
        );
        assert!(drain(&mut receiver).is_empty());

        router.all_notes_off(4.0).unwrap();
        assert_eq!(*loader.stopped.lock().unwrap(), vec![4.0]);
        assert_eq!(
            drain(&mut receiver),
            vec![ControlMessage::Clear { when: 4.0 }]
        );
    }

    #[test]
    fn samples_without_a_loader_fall_back_to_the_synth() {
        let (control, _receiver) = control_channel(64);
        let mut router = Router::new(control, &Settings::default(), None);
        router.route(Role::Melody, &InstrumentChoice::Sample("piano".to_owned()));
        assert_eq!(
            router.instrument(Role::Melody).unwrap().choice(),
            InstrumentChoice::Synth(Patch::Bell)
        );
    }

    #[test]
    fn instruments_change_with_the_hints() {
        let (control, _receiver) = control_channel(64);
        let mut router = Router::new(control, &Settings::default(), None);
        assert!(!router.route(Role::Bass, &InstrumentChoice::Auto));
        assert!(router.route(Role::Bass, &InstrumentChoice::Synth(Patch::Bass)));
        assert_eq!(
            router.instrument(Role::Bass).unwrap().choice(),
            InstrumentChoice::Synth(Patch::Bass)
        );
        assert!(router.route(Role::Bass, &InstrumentChoice::Silent));
        assert!(router.instrument(Role::Bass).is_none());
    }

    #[test]
    fn full_rings_drop_notes() {
        let (control, _receiver) = control_channel(3);
        let mut router = Router::new(control, &Settings::default(), None);
        let dispatched = router
            .dispatch(2.0, &[note(Role::Bass, 40, 0.0), note(Role::Bass, 42, 0.5)])
            .unwrap();
        assert_eq!(
            dispatched,
            Dispatched {
                played: 1,
                dropped: 1
            }
        );
    }

    #[test]
    fn losing_the_synth_is_an_error() {
        let (control, receiver) = control_channel(8);
        drop(receiver);
        let mut router = Router::new(control, &Settings::default(), None);
        assert!(matches!(
            router.dispatch(2.0, &[note(Role::Bass, 40, 0.0)]),
            Err(Error::Abandoned)
        ));
    }

    #[test]
    fn orchestrator_routes_bars() {
        use crate::{blueprint::Library, composer::Composition, synth::Synth};

        let (control, receiver) = control_channel(1024);
        let synth = Synth::new(48_000.0, receiver);
        let (mut sender, bars) = bar_channel();
        let router = Router::new(control, &Settings::default(), None);
        let mut orchestrator =
            Orchestrator::new(bars, router, synth.clock()).timeline(Timeline::new(0.5));

        let mut composition = Composition::new(Settings::default(), Library::builtin());
        composition.tick(&mut sender);
        composition.tick(&mut sender);
        assert_eq!(orchestrator.pump().unwrap(), 2);
        assert_eq!(orchestrator.pump().unwrap(), 0);

        drop(sender);
        drop(composition);
        assert!(matches!(orchestrator.pump(), Err(Error::Hangup)));
    }
}
