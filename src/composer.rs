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

//! Drives the engine once per bar.
//!
//! A [`Composition`] is the state of one generative session: the settings, the engine and the
//! bar counter. Every [`Composition::tick`] writes one bar and hands it to a [`BarSink`] as a
//! [`BarReady`]. Ticking never fails. Bars the engine cannot write are reported as
//! [`Report::BarSkipped`] and the counter moves on regardless, and when the counter reaches the
//! end of the composition a new one is generated from a fresh seed.
//!
//! A [`Composer`] runs a composition on its own thread with a [`Scheduler`], ticking once per bar
//! period. It can be stopped, restarted and reconfigured while it runs:
//!
//! ```
//! use reverie::composer::{BarReady, Composer};
//! use reverie::settings::{Mood, Settings, SettingsUpdate};
//! use std::sync::mpsc;
//!
//! let (sender, bars) = mpsc::channel();
//! let mut composer = Composer::new(move |bar: BarReady| {
//!     let _ = sender.send(bar);
//! });
//!
//! composer.init(Settings {
//!     tempo: Some(240.0),
//!     ..Settings::default()
//! })?;
//! composer.start()?;
//! let first = bars.recv().unwrap();
//! assert_eq!(first.bar_count, 0);
//!
//! composer.update_settings(&SettingsUpdate::default().mood(Mood::Dark))?;
//! composer.stop()?;
//! # reverie::composer::Result::Ok(())
//! ```

use crate::{
    blueprint::{navigator::NavigationInfo, Library},
    engine::{BarOutput, Engine, PhraseInfo},
    event::{Event, Role},
    scheduler::{self, Handle, Job, Scheduler},
    seed,
    settings::{self, Changes, InstrumentChoice, Settings, SettingsUpdate},
};
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, Sender},
    time::{Duration, Instant},
};
use thiserror::Error;

/// A specialized [`Result`] type for composer errors.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Composer`] commands.
#[derive(Debug, Error)]
pub enum Error {
    #[error("composer has no settings, call init first")]
    NotInitialized,
    #[error("invalid settings: {0}")]
    Settings(#[from] settings::Error),
    #[error(transparent)]
    Scheduler(#[from] scheduler::Error),
    #[error("the composer thread did not hand its bar sink back")]
    SinkLost,
    #[error("the composer thread died, start it again to resume")]
    Dead,
}

/// One bar of music, ready to be scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarReady {
    pub events: Vec<Event>,
    pub instrument_hints: BTreeMap<Role, InstrumentChoice>,
    /// Length of the bar in seconds.
    pub bar_duration: f64,
    pub bar_count: u32,
    pub actual_bpm: f64,
    pub nav: NavigationInfo,
    pub tension: f64,
    pub phrases: BTreeMap<Role, PhraseInfo>,
}

/// Things that happen to a composition besides bars being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Report {
    Started { seed: u64 },
    Stopped { bar_count: u32 },
    /// The composition was regenerated because its settings changed or it was asked to.
    Reset { seed: u64 },
    /// The composition reached its end and a new one was generated.
    CycleComplete { seed: u64, total_bars: u32 },
    /// The engine could not write a bar. The bar was skipped.
    BarSkipped { bar_count: u32, reason: String },
}

/// Receives what a composition produces.
pub trait BarSink {
    fn bar(&mut self, bar: BarReady);

    /// Defaults to logging the report.
    fn report(&mut self, report: Report) {
        log::info!("{:?}", report);
    }
}

impl<F> BarSink for F
where
    F: FnMut(BarReady),
{
    fn bar(&mut self, bar: BarReady) {
        self(bar)
    }
}

/// The state of one generative session.
#[derive(Debug, Clone)]
pub struct Composition {
    library: Library,
    settings: Settings,
    engine: Engine,
    bar_count: u32,
    seed: u64,
}

impl Composition {
    /// Starts a composition seeded with the settings' seed.
    pub fn new(settings: Settings, library: Library) -> Composition {
        let seed = settings.seed;
        let engine = Engine::with_seed(settings.clone(), &library, seed);
        Composition {
            library,
            settings,
            engine,
            bar_count: 0,
            seed,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The number of the next bar to be written.
    pub fn bar_count(&self) -> u32 {
        self.bar_count
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Length of the next bar in seconds.
    pub fn bar_duration(&self) -> f64 {
        self.engine.bar_duration()
    }

    /// Writes the next bar and returns its length in seconds.
    pub fn tick(&mut self, sink: &mut impl BarSink) -> f64 {
        if self.bar_count >= self.engine.total_bars() {
            let total_bars = self.engine.total_bars();
            let seed = seed::next_seed(self.seed);
            log::info!("composition complete after {} bars", total_bars);
            self.regenerate(seed);
            sink.report(Report::CycleComplete { seed, total_bars });
        }

        let bar_duration = self.engine.bar_duration();
        let bar_count = self.bar_count;
        let engine = &mut self.engine;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            engine.evolve(bar_duration, bar_count)
        }));
        match result {
            Ok(Ok(output)) => sink.bar(self.package(output, bar_duration)),
            Ok(Err(err)) => self.skip(sink, err.to_string()),
            Err(payload) => self.skip(sink, panic_message(payload)),
        }
        self.bar_count += 1;
        bar_duration
    }

    /// Applies a partial settings update.
    ///
    /// Mood, genre, seed and intro length changes regenerate the composition and restart the bar
    /// count. Everything else is applied to the running composition.
    pub fn apply_update(&mut self, update: &SettingsUpdate) -> settings::Result<Changes> {
        let changes = self.settings.apply(update)?;
        if changes.is_structural() {
            let seed = if changes.seed {
                self.settings.seed
            } else {
                seed::next_seed(self.seed)
            };
            self.regenerate(seed);
        } else if !changes.is_empty() {
            self.engine.reconfigure(self.settings.clone());
        }
        Ok(changes)
    }

    /// Regenerates the composition from a new seed.
    pub fn reset(&mut self) -> u64 {
        let seed = seed::next_seed(self.seed);
        self.regenerate(seed);
        seed
    }

    fn regenerate(&mut self, seed: u64) {
        self.seed = seed;
        self.engine = Engine::with_seed(self.settings.clone(), &self.library, seed);
        self.bar_count = 0;
    }

    fn package(&self, output: BarOutput, bar_duration: f64) -> BarReady {
        BarReady {
            events: output.events,
            instrument_hints: output.instrument_hints,
            bar_duration,
            bar_count: self.bar_count,
            actual_bpm: self.engine.tempo(),
            nav: output.nav,
            tension: output.tension,
            phrases: output.phrases,
        }
    }

    fn skip(&self, sink: &mut impl BarSink, reason: String) {
        log::error!("skipping bar {}: {}", self.bar_count, reason);
        sink.report(Report::BarSkipped {
            bar_count: self.bar_count,
            reason,
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "engine panicked".to_owned(),
        },
    }
}

#[derive(Debug)]
enum Command {
    Update(SettingsUpdate),
    Reset,
}

struct ComposerJob<S> {
    composition: Composition,
    sink: S,
    commands: Receiver<Command>,
}

impl<S: BarSink> ComposerJob<S> {
    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Update(update) => match self.composition.apply_update(&update) {
                    Ok(changes) if changes.is_structural() => {
                        let seed = self.composition.seed();
                        log::info!("settings changed the composition, new seed {}", seed);
                        self.sink.report(Report::Reset { seed });
                    }
                    Ok(changes) => log::debug!("settings updated: {:?}", changes),
                    Err(err) => log::warn!("ignoring settings update: {}", err),
                },
                Command::Reset => {
                    let seed = self.composition.reset();
                    log::info!("composition reset, new seed {}", seed);
                    self.sink.report(Report::Reset { seed });
                }
            }
        }
    }
}

impl<S: BarSink> Job for ComposerJob<S> {
    fn run(&mut self, _logical_time: Instant) -> Option<Duration> {
        self.apply_commands();
        let seconds = self.composition.tick(&mut self.sink);
        match Duration::try_from_secs_f64(seconds) {
            Ok(duration) => Some(duration),
            Err(err) => {
                log::error!("bar duration {} is unusable: {}", seconds, err);
                Some(Duration::from_secs(2))
            }
        }
    }
}

enum State<S> {
    Idle(S),
    Running {
        handle: Handle<ComposerJob<S>>,
        commands: Sender<Command>,
    },
    Lost,
}

/// Runs a [`Composition`] on its own thread, one bar per bar period.
pub struct Composer<S: BarSink + Send + 'static> {
    library: Library,
    settings: Option<Settings>,
    lookahead: Duration,
    state: State<S>,
}

impl<S: BarSink + Send + 'static> Composer<S> {
    /// Creates a stopped composer using the built-in blueprints.
    pub fn new(sink: S) -> Composer<S> {
        Composer::with_library(sink, Library::builtin())
    }

    pub fn with_library(sink: S, library: Library) -> Composer<S> {
        Composer {
            library,
            settings: None,
            lookahead: Duration::from_millis(100),
            state: State::Idle(sink),
        }
    }

    /// How far ahead of the bar clock bars are written. Takes effect on the next start.
    pub fn lookahead(mut self, lookahead: Duration) -> Composer<S> {
        self.lookahead = lookahead;
        self
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    /// Sets the settings the next composition starts with. A running composer restarts.
    pub fn init(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.settings = Some(settings);
        if self.is_running() {
            self.stop()?;
            self.start()?;
        }
        Ok(())
    }

    /// Starts composing from bar zero. Does nothing if the composer is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.stop()?;
        let settings = self.settings.clone().ok_or(Error::NotInitialized)?;
        let mut sink = match std::mem::replace(&mut self.state, State::Lost) {
            State::Idle(sink) => sink,
            _ => return Err(Error::SinkLost),
        };

        sink.report(Report::Started {
            seed: settings.seed,
        });
        let (commands, receiver) = mpsc::channel();
        let library = self.library.clone();
        let job_def = move |_: Instant| ComposerJob {
            composition: Composition::new(settings, library),
            sink,
            commands: receiver,
        };
        let handle = Scheduler::new()
            .ahead_by(self.lookahead)
            .spawn("reverie-composer", job_def)?;
        self.state = State::Running { handle, commands };
        log::info!("composer started");
        Ok(())
    }

    /// Stops composing. Bars already handed to the sink are not retracted.
    pub fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Lost) {
            State::Running { handle, .. } => {
                let job = handle.cancel()?.ok_or(Error::SinkLost)?;
                let ComposerJob {
                    composition,
                    mut sink,
                    ..
                } = job;
                sink.report(Report::Stopped {
                    bar_count: composition.bar_count(),
                });
                log::info!("composer stopped at bar {}", composition.bar_count());
                self.state = State::Idle(sink);
                Ok(())
            }
            State::Idle(sink) => {
                self.state = State::Idle(sink);
                Ok(())
            }
            State::Lost => Err(Error::SinkLost),
        }
    }

    /// Regenerates the running composition from a new seed.
    ///
    /// Returns [`Error::Dead`] if the composer thread is gone.
    pub fn reset(&mut self) -> Result<()> {
        if let State::Running { commands, .. } = &self.state {
            commands.send(Command::Reset).map_err(|_| Error::Dead)?;
        }
        Ok(())
    }

    /// Applies a partial settings update.
    ///
    /// The update is validated immediately. A running composition picks it up before writing its
    /// next bar: mood, genre, seed and intro length changes restart it from bar zero, other
    /// changes take effect without interrupting it. If the composer thread is gone the update is
    /// kept for the next start and [`Error::Dead`] is returned.
    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Result<Changes> {
        let settings = self.settings.as_mut().ok_or(Error::NotInitialized)?;
        let changes = settings.apply(update)?;
        if let State::Running { commands, .. } = &self.state {
            commands
                .send(Command::Update(update.clone()))
                .map_err(|_| Error::Dead)?;
        }
        Ok(changes)
    }

    pub fn is_running(&self) -> bool {
        match &self.state {
            State::Running { handle, .. } => !handle.is_finished(),
            _ => false,
        }
    }
}

impl<S: BarSink + Send + 'static> Drop for Composer<S> {
    fn drop(&mut self) {
        if let State::Running { .. } = self.state {
            if let Err(err) = self.stop() {
                log::error!("failed to stop composer: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Genre, Mood};

    #[derive(Default)]
    struct Collector {
        bars: Vec<BarReady>,
        reports: Vec<Report>,
    }

    impl BarSink for Collector {
        fn bar(&mut self, bar: BarReady) {
            self.bars.push(bar);
        }

        fn report(&mut self, report: Report) {
            self.reports.push(report);
        }
    }

    fn settings() -> Settings {
        Settings {
            mood: Mood::Melancholic,
            genre: Genre::Ambient,
            tempo: Some(75.0),
            seed: 42,
            ..Settings::default()
        }
    }

    #[test]
    fn ticks_count_bars() {
        let mut composition = Composition::new(settings(), Library::builtin());
        let mut sink = Collector::default();
        for _ in 0..3 {
            let seconds = composition.tick(&mut sink);
            assert!((seconds - 3.2).abs() < 1e-9);
        }
        let counts = sink.bars.iter().map(|bar| bar.bar_count).collect::<Vec<_>>();
        assert_eq!(counts, vec![0, 1, 2]);
        assert_eq!(sink.bars[0].actual_bpm, 75.0);
        assert_eq!(composition.bar_count(), 3);
    }

    #[test]
    fn mood_change_restarts_the_bar_count() {
        let mut composition = Composition::new(settings(), Library::builtin());
        let mut sink = Collector::default();
        for _ in 0..5 {
            composition.tick(&mut sink);
        }
        let changes = composition
            .apply_update(&SettingsUpdate::default().mood(Mood::Dark))
            .unwrap();
        assert!(changes.is_structural());
        assert_eq!(composition.bar_count(), 0);
        composition.tick(&mut sink);
        assert_eq!(sink.bars.last().unwrap().nav.bar_count, 0);
        assert_eq!(composition.engine().navigator().blueprint().mood, Mood::Dark);
    }

    #[test]
    fn tempo_change_keeps_the_bar_count() {
        let mut composition = Composition::new(settings(), Library::builtin());
        let mut sink = Collector::default();
        composition.tick(&mut sink);
        composition.tick(&mut sink);
        let seed = composition.seed();
        composition
            .apply_update(&SettingsUpdate::default().tempo(120.0))
            .unwrap();
        assert_eq!(composition.bar_count(), 2);
        assert_eq!(composition.seed(), seed);
        composition.tick(&mut sink);
        assert_eq!(sink.bars.last().unwrap().bar_duration, 2.0);
    }

    #[test]
    fn invalid_updates_change_nothing() {
        let mut composition = Composition::new(settings(), Library::builtin());
        assert!(composition
            .apply_update(&SettingsUpdate::default().density(3.0))
            .is_err());
        assert_eq!(composition.settings().density, settings().density);
    }

    #[test]
    fn finished_compositions_regenerate() {
        let mut composition = Composition::new(settings(), Library::builtin());
        let mut sink = Collector::default();
        let total_bars = composition.engine().total_bars();
        for _ in 0..=total_bars {
            composition.tick(&mut sink);
        }
        assert!(matches!(
            sink.reports.as_slice(),
            [Report::CycleComplete { total_bars: bars, .. }] if *bars == total_bars
        ));
        assert_eq!(sink.bars.last().unwrap().bar_count, 0);
        assert_ne!(composition.seed(), 42);
    }

    #[test]
    fn same_settings_same_bars() {
        let mut a = Composition::new(settings(), Library::builtin());
        let mut b = Composition::new(settings(), Library::builtin());
        let mut sink_a = Collector::default();
        let mut sink_b = Collector::default();
        for _ in 0..16 {
            a.tick(&mut sink_a);
            b.tick(&mut sink_b);
        }
        assert_eq!(sink_a.bars, sink_b.bars);
    }

    #[test]
    fn panic_messages_are_recovered() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload), "boom");
    }

    #[test]
    fn start_requires_init() {
        let mut composer = Composer::new(|_: BarReady| {});
        assert!(matches!(composer.start(), Err(Error::NotInitialized)));
        assert!(!composer.is_running());
    }

    #[test]
    fn start_stop_start() {
        let (sender, bars) = mpsc::channel();
        let mut composer = Composer::new(move |bar: BarReady| {
            let _ = sender.send(bar);
        })
        .lookahead(Duration::from_millis(0));
        composer
            .init(Settings {
                tempo: Some(300.0),
                ..settings()
            })
            .unwrap();

        composer.start().unwrap();
        composer.start().unwrap();
        assert!(composer.is_running());
        assert_eq!(bars.recv().unwrap().bar_count, 0);
        composer.stop().unwrap();
        assert!(!composer.is_running());

        while bars.try_recv().is_ok() {}
        composer.start().unwrap();
        assert_eq!(bars.recv().unwrap().bar_count, 0);
        composer.stop().unwrap();
    }

    #[test]
    fn commands_to_a_dead_composer_fail() {
        let mut composer = Composer::new(|bar: BarReady| {
            if bar.bar_count == 0 {
                panic!("sink gave up");
            }
        })
        .lookahead(Duration::from_millis(0));
        composer.init(settings()).unwrap();
        composer.start().unwrap();
        for _ in 0..500 {
            if !composer.is_running() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!composer.is_running());

        assert!(matches!(composer.reset(), Err(Error::Dead)));
        let update = SettingsUpdate::default().mood(Mood::Dark);
        assert!(matches!(composer.update_settings(&update), Err(Error::Dead)));
        assert_eq!(composer.settings().map(|settings| settings.mood), Some(Mood::Dark));
    }
}
