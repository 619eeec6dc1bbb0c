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

//! An ahead-of-time scheduler for executing recurring jobs.
//!
//! A [`Scheduler`] creates a [`Job`] from a [`JobDef`] and invokes [`Job::run`] on that job
//! continuously, on the current thread with [`Scheduler::run`] or on a dedicated thread with
//! [`Scheduler::spawn`]. The interval at which the job is run is determined by the [`Duration`]
//! returned by `Job::run`. The composer uses it to write one bar per bar period.
//!
//! # Examples
//!
//! ```
//! use reverie::scheduler::Scheduler;
//! use std::time::{Duration, Instant};
//!
//! let mut beats = 0..4;
//! let job = Scheduler::new().run(|_: Instant| {
//!     move |_: Instant| {
//!         let beat = beats.next()?;
//!         println!("beat {}", beat);
//!         Some(Duration::from_millis(5))
//!     }
//! })?;
//! assert!(job.is_some());
//! # reverie::scheduler::Result::Ok(())
//! ```
//!
//! # Cancellation
//!
//! Jobs run until they return `None` or until the scheduler is cancelled. Cancelling wakes the
//! scheduler immediately, even in the middle of a delay, and hands the job back to the caller so
//! that its state can be inspected or reused. A job is never interrupted in the middle of
//! [`Job::run`].
//!
//! # Logical Time
//!
//! The functions [`JobDef::init`] and [`Job::run`] both take a `logical_time` argument. The
//! logical time is kept by the scheduler and provides a time that jobs can use as a basis for
//! timestamps. The logical time is distinctly different from the _actual time_ that jobs can
//! observe using [`Instant::now()`] in a few ways:
//!
//! * Logical time only advances when [`Job::run`] returns a duration, and the logical time always
//!   advances by _exactly_ that duration. The logical time is never affected by fluctuations in
//!   system performance.
//!
//! * The `logical_time` is usually, and is by default, ahead of the actual time that the job is
//!   run. This delay gives whatever consumes the job's output time to prepare before the output
//!   is due. This delay can be configured using [`Scheduler::ahead_by`].
//!
//! * When the job falls behind the logical clock by more than [`Scheduler::max_lag`], for example
//!   because the process was suspended, the logical clock is moved forward to the actual time
//!   instead of running the job over and over to catch up.

use std::time::{Duration, Instant};
use thiserror::Error;

mod scheduler_impl;

pub use scheduler_impl::{Canceller, Handle};

/// A specialized [`Result`] type for scheduler errors.
///
/// Most of the functions and methods that can fail in this module return this type.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by [`Scheduler`] operations.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(scheduler_impl::Error);

/// An ahead-of-time scheduler for executing recurring tasks.
#[derive(Debug)]
pub struct Scheduler(scheduler_impl::Scheduler);

impl Default for Scheduler {
    fn default() -> Scheduler {
        Scheduler::new()
    }
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Scheduler {
        Scheduler(scheduler_impl::Scheduler::default())
    }

    /// Run the job in advance.
    ///
    /// This function pushes the `logical_time` parameter passed to [`JobDef::init`] and
    /// [`Job::run`] into the future, so that whatever the job produces for a given time is ready
    /// before that time comes.
    ///
    /// Defaults to 100 milliseconds.
    pub fn ahead_by(self, ahead_by: Duration) -> Self {
        Scheduler(self.0.ahead_by(ahead_by))
    }

    /// How far the scheduler may fall behind before the logical clock is resynchronised.
    ///
    /// Defaults to 2 seconds.
    pub fn max_lag(self, max_lag: Duration) -> Self {
        Scheduler(self.0.max_lag(max_lag))
    }

    /// Returns a [`Canceller`] which can be used to stop a [`Scheduler`] from another thread.
    ///
    /// The [`Scheduler::run`] method will return immediately after [`Canceller::cancel`] is
    /// called.
    pub fn canceller(&self) -> Canceller {
        self.0.canceller()
    }

    /// Creates the job and runs it until it returns `None` or the scheduler is cancelled.
    ///
    /// This function will block until the job has finished running. See
    /// [`Scheduler::canceller`] for a way to interrupt this method from a different thread.
    /// Returns the job, or `None` if [`JobDef::init`] declined to create one.
    pub fn run<D: JobDef>(self, job_def: D) -> Result<Option<D::Job>> {
        self.0.run(job_def).map_err(Error)
    }

    /// Runs the job on a new thread.
    ///
    /// The returned [`Handle`] cancels the thread and hands the job back.
    pub fn spawn<D>(self, name: &str, job_def: D) -> Result<Handle<D::Job>>
    where
        D: JobDef + Send + 'static,
        D::Job: Send + 'static,
    {
        self.0.spawn(name, job_def).map_err(Error)
    }
}

/// A [`Job`] factory.
///
/// Job definitions are given to [`Scheduler::run`] so that the jobs can be initialized with the
/// logical time of their first run.
pub trait JobDef {
    /// The type of job that this job definitions creates.
    type Job: Job;

    /// Initialize a new job.
    ///
    /// The `logical_time` argument will always be the same as what is given to the first
    /// invocation of [`Job::run`] on the returned job.
    fn init(self, logical_time: Instant) -> Option<Self::Job>;
}

/// A recurring job.
pub trait Job {
    /// Run job using the given `logical_time` as a basis for scheduling events.
    ///
    /// Returns the time until the next run, or `None` when the job is done.
    ///
    /// See [the module level documentation](self) for more.
    fn run(&mut self, logical_time: Instant) -> Option<Duration>;
}

impl<F> Job for F
where
    F: FnMut(Instant) -> Option<Duration>,
{
    fn run(&mut self, logical_time: Instant) -> Option<Duration> {
        self(logical_time)
    }
}

impl<D, J> JobDef for D
where
    D: FnOnce(Instant) -> J,
    J: Job,
{
    type Job = J;

    fn init(self, logical_time: Instant) -> Option<J> {
        Some(self(logical_time))
    }
}
