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

use crate::scheduler::{Job, JobDef};
use std::{
    io,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stops a running scheduler.
///
/// Returned by [`Scheduler::canceller`](super::Scheduler::canceller). Cancellers can be cloned
/// and sent to other threads.
#[derive(Debug, Clone)]
pub struct Canceller {
    sender: Sender<Message>,
}

impl Canceller {
    /// Cancel the scheduler that created this canceller.
    pub fn cancel(&self) {
        let _ = self.sender.send(Message::Quit);
    }
}

/// A handle to a scheduler running on its own thread.
///
/// Returned by [`Scheduler::spawn`](super::Scheduler::spawn).
#[derive(Debug)]
pub struct Handle<J> {
    canceller: Canceller,
    thread: JoinHandle<Result<Option<J>>>,
}

impl<J> Handle<J> {
    /// Cancel the scheduler and wait for its thread to finish.
    ///
    /// Returns the job, or `None` if the job was never created.
    pub fn cancel(self) -> super::Result<Option<J>> {
        self.canceller.cancel();
        self.join()
    }

    /// Wait for the job to finish on its own.
    pub fn join(self) -> super::Result<Option<J>> {
        self.thread
            .join()
            .map_err(|_| super::Error(Error::Panicked))?
            .map_err(super::Error)
    }

    /// Whether the scheduler's thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }
}

#[derive(Debug)]
pub struct Scheduler {
    ahead_by: Duration,
    max_lag: Duration,
    receiver: Receiver<Message>,
    sender: Sender<Message>,
}

impl Default for Scheduler {
    fn default() -> Scheduler {
        let (sender, receiver) = mpsc::channel();
        Scheduler {
            ahead_by: Duration::from_millis(100),
            max_lag: Duration::from_secs(2),
            receiver,
            sender,
        }
    }
}

impl Scheduler {
    pub fn ahead_by(mut self, ahead_by: Duration) -> Self {
        self.ahead_by = ahead_by;
        self
    }

    pub fn max_lag(mut self, max_lag: Duration) -> Self {
        self.max_lag = max_lag;
        self
    }

    pub fn canceller(&self) -> Canceller {
        let sender = self.sender.clone();
        Canceller { sender }
    }

    pub fn spawn<D>(self, name: &str, job_def: D) -> Result<Handle<D::Job>>
    where
        D: JobDef + Send + 'static,
        D::Job: Send + 'static,
    {
        let canceller = self.canceller();
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.run(job_def))
            .map_err(Error::Spawn)?;
        Ok(Handle { canceller, thread })
    }

    pub fn run<D: JobDef>(self, job_def: D) -> Result<Option<D::Job>> {
        let mut logical_time = self.now();
        let mut job = match job_def.init(logical_time) {
            Some(job) => job,
            None => return Ok(None),
        };

        loop {
            let delay = match job.run(logical_time) {
                Some(delay) => delay,
                None => return Ok(Some(job)),
            };
            logical_time = logical_time
                .checked_add(delay)
                .ok_or(Error::DelayOverflow(delay))?;

            let now = self.now();
            if now > logical_time + self.max_lag {
                log::warn!(
                    "scheduler fell {:?} behind, resynchronising",
                    now - logical_time
                );
                logical_time = now;
            }

            match self
                .receiver
                .recv_timeout(logical_time.saturating_duration_since(now))
            {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(Message::Quit) | Err(RecvTimeoutError::Disconnected) => {
                    return Ok(Some(job));
                }
            }
        }
    }

    fn now(&self) -> Instant {
        Instant::now() + self.ahead_by
    }
}

#[derive(Debug)]
pub enum Message {
    Quit,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(io::Error),
    #[error("scheduler thread panicked")]
    Panicked,
    #[error("delay returned by job is too long: {0:?}")]
    DelayOverflow(Duration),
}
