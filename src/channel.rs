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

//! Moves bars from the composer thread to the render clock.
//!
//! [`bar_channel`] connects a [`Composer`](crate::composer::Composer) to whatever owns the render
//! clock. Only finished, immutable [`BarReady`] values and [`Report`]s cross the channel.
//!
//! On the receiving side a [`Timeline`] turns the beat offsets of a bar into absolute render clock
//! timestamps. It keeps the start time of the next bar and advances it by exactly one bar
//! duration per bar, so the timestamps do not depend on when a bar happens to arrive. A bar that
//! arrives too late to be played at its planned time is re-anchored a full bar ahead of the clock,
//! which leaves the following bar one bar period to arrive.
//!
//! ```
//! use reverie::channel::Timeline;
//! use reverie::composer::{BarReady, Composition};
//! use reverie::blueprint::Library;
//! use reverie::settings::Settings;
//!
//! let mut composition = Composition::new(Settings::default(), Library::builtin());
//! let mut bars = Vec::new();
//! composition.tick(&mut |bar: BarReady| bars.push(bar));
//! composition.tick(&mut |bar: BarReady| bars.push(bar));
//!
//! let mut timeline = Timeline::new(0.1);
//! let first = timeline.map_bar(&bars[0], 10.0);
//! let second = timeline.map_bar(&bars[1], 10.5);
//! assert!(first.iter().all(|note| note.on >= 10.1));
//! assert!(second.iter().all(|note| note.on >= 10.1 + bars[0].bar_duration));
//! ```

use crate::{
    composer::{BarReady, BarSink, Report},
    event::{Event, BEATS_PER_BAR},
};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// Default least distance, in seconds, between the render clock and a re-anchored bar.
pub const DEFAULT_LOOKAHEAD: f64 = 0.2;

/// What travels from the composer to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarMessage {
    Bar(BarReady),
    Report(Report),
}

/// Creates a connected sender and receiver.
pub fn bar_channel() -> (BarSender, BarReceiver) {
    let (sender, receiver) = mpsc::channel();
    (BarSender { sender }, BarReceiver { receiver })
}

/// The composer side of a [`bar_channel`]. Can be used directly as a [`BarSink`].
#[derive(Debug, Clone)]
pub struct BarSender {
    sender: Sender<BarMessage>,
}

impl BarSender {
    /// Sends a message. Returns `false` when the receiver is gone.
    pub fn send(&self, message: BarMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

impl BarSink for BarSender {
    fn bar(&mut self, bar: BarReady) {
        if !self.send(BarMessage::Bar(bar)) {
            log::debug!("bar receiver hung up, dropping bar");
        }
    }

    fn report(&mut self, report: Report) {
        log::info!("{:?}", report);
        self.send(BarMessage::Report(report));
    }
}

/// The orchestration side of a [`bar_channel`].
#[derive(Debug)]
pub struct BarReceiver {
    receiver: Receiver<BarMessage>,
}

impl BarReceiver {
    /// Returns the next message without blocking, or [`Disconnected`] once the sender hung up
    /// and no messages are left.
    pub fn try_recv(&self) -> Result<Option<BarMessage>, Disconnected> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Disconnected),
        }
    }

    /// Blocks until the next message arrives, or returns `None` once the sender hung up.
    pub fn recv(&self) -> Option<BarMessage> {
        self.receiver.recv().ok()
    }
}

/// Returned when the other side of a [`bar_channel`] is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// An event with absolute render clock times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNote {
    pub event: Event,
    /// Render clock time of the note on, in seconds.
    pub on: f64,
    /// Render clock time of the note off, in seconds.
    pub off: f64,
}

/// Maps bar-relative beats onto the render clock.
#[derive(Debug, Clone)]
pub struct Timeline {
    lookahead: f64,
    next_bar_start: Option<f64>,
}

impl Default for Timeline {
    fn default() -> Timeline {
        Timeline::new(DEFAULT_LOOKAHEAD)
    }
}

impl Timeline {
    /// `lookahead` is the least distance, in seconds, between the render clock and a bar that
    /// has to be re-anchored. A bar is never anchored less than its own duration ahead, so the
    /// next bar always has a full bar period to arrive.
    pub fn new(lookahead: f64) -> Timeline {
        Timeline {
            lookahead: if lookahead.is_finite() {
                lookahead.max(0.0)
            } else {
                DEFAULT_LOOKAHEAD
            },
            next_bar_start: None,
        }
    }

    /// Render clock time at which the next bar starts, once a bar has been mapped.
    pub fn next_bar_start(&self) -> Option<f64> {
        self.next_bar_start
    }

    /// Forgets the running bar position. The next bar is anchored to the clock.
    pub fn reset(&mut self) {
        self.next_bar_start = None;
    }

    /// Computes note on and note off times for every event of a bar, given the current render
    /// clock time `now` in seconds.
    ///
    /// Events whose times are not finite are dropped with a warning. The other events of the bar
    /// are unaffected.
    pub fn map_bar(&mut self, bar: &BarReady, now: f64) -> Vec<ScheduledNote> {
        let start = match self.next_bar_start {
            Some(start) if start >= now => start,
            Some(start) => {
                log::warn!(
                    "bar {} arrived {:.3}s late, re-anchoring",
                    bar.bar_count,
                    now - start
                );
                now + self.anchor_distance(bar)
            }
            None => now + self.anchor_distance(bar),
        };

        let beat = bar.bar_duration / BEATS_PER_BAR;
        let mut notes = Vec::with_capacity(bar.events.len());
        for event in bar.events.iter() {
            let on = start + event.time * beat;
            let off = on + event.duration * beat;
            if !on.is_finite() || !off.is_finite() {
                log::warn!(
                    "dropping {} note {} in bar {}: non-finite time",
                    event.role,
                    event.pitch,
                    bar.bar_count
                );
                continue;
            }
            notes.push(ScheduledNote {
                event: *event,
                on,
                off,
            });
        }

        let next = start + bar.bar_duration;
        if next.is_finite() {
            self.next_bar_start = Some(next);
        } else {
            log::warn!("bar {} has an unusable duration", bar.bar_count);
            self.next_bar_start = None;
        }
        notes
    }

    fn anchor_distance(&self, bar: &BarReady) -> f64 {
        if bar.bar_duration.is_finite() {
            self.lookahead.max(bar.bar_duration)
        } else {
            self.lookahead
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::navigator::NavigationInfo;
    use crate::event::Role;
    use std::collections::BTreeMap;

    fn bar(bar_count: u32, bar_duration: f64, events: Vec<Event>) -> BarReady {
        BarReady {
            events,
            instrument_hints: BTreeMap::new(),
            bar_duration,
            bar_count,
            actual_bpm: 240.0 / bar_duration,
            nav: NavigationInfo {
                bar_count,
                total_bars: 16,
                part_id: "intro".to_owned(),
                part_index: 0,
                part_progress: 0.0,
                part_bar: bar_count,
                part_bars: 16,
                is_last_bar_of_part: false,
            },
            tension: 0.2,
            phrases: BTreeMap::new(),
        }
    }

    #[test]
    fn maps_beats_onto_the_clock() {
        let mut timeline = Timeline::new(0.5);
        let notes = timeline.map_bar(
            &bar(0, 2.0, vec![Event::new(Role::Bass, 40, 1.0, 2.0)]),
            10.0,
        );
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].on, 12.5);
        assert_eq!(notes[0].off, 13.5);
        assert_eq!(timeline.next_bar_start(), Some(14.0));
    }

    #[test]
    fn bars_follow_each_other_regardless_of_arrival() {
        let mut timeline = Timeline::new(0.1);
        timeline.map_bar(&bar(0, 2.0, Vec::new()), 0.0);
        let notes = timeline.map_bar(
            &bar(1, 2.0, vec![Event::new(Role::Bass, 40, 0.0, 1.0)]),
            3.7,
        );
        assert_eq!(notes[0].on, 4.0);
    }

    #[test]
    fn late_bars_are_re_anchored() {
        let mut timeline = Timeline::new(0.1);
        timeline.map_bar(&bar(0, 2.0, Vec::new()), 0.0);
        let notes = timeline.map_bar(
            &bar(1, 2.0, vec![Event::new(Role::Bass, 40, 0.0, 1.0)]),
            5.0,
        );
        assert_eq!(notes[0].on, 7.0);
    }

    #[test]
    fn bars_are_anchored_at_least_a_bar_ahead() {
        let mut timeline = Timeline::new(0.1);
        let notes = timeline.map_bar(
            &bar(0, 2.0, vec![Event::new(Role::Bass, 40, 0.0, 1.0)]),
            1.0,
        );
        assert_eq!(notes[0].on, 3.0);

        let mut timeline = Timeline::new(3.0);
        let notes = timeline.map_bar(
            &bar(0, 2.0, vec![Event::new(Role::Bass, 40, 0.0, 1.0)]),
            1.0,
        );
        assert_eq!(notes[0].on, 4.0);
    }

    #[test]
    fn non_finite_notes_are_dropped_alone() {
        let mut timeline = Timeline::default();
        let mut broken = Event::new(Role::Melody, 60, 1.0, 1.0);
        broken.duration = f64::INFINITY;
        let notes = timeline.map_bar(
            &bar(
                0,
                2.0,
                vec![Event::new(Role::Bass, 40, 0.0, 1.0), broken],
            ),
            0.0,
        );
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].event.role, Role::Bass);
    }

    #[test]
    fn reset_re_anchors() {
        let mut timeline = Timeline::new(0.0);
        timeline.map_bar(&bar(0, 2.0, Vec::new()), 0.0);
        timeline.reset();
        assert_eq!(timeline.next_bar_start(), None);
        let notes = timeline.map_bar(
            &bar(0, 2.0, vec![Event::new(Role::Bass, 40, 0.0, 1.0)]),
            0.5,
        );
        assert_eq!(notes[0].on, 2.5);
    }

    #[test]
    fn sender_feeds_the_receiver() {
        let (mut sender, receiver) = bar_channel();
        assert_eq!(receiver.try_recv(), Ok(None));
        sender.bar(bar(0, 2.0, Vec::new()));
        sender.report(Report::Reset { seed: 3 });
        assert!(matches!(receiver.try_recv(), Ok(Some(BarMessage::Bar(_)))));
        assert_eq!(
            receiver.try_recv(),
            Ok(Some(BarMessage::Report(Report::Reset { seed: 3 })))
        );
        drop(sender);
        assert_eq!(receiver.try_recv(), Err(Disconnected));
    }
}
