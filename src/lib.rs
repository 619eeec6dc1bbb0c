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


//! An endless, structure-aware generative ambient music engine with its own real-time
//! synthesizer.
//!
//! # Introduction
//!
//! Reverie writes music one bar at a time, forever. Every composition follows a *blueprint*, an
//! arrangement of parts such as an intro, a build and a peak, chosen from a library by genre and
//! mood. Inside each part every role of the band (bass, melody, accompaniment, harmony, drums and
//! effects) keeps a small set of phrases, and from bar to bar the engine decides whether to
//! repeat a phrase, mutate it or switch to another one. When a composition runs out of bars a new
//! one is generated from a fresh seed. Everything is derived from that seed, so the same settings
//! and seed always produce the same music.
//!
//! The crate is laid out along the path a bar takes:
//!
//!  * [`settings`] - What the host asks for: mood, genre, tempo, density and instruments.
//!
//!  * [`blueprint`] - Song structures, the built-in library and the [`Navigator`] that tracks
//!    where a composition is inside its blueprint.
//!
//!  * [`engine`] - Writes the phrases of every role, mutates them and picks which one plays next.
//!
//!  * [`composer`] - Drives the engine once per bar, either by hand with a [`Composition`] or on
//!    its own thread with a [`Composer`] built on the [`scheduler`].
//!
//!  * [`channel`] - Carries finished bars to whoever owns the audio clock and maps their beats
//!    onto it.
//!
//!  * [`routing`] - Sends every note to the instrument of its role.
//!
//!  * [`synth`] - A polyphonic synthesizer meant to run inside an audio callback, controlled
//!    through a lock-free ring buffer or [OSC](synth::osc).
//!
//! # Examples
//!
//! Composing and rendering a few bars without any threads:
//!
//! ```
//! use reverie::{
//!     blueprint::Library,
//!     channel::bar_channel,
//!     composer::Composition,
//!     routing::{Orchestrator, Router},
//!     settings::{Mood, Settings},
//!     synth::{control_channel, Synth},
//! };
//!
//! let settings = Settings {
//!     mood: Mood::Dreamy,
//!     seed: 7,
//!     ..Settings::default()
//! };
//!
//! let (control, receiver) = control_channel(4096);
//! let mut synth = Synth::new(44_100.0, receiver);
//! let (mut bars, bar_receiver) = bar_channel();
//! let router = Router::new(control, &settings, None);
//! let mut orchestrator = Orchestrator::new(bar_receiver, router, synth.clock());
//! let mut composition = Composition::new(settings, Library::builtin());
//!
//! let mut buffer = vec![0.0; 512];
//! for _ in 0..2 {
//!     let bar_duration = composition.tick(&mut bars);
//!     orchestrator.pump()?;
//!     let frames = (bar_duration * 44_100.0) as usize;
//!     for _ in 0..frames / buffer.len() {
//!         synth.render(&mut buffer);
//!     }
//! }
//! assert!(synth.clock().seconds() > 0.0);
//! # reverie::routing::Result::Ok(())
//! ```
//!
//! [`Navigator`]: blueprint::navigator::Navigator
//! [`Composition`]: composer::Composition
//! [`Composer`]: composer::Composer

pub mod blueprint;
pub mod channel;
pub mod composer;
pub mod engine;
pub mod event;
pub mod routing;
pub mod scheduler;
mod seed;
pub mod settings;
pub mod synth;
pub mod theory;
