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

//! Candidate phrases and their selection.
//!
//! Every role keeps a small [`Pool`] of [`Branch`]es. A branch's weight is its fitness decayed by
//! [`AGE_DECAY`] for every bar it has spent in the pool, and it is zero outright when the branch's
//! content hash is in the role's recent-use [`History`]. Selection is weighted-random among the
//! branches whose weight reaches [`WEIGHT_FLOOR`]; when none does the engine originates a new
//! branch instead.

use crate::{
    event::{normalize_phrase, phrase_hash, Event, Role},
    seed::Rng,
};
use rand::Rng as _;
use std::collections::VecDeque;

/// Most branches a pool holds at once.
pub const POOL_SIZE: usize = 4;

/// Number of recently played phrase hashes remembered per role.
pub const HISTORY_LEN: usize = 8;

/// Weight multiplier applied per bar of age.
pub const AGE_DECAY: f64 = 0.85;

/// Branches weighing less than this are not selected.
pub const WEIGHT_FLOOR: f64 = 0.2;

/// A candidate phrase for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: u64,
    pub role: Role,
    pub events: Vec<Event>,
    pub fitness: f64,
    /// Bars spent in the pool.
    pub age: u32,
    /// Beat at which the last event stops sounding.
    pub end_time: f64,
    pub hash: u64,
}

impl Branch {
    pub fn new(id: u64, role: Role, events: Vec<Event>, fitness: f64) -> Branch {
        let mut branch = Branch {
            id,
            role,
            events,
            fitness,
            age: 0,
            end_time: 0.0,
            hash: 0,
        };
        branch.refresh();
        branch
    }

    /// Re-normalizes the events and recomputes everything derived from them. Call after
    /// mutating `events`.
    pub fn refresh(&mut self) {
        normalize_phrase(&mut self.events);
        self.end_time = self.events.iter().map(Event::end).fold(0.0, f64::max);
        self.hash = phrase_hash(&self.events);
    }

    /// Fitness decayed by age alone.
    pub fn decayed(&self) -> f64 {
        self.fitness * AGE_DECAY.powi(self.age as i32)
    }

    /// The selection weight, taking the recent-use history into account.
    pub fn weight(&self, history: &History) -> f64 {
        if history.contains(self.hash) {
            0.0
        } else {
            self.decayed()
        }
    }
}

/// A bounded rolling log of recently played phrase hashes.
#[derive(Debug, Clone, Default)]
pub struct History {
    hashes: VecDeque<u64>,
}

impl History {
    pub fn push(&mut self, hash: u64) {
        if self.hashes.len() == HISTORY_LEN {
            self.hashes.pop_front();
        }
        self.hashes.push_back(hash);
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.hashes.contains(&hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }
}

/// The branches of one role.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    branches: Vec<Branch>,
    history: History,
    current: Option<u64>,
}

impl Pool {
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// The branch played most recently, if it is still in the pool.
    pub fn current(&self) -> Option<&Branch> {
        let id = self.current?;
        self.branches.iter().find(|branch| branch.id == id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Branch> {
        let id = self.current?;
        self.branches.iter_mut().find(|branch| branch.id == id)
    }

    pub fn get(&self, id: u64) -> Option<&Branch> {
        self.branches.iter().find(|branch| branch.id == id)
    }

    /// Ages every branch by one bar and drops the ones that have decayed below the floor.
    pub fn age(&mut self) {
        for branch in self.branches.iter_mut() {
            branch.age += 1;
        }
        let before = self.branches.len();
        self.branches.retain(|branch| branch.decayed() >= WEIGHT_FLOOR);
        if self.branches.len() != before {
            log::debug!("pruned {} branches", before - self.branches.len());
        }
    }

    /// Picks a branch at random in proportion to its weight. Returns `None` when no branch
    /// reaches the floor.
    pub fn select(&self, rng: &mut Rng) -> Option<u64> {
        let weights = self
            .branches
            .iter()
            .map(|branch| {
                let weight = branch.weight(&self.history);
                if weight >= WEIGHT_FLOOR {
                    weight
                } else {
                    0.0
                }
            })
            .collect::<Vec<_>>();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let mut target = rng.random_range(0.0..total);
        for (branch, weight) in self.branches.iter().zip(weights) {
            if weight <= 0.0 {
                continue;
            }
            if target < weight {
                return Some(branch.id);
            }
            target -= weight;
        }
        // Rounding can leave a sliver past the last candidate.
        self.branches
            .iter()
            .rev()
            .find(|branch| branch.weight(&self.history) >= WEIGHT_FLOOR)
            .map(|branch| branch.id)
    }

    /// Adds a branch, evicting the weakest one when the pool is full.
    pub fn insert(&mut self, branch: Branch) {
        if self.branches.len() >= POOL_SIZE {
            let weakest = self
                .branches
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.decayed().total_cmp(&b.decayed()))
                .map(|(i, _)| i);
            if let Some(i) = weakest {
                self.branches.remove(i);
            }
        }
        self.branches.push(branch);
    }

    /// Records that `id` was played this bar.
    pub fn played(&mut self, id: u64) {
        if let Some(hash) = self.get(id).map(|branch| branch.hash) {
            self.history.push(hash);
        }
        self.current = Some(id);
    }

    /// Forgets every branch but keeps the history.
    pub fn clear(&mut self) {
        self.branches.clear();
        self.current = None;
    }
}
