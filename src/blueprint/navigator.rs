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

//! Maps bar numbers onto a blueprint's parts.
//!
//! Part lengths in a [`Blueprint`] are percentages. Once a [`Navigator`] has fixed the total
//! length of the composition it turns those percentages into absolute bar ranges, and from then
//! on answers "where are we?" for any bar count with a [`NavigationInfo`].

use super::{Blueprint, BlueprintPart, Resolution};
use crate::seed::{self, Stream};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, ops::Range};

/// Where a bar sits in the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationInfo {
    pub bar_count: u32,
    pub total_bars: u32,
    pub part_id: String,
    pub part_index: usize,
    /// Fraction of the part already played before this bar, in `[0, 1)`.
    pub part_progress: f64,
    /// Bar number inside the part, starting at zero.
    pub part_bar: u32,
    pub part_bars: u32,
    pub is_last_bar_of_part: bool,
}

/// Resolves bar numbers against a blueprint.
#[derive(Debug, Clone)]
pub struct Navigator {
    blueprint: Blueprint,
    resolution: Resolution,
    total_bars: u32,
    ranges: Vec<Range<u32>>,
}

impl Navigator {
    /// Fixes the length of a composition and lays its parts out.
    ///
    /// The total length is picked from the blueprint's bar range using `seed`. A non-zero
    /// `intro_bars` pins the length of the first part; the remaining parts share the rest in
    /// proportion to their percentages. Every part gets at least one bar.
    pub fn new(
        blueprint: Blueprint,
        resolution: Resolution,
        seed: u64,
        intro_bars: u32,
    ) -> Navigator {
        let parts = blueprint.parts.len() as u32;
        let (low, high) = blueprint.bars;
        let mut rng = seed::rng(seed, Stream::Length, 0, 0);
        let picked = rng.random_range(low..=high.max(low));
        let total_bars = if intro_bars > 0 {
            picked.max(intro_bars + parts - 1)
        } else {
            picked.max(parts)
        };
        let ranges = layout(&blueprint.parts, total_bars, intro_bars);
        log::debug!(
            "blueprint {:?} laid out over {} bars: {:?}",
            blueprint.name,
            total_bars,
            ranges
        );
        Navigator {
            blueprint,
            resolution,
            total_bars,
            ranges,
        }
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn total_bars(&self) -> u32 {
        self.total_bars
    }

    /// The bar range of each part, in order.
    pub fn ranges(&self) -> &[Range<u32>] {
        &self.ranges
    }

    /// The index of the part playing at `bar_count`. Bars past the end stay in the last part.
    pub fn part_index(&self, bar_count: u32) -> usize {
        self.ranges
            .iter()
            .position(|range| range.contains(&bar_count))
            .unwrap_or(self.ranges.len() - 1)
    }

    pub fn part(&self, bar_count: u32) -> &BlueprintPart {
        &self.blueprint.parts[self.part_index(bar_count)]
    }

    pub fn locate(&self, bar_count: u32) -> NavigationInfo {
        let part_index = self.part_index(bar_count);
        let range = &self.ranges[part_index];
        let part_bars = range.end - range.start;
        let part_bar = bar_count.saturating_sub(range.start).min(part_bars - 1);
        NavigationInfo {
            bar_count,
            total_bars: self.total_bars,
            part_id: self.blueprint.parts[part_index].id.clone(),
            part_index,
            part_progress: part_bar as f64 / part_bars as f64,
            part_bar,
            part_bars,
            is_last_bar_of_part: part_bar + 1 == part_bars,
        }
    }

    /// Structural tension at a bar, between 0 and 1.
    ///
    /// Blends the part's baseline with an arc over the whole composition and a gentle rise
    /// towards the end of each part.
    pub fn tension(&self, bar_count: u32) -> f64 {
        let info = self.locate(bar_count);
        let part = &self.blueprint.parts[info.part_index];
        let global = bar_count.min(self.total_bars) as f64 / self.total_bars as f64;
        let arc = (PI * global).sin();
        (0.6 * part.tension + 0.3 * arc + 0.1 * info.part_progress).clamp(0.0, 1.0)
    }
}

fn layout(parts: &[BlueprintPart], total_bars: u32, intro_bars: u32) -> Vec<Range<u32>> {
    let count = parts.len() as u32;
    let mut ranges = Vec::with_capacity(parts.len());
    let (mut start, shared) = if intro_bars > 0 && count > 1 {
        ranges.push(0..intro_bars);
        (intro_bars, &parts[1..])
    } else {
        (0, parts)
    };

    let available = total_bars - start;
    let total_percent: f64 = shared.iter().map(|part| part.percent.max(0.0)).sum();
    let mut cumulative = 0.0;
    for (i, part) in shared.iter().enumerate() {
        let remaining_parts = (shared.len() - i - 1) as u32;
        cumulative += part.percent.max(0.0);
        let end = if remaining_parts == 0 {
            total_bars
        } else {
            let ideal = start_of(total_bars, available, cumulative, total_percent);
            ideal.max(start + 1).min(total_bars - remaining_parts)
        };
        ranges.push(start..end);
        start = end;
    }
    ranges
}

fn start_of(total_bars: u32, available: u32, cumulative: f64, total_percent: f64) -> u32 {
    let offset = total_bars - available;
    let fraction = if total_percent > 0.0 {
        cumulative / total_percent
    } else {
        0.0
    };
    offset + (fraction * available as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{library::default_blueprint, Library};
    use crate::settings::{Genre, Mood};

    fn navigator(seed: u64, intro_bars: u32) -> Navigator {
        Navigator::new(default_blueprint(), Resolution::Fallback, seed, intro_bars)
    }

    #[test]
    fn ranges_cover_every_bar_exactly_once() {
        for seed in 0..50 {
            for &intro in &[0, 1, 4, 12] {
                let navigator = navigator(seed, intro);
                let ranges = navigator.ranges();
                assert_eq!(ranges.len(), navigator.blueprint().parts.len());
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges.last().unwrap().end, navigator.total_bars());
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                assert!(ranges.iter().all(|range| range.end > range.start));
            }
        }
    }

    #[test]
    fn intro_bars_pin_the_first_part() {
        let navigator = navigator(7, 6);
        assert_eq!(navigator.ranges()[0], 0..6);
    }

    #[test]
    fn total_length_is_picked_from_the_blueprint_range() {
        let (low, high) = default_blueprint().bars;
        for seed in 0..50 {
            let total = navigator(seed, 0).total_bars();
            assert!((low..=high).contains(&total));
        }
    }

    #[test]
    fn locate_reports_part_boundaries() {
        let navigator = navigator(3, 4);
        let info = navigator.locate(3);
        assert_eq!(info.part_index, 0);
        assert_eq!(info.part_id, "intro");
        assert!(info.is_last_bar_of_part);
        assert!((info.part_progress - 0.75).abs() < 1e-9);

        let info = navigator.locate(4);
        assert_eq!(info.part_index, 1);
        assert_eq!(info.part_bar, 0);
        assert!(!info.is_last_bar_of_part);
    }

    #[test]
    fn bars_past_the_end_stay_in_the_last_part() {
        let navigator = navigator(3, 0);
        let info = navigator.locate(navigator.total_bars() + 10);
        assert_eq!(info.part_index, navigator.ranges().len() - 1);
    }

    #[test]
    fn tension_stays_in_range_and_peaks_mid_piece() {
        let (blueprint, resolution) = Library::builtin().resolve(Genre::Trance, Mood::Epic);
        let navigator = Navigator::new(blueprint, resolution, 11, 0);
        let tensions = (0..navigator.total_bars())
            .map(|bar| navigator.tension(bar))
            .collect::<Vec<_>>();
        assert!(tensions.iter().all(|t| (0.0..=1.0).contains(t)));
        let first = tensions[0];
        let max = tensions.iter().cloned().fold(0.0, f64::max);
        assert!(max > first);
    }
}
