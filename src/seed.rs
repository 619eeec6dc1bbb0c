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

// Deterministic seeding. Every random decision in the engine draws from a generator derived from
// the session seed plus the coordinates of the decision, so replaying a seed replays the music
// regardless of the order in which roles happen to be evaluated.

use rand::SeedableRng;
use rand_pcg::Pcg32;

pub(crate) type Rng = Pcg32;

/// Streams keep unrelated decisions from sharing random sequences.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Stream {
    Length = 1,
    Phrase = 2,
    Instrument = 3,
}

/// A generator for one decision, identified by stream and two coordinates (usually the bar and
/// the role).
pub(crate) fn rng(seed: u64, stream: Stream, a: u64, b: u64) -> Rng {
    let mut state = seed;
    let mut mixed = splitmix64(&mut state);
    for coordinate in [stream as u64, a, b] {
        state ^= coordinate.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        mixed ^= splitmix64(&mut state);
    }
    Pcg32::seed_from_u64(mixed)
}

/// The seed of the composition following one seeded with `seed`.
pub(crate) fn next_seed(seed: u64) -> u64 {
    let mut state = seed;
    splitmix64(&mut state)
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng as _;

    #[test]
    fn same_coordinates_same_sequence() {
        let mut a = rng(42, Stream::Phrase, 3, 1);
        let mut b = rng(42, Stream::Phrase, 3, 1);
        for _ in 0..100 {
            assert_eq!(a.random::<u32>(), b.random::<u32>());
        }
    }

    #[test]
    fn coordinates_separate_sequences() {
        let first = rng(42, Stream::Phrase, 3, 1).random::<u64>();
        assert_ne!(first, rng(42, Stream::Phrase, 3, 2).random::<u64>());
        assert_ne!(first, rng(42, Stream::Phrase, 4, 1).random::<u64>());
        assert_ne!(first, rng(42, Stream::Instrument, 3, 1).random::<u64>());
        assert_ne!(first, rng(43, Stream::Phrase, 3, 1).random::<u64>());
    }

    #[test]
    fn next_seed_moves_on() {
        assert_ne!(next_seed(42), 42);
        assert_eq!(next_seed(42), next_seed(42));
    }
}
