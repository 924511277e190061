//! Injectable randomness for target selection.
//!
//! Everything random in a cycle flows through [`RandomSource::next_f64`], so
//! tests can script the exact sequence of draws and assert exact outcomes.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform samples in `[0, 1)`.
pub trait RandomSource: Send {
    /// Next uniform sample in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// `true` with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn index(&mut self, len: usize) -> usize {
        let scaled = (self.next_f64() * len as f64).floor() as usize;
        scaled.min(len.saturating_sub(1))
    }
}

/// Production source backed by [`StdRng`].
#[derive(Debug)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seed from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }
}

/// Replays a fixed list of samples, then repeats `fallback` forever.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedRandom {
    /// Replay `values` in order, then return `fallback`.
    pub fn new(values: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            values: values.into_iter().collect(),
            fallback,
        }
    }

    /// Always return `value`.
    pub fn constant(value: f64) -> Self {
        Self::new([], value)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        self.values.pop_front().unwrap_or(self.fallback)
    }
}

/// Fisher-Yates shuffle in place.
pub fn shuffle<T>(rng: &mut dyn RandomSource, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.index(i + 1);
        items.swap(i, j);
    }
}

/// Draw up to `k` distinct items, each draw proportional to its weight among
/// the items not yet drawn. Non-positive weights are never drawn.
pub fn weighted_sample<T: Clone>(rng: &mut dyn RandomSource, items: &[(T, f64)], k: usize) -> Vec<T> {
    let mut remaining: Vec<(T, f64)> = items
        .iter()
        .filter(|(_, weight)| *weight > 0.0)
        .cloned()
        .collect();
    let mut chosen = Vec::with_capacity(k.min(remaining.len()));

    while chosen.len() < k && !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, weight)| weight).sum();
        let mut point = rng.next_f64() * total;
        let mut pick = remaining.len() - 1;
        for (index, (_, weight)) in remaining.iter().enumerate() {
            if point < *weight {
                pick = index;
                break;
            }
            point -= weight;
        }
        chosen.push(remaining.remove(pick).0);
    }
    chosen
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_replays_then_falls_back() {
        let mut rng = ScriptedRandom::new([0.1, 0.9], 0.5);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.next_f64(), 0.9);
        assert_eq!(rng.next_f64(), 0.5);
        assert_eq!(rng.next_f64(), 0.5);
    }

    #[test]
    fn test_index_bounds() {
        let mut low = ScriptedRandom::constant(0.0);
        let mut high = ScriptedRandom::constant(0.999_999);
        assert_eq!(low.index(4), 0);
        assert_eq!(high.index(4), 3);
    }

    #[test]
    fn test_weighted_sample_follows_cumulative_weights() {
        // Given: weights 1, 3, 1 (total 5)
        let items = [("a", 1.0), ("b", 3.0), ("c", 1.0)];

        // When: first draw lands at 0.5 * 5 = 2.5, inside b's band [1, 4)
        let mut rng = ScriptedRandom::new([0.5, 0.0], 0.0);
        let picked = weighted_sample(&mut rng, &items, 2);

        // Then: b first, then a (first band of the remaining a, c)
        assert_eq!(picked, vec!["b", "a"]);
    }

    #[test]
    fn test_weighted_sample_skips_zero_weights_and_caps_k() {
        let items = [("a", 0.0), ("b", 2.0)];
        let mut rng = StdRandom::seeded(7);
        assert_eq!(weighted_sample(&mut rng, &items, 5), vec!["b"]);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = StdRandom::seeded(42);
        let mut items: Vec<u32> = (0..50).collect();
        shuffle(&mut rng, &mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_weighted_sample_frequencies_track_weights() {
        let items = [("light", 1.0), ("heavy", 5.0)];
        let mut rng = StdRandom::seeded(1234);
        let heavy = (0..2_000)
            .filter(|_| weighted_sample(&mut rng, &items, 1) == vec!["heavy"])
            .count();
        // Expected share is 5/6 (~1667 of 2000)
        assert!((1_500..1_800).contains(&heavy), "heavy drawn {heavy} times");
    }
}
