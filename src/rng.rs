//! Seedable random numbers for warps, handshakes and fault injection.
//!
//! The crate needs very little randomness: a warp destination inside the arena, a link magic
//! and handshake nonce, and the coin flips of [`ChaosSocket`](crate::ChaosSocket). A small
//! PCG-XSH-RR generator (64-bit state, 32-bit output) covers all of it. Nothing here is
//! suitable for secrets.
//!
//! ```rust
//! use princess_of_fire::rng::{Pcg32, Rng, SeedableRng};
//!
//! let mut rng = Pcg32::seed_from_u64(12345);
//! let x = rng.gen_range(0..320);
//! assert!(x < 320);
//! ```

use crate::{
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};
use std::cell::RefCell;
use std::hash::BuildHasher;
use std::ops::Range;

const MULTIPLIER: u64 = 6364136223846793005;
const DEFAULT_STREAM: u64 = 1442695040888963407;

/// Permuted congruential generator, 32-bit output variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    increment: u64,
}

impl Pcg32 {
    /// Creates a generator from an initial state and a stream selector.
    #[must_use]
    pub const fn new(seed: u64, stream: u64) -> Self {
        let mut rng = Self {
            state: 0,
            increment: (stream << 1) | 1,
        };
        rng.step();
        rng.state = rng.state.wrapping_add(seed);
        rng.step();
        rng
    }

    const fn step(&mut self) {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(self.increment);
    }

    #[inline]
    fn output(state: u64) -> u32 {
        let shifted = (((state >> 18) ^ state) >> 27) as u32;
        shifted.rotate_right((state >> 59) as u32)
    }
}

/// Construction from a seed or from process entropy.
pub trait SeedableRng: Sized {
    /// Builds a generator whose sequence is fixed by `seed`.
    #[must_use]
    fn seed_from_u64(seed: u64) -> Self;

    /// Builds a generator with an unpredictable seed.
    #[must_use]
    fn from_entropy() -> Self;
}

impl SeedableRng for Pcg32 {
    fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, DEFAULT_STREAM)
    }

    fn from_entropy() -> Self {
        Self::seed_from_u64(entropy_seed())
    }
}

/// A source of random bits plus the draws built on top of it.
pub trait Rng {
    /// The next 32 random bits.
    fn next_u32(&mut self) -> u32;

    /// The next 64 random bits.
    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    /// Draws a value of type `T`.
    fn gen<T: RandomValue>(&mut self) -> T {
        T::random(self)
    }

    /// Uniform draw from `range`, with rejection instead of modulo bias.
    ///
    /// An empty range is reported as an internal violation and yields `range.start`.
    fn gen_range(&mut self, range: Range<u32>) -> u32 {
        if range.is_empty() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::InternalError,
                "empty random range {}..{}",
                range.start,
                range.end
            );
            return range.start;
        }
        let span = range.end - range.start;
        // values below `floor` would make the low residues more likely
        let floor = span.wrapping_neg() % span;
        let mut draw = self.next_u32();
        while draw < floor {
            draw = self.next_u32();
        }
        range.start + draw % span
    }

    /// Uniform index into a collection of `range.end` items.
    fn gen_range_usize(&mut self, range: Range<usize>) -> usize {
        let start = u32::try_from(range.start).unwrap_or(u32::MAX);
        let end = u32::try_from(range.end).unwrap_or(u32::MAX);
        self.gen_range(start..end) as usize
    }

    /// `true` with probability `probability`, clamped to `[0, 1]`.
    fn gen_bool(&mut self, probability: f64) -> bool {
        if probability >= 1.0 {
            return true;
        }
        let cutoff = (probability.max(0.0) * f64::from(u32::MAX)) as u32;
        self.next_u32() < cutoff
    }
}

impl Rng for Pcg32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let previous = self.state;
        self.step();
        Self::output(previous)
    }
}

/// Types that can be drawn directly with [`Rng::gen`].
pub trait RandomValue {
    /// Draws one value from `rng`.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

impl RandomValue for u16 {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        (rng.next_u32() >> 16) as Self
    }
}

impl RandomValue for u32 {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.next_u32()
    }
}

impl RandomValue for bool {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.next_u32() >> 31 == 1
    }
}

thread_local! {
    static LOCAL: RefCell<Pcg32> = RefCell::new(Pcg32::from_entropy());
}

/// Draws from a per-thread generator seeded from entropy.
///
/// ```rust
/// let nonce: u32 = princess_of_fire::rng::random();
/// # let _ = nonce;
/// ```
#[must_use]
pub fn random<T: RandomValue>() -> T {
    LOCAL.with(|rng| T::random(&mut *rng.borrow_mut()))
}

fn entropy_seed() -> u64 {
    let started = web_time::Instant::now();
    std::collections::hash_map::RandomState::new()
        .hash_one((std::thread::current().id(), started.elapsed().as_nanos()))
        .rotate_left(17)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(42);
        let mut b = Pcg32::seed_from_u64(42);
        let left: Vec<u32> = (0..64).map(|_| a.next_u32()).collect();
        let right: Vec<u32> = (0..64).map(|_| b.next_u32()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn matches_reference_output() {
        let mut rng = Pcg32::seed_from_u64(0);
        let first: Vec<u32> = (0..5).map(|_| rng.next_u32()).collect();
        assert_eq!(
            first,
            [0x348a463f, 0x4f205a1b, 0x2946c488, 0x805e36de, 0x79f994a9]
        );
    }

    #[test]
    fn warp_draws_stay_on_screen() {
        let mut rng = Pcg32::seed_from_u64(7);
        for _ in 0..10_000 {
            assert!(rng.gen_range(0..320) < 320);
            assert!(rng.gen_range(0..240) < 240);
        }
    }

    #[test]
    fn every_value_of_a_small_range_shows_up() {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut seen = [0u32; 5];
        for _ in 0..1_000 {
            seen[rng.gen_range(0..5) as usize] += 1;
        }
        assert!(seen.iter().all(|count| *count > 100), "{seen:?}");
    }

    #[test]
    fn empty_ranges_fall_back_to_start() {
        let mut rng = Pcg32::seed_from_u64(3);
        assert_eq!(rng.gen_range(10..10), 10);
        assert_eq!(rng.gen_range_usize(4..4), 4);
    }

    #[test]
    fn certain_and_impossible_events() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..100 {
            assert!(!rng.gen_bool(0.0));
            assert!(!rng.gen_bool(-1.0));
            assert!(rng.gen_bool(1.0));
            assert!(rng.gen_bool(1.5));
        }
    }

    #[test]
    fn entropy_generators_diverge() {
        let mut a = Pcg32::from_entropy();
        let mut b = Pcg32::from_entropy();
        let left: Vec<u32> = (0..4).map(|_| a.next_u32()).collect();
        let right: Vec<u32> = (0..4).map(|_| b.next_u32()).collect();
        assert_ne!(left, right);
    }
}
