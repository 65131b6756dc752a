//! Seeded deterministic random number generation based on PCG32.
//!
//! A deterministic simulation gets exactly one PRNG stream, seeded from its
//! initial conditions and advanced only from inside the tick function. This
//! module provides that stream without pulling in the `rand` crate: PCG32 is
//! small enough to carry directly, and owning the implementation guarantees
//! the sequence never shifts under a dependency upgrade - which would be a
//! silent desync between peers built against different lockfiles.
//!
//! # PCG32 Algorithm
//!
//! PCG (Permuted Congruential Generator) is a family of simple, fast,
//! statistically strong generators. The XSH-RR variant used here has 64 bits
//! of state, 32-bit output, and a period of 2^64.
//!
//! Reference: <https://www.pcg-random.org/>
//!
//! # Floats
//!
//! Every derived sampler here is integer-only. There is deliberately no
//! `gen_bool(probability: f64)` style API: float thresholds on a
//! state-affecting path would reintroduce exactly the cross-platform
//! divergence this crate exists to prevent. Probabilities are expressed as
//! integer ratios and continuous values as [`Fixed`].
//!
//! # Usage
//!
//! ```rust
//! use bulwark_rollback::rng::Pcg32;
//!
//! let mut rng = Pcg32::seed_from_u64(12345);
//! let roll = rng.gen_range_u32(0..100);
//! assert!(roll < 100);
//! ```

use crate::{
    fixed::Fixed,
    report_violation,
    telemetry::{ViolationKind, ViolationSeverity},
};
use serde::{Deserialize, Serialize};

/// Default increment for single-stream PCG32.
/// This is a standard value from the PCG paper.
const PCG_DEFAULT_INCREMENT: u64 = 1442695040888963407;

/// Multiplier constant for the LCG step.
/// This is the standard multiplier for 64-bit state PCG.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

/// PCG32 random number generator.
///
/// A minimal implementation of the PCG-XSH-RR variant with 64-bit state.
/// Statistically strong and fast, but NOT cryptographically secure - it
/// drives gameplay decisions, nothing else.
///
/// The generator is a plain value: cloning a simulation clones its stream,
/// and both copies then produce identical sequences. It serializes alongside
/// the rest of the simulation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Creates a new PCG32 generator with the given state and stream.
    ///
    /// The stream selects one of 2^63 independent sequences. The internal
    /// increment must be odd, so the stream value is shifted up and OR-ed
    /// with 1, exactly as in the reference implementation.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        // Standard PCG seeding: start from zero state, advance once, add the
        // caller's state, advance again. Inlined because const fns cannot
        // call the non-const step.
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Creates a generator from a single 64-bit seed on the default stream.
    ///
    /// Different seeds produce statistically independent sequences. This is
    /// the constructor simulations use: same seed, same world.
    #[must_use]
    pub const fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_INCREMENT)
    }

    /// Generates the next 32-bit random value.
    #[inline]
    #[must_use]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        // XSH-RR output permutation: xor-shift high bits, then random rotate.
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Generates the next 64-bit random value by combining two 32-bit values.
    #[inline]
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }

    /// Generates a random `u32` in `[low, high)` using rejection sampling
    /// (no modulo bias).
    ///
    /// # Empty Range Behavior
    /// If `range.is_empty()`, reports a violation via telemetry and returns
    /// `range.start`.
    pub fn gen_range_u32(&mut self, range: std::ops::Range<u32>) -> u32 {
        let span = range.end.wrapping_sub(range.start);
        if span == 0 {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::SimContract,
                "gen_range_u32 called with empty range [{}..{})",
                range.start,
                range.end
            );
            return range.start;
        }

        let threshold = span.wrapping_neg() % span;
        loop {
            let random_value = self.next_u32();
            if random_value >= threshold {
                return range.start.wrapping_add(random_value % span);
            }
        }
    }

    /// Returns `true` with probability `numerator / denominator`.
    ///
    /// A zero denominator is treated as "never" and reported via telemetry;
    /// a numerator at or above the denominator is "always". The degenerate
    /// cases still consume a stream value, so tuning a probability to 0 or 1
    /// does not freeze the sequence for later call sites.
    pub fn gen_bool_ratio(&mut self, numerator: u32, denominator: u32) -> bool {
        if denominator == 0 {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::SimContract,
                "gen_bool_ratio called with zero denominator (numerator={})",
                numerator
            );
            let _ = self.next_u32();
            return false;
        }
        if numerator >= denominator {
            let _ = self.next_u32();
            return true;
        }
        self.gen_range_u32(0..denominator) < numerator
    }

    /// Generates a uniform [`Fixed`] in `[0, 1)` from the top 16 bits of one
    /// stream value.
    pub fn gen_fixed_unit(&mut self) -> Fixed {
        Fixed::from_raw((self.next_u32() >> 16) as i32)
    }

    /// Generates a uniform [`Fixed`] in `[low, high)`.
    ///
    /// Degenerate ranges (`high <= low`) return `low` without consuming the
    /// stream differently from the normal path.
    pub fn gen_fixed_range(&mut self, low: Fixed, high: Fixed) -> Fixed {
        let span = i64::from(high.raw()) - i64::from(low.raw());
        let frac = i64::from(self.next_u32() >> 16);
        if span <= 0 {
            return low;
        }
        Fixed::from_raw((i64::from(low.raw()) + ((span * frac) >> 16)) as i32)
    }

    /// Raw `(state, increment)` pair, for explicit-field state checksums.
    #[must_use]
    pub const fn state_raw(&self) -> (u64, u64) {
        (self.state, self.inc)
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ===== Core generator =====

    // Check values published with the reference C implementation for
    // pcg32_srandom_r(42, 54); our seeding procedure is identical.
    #[test]
    fn matches_reference_implementation() {
        let mut rng = Pcg32::new(42, 54);
        let expected = [
            0xa15c_02b7_u32,
            0x7b47_f409_u32,
            0xba1d_3330_u32,
            0x83d2_f293_u32,
            0xbfa4_784b_u32,
            0xcbed_606e_u32,
        ];
        for &exp in &expected {
            assert_eq!(rng.next_u32(), exp);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(12345);
        let mut b = Pcg32::seed_from_u64(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let a_vals: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let b_vals: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(a_vals, b_vals);
    }

    #[test]
    fn different_streams_diverge() {
        let mut a = Pcg32::new(7, 1);
        let mut b = Pcg32::new(7, 2);
        let a_vals: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let b_vals: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(a_vals, b_vals);
    }

    #[test]
    fn clone_continues_identically() {
        let mut original = Pcg32::seed_from_u64(99);
        // Burn a few values so the clone starts mid-stream.
        for _ in 0..10 {
            let _ = original.next_u32();
        }
        let mut copy = original.clone();
        for _ in 0..50 {
            assert_eq!(original.next_u32(), copy.next_u32());
        }
    }

    #[test]
    fn next_u64_combines_two_outputs() {
        let mut a = Pcg32::seed_from_u64(5);
        let mut b = Pcg32::seed_from_u64(5);
        let high = u64::from(b.next_u32());
        let low = u64::from(b.next_u32());
        assert_eq!(a.next_u64(), (high << 32) | low);
    }

    // ===== Derived samplers =====

    #[test]
    fn gen_range_stays_in_bounds() {
        let mut rng = Pcg32::seed_from_u64(42);
        for _ in 0..1000 {
            let val = rng.gen_range_u32(10..20);
            assert!((10..20).contains(&val));
        }
    }

    #[test]
    fn gen_range_single_value() {
        let mut rng = Pcg32::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(rng.gen_range_u32(7..8), 7);
        }
    }

    #[test]
    fn gen_range_empty_returns_start() {
        let mut rng = Pcg32::seed_from_u64(42);
        assert_eq!(rng.gen_range_u32(5..5), 5);
    }

    #[test]
    fn gen_range_covers_full_span_eventually() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[rng.gen_range_u32(0..4) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "seen: {:?}", seen);
    }

    #[test]
    fn gen_bool_ratio_extremes() {
        let mut rng = Pcg32::seed_from_u64(1);
        for _ in 0..100 {
            assert!(rng.gen_bool_ratio(1, 1));
            assert!(!rng.gen_bool_ratio(0, 1));
        }
        // Zero denominator is "never", not a panic.
        assert!(!rng.gen_bool_ratio(3, 0));
    }

    #[test]
    fn gen_bool_ratio_is_roughly_fair() {
        let mut rng = Pcg32::seed_from_u64(2024);
        let hits = (0..10_000)
            .filter(|_| rng.gen_bool_ratio(1, 2))
            .count();
        assert!((4_000..6_000).contains(&hits), "hits: {}", hits);
    }

    #[test]
    fn gen_fixed_unit_stays_in_unit_interval() {
        let mut rng = Pcg32::seed_from_u64(11);
        for _ in 0..1000 {
            let v = rng.gen_fixed_unit();
            assert!(v >= Fixed::ZERO);
            assert!(v < Fixed::ONE);
        }
    }

    #[test]
    fn gen_fixed_range_stays_in_bounds() {
        use crate::fixed::fx;
        let mut rng = Pcg32::seed_from_u64(12);
        for _ in 0..1000 {
            let v = rng.gen_fixed_range(fx(-8), fx(8));
            assert!(v >= fx(-8));
            assert!(v < fx(8));
        }
    }

    #[test]
    fn gen_fixed_range_degenerate_returns_low() {
        use crate::fixed::fx;
        let mut rng = Pcg32::seed_from_u64(13);
        assert_eq!(rng.gen_fixed_range(fx(3), fx(3)), fx(3));
        assert_eq!(rng.gen_fixed_range(fx(3), fx(1)), fx(3));
    }

    #[test]
    fn state_raw_exposes_progression() {
        let mut rng = Pcg32::seed_from_u64(1);
        let before = rng.state_raw();
        let _ = rng.next_u32();
        let after = rng.state_raw();
        assert_ne!(before.0, after.0);
        assert_eq!(before.1, after.1, "increment never changes");
    }

    #[test]
    fn serde_round_trip_preserves_stream() {
        let mut rng = Pcg32::seed_from_u64(77);
        for _ in 0..5 {
            let _ = rng.next_u32();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: Pcg32 = serde_json::from_str(&json).unwrap();
        for _ in 0..50 {
            assert_eq!(rng.next_u32(), restored.next_u32());
        }
    }
}
