//! Minimal deterministic simulations for the integration suite.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use bulwark_rollback::checksum::Fnv32;
use bulwark_rollback::fixed::Vec2Fx;
use bulwark_rollback::{InputFrame, Simulation};

/// The simplest honest game: every player's position integrates its
/// velocity, nothing else happens.
///
/// Cheap to clone and trivial to reason about, which makes it the workhorse
/// for rollback bookkeeping tests where the full arena would add noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerSim {
    tick: u64,
    positions: Vec<Vec2Fx>,
    checksum_skew: u32,
}

impl WalkerSim {
    #[allow(dead_code)]
    #[must_use]
    pub fn new(player_count: usize) -> Self {
        Self {
            tick: 0,
            positions: vec![Vec2Fx::ZERO; player_count],
            checksum_skew: 0,
        }
    }

    /// A walker whose checksums are wrong by construction.
    ///
    /// The skew feeds the digest but never the state, so the timelines stay
    /// healthy while every cross-validation against an unskewed peer fails.
    /// That is exactly the shape of a real desync: both sides look fine
    /// locally and only the comparison catches it.
    #[allow(dead_code)]
    #[must_use]
    pub fn with_checksum_skew(player_count: usize, skew: u32) -> Self {
        Self {
            checksum_skew: skew,
            ..Self::new(player_count)
        }
    }

    #[allow(dead_code)]
    #[must_use]
    pub fn positions(&self) -> &[Vec2Fx] {
        &self.positions
    }
}

impl Simulation for WalkerSim {
    fn update(&mut self, inputs: &[InputFrame]) {
        assert_eq!(inputs.len(), self.positions.len());
        for (position, input) in self.positions.iter_mut().zip(inputs) {
            *position += input.velocity;
        }
        self.tick += 1;
    }

    fn checksum(&self) -> u32 {
        let mut hasher = Fnv32::new();
        hasher.write_u64(self.tick);
        for position in &self.positions {
            hasher.write_i32(position.x.raw());
            hasher.write_i32(position.y.raw());
        }
        hasher.write_u32(self.checksum_skew);
        hasher.finish()
    }

    fn tick_count(&self) -> u64 {
        self.tick
    }

    fn game_over(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walkers_with_equal_histories_agree() {
        let mut a = WalkerSim::new(2);
        let mut b = WalkerSim::new(2);
        let inputs = [
            InputFrame::default().with_velocity(Vec2Fx::from_ints(1, 2)),
            InputFrame::default().with_velocity(Vec2Fx::from_ints(-3, 0)),
        ];
        for _ in 0..10 {
            a.update(&inputs);
            b.update(&inputs);
        }
        assert_eq!(a, b);
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn skew_changes_the_digest_but_not_the_state() {
        let mut honest = WalkerSim::new(1);
        let mut skewed = WalkerSim::with_checksum_skew(1, 0xBAD);
        let inputs = [InputFrame::default().with_velocity(Vec2Fx::from_ints(2, 0))];
        honest.update(&inputs);
        skewed.update(&inputs);
        assert_eq!(honest.positions(), skewed.positions());
        assert_ne!(honest.checksum(), skewed.checksum());
    }
}
