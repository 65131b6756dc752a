//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `stubs`: minimal deterministic `Simulation` implementations
//! - peer-pair constructors and a lockstep driver for the bundled arena game
//!
//! # Usage
//!
//! From any integration test file:
//! ```ignore
//! mod common;
//! use common::stubs::WalkerSim;
//! use common::{arena_pair, lockstep_round};
//! ```

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

pub mod stubs;

use bulwark_rollback::arena::{ArenaSim, InitialConditions, ModeFlags};
use bulwark_rollback::{InputFrame, InputMapping, NetworkedSimState};

use stubs::WalkerSim;

/// Installs a fmt subscriber so violation reports are visible under
/// `cargo test -- --nocapture`. First call wins; later calls are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A two-player arena peer keyed by static string ids.
pub type ArenaPeer = NetworkedSimState<ArenaSim, &'static str>;

/// A two-player walker peer keyed by static string ids.
pub type WalkerPeer = NetworkedSimState<WalkerSim, &'static str>;

/// Two arena peers over the same starting state: "alice" drives player 0,
/// "bob" drives player 1, and each knows the other by name.
#[allow(dead_code)]
#[must_use]
pub fn arena_pair(seed: u64) -> (ArenaPeer, ArenaPeer) {
    arena_pair_with_mode(seed, ModeFlags::NONE)
}

/// Same as [`arena_pair`] with extra arena rules switched on.
#[allow(dead_code)]
#[must_use]
pub fn arena_pair_with_mode(seed: u64, mode: ModeFlags) -> (ArenaPeer, ArenaPeer) {
    let conditions = InitialConditions::new(seed, 2).with_mode(mode);
    let alice = NetworkedSimState::new(
        ArenaSim::new(conditions).unwrap(),
        InputMapping::new(vec![0], vec![("bob", vec![1])]).unwrap(),
    );
    let bob = NetworkedSimState::new(
        ArenaSim::new(conditions).unwrap(),
        InputMapping::new(vec![1], vec![("alice", vec![0])]).unwrap(),
    );
    (alice, bob)
}

/// Two walker peers in the same arrangement as [`arena_pair`].
#[allow(dead_code)]
#[must_use]
pub fn walker_pair() -> (WalkerPeer, WalkerPeer) {
    let alice = NetworkedSimState::new(
        WalkerSim::new(2),
        InputMapping::new(vec![0], vec![("bob", vec![1])]).unwrap(),
    );
    let bob = NetworkedSimState::new(
        WalkerSim::new(2),
        InputMapping::new(vec![1], vec![("alice", vec![0])]).unwrap(),
    );
    (alice, bob)
}

/// One zero-latency round: both peers tick, then the packets cross.
///
/// With every round driven this way the canonical timelines advance in
/// lockstep, one tick behind the predicted ones.
#[allow(dead_code)]
pub fn lockstep_round(
    alice: &mut ArenaPeer,
    bob: &mut ArenaPeer,
    alice_input: InputFrame,
    bob_input: InputFrame,
) {
    let from_alice = alice.update(&[alice_input]).unwrap();
    let from_bob = bob.update(&[bob_input]).unwrap();
    alice.input_packet(&"bob", from_bob).unwrap();
    bob.input_packet(&"alice", from_alice).unwrap();
}
