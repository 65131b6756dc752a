//! Property-based tests for the rollback state machine.
//!
//! These check relationships rather than hand-computed values: timeline
//! ordering, delivery-timing invariance, and the immutability of confirmed
//! history, all under randomized inputs and delivery schedules. The walker
//! stub keeps the simulation itself trivial, so any failure here points at
//! the rollback bookkeeping and not at game rules.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use std::collections::VecDeque;

use bulwark_rollback::fixed::Vec2Fx;
use bulwark_rollback::{BulwarkError, InputFrame, SimPacket, Simulation};
use proptest::prelude::*;

use common::{walker_pair, WalkerPeer};

// ============================================================================
// Strategies and helpers
// ============================================================================

/// One round of play as the transport sees it: what each side pressed, and
/// whether the link wakes up afterwards.
#[derive(Debug, Clone)]
struct Round {
    alice: (i8, i8),
    bob: (i8, i8),
    deliver: bool,
}

fn round_strategy() -> impl Strategy<Value = Round> {
    (any::<(i8, i8)>(), any::<(i8, i8)>(), any::<bool>())
        .prop_map(|(alice, bob, deliver)| Round { alice, bob, deliver })
}

fn script_strategy() -> impl Strategy<Value = Vec<Round>> {
    prop::collection::vec(round_strategy(), 1..48)
}

fn step(delta: (i8, i8)) -> InputFrame {
    InputFrame::default().with_velocity(Vec2Fx::from_ints(
        i32::from(delta.0),
        i32::from(delta.1),
    ))
}

fn drain_into(peer: &mut WalkerPeer, from: &'static str, queue: &mut VecDeque<SimPacket>) {
    while let Some(packet) = queue.pop_front() {
        peer.input_packet(&from, packet).unwrap();
    }
}

// ============================================================================
// Timeline ordering
// ============================================================================

proptest! {
    /// The predicted timeline never lags canonical, canonical never moves
    /// backwards, and once every packet is through both peers agree on every
    /// confirmed tick.
    #[test]
    fn prop_timelines_stay_ordered(script in script_strategy()) {
        let (mut alice, mut bob) = walker_pair();
        let mut to_alice = VecDeque::new();
        let mut to_bob = VecDeque::new();
        let mut last_canonical = 0;

        for round in &script {
            to_bob.push_back(alice.update(&[step(round.alice)]).unwrap());
            to_alice.push_back(bob.update(&[step(round.bob)]).unwrap());
            if round.deliver {
                drain_into(&mut alice, "bob", &mut to_alice);
                drain_into(&mut bob, "alice", &mut to_bob);
            }
            prop_assert!(alice.predicted_tick_count() >= alice.canonical_tick_count());
            prop_assert!(bob.predicted_tick_count() >= bob.canonical_tick_count());
            prop_assert!(alice.canonical_tick_count() >= last_canonical);
            last_canonical = alice.canonical_tick_count();
        }

        drain_into(&mut alice, "bob", &mut to_alice);
        drain_into(&mut bob, "alice", &mut to_bob);

        prop_assert_eq!(alice.canonical_tick_count(), script.len() as u64);
        prop_assert_eq!(bob.canonical_tick_count(), script.len() as u64);
        prop_assert_eq!(alice.canonical(), bob.canonical());
        prop_assert!(alice.checksum_failed_remote_ids().is_empty());
        prop_assert!(bob.checksum_failed_remote_ids().is_empty());
    }
}

// ============================================================================
// Duplicate delivery
// ============================================================================

proptest! {
    /// Replaying any packet the receiver has already consumed is rejected as
    /// stale and leaves the confirmed timeline untouched.
    #[test]
    fn prop_duplicate_packets_never_mutate(
        script in prop::collection::vec((any::<i8>(), any::<i8>()), 2..32),
        resend_at in 0usize..32,
    ) {
        let (mut alice, mut bob) = walker_pair();
        let mut from_bob = Vec::new();
        for &(da, db) in &script {
            let to_bob = alice.update(&[step((da, db))]).unwrap();
            let to_alice = bob.update(&[step((db, da))]).unwrap();
            from_bob.push(to_alice.clone());
            alice.input_packet(&"bob", to_alice).unwrap();
            bob.input_packet(&"alice", to_bob).unwrap();
        }

        let tick_before = alice.canonical_tick_count();
        let checksum_before = alice.canonical().checksum();

        let replay = from_bob[resend_at % from_bob.len()].clone();
        let err = alice.input_packet(&"bob", replay).unwrap_err();
        prop_assert!(matches!(err, BulwarkError::StalePacket { .. }));
        prop_assert_eq!(alice.canonical_tick_count(), tick_before);
        prop_assert_eq!(alice.canonical().checksum(), checksum_before);
    }
}

// ============================================================================
// Delivery-timing invariance
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Delivery timing is invisible to the confirmed timeline: a universe
    /// where the link holds packets in bulk ends bit-identical to one with
    /// per-round delivery.
    #[test]
    fn prop_rollback_matches_lockstep(
        script in prop::collection::vec((any::<i8>(), any::<i8>()), 1..40),
        hold in 1usize..8,
    ) {
        // Per-round delivery.
        let (mut ls_alice, mut ls_bob) = walker_pair();
        for &(da, db) in &script {
            let to_bob = ls_alice.update(&[step((da, db))]).unwrap();
            let to_alice = ls_bob.update(&[step((db, da))]).unwrap();
            ls_alice.input_packet(&"bob", to_alice).unwrap();
            ls_bob.input_packet(&"alice", to_bob).unwrap();
        }

        // Same play, but the link only wakes up every `hold` rounds.
        let (mut alice, mut bob) = walker_pair();
        let mut to_alice = VecDeque::new();
        let mut to_bob = VecDeque::new();
        for (round, &(da, db)) in script.iter().enumerate() {
            to_bob.push_back(alice.update(&[step((da, db))]).unwrap());
            to_alice.push_back(bob.update(&[step((db, da))]).unwrap());
            if round % hold == hold - 1 {
                drain_into(&mut alice, "bob", &mut to_alice);
                drain_into(&mut bob, "alice", &mut to_bob);
            }
        }
        drain_into(&mut alice, "bob", &mut to_alice);
        drain_into(&mut bob, "alice", &mut to_bob);

        prop_assert_eq!(alice.canonical(), ls_alice.canonical());
        prop_assert_eq!(bob.canonical(), ls_bob.canonical());
        prop_assert_eq!(
            alice.canonical().checksum(),
            ls_bob.canonical().checksum()
        );
    }
}

// ============================================================================
// Confirmed history immutability
// ============================================================================

proptest! {
    /// The canonical rider a peer advertises never rewrites history: the
    /// advertised tick is nondecreasing, and re-advertisements of the same
    /// tick always carry the same digest.
    #[test]
    fn prop_confirmed_history_never_rewrites(script in script_strategy()) {
        let (mut alice, mut bob) = walker_pair();
        let mut to_alice = VecDeque::new();
        let mut advertised: Vec<(u64, u32)> = Vec::new();

        for round in &script {
            let packet = alice.update(&[step(round.alice)]).unwrap();
            advertised.push((packet.canonical_tick_count, packet.canonical_checksum));
            to_alice.push_back(bob.update(&[step(round.bob)]).unwrap());
            if round.deliver {
                drain_into(&mut alice, "bob", &mut to_alice);
            }
        }

        for pair in advertised.windows(2) {
            prop_assert!(pair[1].0 >= pair[0].0);
            if pair[1].0 == pair[0].0 {
                prop_assert_eq!(pair[1].1, pair[0].1);
            }
        }
    }
}
