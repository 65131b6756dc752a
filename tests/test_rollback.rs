//! End-to-end rollback behavior over simulated peer links.
//!
//! Every test here moves real [`SimPacket`]s between two
//! [`NetworkedSimState`] instances by hand, standing in for the transport:
//! instant delivery, long holds, bursts, and protocol violations. The core
//! claims under test are that the canonical timelines of honest peers are
//! bit-identical regardless of delivery timing, and that dishonest or
//! diverged peers are caught rather than trusted.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod common;

use std::collections::VecDeque;

use bulwark_rollback::arena::ModeFlags;
use bulwark_rollback::fixed::{fx, Fixed, Vec2Fx};
use bulwark_rollback::{
    ActionFlags, BulwarkError, InputFrame, InputMapping, NetworkedSimState, SimPacket, Simulation,
};

use common::stubs::WalkerSim;
use common::{arena_pair, arena_pair_with_mode, lockstep_round, WalkerPeer};

fn walk(dx: i32, dy: i32) -> InputFrame {
    InputFrame::default().with_velocity(Vec2Fx::from_ints(dx, dy))
}

/// Varied per-round inputs so rollbacks have real corrections to make.
fn scripted(round: u64) -> (InputFrame, InputFrame) {
    let alice = walk((round % 5) as i32 - 2, 1).with_actions(if round % 4 == 0 {
        ActionFlags::FIRE
    } else {
        ActionFlags::NONE
    });
    let bob = walk(-1, (round % 3) as i32 - 1).with_actions(if round % 6 == 0 {
        ActionFlags::FIRE | ActionFlags::DASH
    } else {
        ActionFlags::NONE
    });
    (alice, bob)
}

#[test]
fn lockstep_keeps_timelines_in_step() {
    let (mut alice, mut bob) = arena_pair(1);
    for round in 0..20 {
        let (a, b) = scripted(round);
        lockstep_round(&mut alice, &mut bob, a, b);
        assert_eq!(alice.canonical_tick_count(), round + 1);
        assert_eq!(alice.predicted_tick_count(), round + 1);
    }
    assert_eq!(alice.canonical(), bob.canonical());
    assert!(alice.checksum_failed_remote_ids().is_empty());
    assert!(bob.checksum_failed_remote_ids().is_empty());
}

#[test]
fn predicted_timeline_runs_ahead_while_remote_is_silent() {
    let (mut alice, _bob) = arena_pair(2);
    for _ in 0..6 {
        alice.update(&[walk(2, 0)]).unwrap();
    }
    // Six ticks speculated, none confirmed.
    assert_eq!(alice.predicted_tick_count(), 6);
    assert_eq!(alice.canonical_tick_count(), 0);
    assert_eq!(alice.frames_ahead(), 6);

    // The guess for the silent peer is repeat-last, which from the start
    // means blank: alice's predicted bob is still standing on spawn.
    let guessed_bob = alice.predicted().player(1).unwrap();
    assert_eq!(guessed_bob.velocity, Vec2Fx::ZERO);
}

/// Holding the first five ticks of remote input until after the local side
/// has speculated past them must not change where anyone ends up: after
/// full delivery the canonical states match a zero-latency run exactly.
#[test]
fn delayed_packets_converge_to_the_lockstep_result() {
    let alice_input = walk(2, 0);
    let bob_input = walk(0, 3);

    // Reference universe: no latency at all.
    let (mut ref_alice, mut ref_bob) = arena_pair(7);
    for _ in 0..10 {
        lockstep_round(&mut ref_alice, &mut ref_bob, alice_input, bob_input);
    }
    assert_eq!(ref_alice.canonical_tick_count(), 10);

    // Delayed universe: both peers run ticks 0 through 5 hearing nothing.
    let (mut alice, mut bob) = arena_pair(7);
    let mut from_alice = VecDeque::new();
    let mut from_bob = VecDeque::new();
    for _ in 0..6 {
        from_alice.push_back(alice.update(&[alice_input]).unwrap());
        from_bob.push_back(bob.update(&[bob_input]).unwrap());
    }
    assert_eq!(alice.canonical_tick_count(), 0);
    assert_eq!(alice.predicted_tick_count(), 6);
    // Alice's guess had bob idle; he was actually walking up the whole time.
    assert_eq!(
        alice.predicted().player(1).unwrap().position.y,
        Fixed::ZERO
    );

    // The transport finally flushes. Each packet confirms one more tick.
    while let Some(packet) = from_bob.pop_front() {
        alice.input_packet(&"bob", packet).unwrap();
    }
    while let Some(packet) = from_alice.pop_front() {
        bob.input_packet(&"alice", packet).unwrap();
    }
    assert_eq!(alice.canonical_tick_count(), 6);
    assert_eq!(bob.canonical_tick_count(), 6);
    // Confirmed reality replaced the blank guess.
    assert_eq!(alice.canonical().player(1).unwrap().position.y, fx(18));

    // Back to live play for ticks 6 through 9.
    for _ in 0..4 {
        lockstep_round(&mut alice, &mut bob, alice_input, bob_input);
    }

    // Same ticks, same inputs, very different delivery - identical worlds.
    assert_eq!(alice.canonical_tick_count(), 10);
    assert_eq!(alice.canonical(), ref_alice.canonical());
    assert_eq!(bob.canonical(), ref_bob.canonical());
    assert_eq!(
        alice.canonical().checksum(),
        bob.canonical().checksum()
    );
    assert!(alice.checksum_failed_remote_ids().is_empty());
    assert!(bob.checksum_failed_remote_ids().is_empty());
}

/// Packets arrive in order but in irregular bursts, with pickups and
/// sudden death exercising the PRNG and container ordering under replay.
#[test]
fn bursty_delivery_converges_over_a_long_run() {
    let (mut alice, mut bob) =
        arena_pair_with_mode(99, ModeFlags::PICKUPS | ModeFlags::SUDDEN_DEATH);
    let mut from_alice: VecDeque<SimPacket> = VecDeque::new();
    let mut from_bob: VecDeque<SimPacket> = VecDeque::new();

    for round in 0..90 {
        let (a, b) = scripted(round);
        from_bob.push_back(alice.update(&[a]).unwrap());
        from_alice.push_back(bob.update(&[b]).unwrap());

        // Every third round the link wakes up and drains both directions.
        if round % 3 == 2 {
            while let Some(packet) = from_alice.pop_front() {
                bob.input_packet(&"alice", packet).unwrap();
            }
            while let Some(packet) = from_bob.pop_front() {
                alice.input_packet(&"bob", packet).unwrap();
            }
        }
        assert!(alice.predicted_tick_count() >= alice.canonical_tick_count());
        assert!(bob.predicted_tick_count() >= bob.canonical_tick_count());
    }

    // Flush whatever the last burst left behind.
    while let Some(packet) = from_alice.pop_front() {
        bob.input_packet(&"alice", packet).unwrap();
    }
    while let Some(packet) = from_bob.pop_front() {
        alice.input_packet(&"bob", packet).unwrap();
    }

    assert_eq!(alice.canonical_tick_count(), 90);
    assert_eq!(bob.canonical_tick_count(), 90);
    assert_eq!(alice.canonical(), bob.canonical());
    assert!(alice.checksum_failed_remote_ids().is_empty());
    assert!(bob.checksum_failed_remote_ids().is_empty());
}

/// Peers that constructed different starting states are genuinely desynced:
/// every canonical checksum disagrees. Both sides must notice, keep playing,
/// and never un-notice.
#[test]
fn diverged_peers_mark_each_other() {
    let (mut alice, _) = arena_pair(1);
    let (_, mut bob) = arena_pair(2);

    for round in 0..6 {
        let (a, b) = scripted(round);
        lockstep_round(&mut alice, &mut bob, a, b);
    }

    assert!(alice.checksum_failed_remote_ids().contains("bob"));
    assert!(bob.checksum_failed_remote_ids().contains("alice"));
    // Detection does not halt the timelines; that policy belongs upstream.
    assert_eq!(alice.canonical_tick_count(), 6);
    assert_eq!(bob.canonical_tick_count(), 6);

    // Sticky: more honest rounds change nothing.
    for round in 6..12 {
        let (a, b) = scripted(round);
        lockstep_round(&mut alice, &mut bob, a, b);
    }
    assert!(alice.checksum_failed_remote_ids().contains("bob"));
}

/// The subtler desync: states that agree while one side's digest lies.
/// Nothing about the timelines is wrong, so only the checksum exchange can
/// catch it.
#[test]
fn checksum_skew_alone_is_flagged() {
    common::init_tracing();
    let mut alice: WalkerPeer = NetworkedSimState::new(
        WalkerSim::new(2),
        InputMapping::new(vec![0], vec![("bob", vec![1])]).unwrap(),
    );
    let mut bob: WalkerPeer = NetworkedSimState::new(
        WalkerSim::with_checksum_skew(2, 0xBAD),
        InputMapping::new(vec![1], vec![("alice", vec![0])]).unwrap(),
    );

    for _ in 0..4 {
        let from_alice = alice.update(&[walk(1, 0)]).unwrap();
        let from_bob = bob.update(&[walk(0, 1)]).unwrap();
        alice.input_packet(&"bob", from_bob).unwrap();
        bob.input_packet(&"alice", from_alice).unwrap();
    }

    // Both walkers hold identical positions; the mismatch is digest-only.
    assert_eq!(
        alice.canonical().positions(),
        bob.canonical().positions()
    );
    assert!(alice.checksum_failed_remote_ids().contains("bob"));
    assert!(bob.checksum_failed_remote_ids().contains("alice"));
}

#[test]
fn protocol_violations_surface_as_errors() {
    common::init_tracing();
    let (mut alice, mut bob) = arena_pair(11);
    let from_bob_t0 = {
        let _ = alice.update(&[walk(1, 0)]).unwrap();
        bob.update(&[walk(0, 1)]).unwrap()
    };

    // A sender the mapping has never heard of.
    let err = alice
        .input_packet(&"mallory", from_bob_t0.clone())
        .unwrap_err();
    assert!(matches!(err, BulwarkError::UnknownRemote { .. }));

    // A gap in bob's sequence: tick 1 cannot arrive before tick 0 on a
    // reliable ordered channel.
    let from_bob_t1 = bob.update(&[walk(0, 1)]).unwrap();
    let err = alice
        .input_packet(&"bob", from_bob_t1.clone())
        .unwrap_err();
    assert!(matches!(err, BulwarkError::OutOfOrder { .. }));

    // In order, both are welcome.
    alice.input_packet(&"bob", from_bob_t0.clone()).unwrap();
    alice.input_packet(&"bob", from_bob_t1).unwrap();
    assert_eq!(alice.canonical_tick_count(), 1);

    // A duplicate resend is stale, and rejection changes nothing.
    let err = alice.input_packet(&"bob", from_bob_t0).unwrap_err();
    assert!(matches!(err, BulwarkError::StalePacket { .. }));
    assert_eq!(alice.canonical_tick_count(), 1);
}
