//! Benchmarks for the rollback core.
//!
//! Run with: cargo bench --bench rollback
//!
//! The interesting costs are the per-tick arena update, the checksum walk,
//! packet encode/decode, and the two halves of recovering from latency:
//! ingesting a burst of confirmed packets, and rebuilding the predicted
//! timeline on the next update.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::hint::black_box;

use bulwark_rollback::arena::{ArenaSim, InitialConditions, ModeFlags};
use bulwark_rollback::codec;
use bulwark_rollback::fixed::Vec2Fx;
use bulwark_rollback::{
    ActionFlags, InputFrame, InputMapping, NetworkedSimState, SimPacket, Simulation,
};

type Peer = NetworkedSimState<ArenaSim, &'static str>;

fn arena(seed: u64) -> ArenaSim {
    ArenaSim::new(
        InitialConditions::new(seed, 2).with_mode(ModeFlags::PICKUPS | ModeFlags::SUDDEN_DEATH),
    )
    .expect("two players is a valid arena")
}

fn peer_pair(seed: u64) -> (Peer, Peer) {
    let alice = NetworkedSimState::new(
        arena(seed),
        InputMapping::new(vec![0], vec![("bob", vec![1])]).expect("valid mapping"),
    );
    let bob = NetworkedSimState::new(
        arena(seed),
        InputMapping::new(vec![1], vec![("alice", vec![0])]).expect("valid mapping"),
    );
    (alice, bob)
}

fn busy_frame(tick: u64) -> InputFrame {
    InputFrame::default()
        .with_velocity(Vec2Fx::from_ints((tick % 7) as i32 - 3, (tick % 5) as i32 - 2))
        .with_actions(if tick % 4 == 0 {
            ActionFlags::FIRE
        } else {
            ActionFlags::NONE
        })
}

fn mid_match_sim() -> ArenaSim {
    let mut sim = arena(7);
    for tick in 0..120 {
        sim.update(&[busy_frame(tick), busy_frame(tick + 3)]);
    }
    sim
}

fn bench_arena_tick(c: &mut Criterion) {
    let sim = mid_match_sim();
    let inputs = [busy_frame(120), busy_frame(123)];
    c.bench_function("arena_tick", |b| {
        b.iter_batched(
            || sim.clone(),
            |mut sim| {
                sim.update(black_box(&inputs));
                sim
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_arena_checksum(c: &mut Criterion) {
    let sim = mid_match_sim();
    c.bench_function("arena_checksum", |b| {
        b.iter(|| black_box(&sim).checksum());
    });
}

fn bench_lockstep_round(c: &mut Criterion) {
    c.bench_function("lockstep_round", |b| {
        b.iter_batched(
            || peer_pair(11),
            |(mut alice, mut bob)| {
                let from_alice = alice.update(&[busy_frame(0)]).expect("local update");
                let from_bob = bob.update(&[busy_frame(1)]).expect("local update");
                alice.input_packet(&"bob", from_bob).expect("delivery");
                bob.input_packet(&"alice", from_alice).expect("delivery");
                (alice, bob)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Ingest a burst of confirmed remote ticks: each packet completes one row
/// and advances the canonical timeline by one simulation step.
fn bench_packet_burst_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_burst_ingest");
    for depth in [2u64, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || {
                    let (mut alice, mut bob) = peer_pair(23);
                    let mut packets = Vec::with_capacity(depth as usize);
                    for tick in 0..depth {
                        let _ = alice.update(&[busy_frame(tick)]).expect("local update");
                        packets.push(bob.update(&[busy_frame(tick + 1)]).expect("remote update"));
                    }
                    (alice, packets)
                },
                |(mut alice, packets)| {
                    for packet in packets {
                        alice.input_packet(&"bob", packet).expect("in-order packet");
                    }
                    alice
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Rebuild the predicted timeline after a partial catch-up: the next update
/// clones the canonical state and replays the still-unconfirmed ticks.
fn bench_resync_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("resync_replay");
    for depth in [2u64, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter_batched(
                || {
                    let (mut alice, mut bob) = peer_pair(37);
                    for tick in 0..depth * 2 {
                        let _ = alice.update(&[busy_frame(tick)]).expect("local update");
                    }
                    for tick in 0..depth {
                        let packet = bob.update(&[busy_frame(tick + 1)]).expect("remote update");
                        alice.input_packet(&"bob", packet).expect("in-order packet");
                    }
                    alice
                },
                |mut alice| {
                    let packet = alice.update(&[busy_frame(99)]).expect("resync update");
                    black_box(packet);
                    alice
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_packet_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_codec");
    let packet = SimPacket::new(500, vec![busy_frame(500)], 499, 0xABCD_EF01);
    let bytes = codec::encode(&packet).expect("encoding should succeed");

    group.bench_function("encode", |b| {
        b.iter(|| codec::encode(black_box(&packet)).expect("encoding should succeed"));
    });
    group.bench_function("decode", |b| {
        b.iter(|| {
            codec::decode_value::<SimPacket>(black_box(&bytes)).expect("decoding should succeed")
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_arena_tick,
    bench_arena_checksum,
    bench_lockstep_round,
    bench_packet_burst_ingest,
    bench_resync_replay,
    bench_packet_codec
);
criterion_main!(benches);
