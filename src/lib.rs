//! # Bulwark Rollback
//!
//! A transport-agnostic rollback netcode core for deterministic lockstep
//! games, written in 100% safe Rust.
//!
//! Bulwark keeps two copies of your simulation. The *canonical* copy only
//! advances on ticks where every player's input has been confirmed, so it is
//! bit-identical on every peer. The *predicted* copy runs ahead on guessed
//! input so the local player never waits on the network. When a confirmed
//! input contradicts a guess, the predicted copy is rebuilt from canonical
//! and replayed with the corrected history - the rollback.
//!
//! The crate deliberately stops at the netcode boundary: you bring the
//! transport (anything with reliable, ordered, per-peer delivery) and the
//! game. The game signs the [`Simulation`] contract; the transport moves
//! [`SimPacket`] values, one per tick per peer, encoded however you like
//! ([`codec`] fixes a compact binary encoding if you want one).
//!
//! # Quick start
//!
//! Two peers driving the bundled [`arena`] game, with every packet
//! delivered promptly:
//!
//! ```
//! use bulwark_rollback::arena::{ArenaSim, InitialConditions};
//! use bulwark_rollback::{InputFrame, InputMapping, NetworkedSimState, Simulation};
//!
//! // Both peers must construct the same starting state.
//! let conditions = InitialConditions::new(0xB0B, 2);
//!
//! // Each peer's mapping lists its own players as local and everyone
//! // else's under the id it knows the peer by.
//! let mut alice = NetworkedSimState::new(
//!     ArenaSim::new(conditions)?,
//!     InputMapping::new(vec![0], vec![("bob", vec![1])])?,
//! );
//! let mut bob = NetworkedSimState::new(
//!     ArenaSim::new(conditions)?,
//!     InputMapping::new(vec![1], vec![("alice", vec![0])])?,
//! );
//!
//! for _ in 0..10 {
//!     let from_alice = alice.update(&[InputFrame::BLANK])?;
//!     let from_bob = bob.update(&[InputFrame::BLANK])?;
//!     alice.input_packet(&"bob", from_bob)?;
//!     bob.input_packet(&"alice", from_alice)?;
//! }
//!
//! // With nothing in flight, both canonical timelines agree exactly.
//! assert_eq!(alice.canonical_tick_count(), 10);
//! assert_eq!(alice.canonical().checksum(), bob.canonical().checksum());
//! assert!(alice.checksum_failed_remote_ids().is_empty());
//! # Ok::<(), bulwark_rollback::BulwarkError>(())
//! ```
//!
//! When packets arrive late instead, [`NetworkedSimState::update`] keeps the
//! predicted timeline moving and [`NetworkedSimState::input_packet`] catches
//! canonical up as confirmations land; see the [`rollback`] module docs for
//! the full lifecycle.
//!
//! # Determinism
//!
//! Rollback only works when replaying the same inputs reproduces the same
//! state. Everything here is built for that: [`fixed`] provides bit-exact
//! arithmetic, [`rng`] a seedable PRNG that lives inside the simulation
//! state, [`checksum`] the digest peers cross-validate with, and [`arena`] a
//! complete example obeying all of it.
//!
//! # Feature flags
//!
//! - `sync-send`: adds `Send + Sync` bounds to [`Simulation`], [`RemoteId`],
//!   and the observer trait so sessions can hop threads.
//! - `paranoid`: keeps the internal invariant sweeps enabled in release
//!   builds.
//! - `json`: JSON export for telemetry types (pulls in `serde_json`).

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::{fmt::Debug, hash::Hash};

use smallvec::SmallVec;

pub use crate::error::BulwarkError;
pub use crate::input_frame::{ActionFlags, AimTarget, InputFrame};
pub use crate::mapping::InputMapping;
pub use crate::packet::SimPacket;
pub use crate::rollback::NetworkedSimState;
pub use crate::telemetry::{
    ContractViolation, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};

pub mod arena;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod fixed;
pub mod input_frame;
pub mod mapping;
pub mod packet;
pub mod prelude;
pub mod rng;
pub mod rollback;
pub mod telemetry;

// #############
// #   TYPES   #
// #############

/// One tick's worth of input, one [`InputFrame`] per player index.
///
/// Rows for typical rosters stay inline; larger ones spill to the heap with
/// no API difference.
pub type InputRow = SmallVec<[InputFrame; 4]>;

// #############
// #  TRAITS   #
// #############

/// The contract a game must satisfy to be driven by [`NetworkedSimState`].
///
/// The crate never inspects your state; it only clones it, steps it, and
/// compares digests of it. In exchange, the implementation must be strictly
/// deterministic: starting from equal states and applying equal inputs must
/// yield bit-identical states on every machine, OS, and build. Concretely
/// that rules out floating point whose rounding can vary, wall-clock reads,
/// unseeded randomness, and iteration over unordered containers. The
/// [`fixed`], [`rng`], and [`checksum`] modules exist so following the rules
/// is the path of least resistance, and [`arena`] shows all of them in use.
///
/// `Clone` is load-bearing: every rollback clones the canonical state, so
/// the cheaper the clone, the cheaper a misprediction.
#[cfg(feature = "sync-send")]
pub trait Simulation: Clone + Send + Sync {
    /// Advances the simulation by exactly one tick.
    ///
    /// `inputs` holds one frame per player, indexed `0..player_count` in a
    /// globally agreed order. The rollback core always passes the correct
    /// arity; implementations may panic on any other length, since that is
    /// a programming error rather than a runtime condition.
    fn update(&mut self, inputs: &[InputFrame]);

    /// A digest of the full gameplay state, used for desync detection.
    ///
    /// Two peers at the same tick with the same input history must produce
    /// the same value. Hash explicit fields in a fixed order
    /// ([`checksum::Fnv32`] exists for exactly this); never hash pointers,
    /// capacities, or anything nondeterministic.
    fn checksum(&self) -> u32;

    /// Ticks simulated so far. Starts at zero and increments by one per
    /// [`update`](Simulation::update).
    fn tick_count(&self) -> u64;

    /// Whether the game has reached a terminal state. The netcode keeps
    /// functioning either way; callers decide when to stop driving it.
    fn game_over(&self) -> bool;
}

/// The contract a game must satisfy to be driven by [`NetworkedSimState`].
///
/// The crate never inspects your state; it only clones it, steps it, and
/// compares digests of it. In exchange, the implementation must be strictly
/// deterministic: starting from equal states and applying equal inputs must
/// yield bit-identical states on every machine, OS, and build. Concretely
/// that rules out floating point whose rounding can vary, wall-clock reads,
/// unseeded randomness, and iteration over unordered containers. The
/// [`fixed`], [`rng`], and [`checksum`] modules exist so following the rules
/// is the path of least resistance, and [`arena`] shows all of them in use.
///
/// `Clone` is load-bearing: every rollback clones the canonical state, so
/// the cheaper the clone, the cheaper a misprediction.
#[cfg(not(feature = "sync-send"))]
pub trait Simulation: Clone {
    /// Advances the simulation by exactly one tick.
    ///
    /// `inputs` holds one frame per player, indexed `0..player_count` in a
    /// globally agreed order. The rollback core always passes the correct
    /// arity; implementations may panic on any other length, since that is
    /// a programming error rather than a runtime condition.
    fn update(&mut self, inputs: &[InputFrame]);

    /// A digest of the full gameplay state, used for desync detection.
    ///
    /// Two peers at the same tick with the same input history must produce
    /// the same value. Hash explicit fields in a fixed order
    /// ([`checksum::Fnv32`] exists for exactly this); never hash pointers,
    /// capacities, or anything nondeterministic.
    fn checksum(&self) -> u32;

    /// Ticks simulated so far. Starts at zero and increments by one per
    /// [`update`](Simulation::update).
    fn tick_count(&self) -> u64;

    /// Whether the game has reached a terminal state. The netcode keeps
    /// functioning either way; callers decide when to stop driving it.
    fn game_over(&self) -> bool;
}

/// Marker for types that can identify a remote peer.
///
/// The crate treats remote ids as opaque: they key the input mapping and
/// the per-remote bookkeeping, nothing more. Socket addresses, player UUIDs,
/// lobby slot numbers, and plain strings all qualify; the blanket
/// implementation covers every type with the right derives.
#[cfg(feature = "sync-send")]
pub trait RemoteId: Clone + Eq + Ord + Hash + Debug + Send + Sync {}

#[cfg(feature = "sync-send")]
impl<T: Clone + Eq + Ord + Hash + Debug + Send + Sync> RemoteId for T {}

/// Marker for types that can identify a remote peer.
///
/// The crate treats remote ids as opaque: they key the input mapping and
/// the per-remote bookkeeping, nothing more. Socket addresses, player UUIDs,
/// lobby slot numbers, and plain strings all qualify; the blanket
/// implementation covers every type with the right derives.
#[cfg(not(feature = "sync-send"))]
pub trait RemoteId: Clone + Eq + Ord + Hash + Debug {}

#[cfg(not(feature = "sync-send"))]
impl<T: Clone + Eq + Ord + Hash + Debug> RemoteId for T {}

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
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn assert_remote_id<R: RemoteId>() {}

    #[test]
    fn common_id_types_satisfy_remote_id() {
        assert_remote_id::<String>();
        assert_remote_id::<&'static str>();
        assert_remote_id::<u64>();
        assert_remote_id::<SocketAddr>();
        assert_remote_id::<(IpAddr, u16)>();
    }

    #[test]
    fn input_rows_for_small_rosters_stay_inline() {
        let row: InputRow = (0..4).map(|_| InputFrame::BLANK).collect();
        assert!(!row.spilled());
        let big: InputRow = (0..5).map(|_| InputFrame::BLANK).collect();
        assert!(big.spilled());
    }

    #[test]
    fn socket_addresses_work_as_mapping_keys() {
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7777);
        let mapping = InputMapping::new(vec![0], vec![(peer, vec![1])]).unwrap();
        assert!(mapping.contains_remote(&peer));
        assert_eq!(mapping.player_count(), 2);
    }
}
