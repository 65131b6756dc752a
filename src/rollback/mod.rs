//! Twin-timeline rollback core.
//!
//! [`NetworkedSimState`] owns two copies of the simulation. The *canonical*
//! copy advances only on ticks where every player's input is confirmed and
//! is therefore identical on every peer. The *predicted* copy runs ahead on
//! guessed input so the local player gets immediate feedback. When confirmed
//! input arrives and contradicts a guess, the predicted copy is thrown away
//! and rebuilt from canonical plus the corrected input history.
//!
//! Between the two timelines sits a window of partially-filled input rows,
//! one row per outstanding tick (see [`frame_window`]). The front row covers
//! the canonical tick; completing it is the only way canonical moves.
//!
//! Every outgoing packet carries the newest confirmed checksum, and every
//! incoming packet delivers the remote's. Reconciliation compares the two
//! histories tick by tick; a mismatch is a desync and permanently marks the
//! remote in [`NetworkedSimState::checksum_failed_remote_ids`].

mod frame_window;
mod remote;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::error::BulwarkError;
use crate::input_frame::InputFrame;
use crate::mapping::InputMapping;
use crate::packet::SimPacket;
use crate::telemetry::{
    report_to_observer, ContractViolation, InvariantChecker, InvariantViolation, ViolationKind,
    ViolationObserver, ViolationSeverity,
};
use crate::{debug_check_invariants, report_violation_to};
use crate::{InputRow, RemoteId, Simulation};

use frame_window::FrameWindow;
use remote::RemoteBookkeeping;

/// Rollback state machine pairing a confirmed and a speculative simulation.
///
/// One instance is logically single-threaded: [`update`] and
/// [`input_packet`] must be serialized with respect to each other. Confine
/// the instance to one thread, or put a mutex or actor boundary around it at
/// the collaborator layer; there is no internal locking.
///
/// # Timelines
///
/// After every public operation,
/// `predicted.tick_count() >= canonical.tick_count()` holds. Canonical never
/// rewinds; predicted may be rebuilt from canonical at any [`update`] call.
/// Render from [`predicted`](Self::predicted), trust
/// [`canonical`](Self::canonical).
///
/// # Example
///
/// ```
/// use bulwark_rollback::arena::{ArenaSim, InitialConditions};
/// use bulwark_rollback::{InputFrame, InputMapping, NetworkedSimState};
///
/// # fn main() -> Result<(), bulwark_rollback::BulwarkError> {
/// let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])])?;
/// let sim = ArenaSim::new(InitialConditions::new(7, 2))?;
/// let mut state = NetworkedSimState::new(sim, mapping);
///
/// // One local tick: prediction advances, canonical waits for the peer.
/// let packet = state.update(&[InputFrame::BLANK])?;
/// assert_eq!(packet.tick_count, 0);
/// assert_eq!(state.predicted_tick_count(), 1);
/// assert_eq!(state.canonical_tick_count(), 0);
/// # Ok(())
/// # }
/// ```
///
/// [`update`]: Self::update
/// [`input_packet`]: Self::input_packet
pub struct NetworkedSimState<S, R>
where
    S: Simulation,
    R: RemoteId,
{
    /// Confirmed timeline. Advances only on complete input rows, so it is
    /// bit-identical across peers that received the same inputs.
    canonical: S,
    /// Speculative timeline, always at or ahead of canonical.
    predicted: S,
    /// Canonical tick `predicted` was last rebuilt from. When canonical has
    /// moved past this, the next [`Self::update`] call rolls back.
    predicted_base: u64,
    /// Which player indices are local and which belong to each remote.
    mapping: InputMapping<R>,
    /// Outstanding per-tick input rows; the front row is the canonical tick.
    frames: FrameWindow,
    /// Last stored input per player index, the repeat-last prediction
    /// source. Seeded with [`InputFrame::BLANK`] before anything is known.
    latest_inputs: Vec<InputFrame>,
    /// `(tick, checksum)` for every confirmed tick still needed for
    /// cross-validation, oldest first and contiguous. Never empty: the
    /// newest entry rides on every outgoing packet.
    local_checksums: VecDeque<(u64, u32)>,
    /// Per-remote ordering and checksum bookkeeping, created lazily on the
    /// first packet from each mapped remote.
    remotes: BTreeMap<R, RemoteBookkeeping>,
    /// Remotes whose reported checksum disagreed with ours. Sticky: a
    /// desync is fatal information, never auto-cleared.
    checksum_failed: BTreeSet<R>,
    /// Receives protocol violations and desync reports. `None` falls back
    /// to the tracing-based default.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<S, R> NetworkedSimState<S, R>
where
    S: Simulation,
    R: RemoteId,
{
    /// Creates a rollback state machine around a confirmed starting state.
    ///
    /// `canonical` is cloned into the predicted timeline, and its current
    /// `(tick, checksum)` pair seeds the local checksum history. Mapping
    /// validity is established at [`InputMapping::new`]; nothing here can
    /// fail.
    #[must_use]
    pub fn new(canonical: S, mapping: InputMapping<R>) -> Self {
        let base = canonical.tick_count();
        let mut local_checksums = VecDeque::new();
        local_checksums.push_back((base, canonical.checksum()));
        let predicted = canonical.clone();

        Self {
            frames: FrameWindow::new(mapping.player_count(), base),
            latest_inputs: vec![InputFrame::BLANK; mapping.player_count()],
            canonical,
            predicted,
            predicted_base: base,
            mapping,
            local_checksums,
            remotes: BTreeMap::new(),
            checksum_failed: BTreeSet::new(),
            violation_observer: None,
        }
    }

    /// Routes violations to the given observer instead of the tracing
    /// default.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Replaces the violation observer. `None` restores the tracing default.
    pub fn set_violation_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        self.violation_observer = observer;
    }

    /// Ingests one packet from a remote peer.
    ///
    /// The packet's input frames are slotted into the window row for
    /// `packet.tick_count`, its canonical checksum report is queued for
    /// reconciliation, and if the front row is now complete the canonical
    /// simulation advances one tick. The predicted timeline is not touched
    /// here; it is rebuilt lazily on the next [`update`](Self::update).
    ///
    /// A rejected packet leaves no partial write behind. Every rejection is
    /// also reported to the violation observer, so transports can stay dumb
    /// and hosts still see why a peer misbehaves.
    ///
    /// # Errors
    ///
    /// - [`UnknownRemote`] if `remote_id` is not in the mapping.
    /// - [`StalePacket`] if the tick is behind canonical, or a resend of a
    ///   tick this remote already delivered on its ordered channel.
    /// - [`OutOfOrder`] if the tick skips ahead of the remote's own
    ///   sequence or past the outstanding window.
    /// - [`MappingInvalid`] if the frame count does not match the remote's
    ///   mapped group size.
    /// - [`DuplicateSlot`] if a target slot is already filled.
    ///
    /// [`UnknownRemote`]: BulwarkError::UnknownRemote
    /// [`StalePacket`]: BulwarkError::StalePacket
    /// [`OutOfOrder`]: BulwarkError::OutOfOrder
    /// [`MappingInvalid`]: BulwarkError::MappingInvalid
    /// [`DuplicateSlot`]: BulwarkError::DuplicateSlot
    pub fn input_packet(&mut self, remote_id: &R, packet: SimPacket) -> Result<(), BulwarkError> {
        let tick = packet.tick_count;
        let base = self.frames.base_tick();

        // The mapping decides which remotes exist.
        let Some(group) = self.mapping.remote_group(remote_id) else {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InputMapping,
                "dropping packet from unmapped remote {:?}",
                remote_id
            );
            return Err(BulwarkError::UnknownRemote {
                remote: format!("{remote_id:?}"),
            });
        };

        // Stale: already folded into canonical, nothing left to do with it.
        if tick < base {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::TickOrdering,
                "stale packet for tick {} from {:?}, canonical is at {}",
                tick,
                remote_id,
                base
            );
            return Err(BulwarkError::StalePacket {
                packet_tick: tick,
                canonical_tick: base,
            });
        }

        // Stale: a resend of a tick the ordered channel already delivered.
        if let Some(latest) = self
            .remotes
            .get(remote_id)
            .and_then(|bookkeeping| bookkeeping.latest_input_tick())
        {
            if tick <= latest {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::TickOrdering,
                    "duplicate resend of tick {} from {:?}, newest from it is {}",
                    tick,
                    remote_id,
                    latest
                );
                return Err(BulwarkError::StalePacket {
                    packet_tick: tick,
                    canonical_tick: base,
                });
            }
        }

        // Out of order: a gap in the remote's own sequence, or a jump past
        // the window. Reliable-ordered delivery makes both impossible in a
        // correct peer, so this is a protocol violation, not a reorder.
        let expected = self
            .remotes
            .get(remote_id)
            .map_or(base, |bookkeeping| bookkeeping.expected_input_tick(base));
        if tick > expected {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::TickOrdering,
                "packet for tick {} from {:?} skips ahead, expected {}",
                tick,
                remote_id,
                expected
            );
            return Err(BulwarkError::OutOfOrder {
                packet_tick: tick,
                expected_max: expected,
            });
        }

        // Queue the remote's checksum report; resends count once.
        let bookkeeping = self
            .remotes
            .entry(remote_id.clone())
            .or_insert_with(RemoteBookkeeping::new);
        bookkeeping.record_report(packet.canonical_tick_count, packet.canonical_checksum);

        // The packet must carry exactly one frame per mapped player.
        if packet.input_frames.len() != group.len() {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::InputMapping,
                "packet from {:?} carries {} frames for a group of {}",
                remote_id,
                packet.input_frames.len(),
                group.len()
            );
            return Err(BulwarkError::MappingInvalid {
                reason: format!(
                    "remote {:?} sent {} input frames, its mapped group has {}",
                    remote_id,
                    packet.input_frames.len(),
                    group.len()
                ),
            });
        }

        // The ordering checks above pin the tick inside the window or at
        // its end, so the row always materializes.
        let Some(offset) = self.frames.ensure_row_for_tick(tick) else {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Critical,
                ViolationKind::InternalError,
                "window refused tick {} from {:?} (base {}, length {})",
                tick,
                remote_id,
                self.frames.base_tick(),
                self.frames.len()
            );
            return Err(BulwarkError::OutOfOrder {
                packet_tick: tick,
                expected_max: self.frames.next_new_tick(),
            });
        };

        // Validate every target slot before committing any, so a rejected
        // packet leaves no partial write.
        for &player in group {
            if self.frames.is_filled(offset, player) {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::PartialFrame,
                    "duplicate input for player {} at tick {} from {:?}",
                    player,
                    tick,
                    remote_id
                );
                return Err(BulwarkError::DuplicateSlot { tick, player });
            }
        }

        for (&player, frame) in group.iter().zip(&packet.input_frames) {
            if !self.frames.fill_slot(offset, player, *frame) {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::InternalError,
                    "slot write refused after validation (player {}, tick {})",
                    player,
                    tick
                );
            }
            self.latest_inputs[player] = *frame;
        }
        if let Some(bookkeeping) = self.remotes.get_mut(remote_id) {
            bookkeeping.note_input_tick(tick);
        }

        // Only offset-0 completion advances canonical. A complete row
        // further back becomes actionable when it rotates to the front.
        if let Some(inputs) = self.frames.take_front_if_complete() {
            self.advance_canonical(&inputs);
        }

        debug_check_invariants!(self);
        Ok(())
    }

    /// Advances the local tick: one step of prediction, one outgoing packet.
    ///
    /// Call once per local tick with one frame per local player, in mapping
    /// order. If canonical progressed since the previous call (because
    /// packets completed rows), the predicted timeline is first rebuilt from
    /// canonical and replayed forward over the stored inputs, substituting
    /// each player's last known input where a tick's actual value is still
    /// missing. The supplied frames are then recorded for the current
    /// predicted tick and either confirm it outright (every other slot
    /// already present: canonical advances and prediction snaps to it) or
    /// drive one speculative step.
    ///
    /// The returned packet is ready to broadcast: the tick these inputs
    /// apply to, the frames themselves, and the newest confirmed
    /// `(tick, checksum)` pair. The call finishes with a checksum
    /// reconciliation pass over everything the remotes have reported.
    ///
    /// # Errors
    ///
    /// - [`MappingInvalid`] if `local_input.len()` differs from the local
    ///   group size.
    /// - [`DuplicateSlot`] if the current tick's local slots are somehow
    ///   already filled (one submission per tick).
    ///
    /// [`MappingInvalid`]: BulwarkError::MappingInvalid
    /// [`DuplicateSlot`]: BulwarkError::DuplicateSlot
    pub fn update(&mut self, local_input: &[InputFrame]) -> Result<SimPacket, BulwarkError> {
        // Fold canonical progress made by input_packet into predicted.
        if self.canonical.tick_count() != self.predicted_base {
            self.resync_predicted();
        }

        let locals = self.mapping.local_players();
        if local_input.len() != locals.len() {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::SimContract,
                "update called with {} frames for {} local players",
                local_input.len(),
                locals.len()
            );
            return Err(BulwarkError::MappingInvalid {
                reason: format!(
                    "update expects {} local input frames, got {}",
                    locals.len(),
                    local_input.len()
                ),
            });
        }

        // These inputs apply to predicted's current tick, which never trails
        // the window base, so the row always materializes.
        let input_tick = self.predicted.tick_count();
        let Some(target_offset) = self.frames.ensure_row_for_tick(input_tick) else {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Critical,
                ViolationKind::InternalError,
                "window refused local tick {} (base {}, length {})",
                input_tick,
                self.frames.base_tick(),
                self.frames.len()
            );
            return Err(BulwarkError::OutOfOrder {
                packet_tick: input_tick,
                expected_max: self.frames.next_new_tick(),
            });
        };

        for &player in locals {
            if self.frames.is_filled(target_offset, player) {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::PartialFrame,
                    "local input for tick {} submitted twice (player {})",
                    input_tick,
                    player
                );
                return Err(BulwarkError::DuplicateSlot {
                    tick: input_tick,
                    player,
                });
            }
        }

        for (&player, frame) in locals.iter().zip(local_input) {
            if !self.frames.fill_slot(target_offset, player, *frame) {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::InternalError,
                    "local slot write refused after validation (player {}, tick {})",
                    player,
                    input_tick
                );
            }
            self.latest_inputs[player] = *frame;
        }

        if target_offset == 0 {
            if let Some(inputs) = self.frames.take_front_if_complete() {
                // Fast path: this write confirmed the tick. Advance
                // canonical directly and snap prediction to it; no
                // speculative step needed.
                self.advance_canonical(&inputs);
                self.predicted.clone_from(&self.canonical);
                self.predicted_base = self.canonical.tick_count();
            } else {
                self.advance_predicted(target_offset);
            }
        } else {
            self.advance_predicted(target_offset);
        }

        // The newest confirmed checksum rides on every outgoing packet.
        let (canonical_tick_count, canonical_checksum) = match self.local_checksums.back() {
            Some(&entry) => entry,
            None => {
                report_violation_to!(
                    self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::ChecksumHistory,
                    "checksum history empty, reseeding from canonical tick {}",
                    self.canonical.tick_count()
                );
                let entry = (self.canonical.tick_count(), self.canonical.checksum());
                self.local_checksums.push_back(entry);
                entry
            }
        };
        let packet = SimPacket {
            tick_count: input_tick,
            input_frames: local_input.to_vec(),
            canonical_tick_count,
            canonical_checksum,
        };

        self.reconcile_checksums();

        debug_check_invariants!(self);
        Ok(packet)
    }

    /// Remotes whose reported canonical checksum ever disagreed with ours.
    ///
    /// Sticky: once a remote lands here it never leaves. What to do about a
    /// desynced peer (drop it, resync out of band, end the match) is the
    /// caller's decision.
    #[must_use]
    pub fn checksum_failed_remote_ids(&self) -> &BTreeSet<R> {
        &self.checksum_failed
    }

    /// The confirmed simulation. Identical across peers at equal ticks.
    #[must_use]
    pub fn canonical(&self) -> &S {
        &self.canonical
    }

    /// The speculative simulation. Render from this one.
    #[must_use]
    pub fn predicted(&self) -> &S {
        &self.predicted
    }

    /// Tick count of the confirmed timeline.
    #[must_use]
    pub fn canonical_tick_count(&self) -> u64 {
        self.canonical.tick_count()
    }

    /// Tick count of the speculative timeline.
    #[must_use]
    pub fn predicted_tick_count(&self) -> u64 {
        self.predicted.tick_count()
    }

    /// The input mapping this instance was built with.
    #[must_use]
    pub fn mapping(&self) -> &InputMapping<R> {
        &self.mapping
    }

    /// Number of outstanding ticks still waiting for confirmed input.
    #[must_use]
    pub fn frames_ahead(&self) -> usize {
        self.frames.len()
    }

    /// Advances canonical one tick and records the new checksum.
    fn advance_canonical(&mut self, inputs: &[InputFrame]) {
        self.canonical.update(inputs);
        self.local_checksums
            .push_back((self.canonical.tick_count(), self.canonical.checksum()));
    }

    /// One speculative step of the predicted timeline.
    fn advance_predicted(&mut self, offset: usize) {
        let row = self.assemble_row(offset);
        self.predicted.update(&row);
    }

    /// Rebuilds predicted from canonical and replays it back to its
    /// previous tick, preferring stored inputs over repeat-last guesses.
    fn resync_predicted(&mut self) {
        let replay_ticks = self
            .predicted
            .tick_count()
            .saturating_sub(self.canonical.tick_count());
        self.predicted.clone_from(&self.canonical);
        for offset in 0..replay_ticks as usize {
            let row = self.assemble_row(offset);
            self.predicted.update(&row);
        }
        self.predicted_base = self.canonical.tick_count();
    }

    /// The best available input row for a window offset: the stored value
    /// where one exists, otherwise that player's last known input.
    fn assemble_row(&self, offset: usize) -> InputRow {
        (0..self.mapping.player_count())
            .map(|player| {
                self.frames
                    .slot(offset, player)
                    .unwrap_or(self.latest_inputs[player])
            })
            .collect()
    }

    /// Compares remote checksum reports against local history and prunes
    /// entries every remote has moved past.
    fn reconcile_checksums(&mut self) {
        let Some(&(oldest_tick, _)) = self.local_checksums.front() else {
            return;
        };
        let Some(&(newest_tick, _)) = self.local_checksums.back() else {
            return;
        };

        for (remote, bookkeeping) in self.remotes.iter_mut() {
            bookkeeping.discard_reports_before(oldest_tick);
            while let Some((tick, reported)) = bookkeeping.front_report() {
                if tick > newest_tick {
                    // The remote is ahead of our confirmed history; keep
                    // its report for a later pass.
                    break;
                }
                // Local history is contiguous in tick, so the entry sits at
                // a fixed index from the front.
                let index = (tick - oldest_tick) as usize;
                match self.local_checksums.get(index) {
                    Some(&(local_tick, local_sum)) if local_tick == tick => {
                        if local_sum != reported {
                            let violation = ContractViolation::new(
                                ViolationSeverity::Critical,
                                ViolationKind::Desync,
                                format!(
                                    "remote {:?} reports checksum {:#010x} for tick {}, local history has {:#010x}",
                                    remote, reported, tick, local_sum
                                ),
                                concat!(file!(), ":", line!()),
                            )
                            .with_tick(tick);
                            report_to_observer(self.violation_observer.as_ref(), &violation);
                            self.checksum_failed.insert(remote.clone());
                        }
                    }
                    _ => {
                        report_violation_to!(
                            self.violation_observer,
                            ViolationSeverity::Error,
                            ViolationKind::ChecksumHistory,
                            "local checksum history lost tick {} (oldest {}, newest {})",
                            tick,
                            oldest_tick,
                            newest_tick
                        );
                    }
                }
                // Consumed either way; desync state is already sticky.
                bookkeeping.pop_report();
            }
        }

        // Prune entries every mapped remote has reported strictly past. A
        // remote that has never reported blocks pruning; the newest entry
        // always stays because it rides on outgoing packets.
        while self.local_checksums.len() > 1 {
            let Some(&(front_tick, _)) = self.local_checksums.front() else {
                break;
            };
            let everyone_past = self.mapping.remotes().all(|remote| {
                self.remotes
                    .get(remote)
                    .is_some_and(|bookkeeping| bookkeeping.has_reported_past(front_tick))
            });
            if !everyone_past {
                break;
            }
            self.local_checksums.pop_front();
        }
    }
}

impl<S, R> fmt::Debug for NetworkedSimState<S, R>
where
    S: Simulation,
    R: RemoteId,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkedSimState")
            .field("canonical_tick", &self.canonical.tick_count())
            .field("predicted_tick", &self.predicted.tick_count())
            .field("frames", &self.frames)
            .field("remotes", &self.remotes)
            .field("checksum_failed", &self.checksum_failed)
            .field("observer", &self.violation_observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, R> InvariantChecker for NetworkedSimState<S, R>
where
    S: Simulation,
    R: RemoteId,
{
    /// Checks the invariants of the NetworkedSimState.
    ///
    /// # Invariants
    ///
    /// 1. Predicted is at or ahead of canonical
    /// 2. The window's base tick equals the canonical tick
    /// 3. Predicted's lead never exceeds the window length
    /// 4. The predicted timeline's base is at or behind canonical
    /// 5. Checksum history is non-empty, contiguous, and ends at canonical
    /// 6. The window's own invariants hold
    /// 7. Every remote's bookkeeping invariants hold
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let canonical_tick = self.canonical.tick_count();
        let predicted_tick = self.predicted.tick_count();

        // Invariant 1: predicted at or ahead of canonical
        if predicted_tick < canonical_tick {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "predicted timeline behind canonical",
            )
            .with_details(format!(
                "predicted_tick={}, canonical_tick={}",
                predicted_tick, canonical_tick
            )));
        }

        // Invariant 2: window base tracks the canonical tick
        if self.frames.base_tick() != canonical_tick {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "window base out of step with canonical",
            )
            .with_details(format!(
                "base_tick={}, canonical_tick={}",
                self.frames.base_tick(),
                canonical_tick
            )));
        }

        // Invariant 3: predicted's lead is covered by window rows
        if (predicted_tick - canonical_tick) as usize > self.frames.len() {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "predicted lead exceeds the outstanding window",
            )
            .with_details(format!(
                "lead={}, window_len={}",
                predicted_tick - canonical_tick,
                self.frames.len()
            )));
        }

        // Invariant 4: rollback base never ahead of canonical
        if self.predicted_base > canonical_tick {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "predicted base ahead of canonical",
            )
            .with_details(format!(
                "predicted_base={}, canonical_tick={}",
                self.predicted_base, canonical_tick
            )));
        }

        // Invariant 5: contiguous checksum history ending at canonical
        if self.local_checksums.is_empty() {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "checksum history empty",
            ));
        }
        let mut previous: Option<u64> = None;
        for &(tick, _) in &self.local_checksums {
            if let Some(previous_tick) = previous {
                if tick != previous_tick + 1 {
                    return Err(InvariantViolation::new(
                        "NetworkedSimState",
                        "checksum history not contiguous",
                    )
                    .with_details(format!(
                        "previous_tick={}, next_tick={}",
                        previous_tick, tick
                    )));
                }
            }
            previous = Some(tick);
        }
        if previous != Some(canonical_tick) {
            return Err(InvariantViolation::new(
                "NetworkedSimState",
                "checksum history does not end at canonical",
            )
            .with_details(format!(
                "newest={:?}, canonical_tick={}",
                previous, canonical_tick
            )));
        }

        // Invariant 6: window bookkeeping
        self.frames.check_invariants()?;

        // Invariant 7: per-remote bookkeeping
        for bookkeeping in self.remotes.values() {
            bookkeeping.check_invariants()?;
        }

        Ok(())
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
    use crate::checksum::Fnv32;
    use crate::fixed::Vec2Fx;
    use crate::telemetry::CollectingObserver;

    /// Minimal deterministic sim: every player's position integrates its
    /// velocity input each tick.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct StubSim {
        tick: u64,
        positions: Vec<Vec2Fx>,
    }

    impl StubSim {
        fn new(players: usize) -> Self {
            Self {
                tick: 0,
                positions: vec![Vec2Fx::ZERO; players],
            }
        }
    }

    impl Simulation for StubSim {
        fn update(&mut self, inputs: &[InputFrame]) {
            assert_eq!(inputs.len(), self.positions.len());
            for (position, input) in self.positions.iter_mut().zip(inputs) {
                *position = *position + input.velocity;
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
            hasher.finish()
        }

        fn tick_count(&self) -> u64 {
            self.tick
        }

        fn game_over(&self) -> bool {
            false
        }
    }

    fn move_right(units: i32) -> InputFrame {
        InputFrame::default().with_velocity(Vec2Fx::from_ints(units, 0))
    }

    fn move_up(units: i32) -> InputFrame {
        InputFrame::default().with_velocity(Vec2Fx::from_ints(0, units))
    }

    /// Player 0 local, player 1 owned by "peer".
    fn two_player_state() -> NetworkedSimState<StubSim, &'static str> {
        let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])]).unwrap();
        NetworkedSimState::new(StubSim::new(2), mapping)
    }

    fn solo_state() -> NetworkedSimState<StubSim, &'static str> {
        let mapping = InputMapping::new(vec![0], vec![]).unwrap();
        NetworkedSimState::new(StubSim::new(1), mapping)
    }

    /// A packet an honest peer at genesis would send for `tick`.
    fn peer_packet(tick: u64, frame: InputFrame) -> SimPacket {
        let genesis = StubSim::new(2).checksum();
        SimPacket::new(tick, vec![frame], 0, genesis)
    }

    // ########################
    // # TIMELINE PROGRESSION #
    // ########################

    #[test]
    fn solo_updates_take_the_fast_path() {
        let mut state = solo_state();

        for tick in 0..5 {
            let packet = state.update(&[move_right(1)]).unwrap();
            assert_eq!(packet.tick_count, tick);
            // No remotes to wait on: every tick confirms immediately.
            assert_eq!(state.canonical_tick_count(), tick + 1);
            assert_eq!(state.predicted_tick_count(), tick + 1);
            assert_eq!(state.frames_ahead(), 0);
        }
        assert_eq!(state.canonical().positions[0], Vec2Fx::from_ints(5, 0));
        assert_eq!(state.canonical(), state.predicted());
    }

    #[test]
    fn solo_packet_carries_the_fresh_checksum() {
        let mut state = solo_state();

        let packet = state.update(&[move_right(1)]).unwrap();
        // The tick confirmed on the fast path, so the packet reports it.
        assert_eq!(packet.canonical_tick_count, 1);
        assert_eq!(packet.canonical_checksum, state.canonical().checksum());
    }

    #[test]
    fn prediction_runs_ahead_while_the_remote_is_silent() {
        let mut state = two_player_state();

        for tick in 0..3 {
            let packet = state.update(&[move_right(1)]).unwrap();
            assert_eq!(packet.tick_count, tick);
            assert_eq!(packet.canonical_tick_count, 0);
        }

        assert_eq!(state.canonical_tick_count(), 0);
        assert_eq!(state.predicted_tick_count(), 3);
        assert_eq!(state.frames_ahead(), 3);
        // The silent remote is guessed at blank, so only player 0 moved.
        assert_eq!(state.predicted().positions[0], Vec2Fx::from_ints(3, 0));
        assert_eq!(state.predicted().positions[1], Vec2Fx::ZERO);
    }

    #[test]
    fn remote_packet_completes_the_front_and_advances_canonical() {
        let mut state = two_player_state();

        state.update(&[move_right(1)]).unwrap();
        assert_eq!(state.canonical_tick_count(), 0);

        state.input_packet(&"peer", peer_packet(0, move_up(2))).unwrap();
        assert_eq!(state.canonical_tick_count(), 1);
        assert_eq!(state.canonical().positions[0], Vec2Fx::from_ints(1, 0));
        assert_eq!(state.canonical().positions[1], Vec2Fx::from_ints(0, 2));
        // Prediction is rebuilt lazily, not here.
        assert_eq!(state.predicted_tick_count(), 1);
    }

    #[test]
    fn remote_leading_the_local_tick_extends_the_window() {
        let mut state = two_player_state();

        // The peer runs ahead of us: ticks 0 and 1 arrive before we update.
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        state.input_packet(&"peer", peer_packet(1, move_up(1))).unwrap();
        assert_eq!(state.frames_ahead(), 2);
        assert_eq!(state.canonical_tick_count(), 0);

        // Our first update confirms tick 0 on the fast path.
        state.update(&[move_right(1)]).unwrap();
        assert_eq!(state.canonical_tick_count(), 1);
        assert_eq!(state.predicted_tick_count(), 1);

        // And the next one confirms tick 1 the same way.
        state.update(&[move_right(1)]).unwrap();
        assert_eq!(state.canonical_tick_count(), 2);
        assert_eq!(state.canonical().positions[1], Vec2Fx::from_ints(0, 2));
    }

    // ####################
    // # ROLLBACK /REPLAY #
    // ####################

    #[test]
    fn rollback_replaces_guesses_with_actual_inputs() {
        let mut state = two_player_state();

        // Three local ticks, remote guessed at blank the whole time.
        for _ in 0..3 {
            state.update(&[move_right(1)]).unwrap();
        }
        assert_eq!(state.predicted().positions[1], Vec2Fx::ZERO);

        // The real tick-0 input was a climb. Canonical advances...
        state.input_packet(&"peer", peer_packet(0, move_up(2))).unwrap();
        assert_eq!(state.canonical_tick_count(), 1);

        // ...and the next update rolls prediction back and replays.
        state.update(&[move_right(1)]).unwrap();
        assert_eq!(state.predicted_tick_count(), 4);

        // Reference: actual input at tick 0, repeat-last for 1..=3.
        let mut reference = StubSim::new(2);
        for _ in 0..4 {
            reference.update(&[move_right(1), move_up(2)]);
        }
        assert_eq!(state.predicted().positions, reference.positions);
    }

    #[test]
    fn replay_prefers_stored_inputs_over_repeat_last() {
        let mut state = two_player_state();

        for _ in 0..3 {
            state.update(&[move_right(1)]).unwrap();
        }

        // Ticks 0 and 1 arrive together; tick 1's input differs from
        // tick 0's, so repeat-last alone would get tick 1 wrong.
        state.input_packet(&"peer", peer_packet(0, move_up(2))).unwrap();
        state.input_packet(&"peer", peer_packet(1, move_up(5))).unwrap();
        assert_eq!(state.canonical_tick_count(), 2);

        state.update(&[move_right(1)]).unwrap();

        // Reference: stored inputs for ticks 0 and 1, repeat-last (5) after.
        let mut reference = StubSim::new(2);
        reference.update(&[move_right(1), move_up(2)]);
        reference.update(&[move_right(1), move_up(5)]);
        reference.update(&[move_right(1), move_up(5)]);
        reference.update(&[move_right(1), move_up(5)]);
        assert_eq!(state.predicted().positions, reference.positions);
    }

    #[test]
    fn canonical_and_predicted_agree_once_all_input_arrives() {
        let mut state = two_player_state();

        for _ in 0..4 {
            state.update(&[move_right(1)]).unwrap();
        }
        for tick in 0..4 {
            state
                .input_packet(&"peer", peer_packet(tick, move_up(1)))
                .unwrap();
        }
        assert_eq!(state.canonical_tick_count(), 4);

        // The two timelines converge at the next update.
        state.update(&[move_right(1)]).unwrap();
        assert_eq!(state.canonical_tick_count(), 4);
        assert_eq!(state.predicted_tick_count(), 5);

        state.input_packet(&"peer", peer_packet(4, move_up(1))).unwrap();
        assert_eq!(state.canonical_tick_count(), 5);
        let canonical = state.canonical().clone();

        state.update(&[move_right(1)]).unwrap();
        // Replay over fully-confirmed history reproduces canonical exactly.
        let mut reference = canonical;
        reference.update(&[move_right(1), move_up(1)]);
        assert_eq!(state.predicted().positions, reference.positions);
    }

    // ####################
    // # PACKET REJECTION #
    // ####################

    #[test]
    fn packet_from_unmapped_remote_is_rejected() {
        let mut state = two_player_state();

        let result = state.input_packet(&"stranger", peer_packet(0, move_up(1)));
        assert_eq!(
            result,
            Err(BulwarkError::UnknownRemote {
                remote: "\"stranger\"".to_owned()
            })
        );
    }

    #[test]
    fn stale_packet_behind_canonical_is_rejected() {
        let mut state = two_player_state();

        state.update(&[move_right(1)]).unwrap();
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        assert_eq!(state.canonical_tick_count(), 1);

        // Tick 0 is already folded into canonical.
        let result = state.input_packet(&"peer", peer_packet(0, move_up(1)));
        assert_eq!(
            result,
            Err(BulwarkError::StalePacket {
                packet_tick: 0,
                canonical_tick: 1,
            })
        );
    }

    #[test]
    fn duplicate_resend_within_the_window_is_rejected() {
        let mut state = two_player_state();

        // Without a local update the window stays at tick 0, so the resent
        // packet is still inside it.
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        let result = state.input_packet(&"peer", peer_packet(0, move_up(1)));
        assert_eq!(
            result,
            Err(BulwarkError::StalePacket {
                packet_tick: 0,
                canonical_tick: 0,
            })
        );
    }

    #[test]
    fn gap_in_the_remote_sequence_is_rejected() {
        let mut state = two_player_state();

        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        let result = state.input_packet(&"peer", peer_packet(2, move_up(1)));
        assert_eq!(
            result,
            Err(BulwarkError::OutOfOrder {
                packet_tick: 2,
                expected_max: 1,
            })
        );
    }

    #[test]
    fn first_packet_past_the_window_is_rejected() {
        let mut state = two_player_state();

        let result = state.input_packet(&"peer", peer_packet(3, move_up(1)));
        assert_eq!(
            result,
            Err(BulwarkError::OutOfOrder {
                packet_tick: 3,
                expected_max: 0,
            })
        );
    }

    #[test]
    fn wrong_frame_count_is_rejected_without_side_effects() {
        let mut state = two_player_state();

        let genesis = StubSim::new(2).checksum();
        let packet = SimPacket::new(0, vec![move_up(1), move_up(1)], 0, genesis);
        let result = state.input_packet(&"peer", packet);
        assert!(matches!(result, Err(BulwarkError::MappingInvalid { .. })));

        // The rejected packet must not have slotted anything.
        assert_eq!(state.frames_ahead(), 0);
        let follow_up = state.input_packet(&"peer", peer_packet(0, move_up(1)));
        assert!(follow_up.is_ok());
    }

    #[test]
    fn rejected_packets_emit_violations() {
        let observer = Arc::new(CollectingObserver::new());
        let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])]).unwrap();
        let mut state = NetworkedSimState::new(StubSim::new(2), mapping)
            .with_violation_observer(observer.clone());

        let _ = state.input_packet(&"stranger", peer_packet(0, move_up(1)));
        let _ = state.input_packet(&"peer", peer_packet(5, move_up(1)));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_violation(ViolationKind::InputMapping));
        assert!(observer.has_violation(ViolationKind::TickOrdering));
    }

    // ###########################
    // # CHECKSUM RECONCILIATION #
    // ###########################

    #[test]
    fn matching_checksums_keep_the_failed_set_empty() {
        let mut state = two_player_state();

        // Drive a confirmed tick, then let the remote report the same
        // checksum we recorded for it.
        state.update(&[move_right(1)]).unwrap();
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        let (tick, sum) = *state.local_checksums.back().unwrap();
        assert_eq!(tick, 1);

        let echo = SimPacket::new(1, vec![move_up(1)], tick, sum);
        state.input_packet(&"peer", echo).unwrap();
        state.update(&[move_right(1)]).unwrap();

        assert!(state.checksum_failed_remote_ids().is_empty());
    }

    #[test]
    fn checksum_mismatch_marks_the_remote_sticky() {
        let observer = Arc::new(CollectingObserver::new());
        let mapping = InputMapping::new(vec![0], vec![("peer", vec![1])]).unwrap();
        let mut state = NetworkedSimState::new(StubSim::new(2), mapping)
            .with_violation_observer(observer.clone());

        state.update(&[move_right(1)]).unwrap();
        // The remote claims a bogus checksum for tick 0.
        let lying = SimPacket::new(0, vec![move_up(1)], 0, 0xDEAD_BEEF);
        state.input_packet(&"peer", lying).unwrap();
        state.update(&[move_right(1)]).unwrap();

        assert!(state.checksum_failed_remote_ids().contains(&"peer"));
        assert!(observer.has_violation(ViolationKind::Desync));

        // Sticky: honest reports afterwards do not clear it.
        let (tick, sum) = *state.local_checksums.back().unwrap();
        let honest = SimPacket::new(1, vec![move_up(1)], tick, sum);
        state.input_packet(&"peer", honest).unwrap();
        state.update(&[move_right(1)]).unwrap();
        assert!(state.checksum_failed_remote_ids().contains(&"peer"));
    }

    #[test]
    fn history_prunes_entries_every_remote_reported_past() {
        let mut state = two_player_state();

        state.update(&[move_right(1)]).unwrap();
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        state.update(&[move_right(1)]).unwrap();
        // The remote has only reported tick 0, so ticks 0 and 1 must stay.
        assert_eq!(state.local_checksums.len(), 2);
        assert_eq!(state.local_checksums.front().unwrap().0, 0);

        let (tick, sum) = *state.local_checksums.back().unwrap();
        let echo = SimPacket::new(1, vec![move_up(1)], tick, sum);
        state.input_packet(&"peer", echo).unwrap();
        state.update(&[move_right(1)]).unwrap();

        // Reported past tick 0: that entry goes. Tick 1 was only matched,
        // not passed, so it stays alongside the new rider entry.
        assert_eq!(state.local_checksums.front().unwrap().0, 1);
        assert_eq!(state.local_checksums.len(), 2);
    }

    #[test]
    fn remote_not_reporting_past_a_tick_blocks_pruning() {
        let mut state = two_player_state();

        state.update(&[move_right(1)]).unwrap();
        state.input_packet(&"peer", peer_packet(0, move_up(1))).unwrap();
        for _ in 0..3 {
            state.update(&[move_right(1)]).unwrap();
        }

        // One confirmed tick, no report past it: both entries retained.
        assert_eq!(state.local_checksums.len(), 2);
    }

    #[test]
    fn solo_history_prunes_to_the_newest_entry() {
        let mut state = solo_state();

        for _ in 0..6 {
            state.update(&[move_right(1)]).unwrap();
        }
        // No remotes to wait for; only the rider entry remains.
        assert_eq!(state.local_checksums.len(), 1);
        assert_eq!(state.local_checksums.front().unwrap().0, 6);
    }

    // ##############
    // # INVARIANTS #
    // ##############

    #[test]
    fn invariants_hold_through_mixed_traffic() {
        let mut state = two_player_state();
        assert!(state.check_invariants().is_ok());

        for tick in 0..4 {
            state.update(&[move_right(1)]).unwrap();
            assert!(state.check_invariants().is_ok());
            if tick >= 1 {
                state
                    .input_packet(&"peer", peer_packet(tick - 1, move_up(1)))
                    .unwrap();
                assert!(state.check_invariants().is_ok());
            }
        }
    }

    #[test]
    fn debug_output_elides_the_sims() {
        let state = two_player_state();
        let rendered = format!("{state:?}");
        assert!(rendered.contains("canonical_tick"));
        assert!(rendered.contains("predicted_tick"));
    }
}
