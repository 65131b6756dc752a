//! The sliding window of per-tick input assembly buffers.
//!
//! Each row collects one tick's inputs, one slot per player index. The front
//! row is the earliest tick the canonical state is still waiting on; rows
//! behind it cover later ticks. A row leaves the window only through
//! [`FrameWindow::take_front_if_complete`], which is the single place the
//! window's base tick moves.

use std::collections::VecDeque;

use smallvec::{smallvec, SmallVec};

use crate::input_frame::InputFrame;
use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::InputRow;

/// One tick's worth of slots; stays inline for up to four players.
type SlotRow = SmallVec<[Option<InputFrame>; 4]>;

/// FIFO of partially-filled input rows, indexed by tick offset.
///
/// Offset `k` holds the inputs consumed when advancing from tick
/// `base_tick + k` to `base_tick + k + 1`. A row is *complete* when every
/// player slot holds a value; only a complete front row can be consumed.
///
/// The window itself is plain storage: ordering checks, duplicate detection
/// and violation reporting belong to the caller, which sees the whole
/// picture (mapping, remotes, canonical tick).
#[derive(Debug, Clone)]
pub(crate) struct FrameWindow {
    player_count: usize,
    /// Tick covered by offset 0. Always equals the canonical tick count.
    base_tick: u64,
    rows: VecDeque<SlotRow>,
}

impl FrameWindow {
    pub(crate) fn new(player_count: usize, base_tick: u64) -> Self {
        Self {
            player_count,
            base_tick,
            rows: VecDeque::new(),
        }
    }

    /// Tick covered by the front row (whether or not that row exists yet).
    pub(crate) fn base_tick(&self) -> u64 {
        self.base_tick
    }

    /// Number of outstanding rows.
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// First tick with no row yet; a row for it may be appended.
    pub(crate) fn next_new_tick(&self) -> u64 {
        self.base_tick + self.rows.len() as u64
    }

    /// Offset of `tick` inside the window, if the window covers it or it is
    /// exactly the next new tick.
    pub(crate) fn offset_of(&self, tick: u64) -> Option<usize> {
        if tick < self.base_tick || tick > self.next_new_tick() {
            return None;
        }
        // Window lengths stay tiny (prediction depth), the cast is safe.
        Some((tick - self.base_tick) as usize)
    }

    /// Appends a blank row, growing the window by one tick.
    pub(crate) fn push_blank_row(&mut self) {
        self.rows.push_back(smallvec![None; self.player_count]);
    }

    /// Resolves `tick` to its offset, appending one blank row when the tick
    /// is exactly the next new one. `None` for ticks before the base or past
    /// the append point.
    pub(crate) fn ensure_row_for_tick(&mut self, tick: u64) -> Option<usize> {
        let offset = self.offset_of(tick)?;
        if offset == self.rows.len() {
            self.push_blank_row();
        }
        Some(offset)
    }

    /// The stored input for one slot, if filled.
    pub(crate) fn slot(&self, offset: usize, player: usize) -> Option<InputFrame> {
        self.rows.get(offset).and_then(|row| row.get(player).copied().flatten())
    }

    /// Whether the given slot already holds a value.
    pub(crate) fn is_filled(&self, offset: usize, player: usize) -> bool {
        self.slot(offset, player).is_some()
    }

    /// Writes one slot. Returns false when the row or slot does not exist or
    /// the slot is already filled; the caller pre-validates, so a false here
    /// is an internal error on its side.
    pub(crate) fn fill_slot(&mut self, offset: usize, player: usize, frame: InputFrame) -> bool {
        match self
            .rows
            .get_mut(offset)
            .and_then(|row| row.get_mut(player))
        {
            Some(slot @ None) => {
                *slot = Some(frame);
                true
            }
            _ => false,
        }
    }

    /// Whether the front row exists and has every slot filled.
    pub(crate) fn front_complete(&self) -> bool {
        self.rows
            .front()
            .is_some_and(|row| row.iter().all(Option::is_some))
    }

    /// Consumes the front row if it is complete, advancing the base tick and
    /// returning the assembled per-player inputs in index order.
    pub(crate) fn take_front_if_complete(&mut self) -> Option<InputRow> {
        if !self.front_complete() {
            return None;
        }
        let row = self.rows.pop_front()?;
        self.base_tick += 1;
        Some(row.into_iter().flatten().collect())
    }
}

impl InvariantChecker for FrameWindow {
    /// Checks the invariants of the FrameWindow.
    ///
    /// # Invariants
    ///
    /// 1. Every row has exactly `player_count` slots
    /// 2. `base_tick + len` does not overflow the tick domain
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        // Invariant 1: row widths match the player count
        for (offset, row) in self.rows.iter().enumerate() {
            if row.len() != self.player_count {
                return Err(
                    InvariantViolation::new("FrameWindow", "row width differs from player count")
                        .with_details(format!(
                            "offset={}, width={}, player_count={}",
                            offset,
                            row.len(),
                            self.player_count
                        )),
                );
            }
        }

        // Invariant 2: the next-new tick is representable
        if self.base_tick.checked_add(self.rows.len() as u64).is_none() {
            return Err(
                InvariantViolation::new("FrameWindow", "tick domain exhausted")
                    .with_details(format!(
                        "base_tick={}, rows={}",
                        self.base_tick,
                        self.rows.len()
                    )),
            );
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
    use crate::fixed::Vec2Fx;

    fn frame(x: i32) -> InputFrame {
        InputFrame::default().with_velocity(Vec2Fx::from_ints(x, 0))
    }

    #[test]
    fn starts_empty_at_tick_zero() {
        let window = FrameWindow::new(2, 0);
        assert_eq!(window.base_tick(), 0);
        assert_eq!(window.len(), 0);
        assert_eq!(window.next_new_tick(), 0);
        assert!(!window.front_complete());
    }

    #[test]
    fn offset_of_covers_window_plus_one() {
        let mut window = FrameWindow::new(2, 0);
        window.push_blank_row();
        window.push_blank_row();

        assert_eq!(window.offset_of(0), Some(0));
        assert_eq!(window.offset_of(1), Some(1));
        // Exactly the next new tick maps to the append offset.
        assert_eq!(window.offset_of(2), Some(2));
        // Beyond that is out of order.
        assert_eq!(window.offset_of(3), None);
    }

    #[test]
    fn offset_of_rejects_ticks_before_base() {
        let mut window = FrameWindow::new(1, 0);
        window.push_blank_row();
        window.fill_slot(0, 0, frame(1));
        assert!(window.take_front_if_complete().is_some());

        assert_eq!(window.base_tick(), 1);
        assert_eq!(window.offset_of(0), None);
        assert_eq!(window.offset_of(1), Some(0));
    }

    #[test]
    fn ensure_row_appends_only_at_the_end() {
        let mut window = FrameWindow::new(2, 0);
        assert_eq!(window.ensure_row_for_tick(0), Some(0));
        assert_eq!(window.len(), 1);
        assert_eq!(window.ensure_row_for_tick(0), Some(0), "existing tick stays valid");
        assert_eq!(window.len(), 1);
        assert_eq!(window.ensure_row_for_tick(1), Some(1));
        assert_eq!(window.len(), 2);
        assert_eq!(window.ensure_row_for_tick(4), None, "gap ticks must be refused");
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn fill_slot_rejects_double_write() {
        let mut window = FrameWindow::new(2, 0);
        window.push_blank_row();

        assert!(window.fill_slot(0, 1, frame(1)));
        assert!(window.is_filled(0, 1));
        assert!(!window.fill_slot(0, 1, frame(2)), "slot already filled");
        // The original value survives the rejected write.
        assert_eq!(window.slot(0, 1), Some(frame(1)));
    }

    #[test]
    fn fill_slot_rejects_missing_row_or_player() {
        let mut window = FrameWindow::new(2, 0);
        window.push_blank_row();

        assert!(!window.fill_slot(1, 0, frame(1)), "no such row");
        assert!(!window.fill_slot(0, 2, frame(1)), "no such player");
    }

    #[test]
    fn front_completes_only_when_all_slots_filled() {
        let mut window = FrameWindow::new(3, 0);
        window.push_blank_row();

        window.fill_slot(0, 0, frame(1));
        window.fill_slot(0, 2, frame(3));
        assert!(!window.front_complete());
        assert!(window.take_front_if_complete().is_none());

        window.fill_slot(0, 1, frame(2));
        assert!(window.front_complete());

        let inputs = window.take_front_if_complete().unwrap();
        assert_eq!(inputs.as_slice(), &[frame(1), frame(2), frame(3)]);
        assert_eq!(window.base_tick(), 1);
        assert_eq!(window.len(), 0);
    }

    #[test]
    fn completion_behind_the_front_does_not_advance() {
        let mut window = FrameWindow::new(1, 0);
        window.push_blank_row();
        window.push_blank_row();

        // Row at offset 1 is complete, front row is not.
        window.fill_slot(1, 0, frame(7));
        assert!(!window.front_complete());
        assert!(window.take_front_if_complete().is_none());
        assert_eq!(window.base_tick(), 0);

        // Once the front completes and pops, the complete row rotates in.
        window.fill_slot(0, 0, frame(5));
        assert_eq!(window.take_front_if_complete().unwrap().as_slice(), &[frame(5)]);
        assert_eq!(window.base_tick(), 1);
        assert!(window.front_complete());
    }

    #[test]
    fn invariants_hold_for_normal_use() {
        let mut window = FrameWindow::new(4, 0);
        window.push_blank_row();
        window.push_blank_row();
        window.fill_slot(0, 0, frame(1));
        assert!(window.check_invariants().is_ok());
    }
}
