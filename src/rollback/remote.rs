//! Per-remote bookkeeping for the networked state.
//!
//! One [`RemoteBookkeeping`] exists per remote id, created lazily when the
//! first packet from that remote arrives and kept for the lifetime of the
//! networked state.

use std::collections::VecDeque;

use crate::telemetry::{InvariantChecker, InvariantViolation};

/// What the networked state remembers about one remote.
///
/// Tracks three independent facts: the newest tick the remote has supplied
/// input for (drives ordering checks), the newest canonical tick the remote
/// has claimed (drives pruning), and a FIFO of first-seen `(tick, checksum)`
/// reports awaiting comparison against local history.
#[derive(Debug, Clone, Default)]
pub(crate) struct RemoteBookkeeping {
    /// Newest tick this remote has delivered input frames for.
    latest_input_tick: Option<u64>,
    /// Newest canonical tick this remote has reported, whether or not the
    /// matching checksum was first-seen. Monotonic.
    latest_reported_canonical: Option<u64>,
    /// First-seen canonical reports, strictly increasing by tick, oldest in
    /// front. Consumed by checksum reconciliation.
    reports: VecDeque<(u64, u32)>,
}

impl RemoteBookkeeping {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Newest tick this remote has delivered input for, if any.
    pub(crate) fn latest_input_tick(&self) -> Option<u64> {
        self.latest_input_tick
    }

    /// The tick the remote's next packet must carry: one past its newest
    /// delivered tick, or `fallback` before any packet has been seen.
    pub(crate) fn expected_input_tick(&self, fallback: u64) -> u64 {
        match self.latest_input_tick {
            Some(tick) => tick + 1,
            None => fallback,
        }
    }

    /// Marks `tick` as delivered.
    pub(crate) fn note_input_tick(&mut self, tick: u64) {
        self.latest_input_tick = Some(tick);
    }

    /// Records a self-reported `(canonical tick, checksum)` pair.
    ///
    /// Remotes resend their newest report with every packet, so only a
    /// strictly newer tick enters the FIFO; the monotonic high-water mark
    /// advances either way.
    pub(crate) fn record_report(&mut self, tick: u64, checksum: u32) {
        let newest = self.reports.back().map(|&(t, _)| t);
        let first_seen = match (newest, self.latest_reported_canonical) {
            (Some(t), _) => tick > t,
            // An empty FIFO may still have consumed history behind it.
            (None, Some(high)) => tick > high,
            (None, None) => true,
        };
        if first_seen {
            self.reports.push_back((tick, checksum));
        }
        self.latest_reported_canonical = Some(
            self.latest_reported_canonical
                .map_or(tick, |high| high.max(tick)),
        );
    }

    /// Whether this remote has claimed a canonical tick strictly past `tick`.
    pub(crate) fn has_reported_past(&self, tick: u64) -> bool {
        self.latest_reported_canonical
            .is_some_and(|high| high > tick)
    }

    /// Oldest unconsumed report.
    pub(crate) fn front_report(&self) -> Option<(u64, u32)> {
        self.reports.front().copied()
    }

    /// Consumes the oldest report.
    pub(crate) fn pop_report(&mut self) {
        self.reports.pop_front();
    }

    /// Drops reports older than `tick`; they can no longer be compared
    /// against any retained local checksum.
    pub(crate) fn discard_reports_before(&mut self, tick: u64) {
        while let Some(&(t, _)) = self.reports.front() {
            if t >= tick {
                break;
            }
            self.reports.pop_front();
        }
    }

    #[cfg(test)]
    pub(crate) fn report_count(&self) -> usize {
        self.reports.len()
    }
}

impl InvariantChecker for RemoteBookkeeping {
    /// Checks the invariants of the RemoteBookkeeping.
    ///
    /// # Invariants
    ///
    /// 1. Report ticks are strictly increasing front to back
    /// 2. No queued report exceeds the reported high-water mark
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        // Invariant 1: strictly increasing report ticks
        let mut previous: Option<u64> = None;
        for &(tick, _) in &self.reports {
            if let Some(prev) = previous {
                if tick <= prev {
                    return Err(InvariantViolation::new(
                        "RemoteBookkeeping",
                        "report ticks not strictly increasing",
                    )
                    .with_details(format!("previous={prev}, next={tick}")));
                }
            }
            previous = Some(tick);
        }

        // Invariant 2: reports never exceed the high-water mark
        if let (Some(&(newest, _)), Some(high)) =
            (self.reports.back(), self.latest_reported_canonical)
        {
            if newest > high {
                return Err(InvariantViolation::new(
                    "RemoteBookkeeping",
                    "queued report exceeds reported high-water mark",
                )
                .with_details(format!("newest={newest}, high={high}")));
            }
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

    #[test]
    fn expected_tick_before_any_input_uses_fallback() {
        let remote = RemoteBookkeeping::new();
        assert_eq!(remote.latest_input_tick(), None);
        assert_eq!(remote.expected_input_tick(0), 0);
        assert_eq!(remote.expected_input_tick(7), 7);
    }

    #[test]
    fn expected_tick_follows_delivered_input() {
        let mut remote = RemoteBookkeeping::new();
        remote.note_input_tick(4);
        assert_eq!(remote.latest_input_tick(), Some(4));
        assert_eq!(remote.expected_input_tick(0), 5);
    }

    #[test]
    fn resent_reports_are_recorded_once() {
        let mut remote = RemoteBookkeeping::new();
        remote.record_report(3, 0xAAAA_0003);
        remote.record_report(3, 0xAAAA_0003);
        remote.record_report(3, 0xDEAD_BEEF);

        assert_eq!(remote.report_count(), 1);
        assert_eq!(remote.front_report(), Some((3, 0xAAAA_0003)));
    }

    #[test]
    fn reports_stay_deduplicated_after_consumption() {
        let mut remote = RemoteBookkeeping::new();
        remote.record_report(3, 0xAAAA_0003);
        remote.pop_report();
        assert_eq!(remote.report_count(), 0);

        // The resend arrives after the original was compared and consumed.
        remote.record_report(3, 0xAAAA_0003);
        assert_eq!(remote.report_count(), 0, "consumed tick must not reappear");

        remote.record_report(4, 0xAAAA_0004);
        assert_eq!(remote.front_report(), Some((4, 0xAAAA_0004)));
    }

    #[test]
    fn high_water_mark_is_monotonic() {
        let mut remote = RemoteBookkeeping::new();
        assert!(!remote.has_reported_past(0));

        remote.record_report(5, 1);
        assert!(remote.has_reported_past(4));
        assert!(!remote.has_reported_past(5));

        // A stale resend cannot lower the mark.
        remote.record_report(2, 9);
        assert!(remote.has_reported_past(4));
    }

    #[test]
    fn discard_drops_only_older_reports() {
        let mut remote = RemoteBookkeeping::new();
        remote.record_report(1, 11);
        remote.record_report(2, 22);
        remote.record_report(3, 33);

        remote.discard_reports_before(3);
        assert_eq!(remote.report_count(), 1);
        assert_eq!(remote.front_report(), Some((3, 33)));
    }

    #[test]
    fn invariants_hold_after_typical_traffic() {
        let mut remote = RemoteBookkeeping::new();
        remote.note_input_tick(0);
        remote.record_report(0, 1);
        remote.note_input_tick(1);
        remote.record_report(1, 2);
        remote.record_report(1, 2);
        assert!(remote.check_invariants().is_ok());
    }
}
