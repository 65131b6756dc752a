//! The per-tick wire message exchanged between peers.
//!
//! Each local tick produces exactly one [`SimPacket`] that is broadcast to
//! every remote peer. It carries two independent pieces of information:
//!
//! 1. The sender's local players' input frames for one tick (the tick the
//!    sender just simulated on its predicted timeline).
//! 2. The sender's newest confirmed canonical `(tick, checksum)` pair, which
//!    receivers use for desync cross-validation.
//!
//! Transport is out of scope for this crate - packets are assumed delivered
//! reliably and in order per peer channel. [`crate::codec`] fixes the byte
//! encoding for whatever transport carries them.

use crate::input_frame::InputFrame;
use serde::{Deserialize, Serialize};

/// One peer's outgoing state for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimPacket {
    /// The tick the `input_frames` apply to, from the sender's predicted
    /// timeline. Receivers slot the frames at `tick_count` relative to their
    /// own canonical tick.
    pub tick_count: u64,
    /// One frame per sender-local player index, in the sender's
    /// mapping-defined order.
    pub input_frames: Vec<InputFrame>,
    /// The sender's latest confirmed-canonical tick.
    pub canonical_tick_count: u64,
    /// The sender's state checksum at `canonical_tick_count`.
    pub canonical_checksum: u32,
}

impl SimPacket {
    /// Creates a packet. Mostly useful in tests; the rollback core builds
    /// its own packets during [`update`](crate::rollback::NetworkedSimState::update).
    #[must_use]
    pub const fn new(
        tick_count: u64,
        input_frames: Vec<InputFrame>,
        canonical_tick_count: u64,
        canonical_checksum: u32,
    ) -> Self {
        Self {
            tick_count,
            input_frames,
            canonical_tick_count,
            canonical_checksum,
        }
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
    use crate::{
        codec,
        fixed::Vec2Fx,
        input_frame::{ActionFlags, InputFrame},
    };

    fn sample_packet() -> SimPacket {
        SimPacket::new(
            42,
            vec![
                InputFrame::default()
                    .with_velocity(Vec2Fx::from_ints(1, 0))
                    .with_actions(ActionFlags::FIRE),
                InputFrame::default().with_absolute_aim(Vec2Fx::from_ints(-3, 7)),
            ],
            40,
            0xDEAD_BEEF,
        )
    }

    #[test]
    fn round_trips_through_codec() {
        let packet = sample_packet();
        let bytes = codec::encode(&packet).unwrap();
        let decoded: SimPacket = codec::decode_value(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn encoding_is_deterministic() {
        let packet = sample_packet();
        let first = codec::encode(&packet).unwrap();
        let second = codec::encode(&packet).unwrap();
        assert_eq!(
            first, second,
            "identical packets must encode to identical bytes"
        );
    }

    #[test]
    fn blank_and_aimed_frames_encode_differently() {
        let blank = SimPacket::new(1, vec![InputFrame::BLANK], 0, 0);
        let aimed = SimPacket::new(
            1,
            vec![InputFrame::BLANK.with_relative_aim(Vec2Fx::from_ints(0, 1))],
            0,
            0,
        );
        assert_ne!(
            codec::encode(&blank).unwrap(),
            codec::encode(&aimed).unwrap()
        );
    }
}
