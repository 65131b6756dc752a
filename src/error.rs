//! Error types returned by the library's fallible operations.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// This enum contains all error messages this library can return. Most API
/// functions will generally return a [`Result<(), BulwarkError>`].
///
/// Every variant carries the values a caller needs to react programmatically,
/// so matching on the variant is enough; no string parsing required.
///
/// [`Result<(), BulwarkError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Hash)]
pub enum BulwarkError {
    /// The packet carries inputs for a tick the canonical state has already
    /// consumed, or a tick this remote has already covered. Safe to drop.
    StalePacket {
        /// The tick the rejected packet was for.
        packet_tick: u64,
        /// The canonical tick at the time of rejection.
        canonical_tick: u64,
    },
    /// The packet skips ahead of what the prediction window can accept.
    /// Accepting it would leave a gap of unknown inputs.
    OutOfOrder {
        /// The tick the rejected packet was for.
        packet_tick: u64,
        /// The largest tick that would have been accepted.
        expected_max: u64,
    },
    /// An input slot that was already filled received a second write.
    /// This indicates a caller bug, not a network condition.
    DuplicateSlot {
        /// The tick whose slot was written twice.
        tick: u64,
        /// The player index of the duplicated slot.
        player: usize,
    },
    /// A packet arrived from a remote the input mapping does not know.
    UnknownRemote {
        /// Debug representation of the unknown remote id.
        remote: String,
    },
    /// The input mapping is inconsistent with the data it was asked to
    /// process, or was invalid at construction.
    MappingInvalid {
        /// Further specifies what was inconsistent.
        reason: String,
    },
}

impl Display for BulwarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulwarkError::StalePacket {
                packet_tick,
                canonical_tick,
            } => {
                write!(
                    f,
                    "Stale packet for tick {}; canonical state is already at tick {}",
                    packet_tick, canonical_tick
                )
            }
            BulwarkError::OutOfOrder {
                packet_tick,
                expected_max,
            } => {
                write!(
                    f,
                    "Out-of-order packet for tick {}: must not exceed tick {}",
                    packet_tick, expected_max
                )
            }
            BulwarkError::DuplicateSlot { tick, player } => {
                write!(
                    f,
                    "Duplicate input for player {} at tick {}; each slot may be written once",
                    player, tick
                )
            }
            BulwarkError::UnknownRemote { remote } => {
                write!(f, "Packet from unknown remote {}", remote)
            }
            BulwarkError::MappingInvalid { reason } => {
                write!(f, "Invalid input mapping: {}", reason)
            }
        }
    }
}

impl Error for BulwarkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_the_values() {
        let err = BulwarkError::StalePacket {
            packet_tick: 3,
            canonical_tick: 10,
        };
        let text = err.to_string();
        assert!(text.contains('3'));
        assert!(text.contains("10"));

        let err = BulwarkError::DuplicateSlot { tick: 7, player: 2 };
        let text = err.to_string();
        assert!(text.contains('7'));
        assert!(text.contains('2'));
    }

    #[test]
    fn variants_compare_by_fields() {
        let a = BulwarkError::OutOfOrder {
            packet_tick: 9,
            expected_max: 5,
        };
        let b = BulwarkError::OutOfOrder {
            packet_tick: 9,
            expected_max: 5,
        };
        assert_eq!(a, b);

        let c = BulwarkError::OutOfOrder {
            packet_tick: 10,
            expected_max: 5,
        };
        assert_ne!(a, c);
    }

    #[test]
    fn error_trait_is_implemented() {
        let err: Box<dyn Error> = Box::new(BulwarkError::MappingInvalid {
            reason: "empty remote group".into(),
        });
        assert!(err.to_string().contains("empty remote group"));
    }
}
