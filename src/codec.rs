//! Binary codec for packet serialization.
//!
//! Centralizes the bincode configuration so every [`SimPacket`]
//! (and anything else that crosses the wire) is encoded exactly one way.
//! Fixed-size integer encoding is deliberate: deterministic message sizes,
//! no variable-length surprises between peers built from the same source.
//!
//! The transport itself is out of scope; this module only fixes the bytes.
//!
//! # Examples
//!
//! ```
//! use bulwark_rollback::codec::{encode, decode_value};
//! use bulwark_rollback::packet::SimPacket;
//!
//! let packet = SimPacket::new(7, Vec::new(), 6, 0xABCD_EF01);
//! let bytes = encode(&packet).expect("encoding should succeed");
//! let back: SimPacket = decode_value(&bytes).expect("decoding should succeed");
//! assert_eq!(packet, back);
//! ```
//!
//! [`SimPacket`]: crate::packet::SimPacket

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// The bincode configuration used throughout the crate. Computed at compile
// time; standard() plus fixed_int_encoding keeps integer widths stable.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// What was being attempted when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding into a freshly allocated vector.
    Encode,
    /// Encoding into a caller-provided buffer.
    EncodeIntoBuffer,
    /// Decoding from a byte slice.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encoding"),
            Self::EncodeIntoBuffer => write!(f, "encoding into buffer"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Messages are stored as `String` because bincode's error types are opaque;
/// their `Display` output is the only diagnostic they offer, and codec
/// failures are exceptional conditions (corrupt bytes, protocol mismatch),
/// not hot-path events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The provided buffer was too small for encoding.
    BufferTooSmall {
        /// The actual buffer size provided.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::BufferTooSmall { provided } => {
                write!(f, "buffer too small: only {provided} bytes provided")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Encodes a value into an existing byte slice, returning the number of
/// bytes written. Avoids allocation when the caller reuses send buffers.
///
/// # Errors
///
/// Returns [`CodecError::BufferTooSmall`] if the buffer cannot hold the
/// encoding.
pub fn encode_into<T: Serialize>(value: &T, buffer: &mut [u8]) -> CodecResult<usize> {
    bincode::serde::encode_into_slice(value, buffer, config()).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("UnexpectedEnd") || msg.contains("not enough") {
            CodecError::BufferTooSmall {
                provided: buffer.len(),
            }
        } else {
            CodecError::encode(msg, CodecOperation::EncodeIntoBuffer)
        }
    })
}

/// Decodes a value from a byte slice, returning the value and the number of
/// bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Decodes a value from a byte slice, ignoring the bytes-consumed count.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
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
    use crate::{fixed::Vec2Fx, input_frame::InputFrame, packet::SimPacket};

    #[test]
    fn round_trip_primitive() {
        let original: u32 = 12345;
        let bytes = encode(&original).unwrap();
        let (decoded, len): (u32, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn round_trip_packet() {
        let original = SimPacket::new(
            9,
            vec![InputFrame::default().with_velocity(Vec2Fx::from_ints(0, -2))],
            8,
            77,
        );
        let bytes = encode(&original).unwrap();
        let (decoded, _): (SimPacket, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn encode_into_buffer() {
        let value: u32 = 42;
        let mut buffer = [0u8; 64];
        let len = encode_into(&value, &mut buffer).unwrap();
        assert!(len > 0);
        assert!(len <= 64);

        let (decoded, _): (u32, _) = decode(&buffer[..len]).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn encode_into_buffer_too_small() {
        let value: u64 = 0x1234_5678_9ABC_DEF0;
        let mut buffer = [0u8; 1];
        let result = encode_into(&value, &mut buffer);
        assert!(matches!(
            result,
            Err(CodecError::BufferTooSmall { .. }) | Err(CodecError::EncodeError { .. })
        ));
    }

    #[test]
    fn decode_invalid_data_errors() {
        let invalid_bytes = [0xFF, 0xFF, 0xFF];
        let result: CodecResult<(u64, _)> = decode(&invalid_bytes);
        assert!(result.is_err());
    }

    #[test]
    fn error_display_is_descriptive() {
        let err = CodecError::encode("boom", CodecOperation::Encode);
        assert!(err.to_string().contains("encoding failed"));

        let err = CodecError::decode("boom", CodecOperation::Decode);
        assert!(err.to_string().contains("decoding failed"));

        let err = CodecError::BufferTooSmall { provided: 10 };
        assert!(err.to_string().contains("10"));
    }
}
