//! State checksums for peer cross-validation.
//!
//! Every confirmed simulation tick produces a `u32` checksum that peers
//! exchange and compare; a mismatch at the same tick is a desync. The hash
//! here is FNV-1a: not cryptographic, but fast, dependency-free, and - the
//! property that actually matters - bit-stable across platforms.
//!
//! Simulations feed their state into an [`Fnv32`] in an explicit, fixed
//! field order. Anything non-deterministic or presentation-only (render
//! buffers, caches) is excluded simply by never being written.
//!
//! For test doubles and simple serde-friendly states, [`compute_checksum`]
//! hashes the bincode encoding instead; real simulations prefer the
//! incremental form to keep the per-tick cost allocation-free.

use serde::Serialize;

/// FNV-1a 32-bit offset basis.
const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5;

/// FNV-1a 32-bit prime.
const FNV_PRIME: u32 = 0x0100_0193;

/// Incremental FNV-1a (32-bit) hasher.
///
/// # Example
///
/// ```
/// use bulwark_rollback::checksum::Fnv32;
///
/// let mut hasher = Fnv32::new();
/// hasher.write_u64(42);
/// hasher.write_i32(-7);
/// let checksum = hasher.finish();
/// assert_ne!(checksum, Fnv32::new().finish());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fnv32 {
    hash: u32,
}

impl Fnv32 {
    /// Creates a hasher at the FNV-1a offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }

    /// Absorbs raw bytes.
    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.hash ^= u32::from(byte);
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }

    /// Absorbs a `u8`.
    pub fn write_u8(&mut self, value: u8) {
        self.write(&[value]);
    }

    /// Absorbs a `u16` in little-endian byte order.
    pub fn write_u16(&mut self, value: u16) {
        self.write(&value.to_le_bytes());
    }

    /// Absorbs a `u32` in little-endian byte order.
    pub fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    /// Absorbs a `u64` in little-endian byte order.
    pub fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }

    /// Absorbs an `i32` in little-endian byte order.
    pub fn write_i32(&mut self, value: i32) {
        self.write(&value.to_le_bytes());
    }

    /// Absorbs an `i64` in little-endian byte order.
    pub fn write_i64(&mut self, value: i64) {
        self.write(&value.to_le_bytes());
    }

    /// Absorbs a `bool` as a single `0`/`1` byte.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Returns the accumulated hash.
    #[must_use]
    pub const fn finish(&self) -> u32 {
        self.hash
    }
}

impl Default for Fnv32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot FNV-1a over a byte slice.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hasher = Fnv32::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Errors from serde-based checksum computation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChecksumError {
    /// The value could not be serialized for hashing.
    Serialization {
        /// Human-readable description of the encode failure.
        context: String,
    },
}

impl std::fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization { context } => {
                write!(f, "checksum serialization failed: {context}")
            },
        }
    }
}

impl std::error::Error for ChecksumError {}

/// Hashes the deterministic bincode encoding of a serializable value.
///
/// Convenient for test states; the encoding allocates, so hot simulation
/// paths should use [`Fnv32`] directly instead.
pub fn compute_checksum<T: Serialize>(value: &T) -> Result<u32, ChecksumError> {
    let bytes =
        bincode::serde::encode_to_vec(value, bincode::config::standard().with_fixed_int_encoding())
            .map_err(|e| ChecksumError::Serialization {
                context: e.to_string(),
            })?;
    Ok(hash_bytes(&bytes))
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
    use proptest::prelude::*;

    // Published FNV-1a 32-bit test vectors.
    #[test]
    fn known_vectors() {
        assert_eq!(hash_bytes(b""), 0x811C_9DC5);
        assert_eq!(hash_bytes(b"a"), 0xE40C_292C);
        assert_eq!(hash_bytes(b"foobar"), 0xBF9C_F968);
    }

    #[test]
    fn hashing_is_deterministic() {
        let data = b"canonical state at tick 42";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(hash_bytes(b"tick 41"), hash_bytes(b"tick 42"));
    }

    #[test]
    fn typed_writes_match_le_bytes() {
        let mut typed = Fnv32::new();
        typed.write_u64(0x0123_4567_89AB_CDEF);
        typed.write_i32(-42);
        typed.write_u16(7);
        typed.write_bool(true);

        let mut raw = Fnv32::new();
        raw.write(&0x0123_4567_89AB_CDEF_u64.to_le_bytes());
        raw.write(&(-42_i32).to_le_bytes());
        raw.write(&7_u16.to_le_bytes());
        raw.write(&[1]);

        assert_eq!(typed.finish(), raw.finish());
    }

    #[test]
    fn finish_does_not_consume() {
        let mut hasher = Fnv32::new();
        hasher.write_u32(99);
        let first = hasher.finish();
        let second = hasher.finish();
        assert_eq!(first, second);
    }

    #[test]
    fn field_order_matters() {
        let mut ab = Fnv32::new();
        ab.write_u32(1);
        ab.write_u32(2);
        let mut ba = Fnv32::new();
        ba.write_u32(2);
        ba.write_u32(1);
        assert_ne!(ab.finish(), ba.finish());
    }

    #[test]
    fn compute_checksum_is_stable() {
        #[derive(Serialize)]
        struct State {
            tick: u64,
            score: i32,
        }
        let a = State {
            tick: 10,
            score: -3,
        };
        let b = State {
            tick: 10,
            score: -3,
        };
        assert_eq!(compute_checksum(&a).unwrap(), compute_checksum(&b).unwrap());
    }

    proptest! {
        // Incremental writes must equal the one-shot hash regardless of how
        // the input is chunked.
        #[test]
        fn prop_chunked_writes_equal_oneshot(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            split in 0usize..256,
        ) {
            let split = split.min(data.len());
            let mut chunked = Fnv32::new();
            chunked.write(&data[..split]);
            chunked.write(&data[split..]);
            prop_assert_eq!(chunked.finish(), hash_bytes(&data));
        }

        #[test]
        fn prop_hash_is_pure(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(hash_bytes(&data), hash_bytes(&data));
        }
    }
}
