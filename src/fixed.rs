//! Deterministic 16.16 fixed-point arithmetic.
//!
//! All gameplay-affecting math in a deterministic simulation must avoid
//! floating point: FPU behavior varies across architectures, compiler flags,
//! and even optimization levels, and a single bit of divergence eventually
//! shows up as a checksum mismatch between peers. This module provides a
//! signed 16.16 fixed-point scalar ([`Fixed`]) and a small 2D vector
//! ([`Vec2Fx`]) built on it.
//!
//! # Representation
//!
//! A [`Fixed`] stores `value * 65536` in an `i32`: 16 integer bits (plus
//! sign) and 16 fractional bits. The usable range is roughly ±32767 with a
//! resolution of 1/65536. Multiplication and division go through `i64`
//! intermediates so they never lose the fractional cross terms.
//!
//! # Overflow behavior
//!
//! Addition, subtraction, and negation wrap, exactly like the underlying
//! integer math they replace. The release profile enables overflow checks, so
//! the wrapping here is explicit (`wrapping_add` and friends) rather than
//! incidental - identical results in debug and release builds is itself a
//! determinism requirement. Simulations are expected to clamp positions and
//! velocities to sane bounds long before the representable range matters.
//!
//! # Examples
//!
//! ```
//! use bulwark_rollback::fixed::{fx, Fixed};
//!
//! let three_halves = fx(3) / fx(2);
//! assert_eq!(three_halves * fx(2), fx(3));
//! assert_eq!(fx(9).sqrt(), fx(3));
//! ```

use serde::{Deserialize, Serialize};

/// Number of fractional bits in a [`Fixed`].
pub const FRAC_BITS: u32 = 16;

const ONE_RAW: i32 = 1 << FRAC_BITS;

/// Shorthand constructor for whole values, mirroring `Fixed::from_int`.
///
/// Exists because simulation code builds constants constantly and
/// `fx(3)` reads better than `Fixed::from_int(3)` at every call site.
#[must_use]
pub const fn fx(units: i32) -> Fixed {
    Fixed::from_int(units)
}

/// A signed 16.16 fixed-point number.
///
/// `Fixed` is a plain value: `Copy`, totally ordered, hashable, and
/// serializable, so it can sit inside input frames, wire packets, and
/// checksummed simulation state without ceremony.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(i32);

impl Fixed {
    /// Zero.
    pub const ZERO: Self = Self(0);
    /// One.
    pub const ONE: Self = Self(ONE_RAW);
    /// Negative one.
    pub const NEG_ONE: Self = Self(-ONE_RAW);
    /// One half.
    pub const HALF: Self = Self(ONE_RAW / 2);
    /// Largest representable value (about 32768).
    pub const MAX: Self = Self(i32::MAX);
    /// Smallest representable value (about -32768).
    pub const MIN: Self = Self(i32::MIN);

    /// Creates a fixed-point value from whole units.
    ///
    /// Inputs outside roughly ±32767 shift out of range and wrap; simulation
    /// constants are nowhere near that.
    #[must_use]
    pub const fn from_int(units: i32) -> Self {
        Self(units << FRAC_BITS)
    }

    /// Creates a fixed-point value from a raw 16.16 bit pattern.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Creates the fixed-point quotient `num / den` without first losing
    /// precision to integer division.
    ///
    /// A zero denominator saturates to [`Fixed::MAX`] or [`Fixed::MIN`]
    /// depending on the numerator's sign (`0 / 0` is zero).
    #[must_use]
    pub const fn from_ratio(num: i32, den: i32) -> Self {
        if den == 0 {
            return if num > 0 {
                Self::MAX
            } else if num < 0 {
                Self::MIN
            } else {
                Self::ZERO
            };
        }
        Self((((num as i64) << FRAC_BITS) / den as i64) as i32)
    }

    /// Returns the raw 16.16 bit pattern.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Returns the value truncated toward negative infinity (floor).
    ///
    /// Arithmetic shift makes this a floor, not a round-toward-zero:
    /// `fx(-1) / fx(2)` truncates to `-1`.
    #[must_use]
    pub const fn trunc(self) -> i32 {
        self.0 >> FRAC_BITS
    }

    /// Absolute value. `Fixed::MIN` saturates to `Fixed::MAX`.
    #[must_use]
    pub const fn abs(self) -> Self {
        if self.0 == i32::MIN {
            Self::MAX
        } else if self.0 < 0 {
            Self(-self.0)
        } else {
            self
        }
    }

    /// Smaller of two values.
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Larger of two values.
    #[must_use]
    pub const fn max(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Clamps the value into `[low, high]`.
    #[must_use]
    pub const fn clamp(self, low: Self, high: Self) -> Self {
        self.max(low).min(high)
    }

    /// Integer square root of a non-negative value. Negative inputs return
    /// zero (callers only take roots of squared lengths).
    ///
    /// Newton's method on the widened raw value converges in a handful of
    /// iterations and uses integer math only, so the result is bit-identical
    /// everywhere.
    #[must_use]
    pub fn sqrt(self) -> Self {
        if self.0 <= 0 {
            return Self::ZERO;
        }
        // sqrt(raw / 2^16) * 2^16 == sqrt(raw * 2^16)
        let target = (self.0 as u64) << FRAC_BITS;
        let mut guess = target;
        let mut better = (guess + 1) / 2;
        while better < guess {
            guess = better;
            better = (guess + target / guess) / 2;
        }
        Self(guess as i32)
    }
}

impl std::ops::Add for Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl std::ops::AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl std::ops::SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::ops::Neg for Fixed {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl std::ops::Mul for Fixed {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self(((self.0 as i64 * rhs.0 as i64) >> FRAC_BITS) as i32)
    }
}

impl std::ops::MulAssign for Fixed {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

/// Scaling by a plain integer, for counts and repeat factors.
impl std::ops::Mul<i32> for Fixed {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        Self((self.0 as i64 * rhs as i64) as i32)
    }
}

impl std::ops::Div for Fixed {
    type Output = Self;

    /// Division by zero saturates instead of panicking; a deterministic
    /// simulation must not have builds that differ on whether they crash.
    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return if self.0 >= 0 { Self::MAX } else { Self::MIN };
        }
        Self((((self.0 as i64) << FRAC_BITS) / rhs.0 as i64) as i32)
    }
}

impl std::ops::DivAssign for Fixed {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl std::fmt::Display for Fixed {
    /// Integer-only formatting (sign, whole part, four fractional digits);
    /// no float detour even in diagnostics.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let raw = self.0 as i64;
        let neg = raw < 0;
        let mag = raw.unsigned_abs();
        let whole = mag >> FRAC_BITS;
        let frac = ((mag & u64::from(ONE_RAW as u32 - 1)) * 10_000) >> FRAC_BITS;
        if neg {
            write!(f, "-")?;
        }
        write!(f, "{whole}.{frac:04}")
    }
}

/// A 2D vector of [`Fixed`] components.
///
/// Used for velocities, positions, and aim directions. Operations mirror
/// the scalar type: component-wise, integer-only, deterministic.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Vec2Fx {
    /// Horizontal component.
    pub x: Fixed,
    /// Vertical component.
    pub y: Fixed,
}

impl Vec2Fx {
    /// The zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Creates a vector from components.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Creates a vector from whole units.
    #[must_use]
    pub const fn from_ints(x: i32, y: i32) -> Self {
        Self {
            x: Fixed::from_int(x),
            y: Fixed::from_int(y),
        }
    }

    /// Squared length. Cheaper than [`length`](Self::length) and sufficient
    /// for radius comparisons.
    #[must_use]
    pub fn length_sq(self) -> Fixed {
        self.x * self.x + self.y * self.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        self.length_sq().sqrt()
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Unit-length copy, or the zero vector when the input is (near) zero.
    ///
    /// The zero fallback keeps aim handling total: a blank aim direction
    /// simply contributes nothing rather than poisoning later math.
    #[must_use]
    pub fn normalized_or_zero(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            Self::ZERO
        } else {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        }
    }

    /// Component-wise clamp into `[-bound, bound]` on both axes.
    #[must_use]
    pub fn clamp_axes(self, bound: Fixed) -> Self {
        Self {
            x: self.x.clamp(-bound, bound),
            y: self.y.clamp(-bound, bound),
        }
    }
}

impl std::ops::Add for Vec2Fx {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fx {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Vec2Fx {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::SubAssign for Vec2Fx {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl std::ops::Neg for Vec2Fx {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::ops::Mul<Fixed> for Vec2Fx {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
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

    // ===== Scalar construction and accessors =====

    #[test]
    fn from_int_round_trips_through_trunc() {
        for units in [-3000, -1, 0, 1, 42, 3000] {
            assert_eq!(fx(units).trunc(), units);
        }
    }

    #[test]
    fn from_raw_preserves_bits() {
        assert_eq!(Fixed::from_raw(0x0001_8000).raw(), 0x0001_8000);
        assert_eq!(Fixed::from_raw(0x0001_8000), fx(3) / fx(2));
    }

    #[test]
    fn from_ratio_matches_division() {
        assert_eq!(Fixed::from_ratio(1, 2), Fixed::HALF);
        assert_eq!(Fixed::from_ratio(-3, 4), fx(-3) / fx(4));
        assert_eq!(Fixed::from_ratio(7, 1), fx(7));
    }

    #[test]
    fn from_ratio_zero_denominator_saturates() {
        assert_eq!(Fixed::from_ratio(5, 0), Fixed::MAX);
        assert_eq!(Fixed::from_ratio(-5, 0), Fixed::MIN);
        assert_eq!(Fixed::from_ratio(0, 0), Fixed::ZERO);
    }

    #[test]
    fn trunc_floors_negative_values() {
        let minus_half = fx(-1) / fx(2);
        assert_eq!(minus_half.trunc(), -1);
        let minus_three_halves = fx(-3) / fx(2);
        assert_eq!(minus_three_halves.trunc(), -2);
    }

    // ===== Arithmetic =====

    #[test]
    fn multiplication_keeps_fractional_cross_terms() {
        let half = Fixed::HALF;
        assert_eq!(half * half, fx(1) / fx(4));
        assert_eq!(fx(3) * half, fx(3) / fx(2));
        assert_eq!(fx(-6) * half, fx(-3));
    }

    #[test]
    fn multiplication_by_integer_scales() {
        assert_eq!(Fixed::HALF * 4, fx(2));
        assert_eq!(fx(-3) * 3, fx(-9));
    }

    #[test]
    fn division_inverts_multiplication_exactly_for_powers_of_two() {
        let v = Fixed::from_raw(0x0012_3400);
        assert_eq!(v * fx(4) / fx(4), v);
        assert_eq!(v / fx(2) * fx(2), v);
    }

    #[test]
    fn division_by_zero_saturates() {
        assert_eq!(fx(5) / Fixed::ZERO, Fixed::MAX);
        assert_eq!(fx(-5) / Fixed::ZERO, Fixed::MIN);
        assert_eq!(Fixed::ZERO / Fixed::ZERO, Fixed::MAX);
    }

    #[test]
    fn addition_wraps_like_integers() {
        // Identical wrap behavior in debug and release is the point.
        let max = Fixed::MAX;
        let one_raw = Fixed::from_raw(1);
        assert_eq!(max + one_raw, Fixed::MIN);
    }

    #[test]
    fn negation_and_abs() {
        assert_eq!(-fx(7), fx(-7));
        assert_eq!(fx(-7).abs(), fx(7));
        assert_eq!(fx(7).abs(), fx(7));
        assert_eq!(Fixed::MIN.abs(), Fixed::MAX);
    }

    #[test]
    fn clamp_and_min_max() {
        assert_eq!(fx(10).clamp(fx(-5), fx(5)), fx(5));
        assert_eq!(fx(-10).clamp(fx(-5), fx(5)), fx(-5));
        assert_eq!(fx(3).clamp(fx(-5), fx(5)), fx(3));
        assert_eq!(fx(2).min(fx(3)), fx(2));
        assert_eq!(fx(2).max(fx(3)), fx(3));
    }

    // ===== Square root =====

    #[test]
    fn sqrt_of_perfect_squares() {
        assert_eq!(fx(0).sqrt(), fx(0));
        assert_eq!(fx(1).sqrt(), fx(1));
        assert_eq!(fx(4).sqrt(), fx(2));
        assert_eq!(fx(9).sqrt(), fx(3));
        assert_eq!(fx(144).sqrt(), fx(12));
    }

    #[test]
    fn sqrt_of_fractions() {
        // sqrt(1/4) == 1/2 exactly in 16.16.
        assert_eq!((fx(1) / fx(4)).sqrt(), Fixed::HALF);
    }

    #[test]
    fn sqrt_of_two_is_close() {
        let root = fx(2).sqrt();
        // 1.41421... in 16.16 is 92681-92682 raw.
        assert!((root.raw() - 92_681).abs() <= 1, "raw was {}", root.raw());
    }

    #[test]
    fn sqrt_of_negative_is_zero() {
        assert_eq!(fx(-4).sqrt(), Fixed::ZERO);
    }

    // ===== Display =====

    #[test]
    fn display_uses_integer_math_only() {
        assert_eq!(fx(3).to_string(), "3.0000");
        assert_eq!(Fixed::HALF.to_string(), "0.5000");
        assert_eq!((fx(-3) / fx(2)).to_string(), "-1.5000");
        assert_eq!(Fixed::ZERO.to_string(), "0.0000");
    }

    // ===== Vectors =====

    #[test]
    fn vector_arithmetic_is_component_wise() {
        let a = Vec2Fx::from_ints(1, 2);
        let b = Vec2Fx::from_ints(3, -4);
        assert_eq!(a + b, Vec2Fx::from_ints(4, -2));
        assert_eq!(a - b, Vec2Fx::from_ints(-2, 6));
        assert_eq!(-a, Vec2Fx::from_ints(-1, -2));
        assert_eq!(a * fx(3), Vec2Fx::from_ints(3, 6));
    }

    #[test]
    fn vector_lengths() {
        let v = Vec2Fx::from_ints(3, 4);
        assert_eq!(v.length_sq(), fx(25));
        assert_eq!(v.length(), fx(5));
    }

    #[test]
    fn dot_product() {
        let a = Vec2Fx::from_ints(2, 3);
        let b = Vec2Fx::from_ints(4, -1);
        assert_eq!(a.dot(b), fx(5));
    }

    #[test]
    fn normalization_produces_unit_vectors() {
        let v = Vec2Fx::from_ints(3, 4).normalized_or_zero();
        // 3/5 and 4/5 exactly.
        assert_eq!(v.x, Fixed::from_ratio(3, 5));
        assert_eq!(v.y, Fixed::from_ratio(4, 5));
    }

    #[test]
    fn normalizing_zero_stays_zero() {
        assert_eq!(Vec2Fx::ZERO.normalized_or_zero(), Vec2Fx::ZERO);
    }

    #[test]
    fn clamp_axes_bounds_both_components() {
        let v = Vec2Fx::from_ints(10, -10).clamp_axes(fx(4));
        assert_eq!(v, Vec2Fx::from_ints(4, -4));
    }

    #[test]
    fn serde_round_trip_is_transparent() {
        let v = fx(3) / fx(2);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "98304");
        let back: Fixed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
