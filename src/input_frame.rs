//! Per-player, per-tick control state.
//!
//! An [`InputFrame`] is the atom the whole netcode layer moves around: one
//! player's controls for exactly one tick. It is a plain value - `Copy`,
//! comparable, serializable - because it gets stored in partial frames,
//! replayed during rollback, and shipped over the wire verbatim.
//!
//! Everything in a frame is bit-exact: velocity is fixed-point, aim is
//! fixed-point, and discrete actions are a bitset. There is no analog data
//! that could round differently on two machines.

use crate::fixed::Vec2Fx;
use serde::{Deserialize, Serialize};

/// A bitset of discrete action flags.
///
/// Buttons are edge- or level-triggered by the simulation's own rules; this
/// type only records which were held for the tick.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionFlags(u16);

impl ActionFlags {
    /// No actions held.
    pub const NONE: Self = Self(0);
    /// Primary fire.
    pub const FIRE: Self = Self(1 << 0);
    /// Dash (velocity burst).
    pub const DASH: Self = Self(1 << 1);
    /// Brake (velocity damp).
    pub const BRAKE: Self = Self(1 << 2);
    /// Context interaction (pickups, switches).
    pub const INTERACT: Self = Self(1 << 3);

    /// Creates a flag set from raw bits. Unknown bits are kept as-is; the
    /// simulation decides what they mean, the netcode just carries them.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` if every flag in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns `true` if no flags are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the given flags.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the given flags.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for ActionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ActionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl std::ops::BitAnd for ActionFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Where a player is aiming this tick.
///
/// The two addressing modes are mutually exclusive by construction: a frame
/// carries at most one `AimTarget`, and it is either absolute or relative,
/// never both. That invariant lives in the type instead of a validation
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AimTarget {
    /// A world-space point to aim at.
    Absolute(Vec2Fx),
    /// A direction relative to the player's own position.
    Relative(Vec2Fx),
}

/// One player's control state for one tick.
///
/// The default frame is "blank": zero velocity, no aim update, no actions.
/// Blank is also what prediction falls back to before any real input from a
/// player has ever been seen.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct InputFrame {
    /// Requested movement velocity (units per tick). The simulation clamps
    /// it to its own speed limits.
    pub velocity: Vec2Fx,
    /// Optional aim update; `None` means "keep facing as-is".
    pub aim: Option<AimTarget>,
    /// Discrete actions held during the tick.
    pub actions: ActionFlags,
}

impl InputFrame {
    /// The blank frame (no movement, no aim change, no actions).
    pub const BLANK: Self = Self {
        velocity: Vec2Fx::ZERO,
        aim: None,
        actions: ActionFlags::NONE,
    };

    /// Builder-style velocity assignment.
    #[must_use]
    pub const fn with_velocity(mut self, velocity: Vec2Fx) -> Self {
        self.velocity = velocity;
        self
    }

    /// Builder-style absolute aim; replaces any previous aim target.
    #[must_use]
    pub const fn with_absolute_aim(mut self, target: Vec2Fx) -> Self {
        self.aim = Some(AimTarget::Absolute(target));
        self
    }

    /// Builder-style relative aim; replaces any previous aim target.
    #[must_use]
    pub const fn with_relative_aim(mut self, direction: Vec2Fx) -> Self {
        self.aim = Some(AimTarget::Relative(direction));
        self
    }

    /// Builder-style action flags.
    #[must_use]
    pub const fn with_actions(mut self, actions: ActionFlags) -> Self {
        self.actions = actions;
        self
    }

    /// Resolves the aim target into a unit direction from `origin`, or
    /// `None` when the frame carries no aim update (or the resolved
    /// direction degenerates to zero, e.g. aiming at one's own position).
    #[must_use]
    pub fn aim_direction_from(&self, origin: Vec2Fx) -> Option<Vec2Fx> {
        let dir = match self.aim? {
            AimTarget::Absolute(point) => (point - origin).normalized_or_zero(),
            AimTarget::Relative(direction) => direction.normalized_or_zero(),
        };
        if dir == Vec2Fx::ZERO {
            None
        } else {
            Some(dir)
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
    use crate::fixed::fx;

    // ===== Action flags =====

    #[test]
    fn default_flags_are_empty() {
        assert!(ActionFlags::default().is_empty());
        assert_eq!(ActionFlags::default(), ActionFlags::NONE);
    }

    #[test]
    fn contains_checks_all_bits() {
        let held = ActionFlags::FIRE | ActionFlags::DASH;
        assert!(held.contains(ActionFlags::FIRE));
        assert!(held.contains(ActionFlags::DASH));
        assert!(held.contains(ActionFlags::FIRE | ActionFlags::DASH));
        assert!(!held.contains(ActionFlags::BRAKE));
        assert!(!held.contains(ActionFlags::FIRE | ActionFlags::BRAKE));
    }

    #[test]
    fn insert_and_remove() {
        let mut flags = ActionFlags::NONE;
        flags.insert(ActionFlags::INTERACT);
        assert!(flags.contains(ActionFlags::INTERACT));
        flags.insert(ActionFlags::FIRE);
        flags.remove(ActionFlags::INTERACT);
        assert!(flags.contains(ActionFlags::FIRE));
        assert!(!flags.contains(ActionFlags::INTERACT));
    }

    #[test]
    fn unknown_bits_survive_round_trips() {
        let exotic = ActionFlags::from_bits(0b1010_0000_0000_0000);
        assert_eq!(ActionFlags::from_bits(exotic.bits()), exotic);
    }

    // ===== Aim exclusivity =====

    #[test]
    fn default_frame_is_blank() {
        let frame = InputFrame::default();
        assert_eq!(frame, InputFrame::BLANK);
        assert_eq!(frame.velocity, Vec2Fx::ZERO);
        assert!(frame.aim.is_none());
        assert!(frame.actions.is_empty());
    }

    #[test]
    fn later_aim_assignment_replaces_earlier() {
        let frame = InputFrame::default()
            .with_absolute_aim(Vec2Fx::from_ints(5, 5))
            .with_relative_aim(Vec2Fx::from_ints(0, 1));
        // Exactly one target survives; the type cannot hold both.
        assert_eq!(frame.aim, Some(AimTarget::Relative(Vec2Fx::from_ints(0, 1))));
    }

    #[test]
    fn absolute_aim_resolves_toward_point() {
        let frame = InputFrame::default().with_absolute_aim(Vec2Fx::from_ints(10, 0));
        let dir = frame.aim_direction_from(Vec2Fx::from_ints(4, 0)).unwrap();
        assert_eq!(dir, Vec2Fx::new(fx(1), fx(0)));
    }

    #[test]
    fn relative_aim_resolves_to_unit_direction() {
        let frame = InputFrame::default().with_relative_aim(Vec2Fx::from_ints(0, -7));
        let dir = frame.aim_direction_from(Vec2Fx::from_ints(100, 100)).unwrap();
        assert_eq!(dir, Vec2Fx::new(fx(0), fx(-1)));
    }

    #[test]
    fn aiming_at_own_position_is_no_aim() {
        let origin = Vec2Fx::from_ints(3, 3);
        let frame = InputFrame::default().with_absolute_aim(origin);
        assert!(frame.aim_direction_from(origin).is_none());
    }

    #[test]
    fn blank_frame_has_no_aim_direction() {
        assert!(InputFrame::BLANK
            .aim_direction_from(Vec2Fx::from_ints(1, 2))
            .is_none());
    }

    // ===== Value semantics =====

    #[test]
    fn frames_compare_by_value() {
        let a = InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(1, 0))
            .with_actions(ActionFlags::FIRE);
        let b = InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(1, 0))
            .with_actions(ActionFlags::FIRE);
        assert_eq!(a, b);
        let c = b.with_actions(ActionFlags::DASH);
        assert_ne!(a, c);
    }
}
