//! A small free-for-all arena game: the crate's reference [`Simulation`].
//!
//! The rollback core is generic over the simulation it drives, which makes
//! it easy to test against stubs and hard to believe against nothing. This
//! module is the "nothing": a complete, playable top-down arena that
//! exercises every determinism rule the contract demands in practice.
//!
//! - All gameplay math is 16.16 fixed-point ([`crate::fixed`]).
//! - The only randomness is a [`Pcg32`] stream seeded at construction and
//!   advanced exclusively inside `update`.
//! - Every container iterates in a deterministic order: players by index,
//!   projectiles in spawn order, pickups by ascending id.
//! - The checksum hashes explicit fields in a fixed order, never pointers,
//!   capacities, or float bits.
//!
//! Two instances constructed from the same [`InitialConditions`] and fed the
//! same input frames stay bit-identical forever:
//!
//! ```
//! use bulwark_rollback::arena::{ArenaSim, InitialConditions};
//! use bulwark_rollback::{InputFrame, Simulation};
//!
//! let mut sim = ArenaSim::new(InitialConditions::new(1, 2))?;
//! let mut twin = sim.clone();
//! let inputs = [InputFrame::BLANK, InputFrame::BLANK];
//! for _ in 0..60 {
//!     sim.update(&inputs);
//!     twin.update(&inputs);
//! }
//! assert_eq!(sim.checksum(), twin.checksum());
//! # Ok::<(), bulwark_rollback::BulwarkError>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checksum::Fnv32;
use crate::error::BulwarkError;
use crate::fixed::{fx, Fixed, Vec2Fx};
use crate::input_frame::{ActionFlags, InputFrame};
use crate::rng::Pcg32;
use crate::Simulation;

// Arena tuning. Distances are in world units (16.16 fixed-point), durations
// in ticks at the nominal 60 Hz step.
const ARENA_HALF_EXTENT: Fixed = fx(240); // playfield is a square, center origin
const SPAWN_OFFSET: Fixed = fx(96); // horizontal distance from center at spawn
const SPAWN_ROW_STEP: Fixed = fx(48); // vertical spacing between spawn pairs
const BASE_SPEED: Fixed = fx(4); // per-axis speed cap, units per tick
const DASH_FACTOR: Fixed = fx(2); // dash doubles the capped velocity
const BRAKE_FACTOR: Fixed = Fixed::HALF; // brake halves it
const MUZZLE_OFFSET: Fixed = fx(16); // projectiles spawn this far along facing
const PROJECTILE_SPEED: Fixed = fx(10); // units per tick
const PROJECTILE_TTL_TICKS: u32 = 48; // lifetime before despawn
const PROJECTILE_DAMAGE: i32 = 20;
const FIRE_COOLDOWN_TICKS: u32 = 15; // quarter second between shots
const HIT_RADIUS: Fixed = fx(12); // projectile-to-player contact distance
const PLAYER_MAX_HEALTH: i32 = 100;
const PICKUP_INTERVAL_TICKS: u64 = 120; // spawn cadence in pickup mode
const PICKUP_SPAWN_EXTENT: Fixed = fx(200); // spawn area, inset from the walls
const PICKUP_RADIUS: Fixed = fx(16); // player-to-pickup contact distance
const PICKUP_HEAL: i32 = 25;
const SUDDEN_DEATH_START_TICK: u64 = 1800; // thirty seconds of grace
const SUDDEN_DEATH_INTERVAL_TICKS: u64 = 60; // one decay pulse per second
const SUDDEN_DEATH_DAMAGE: i32 = 5;

/// A bitset of optional arena rules.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModeFlags(u8);

impl ModeFlags {
    /// Plain deathmatch, no extras.
    pub const NONE: Self = Self(0);
    /// Periodic chip damage for everyone after a grace period.
    pub const SUDDEN_DEATH: Self = Self(1 << 0);
    /// Healing pickups spawn on a fixed cadence at PRNG locations.
    pub const PICKUPS: Self = Self(1 << 1);

    /// Creates a flag set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every flag in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ModeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Everything needed to construct an [`ArenaSim`] identically on every peer.
///
/// Ship these three values during session setup and both sides start from
/// the same bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InitialConditions {
    /// Seed for the arena's PRNG stream.
    pub seed: u64,
    /// Number of players, local and remote combined.
    pub player_count: usize,
    /// Optional rules.
    pub mode: ModeFlags,
}

impl InitialConditions {
    /// Conditions for a plain deathmatch with the given seed and roster size.
    #[must_use]
    pub const fn new(seed: u64, player_count: usize) -> Self {
        Self {
            seed,
            player_count,
            mode: ModeFlags::NONE,
        }
    }

    /// Builder-style mode assignment.
    #[must_use]
    pub const fn with_mode(mut self, mode: ModeFlags) -> Self {
        self.mode = mode;
        self
    }
}

/// One player's simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaPlayer {
    /// Position, clamped to the arena square.
    pub position: Vec2Fx,
    /// Velocity applied this tick.
    pub velocity: Vec2Fx,
    /// Unit-length aim direction; projectiles travel along it.
    pub facing: Vec2Fx,
    /// Remaining health; zero means eliminated.
    pub health: i32,
    /// Ticks until the next shot is allowed.
    pub fire_cooldown: u32,
}

impl ArenaPlayer {
    /// Whether this player is still in the match.
    #[must_use]
    pub const fn alive(self) -> bool {
        self.health > 0
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Current position.
    pub position: Vec2Fx,
    /// Velocity, fixed at spawn.
    pub velocity: Vec2Fx,
    /// Index of the player that fired it; immune to its own shots.
    pub owner: usize,
    /// Remaining lifetime in ticks.
    pub ttl: u32,
}

/// A healing pickup on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    /// Where it sits.
    pub position: Vec2Fx,
    /// Health restored on contact, capped at the player maximum.
    pub heal: i32,
}

/// The arena simulation itself.
///
/// `update` runs a fixed sequence of phases every tick; see the method body.
/// State is a plain value: `Clone` produces an independent copy with an
/// identical future, which is exactly what the rollback core needs for its
/// predicted timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaSim {
    tick: u64,
    mode: ModeFlags,
    players: Vec<ArenaPlayer>,
    /// Spawn order. Hit resolution walks this front to back.
    projectiles: Vec<Projectile>,
    /// Keyed by spawn id, so iteration order is insertion order.
    pickups: BTreeMap<u32, Pickup>,
    next_pickup_id: u32,
    rng: Pcg32,
}

impl ArenaSim {
    /// Builds the starting state for the given conditions.
    ///
    /// Players spawn in facing pairs: even indices on the left looking
    /// right, odd on the right looking left, extra pairs stacked downward.
    ///
    /// # Errors
    ///
    /// Returns [`BulwarkError::MappingInvalid`] when `player_count` is zero;
    /// an arena without players has no meaningful tick.
    pub fn new(conditions: InitialConditions) -> Result<Self, BulwarkError> {
        if conditions.player_count == 0 {
            return Err(BulwarkError::MappingInvalid {
                reason: "arena needs at least one player".to_owned(),
            });
        }
        let players = (0..conditions.player_count)
            .map(|index| {
                let side = if index % 2 == 0 { -1 } else { 1 };
                let row = (index / 2) as i32;
                ArenaPlayer {
                    position: Vec2Fx::new(SPAWN_OFFSET * side, SPAWN_ROW_STEP * row),
                    velocity: Vec2Fx::ZERO,
                    facing: Vec2Fx::new(fx(-side), Fixed::ZERO),
                    health: PLAYER_MAX_HEALTH,
                    fire_cooldown: 0,
                }
            })
            .collect();
        Ok(Self {
            tick: 0,
            mode: conditions.mode,
            players,
            projectiles: Vec::new(),
            pickups: BTreeMap::new(),
            next_pickup_id: 0,
            rng: Pcg32::seed_from_u64(conditions.seed),
        })
    }

    /// All players, indexed as in the input slice.
    #[must_use]
    pub fn players(&self) -> &[ArenaPlayer] {
        &self.players
    }

    /// One player by index, if the index is on the roster.
    #[must_use]
    pub fn player(&self, index: usize) -> Option<&ArenaPlayer> {
        self.players.get(index)
    }

    /// Projectiles currently in flight, in spawn order.
    #[must_use]
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Pickups on the floor, keyed by spawn id.
    #[must_use]
    pub fn pickups(&self) -> &BTreeMap<u32, Pickup> {
        &self.pickups
    }

    /// The active rule set.
    #[must_use]
    pub const fn mode(&self) -> ModeFlags {
        self.mode
    }

    /// Players still in the match.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|player| player.alive()).count()
    }

    fn fire_projectiles(&mut self, inputs: &[InputFrame]) {
        for (index, (player, input)) in self.players.iter_mut().zip(inputs).enumerate() {
            if !player.alive()
                || !input.actions.contains(ActionFlags::FIRE)
                || player.fire_cooldown > 0
            {
                continue;
            }
            player.fire_cooldown = FIRE_COOLDOWN_TICKS;
            self.projectiles.push(Projectile {
                position: player.position + player.facing * MUZZLE_OFFSET,
                velocity: player.facing * PROJECTILE_SPEED,
                owner: index,
                ttl: PROJECTILE_TTL_TICKS,
            });
        }
    }

    fn step_projectiles(&mut self) {
        for projectile in &mut self.projectiles {
            projectile.position += projectile.velocity;
            // Spawned nonzero, culled at zero below, so this cannot underflow.
            projectile.ttl -= 1;
        }

        // Resolve hits oldest projectile first, players in index order within
        // each test. The first contact consumes the projectile.
        for projectile in &mut self.projectiles {
            if projectile.ttl == 0 {
                continue;
            }
            for (target_index, target) in self.players.iter_mut().enumerate() {
                if target_index == projectile.owner || !target.alive() {
                    continue;
                }
                if within_radius(projectile.position, target.position, HIT_RADIUS) {
                    target.health = (target.health - PROJECTILE_DAMAGE).max(0);
                    projectile.ttl = 0;
                    break;
                }
            }
        }

        self.projectiles.retain(|projectile| {
            projectile.ttl > 0
                && projectile.position.x.abs() <= ARENA_HALF_EXTENT
                && projectile.position.y.abs() <= ARENA_HALF_EXTENT
        });
    }

    fn step_pickups(&mut self) {
        if self.tick % PICKUP_INTERVAL_TICKS == 0 {
            let x = self
                .rng
                .gen_fixed_range(-PICKUP_SPAWN_EXTENT, PICKUP_SPAWN_EXTENT);
            let y = self
                .rng
                .gen_fixed_range(-PICKUP_SPAWN_EXTENT, PICKUP_SPAWN_EXTENT);
            let id = self.next_pickup_id;
            self.next_pickup_id += 1;
            self.pickups.insert(
                id,
                Pickup {
                    position: Vec2Fx::new(x, y),
                    heal: PICKUP_HEAL,
                },
            );
        }

        // Consume on contact, lowest id first, lowest player index first.
        let mut consumed: Vec<u32> = Vec::new();
        for (&id, pickup) in &self.pickups {
            for player in &mut self.players {
                if player.alive() && within_radius(player.position, pickup.position, PICKUP_RADIUS)
                {
                    player.health = (player.health + pickup.heal).min(PLAYER_MAX_HEALTH);
                    consumed.push(id);
                    break;
                }
            }
        }
        for id in consumed {
            self.pickups.remove(&id);
        }
    }

    fn apply_sudden_death(&mut self) {
        if self.tick < SUDDEN_DEATH_START_TICK
            || (self.tick - SUDDEN_DEATH_START_TICK) % SUDDEN_DEATH_INTERVAL_TICKS != 0
        {
            return;
        }
        for player in &mut self.players {
            if player.alive() {
                player.health = (player.health - SUDDEN_DEATH_DAMAGE).max(0);
            }
        }
    }
}

impl Simulation for ArenaSim {
    /// One fixed-order tick. Expects exactly one frame per player, indexed
    /// as the roster is.
    fn update(&mut self, inputs: &[InputFrame]) {
        assert_eq!(
            inputs.len(),
            self.players.len(),
            "arena expects one input frame per player"
        );

        let decided = self.game_over();

        // 1. Cooldowns tick down.
        for player in &mut self.players {
            player.fire_cooldown = player.fire_cooldown.saturating_sub(1);
        }

        // 2. Steering: cap the requested velocity, apply dash or brake, turn
        //    toward the aim target. Holding both modifiers cancels them.
        for (player, input) in self.players.iter_mut().zip(inputs) {
            if !player.alive() {
                player.velocity = Vec2Fx::ZERO;
                continue;
            }
            let mut velocity = input.velocity.clamp_axes(BASE_SPEED);
            let dash = input.actions.contains(ActionFlags::DASH);
            let brake = input.actions.contains(ActionFlags::BRAKE);
            if dash && !brake {
                velocity = velocity * DASH_FACTOR;
            } else if brake && !dash {
                velocity = velocity * BRAKE_FACTOR;
            }
            player.velocity = velocity;
            if let Some(direction) = input.aim_direction_from(player.position) {
                player.facing = direction;
            }
        }

        // 3. Integration: one Euler step, then clamp to the arena square.
        for player in &mut self.players {
            player.position = (player.position + player.velocity).clamp_axes(ARENA_HALF_EXTENT);
        }

        // Combat stops once the match is decided; survivors can still move.
        if !decided {
            // 4. Fire, gated on cooldown.
            self.fire_projectiles(inputs);
            // 5. Projectile flight and hits.
            self.step_projectiles();
            // 6. Pickups spawn and get consumed.
            if self.mode.contains(ModeFlags::PICKUPS) {
                self.step_pickups();
            }
            // 7. Sudden-death decay.
            if self.mode.contains(ModeFlags::SUDDEN_DEATH) {
                self.apply_sudden_death();
            }
            // 8. Eliminations: the freshly dead stop moving and shooting.
            for player in &mut self.players {
                if !player.alive() {
                    player.velocity = Vec2Fx::ZERO;
                    player.fire_cooldown = 0;
                }
            }
        }

        // 9. The tick is complete.
        self.tick += 1;
    }

    /// Hashes every simulation field in declaration order. Containers
    /// contribute their elements in iteration order, which the struct
    /// guarantees is deterministic.
    fn checksum(&self) -> u32 {
        let mut hasher = Fnv32::new();
        hasher.write_u64(self.tick);
        hasher.write_u8(self.mode.bits());
        for player in &self.players {
            hasher.write_i32(player.position.x.raw());
            hasher.write_i32(player.position.y.raw());
            hasher.write_i32(player.velocity.x.raw());
            hasher.write_i32(player.velocity.y.raw());
            hasher.write_i32(player.facing.x.raw());
            hasher.write_i32(player.facing.y.raw());
            hasher.write_i32(player.health);
            hasher.write_u32(player.fire_cooldown);
        }
        for projectile in &self.projectiles {
            hasher.write_i32(projectile.position.x.raw());
            hasher.write_i32(projectile.position.y.raw());
            hasher.write_i32(projectile.velocity.x.raw());
            hasher.write_i32(projectile.velocity.y.raw());
            hasher.write_u32(projectile.owner as u32);
            hasher.write_u32(projectile.ttl);
        }
        for (&id, pickup) in &self.pickups {
            hasher.write_u32(id);
            hasher.write_i32(pickup.position.x.raw());
            hasher.write_i32(pickup.position.y.raw());
            hasher.write_i32(pickup.heal);
        }
        hasher.write_u32(self.next_pickup_id);
        let (state, increment) = self.rng.state_raw();
        hasher.write_u64(state);
        hasher.write_u64(increment);
        hasher.finish()
    }

    fn tick_count(&self) -> u64 {
        self.tick
    }

    /// A multiplayer match ends when at most one player is alive; a solo
    /// run ends when its only player dies.
    fn game_over(&self) -> bool {
        let alive = self.alive_count();
        if self.players.len() == 1 {
            alive == 0
        } else {
            alive <= 1
        }
    }
}

/// Contact test with a cheap box rejection first. The box test keeps the
/// squared terms inside 16.16 range; arena-scale deltas would overflow it.
fn within_radius(a: Vec2Fx, b: Vec2Fx, radius: Fixed) -> bool {
    let delta = a - b;
    if delta.x.abs() > radius || delta.y.abs() > radius {
        return false;
    }
    delta.length_sq() <= radius * radius
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

    fn deathmatch(player_count: usize) -> ArenaSim {
        ArenaSim::new(InitialConditions::new(42, player_count)).unwrap()
    }

    fn blank_inputs(count: usize) -> Vec<InputFrame> {
        vec![InputFrame::BLANK; count]
    }

    fn fire() -> InputFrame {
        InputFrame::default().with_actions(ActionFlags::FIRE)
    }

    // ################
    // # CONSTRUCTION #
    // ################

    #[test]
    fn zero_players_is_rejected() {
        let err = ArenaSim::new(InitialConditions::new(1, 0)).unwrap_err();
        assert!(matches!(err, BulwarkError::MappingInvalid { .. }));
    }

    #[test]
    fn spawn_pairs_face_each_other() {
        let sim = deathmatch(2);
        let left = sim.player(0).unwrap();
        let right = sim.player(1).unwrap();
        assert_eq!(left.position, Vec2Fx::new(-SPAWN_OFFSET, Fixed::ZERO));
        assert_eq!(right.position, Vec2Fx::new(SPAWN_OFFSET, Fixed::ZERO));
        assert_eq!(left.facing, Vec2Fx::from_ints(1, 0));
        assert_eq!(right.facing, Vec2Fx::from_ints(-1, 0));
        assert!(left.alive() && right.alive());
    }

    #[test]
    fn extra_players_stack_in_rows() {
        let sim = deathmatch(4);
        assert_eq!(sim.player(2).unwrap().position.y, SPAWN_ROW_STEP);
        assert_eq!(sim.player(3).unwrap().position.y, SPAWN_ROW_STEP);
        assert_eq!(sim.player(2).unwrap().position.x, -SPAWN_OFFSET);
    }

    #[test]
    fn with_mode_sets_flags() {
        let conditions =
            InitialConditions::new(9, 2).with_mode(ModeFlags::PICKUPS | ModeFlags::SUDDEN_DEATH);
        let sim = ArenaSim::new(conditions).unwrap();
        assert!(sim.mode().contains(ModeFlags::PICKUPS));
        assert!(sim.mode().contains(ModeFlags::SUDDEN_DEATH));
    }

    // ###############
    // # DETERMINISM #
    // ###############

    #[test]
    fn identical_runs_stay_bit_identical() {
        let conditions = InitialConditions::new(7, 2).with_mode(ModeFlags::PICKUPS);
        let mut sim = ArenaSim::new(conditions).unwrap();
        let mut twin = ArenaSim::new(conditions).unwrap();
        for tick in 0..240u32 {
            // A busy script: both players move, aim, and shoot.
            let script = [
                InputFrame::default()
                    .with_velocity(Vec2Fx::from_ints(3, 1))
                    .with_actions(ActionFlags::FIRE | ActionFlags::DASH),
                InputFrame::default()
                    .with_velocity(Vec2Fx::from_ints(-2, (tick % 5) as i32 - 2))
                    .with_absolute_aim(Vec2Fx::from_ints(0, 0))
                    .with_actions(ActionFlags::FIRE),
            ];
            sim.update(&script);
            twin.update(&script);
            assert_eq!(sim.checksum(), twin.checksum(), "diverged at tick {tick}");
        }
        assert_eq!(sim, twin);
    }

    #[test]
    fn clone_preserves_the_future() {
        let mut sim = deathmatch(2);
        let script = [fire(), InputFrame::default().with_velocity(Vec2Fx::from_ints(0, 2))];
        for _ in 0..30 {
            sim.update(&script);
        }
        let mut forked = sim.clone();
        for _ in 0..30 {
            sim.update(&script);
            forked.update(&script);
        }
        assert_eq!(sim.checksum(), forked.checksum());
    }

    #[test]
    fn seed_is_part_of_the_checksum() {
        let a = ArenaSim::new(InitialConditions::new(1, 2)).unwrap();
        let b = ArenaSim::new(InitialConditions::new(2, 2)).unwrap();
        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn checksum_changes_every_tick() {
        let mut sim = deathmatch(2);
        let mut previous = sim.checksum();
        for _ in 0..5 {
            sim.update(&blank_inputs(2));
            let current = sim.checksum();
            assert_ne!(current, previous);
            previous = current;
        }
    }

    // ############
    // # MOVEMENT #
    // ############

    #[test]
    fn velocity_is_capped_per_axis() {
        let mut sim = deathmatch(1);
        let start = sim.player(0).unwrap().position;
        sim.update(&[InputFrame::default().with_velocity(Vec2Fx::from_ints(999, 0))]);
        let end = sim.player(0).unwrap().position;
        assert_eq!(end.x - start.x, BASE_SPEED);
        assert_eq!(end.y, start.y);
    }

    #[test]
    fn dash_doubles_and_brake_halves() {
        let mut sim = deathmatch(1);
        let start = sim.player(0).unwrap().position;

        sim.update(&[InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(4, 0))
            .with_actions(ActionFlags::DASH)]);
        let after_dash = sim.player(0).unwrap().position;
        assert_eq!(after_dash.x - start.x, BASE_SPEED * DASH_FACTOR);

        sim.update(&[InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(4, 0))
            .with_actions(ActionFlags::BRAKE)]);
        let after_brake = sim.player(0).unwrap().position;
        assert_eq!(after_brake.x - after_dash.x, BASE_SPEED * BRAKE_FACTOR);

        // Both held: neither applies.
        sim.update(&[InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(4, 0))
            .with_actions(ActionFlags::DASH | ActionFlags::BRAKE)]);
        let after_both = sim.player(0).unwrap().position;
        assert_eq!(after_both.x - after_brake.x, BASE_SPEED);
    }

    #[test]
    fn walls_clamp_position() {
        let mut sim = deathmatch(1);
        let push = [InputFrame::default().with_velocity(Vec2Fx::from_ints(999, 0))];
        for _ in 0..200 {
            sim.update(&push);
        }
        assert_eq!(sim.player(0).unwrap().position.x, ARENA_HALF_EXTENT);
    }

    #[test]
    fn aim_turns_the_player() {
        let mut sim = deathmatch(2);
        sim.update(&[
            InputFrame::default().with_relative_aim(Vec2Fx::from_ints(0, 7)),
            InputFrame::BLANK,
        ]);
        assert_eq!(sim.player(0).unwrap().facing, Vec2Fx::from_ints(0, 1));
        // Blank aim keeps the previous facing.
        assert_eq!(sim.player(1).unwrap().facing, Vec2Fx::from_ints(-1, 0));
    }

    // ##########
    // # COMBAT #
    // ##########

    #[test]
    fn fire_spawns_one_projectile_per_cooldown() {
        let mut sim = deathmatch(1);
        sim.update(&[fire()]);
        assert_eq!(sim.projectiles().len(), 1);
        let slug = sim.projectiles()[0];
        assert_eq!(slug.owner, 0);
        assert_eq!(slug.velocity, Vec2Fx::new(PROJECTILE_SPEED, Fixed::ZERO));

        // Held fire inside the cooldown window adds nothing.
        for _ in 0..(FIRE_COOLDOWN_TICKS - 1) {
            sim.update(&[fire()]);
        }
        assert_eq!(sim.projectiles().len(), 1);
        sim.update(&[fire()]);
        assert_eq!(sim.projectiles().len(), 2);
    }

    #[test]
    fn projectiles_despawn_after_ttl() {
        let mut sim = deathmatch(1);
        sim.update(&[fire()]);
        assert_eq!(sim.projectiles().len(), 1);
        for _ in 0..PROJECTILE_TTL_TICKS {
            sim.update(&blank_inputs(1));
        }
        assert!(sim.projectiles().is_empty());
    }

    #[test]
    fn shots_across_the_arena_land() {
        let mut sim = deathmatch(2);
        // Player 0 holds fire; the spawn layout has player 1 straight ahead.
        let script = [fire(), InputFrame::BLANK];
        for _ in 0..40 {
            sim.update(&script);
        }
        assert!(sim.player(1).unwrap().health < PLAYER_MAX_HEALTH);
        assert_eq!(sim.player(0).unwrap().health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn own_projectiles_never_hit_the_shooter() {
        let mut sim = deathmatch(1);
        // Fire and then dash along the shot's path every tick.
        let chase = InputFrame::default()
            .with_velocity(Vec2Fx::from_ints(10, 0))
            .with_actions(ActionFlags::FIRE | ActionFlags::DASH);
        for _ in 0..120 {
            sim.update(&[chase]);
        }
        assert_eq!(sim.player(0).unwrap().health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn dead_players_stop_acting() {
        let mut sim = deathmatch(2);
        sim.players[1].health = 1;
        let script = [fire(), fire()];
        let mut killed_at = None;
        for tick in 0..60 {
            sim.update(&script);
            if !sim.player(1).unwrap().alive() {
                killed_at = Some(tick);
                break;
            }
        }
        assert!(killed_at.is_some(), "player 1 should have been eliminated");
        assert_eq!(sim.player(1).unwrap().velocity, Vec2Fx::ZERO);

        // Further frames from the dead player change nothing about them.
        let projectiles_before = sim.projectiles().len();
        sim.update(&[
            InputFrame::BLANK,
            InputFrame::default()
                .with_velocity(Vec2Fx::from_ints(4, 4))
                .with_actions(ActionFlags::FIRE),
        ]);
        assert_eq!(sim.player(1).unwrap().velocity, Vec2Fx::ZERO);
        assert!(sim.projectiles().len() <= projectiles_before);
    }

    #[test]
    fn match_is_decided_at_one_survivor() {
        let mut sim = deathmatch(2);
        assert!(!sim.game_over());
        sim.players[1].health = 0;
        assert!(sim.game_over());

        // The survivor can still move afterwards; combat is frozen.
        let before = sim.projectiles().len();
        sim.update(&[fire().with_velocity(Vec2Fx::from_ints(2, 0)), InputFrame::BLANK]);
        assert_eq!(sim.projectiles().len(), before);
        assert_ne!(sim.player(0).unwrap().velocity, Vec2Fx::ZERO);
    }

    #[test]
    fn solo_runs_end_only_on_death() {
        let mut sim = deathmatch(1);
        assert!(!sim.game_over());
        sim.players[0].health = 0;
        assert!(sim.game_over());
    }

    // ###########
    // # PICKUPS #
    // ###########

    #[test]
    fn pickups_spawn_on_cadence() {
        let conditions = InitialConditions::new(3, 2).with_mode(ModeFlags::PICKUPS);
        let mut sim = ArenaSim::new(conditions).unwrap();
        sim.update(&blank_inputs(2));
        assert_eq!(sim.next_pickup_id, 1);
        for _ in 0..PICKUP_INTERVAL_TICKS {
            sim.update(&blank_inputs(2));
        }
        assert_eq!(sim.next_pickup_id, 2);
    }

    #[test]
    fn pickups_do_not_spawn_without_the_mode() {
        let mut sim = deathmatch(2);
        for _ in 0..=PICKUP_INTERVAL_TICKS {
            sim.update(&blank_inputs(2));
        }
        assert!(sim.pickups().is_empty());
        assert_eq!(sim.next_pickup_id, 0);
    }

    #[test]
    fn contact_consumes_and_heals() {
        let conditions = InitialConditions::new(3, 2).with_mode(ModeFlags::PICKUPS);
        let mut sim = ArenaSim::new(conditions).unwrap();
        // Discard the tick-zero spawn so only our planted pickup can be in
        // range of the stationary players.
        sim.update(&blank_inputs(2));
        sim.pickups.clear();
        sim.players[0].health = 50;
        sim.pickups.insert(
            99,
            Pickup {
                position: sim.players[0].position,
                heal: PICKUP_HEAL,
            },
        );
        sim.update(&blank_inputs(2));
        assert_eq!(sim.player(0).unwrap().health, 50 + PICKUP_HEAL);
        assert!(!sim.pickups().contains_key(&99));
    }

    #[test]
    fn healing_is_capped_at_max() {
        let conditions = InitialConditions::new(3, 2).with_mode(ModeFlags::PICKUPS);
        let mut sim = ArenaSim::new(conditions).unwrap();
        sim.update(&blank_inputs(2));
        sim.pickups.clear();
        sim.players[0].health = PLAYER_MAX_HEALTH - 5;
        sim.pickups.insert(
            99,
            Pickup {
                position: sim.players[0].position,
                heal: PICKUP_HEAL,
            },
        );
        sim.update(&blank_inputs(2));
        assert_eq!(sim.player(0).unwrap().health, PLAYER_MAX_HEALTH);
    }

    // ################
    // # SUDDEN DEATH #
    // ################

    #[test]
    fn no_decay_during_grace_period() {
        let conditions = InitialConditions::new(5, 2).with_mode(ModeFlags::SUDDEN_DEATH);
        let mut sim = ArenaSim::new(conditions).unwrap();
        for _ in 0..SUDDEN_DEATH_START_TICK {
            sim.update(&blank_inputs(2));
        }
        assert_eq!(sim.player(0).unwrap().health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn decay_pulses_after_grace_period() {
        let conditions = InitialConditions::new(5, 2).with_mode(ModeFlags::SUDDEN_DEATH);
        let mut sim = ArenaSim::new(conditions).unwrap();
        for _ in 0..=SUDDEN_DEATH_START_TICK {
            sim.update(&blank_inputs(2));
        }
        assert_eq!(
            sim.player(0).unwrap().health,
            PLAYER_MAX_HEALTH - SUDDEN_DEATH_DAMAGE
        );
    }

    #[test]
    fn sudden_death_ends_stalemates() {
        let conditions = InitialConditions::new(5, 2).with_mode(ModeFlags::SUDDEN_DEATH);
        let mut sim = ArenaSim::new(conditions).unwrap();
        let pulses = u64::from(PLAYER_MAX_HEALTH as u32 / SUDDEN_DEATH_DAMAGE as u32);
        let enough = SUDDEN_DEATH_START_TICK + pulses * SUDDEN_DEATH_INTERVAL_TICKS + 1;
        for _ in 0..enough {
            sim.update(&blank_inputs(2));
        }
        assert!(sim.game_over());
        assert_eq!(sim.alive_count(), 0);
    }
}
