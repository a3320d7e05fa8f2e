//! Unit data records for the Vanguard simulation.
//!
//! Units are plain data. Behaviour comes from the trait bindings each unit
//! carries; the systems fold those bindings over the record every tick.

use crate::behavior::TraitBinding;
use crate::pool::UnitHandle;
use crate::status::StatusBag;
use crate::terrain::ObstacleId;
use glam::Vec2;
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY
// ============================================================================

/// Faction/side identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Friendly,
    Hostile,
}

impl Faction {
    pub fn opponent(self) -> Self {
        match self {
            Faction::Friendly => Faction::Hostile,
            Faction::Hostile => Faction::Friendly,
        }
    }

    /// Direction of advance along the scroll axis.
    pub fn forward(self) -> f32 {
        match self {
            Faction::Friendly => 1.0,
            Faction::Hostile => -1.0,
        }
    }
}

impl Default for Faction {
    fn default() -> Self {
        Self::Friendly
    }
}

/// Damage element. Only `Physical` is mitigated by armor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Physical,
    Thermal,
    Cryo,
    Electric,
    Toxic,
}

impl Default for Element {
    fn default() -> Self {
        Self::Physical
    }
}

/// Enumerated unit archetypes for both factions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    // Friendly
    Militia,
    Archer,
    Knight,
    Pyromancer,
    Cryomancer,
    Stormcaller,
    Sapper,
    Berserker,
    // Hostile
    Grunt,
    Raider,
    Brute,
    Spitter,
    Shaman,
    Bomber,
}

impl UnitKind {
    pub const ALL: [UnitKind; 14] = [
        UnitKind::Militia,
        UnitKind::Archer,
        UnitKind::Knight,
        UnitKind::Pyromancer,
        UnitKind::Cryomancer,
        UnitKind::Stormcaller,
        UnitKind::Sapper,
        UnitKind::Berserker,
        UnitKind::Grunt,
        UnitKind::Raider,
        UnitKind::Brute,
        UnitKind::Spitter,
        UnitKind::Shaman,
        UnitKind::Bomber,
    ];
}

// ============================================================================
// COMBAT STATS
// ============================================================================

/// Derived combat stats of a live unit (level and modifiers already applied).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    pub hp: f32,
    pub max_hp: f32,
    pub damage: f32,
    pub range: f32,
    pub move_speed: f32,
    /// Seconds between attacks.
    pub attack_interval: f32,
    pub armor: f32,
    /// Probability (0.0 - 1.0) that a hit is critical.
    pub crit_chance: f32,
    pub crit_multiplier: f32,
    pub element: Element,
}

impl CombatStats {
    /// Stat block for a unit type with no registered archetype.
    ///
    /// Harmless: no damage, no movement, one hit point so it can still be
    /// cleared by any damage source.
    pub fn inert() -> Self {
        Self {
            hp: 1.0,
            max_hp: 1.0,
            damage: 0.0,
            range: 0.0,
            move_speed: 0.0,
            attack_interval: 1.0,
            armor: 0.0,
            crit_chance: 0.0,
            crit_multiplier: 1.0,
            element: Element::Physical,
        }
    }

    pub fn hp_fraction(&self) -> f32 {
        if self.max_hp <= 0.0 {
            0.0
        } else {
            (self.hp / self.max_hp).clamp(0.0, 1.0)
        }
    }
}

impl Default for CombatStats {
    fn default() -> Self {
        Self::inert()
    }
}

// ============================================================================
// LIFECYCLE & CONTEXT
// ============================================================================

/// Lifecycle of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Slot is on the free list.
    #[default]
    Free,
    /// Live unit.
    Active,
    /// Dead; slot is held until the decay timer elapses.
    Decaying,
}

/// Mode flag: unit is holding position on an engaged target.
pub const FLAG_ENGAGED: u32 = 1 << 0;
/// Mode flag: unit is currently attacking an obstacle.
pub const FLAG_SIEGING: u32 = 1 << 1;

/// Per-unit scratch state written by traits.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UnitContext {
    /// Current unit target.
    pub target: Option<UnitHandle>,
    /// Current obstacle target (walls).
    pub obstacle_target: Option<ObstacleId>,
    /// Countdown until target-acquisition hooks run again.
    pub retarget_timer: f32,
    /// Free timers for traits.
    pub timers: [f32; 4],
    /// Mode flags (`FLAG_*`).
    pub flags: u32,
}

impl UnitContext {
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }
}

// ============================================================================
// UNIT RECORD
// ============================================================================

/// A unit record living in a pool slot.
#[derive(Debug, Clone)]
pub struct Unit {
    pub handle: UnitHandle,
    pub faction: Faction,
    pub kind: UnitKind,
    pub level: u32,
    pub pos: Vec2,
    pub velocity: Vec2,
    /// +1.0 facing right, -1.0 facing left.
    pub facing: f32,
    pub radius: f32,
    pub stats: CombatStats,
    pub statuses: StatusBag,
    pub context: UnitContext,
    /// Countdown until the next attack is allowed.
    pub attack_timer: f32,
    /// Countdown until a dead unit's slot is reclaimed.
    pub decay_timer: f32,
    pub lifecycle: Lifecycle,
    /// Resource reward granted when this unit dies.
    pub bounty: f32,
    /// Ordered behaviour bindings.
    pub traits: Vec<TraitBinding>,
}

impl Unit {
    /// An empty record for a free slot.
    pub fn vacant(handle: UnitHandle) -> Self {
        Self {
            handle,
            faction: Faction::Friendly,
            kind: UnitKind::Militia,
            level: 0,
            pos: Vec2::ZERO,
            velocity: Vec2::ZERO,
            facing: 1.0,
            radius: 0.0,
            stats: CombatStats::inert(),
            statuses: StatusBag::default(),
            context: UnitContext::default(),
            attack_timer: 0.0,
            decay_timer: 0.0,
            lifecycle: Lifecycle::Free,
            bounty: 0.0,
            traits: Vec::new(),
        }
    }

    /// Return the record to its vacant state so nothing leaks from a prior
    /// occupant. Keeps the handle, lifecycle and the trait list allocation.
    pub fn reset_transient(&mut self) {
        let mut traits = std::mem::take(&mut self.traits);
        traits.clear();
        *self = Self {
            traits,
            lifecycle: self.lifecycle,
            ..Self::vacant(self.handle)
        };
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.lifecycle == Lifecycle::Decaying
    }

    pub fn distance_to(&self, other: &Unit) -> f32 {
        self.pos.distance(other.pos)
    }

    /// Whether `other` is within attack reach (range plus both radii).
    pub fn in_reach_of(&self, other: &Unit) -> bool {
        let reach = self.stats.range + self.radius + other.radius;
        self.pos.distance_squared(other.pos) <= reach * reach
    }
}
