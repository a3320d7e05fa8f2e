//! Stacking status effects.
//!
//! A unit's statuses live in a fixed-size bag indexed by kind, so applying,
//! decaying and clearing them never allocates.

use serde::{Deserialize, Serialize};

pub const STATUS_KIND_COUNT: usize = 8;

/// Burning/Poisoned true damage per second per stack.
pub const BURN_DPS_PER_STACK: f32 = 4.0;
pub const POISON_DPS_PER_STACK: f32 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Burning,
    Frozen,
    Shocked,
    Poisoned,
    ArmorBroken,
    Stunned,
    Frenzied,
    Slowed,
}

impl StatusKind {
    pub const ALL: [StatusKind; STATUS_KIND_COUNT] = [
        StatusKind::Burning,
        StatusKind::Frozen,
        StatusKind::Shocked,
        StatusKind::Poisoned,
        StatusKind::ArmorBroken,
        StatusKind::Stunned,
        StatusKind::Frenzied,
        StatusKind::Slowed,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// Stack cap per kind.
    pub fn max_stacks(self) -> u8 {
        match self {
            StatusKind::Burning => 5,
            StatusKind::Frozen => 5,
            StatusKind::Shocked => 3,
            StatusKind::Poisoned => 8,
            StatusKind::ArmorBroken => 1,
            StatusKind::Stunned => 1,
            StatusKind::Frenzied => 3,
            StatusKind::Slowed => 3,
        }
    }

    /// True damage per second per stack.
    pub fn damage_per_stack(self) -> f32 {
        match self {
            StatusKind::Burning => BURN_DPS_PER_STACK,
            StatusKind::Poisoned => POISON_DPS_PER_STACK,
            _ => 0.0,
        }
    }
}

/// One active status on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub stacks: u8,
    /// Remaining duration in seconds.
    pub remaining: f32,
}

/// Fixed-capacity bag of statuses, at most one entry per kind.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusBag {
    slots: [Option<StatusEffect>; STATUS_KIND_COUNT],
}

impl StatusBag {
    /// Add stacks (capped) and extend duration to the longer of existing and
    /// incoming. Returns the resulting stack count.
    pub fn apply(&mut self, kind: StatusKind, stacks: u8, duration: f32) -> u8 {
        if stacks == 0 || duration <= 0.0 {
            return self.stacks(kind);
        }
        let cap = kind.max_stacks();
        let slot = &mut self.slots[kind.index()];
        match slot {
            Some(effect) => {
                effect.stacks = effect.stacks.saturating_add(stacks).min(cap);
                effect.remaining = effect.remaining.max(duration);
                effect.stacks
            }
            None => {
                let stacks = stacks.min(cap);
                *slot = Some(StatusEffect { kind, stacks, remaining: duration });
                stacks
            }
        }
    }

    pub fn get(&self, kind: StatusKind) -> Option<&StatusEffect> {
        self.slots[kind.index()].as_ref()
    }

    pub fn stacks(&self, kind: StatusKind) -> u8 {
        self.get(kind).map(|e| e.stacks).unwrap_or(0)
    }

    pub fn has(&self, kind: StatusKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn remove(&mut self, kind: StatusKind) -> Option<StatusEffect> {
        self.slots[kind.index()].take()
    }

    pub fn clear(&mut self) {
        self.slots = [None; STATUS_KIND_COUNT];
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusEffect> {
        self.slots.iter().flatten()
    }

    /// Advance all durations by `dt`, removing expired entries.
    ///
    /// Returns the damage-over-time dealt during this interval.
    pub fn tick(&mut self, dt: f32) -> f32 {
        let mut dot = 0.0;
        for slot in self.slots.iter_mut() {
            if let Some(effect) = slot {
                let active = dt.min(effect.remaining.max(0.0));
                dot += effect.kind.damage_per_stack() * effect.stacks as f32 * active;
                effect.remaining -= dt;
                if effect.remaining <= 0.0 {
                    *slot = None;
                }
            }
        }
        dot
    }

    /// Stunned units and fully frozen units cannot move or attack.
    pub fn can_act(&self) -> bool {
        !self.has(StatusKind::Stunned)
            && self.stacks(StatusKind::Frozen) < StatusKind::Frozen.max_stacks()
    }

    pub fn move_speed_multiplier(&self) -> f32 {
        if !self.can_act() {
            return 0.0;
        }
        let frozen = 1.0 - 0.15 * self.stacks(StatusKind::Frozen) as f32;
        let slowed = 1.0 - 0.2 * self.stacks(StatusKind::Slowed) as f32;
        (frozen * slowed).max(0.0)
    }

    pub fn attack_rate_multiplier(&self) -> f32 {
        let frozen = 1.0 - 0.1 * self.stacks(StatusKind::Frozen) as f32;
        let slowed = 1.0 - 0.1 * self.stacks(StatusKind::Slowed) as f32;
        (frozen * slowed).max(0.1)
    }

    /// Outgoing damage multiplier from frenzy.
    pub fn damage_multiplier(&self) -> f32 {
        1.0 + 0.25 * self.stacks(StatusKind::Frenzied) as f32
    }

    pub fn is_armor_broken(&self) -> bool {
        self.has(StatusKind::ArmorBroken)
    }

    /// Status with the most stacks, for tinting. Ties go to the earlier kind.
    pub fn dominant(&self) -> Option<StatusKind> {
        let mut best: Option<&StatusEffect> = None;
        for effect in self.iter() {
            if best.map_or(true, |b| effect.stacks > b.stacks) {
                best = Some(effect);
            }
        }
        best.map(|e| e.kind)
    }
}
