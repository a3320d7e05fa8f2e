//! Combat math, the request bus and elemental reactions.
//!
//! The resolver that drains the bus lives in `systems::combat`.

pub mod bus;
pub mod reactions;

pub use bus::{CombatBus, CombatRequest};
pub use reactions::{Reaction, ReactionKind, ReactionRegistry, Triggered};

use crate::components::Element;

/// Armor at which physical damage is halved.
pub const ARMOR_SCALE: f32 = 100.0;

/// Armor after the armor-broken status is accounted for.
#[inline]
pub fn effective_armor(armor: f32, armor_broken: bool) -> f32 {
    let armor = armor.max(0.0);
    if armor_broken {
        armor * 0.5
    } else {
        armor
    }
}

/// Mitigate incoming damage. Only physical damage is reduced by armor.
#[inline]
pub fn mitigate(damage: f32, element: Element, armor: f32, armor_broken: bool) -> f32 {
    if element != Element::Physical {
        return damage;
    }
    damage * ARMOR_SCALE / (ARMOR_SCALE + effective_armor(armor, armor_broken))
}
