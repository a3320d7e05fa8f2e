//! Elemental reactions.
//!
//! A reaction fires when a hit of some element lands on a unit carrying a
//! matching status with enough stacks. Reactions are asymmetric and consume
//! the triggering status, so a second hit in the same drain finds nothing.

use crate::components::Element;
use crate::status::{StatusBag, StatusKind};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Frozen + thermal: burst of true damage per frozen stack.
    Shatter,
    /// Shocked + cryo: hard freeze plus stun.
    Superconduct,
    /// Burning + electric: true damage to everyone around the target.
    Overload,
    /// Poisoned + thermal: detonate the remaining poison at once.
    Combust,
}

impl ReactionKind {
    pub fn label(self) -> &'static str {
        match self {
            ReactionKind::Shatter => "SHATTER",
            ReactionKind::Superconduct => "SUPERCONDUCT",
            ReactionKind::Overload => "OVERLOAD",
            ReactionKind::Combust => "COMBUST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub trigger: StatusKind,
    pub element: Element,
    /// Minimum stacks of `trigger` required.
    pub min_stacks: u8,
    /// Damage per consumed stack (Shatter, Overload) or duration (Superconduct).
    pub power: f32,
    /// Area radius for Overload.
    pub radius: f32,
}

/// What the resolver should do once a reaction triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triggered {
    pub reaction: Reaction,
    /// Stacks the trigger status held when consumed.
    pub stacks: u8,
    /// Remaining duration the trigger status held when consumed.
    pub remaining: f32,
}

impl Triggered {
    /// Bonus true damage dealt by the reaction to its primary target.
    pub fn bonus_damage(&self) -> f32 {
        match self.reaction.kind {
            ReactionKind::Shatter | ReactionKind::Overload => self.reaction.power * self.stacks as f32,
            ReactionKind::Combust => {
                self.reaction.power * self.stacks as f32 * self.remaining.max(0.0)
            }
            ReactionKind::Superconduct => 0.0,
        }
    }
}

/// Registry keyed by `(existing status, incoming element)`.
#[derive(Resource, Debug, Clone, Default)]
pub struct ReactionRegistry {
    table: HashMap<(StatusKind, Element), Reaction>,
}

impl ReactionRegistry {
    pub fn register(&mut self, reaction: Reaction) {
        self.table.insert((reaction.trigger, reaction.element), reaction);
    }

    pub fn get(&self, status: StatusKind, element: Element) -> Option<&Reaction> {
        self.table.get(&(status, element))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Find a reaction for this hit and consume its trigger status.
    ///
    /// Statuses are checked in `StatusKind` order; at most one reaction
    /// fires per hit.
    pub fn trigger(&self, statuses: &mut StatusBag, element: Element) -> Option<Triggered> {
        let reaction = StatusKind::ALL.iter().find_map(|&kind| {
            let reaction = self.get(kind, element)?;
            (statuses.stacks(kind) >= reaction.min_stacks.max(1)).then_some(*reaction)
        })?;
        let consumed = statuses.remove(reaction.trigger)?;
        Some(Triggered {
            reaction,
            stacks: consumed.stacks,
            remaining: consumed.remaining,
        })
    }

    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(Reaction {
            kind: ReactionKind::Shatter,
            trigger: StatusKind::Frozen,
            element: Element::Thermal,
            min_stacks: 2,
            power: 12.0,
            radius: 0.0,
        });
        registry.register(Reaction {
            kind: ReactionKind::Superconduct,
            trigger: StatusKind::Shocked,
            element: Element::Cryo,
            min_stacks: 1,
            power: 1.5,
            radius: 0.0,
        });
        registry.register(Reaction {
            kind: ReactionKind::Overload,
            trigger: StatusKind::Burning,
            element: Element::Electric,
            min_stacks: 2,
            power: 8.0,
            radius: 48.0,
        });
        registry.register(Reaction {
            kind: ReactionKind::Combust,
            trigger: StatusKind::Poisoned,
            element: Element::Thermal,
            min_stacks: 3,
            power: crate::status::POISON_DPS_PER_STACK,
            radius: 0.0,
        });
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shatter_consumes_frozen_once() {
        let registry = ReactionRegistry::standard();
        let mut bag = StatusBag::default();
        bag.apply(StatusKind::Frozen, 3, 2.0);

        let first = registry.trigger(&mut bag, Element::Thermal).unwrap();
        assert_eq!(first.reaction.kind, ReactionKind::Shatter);
        assert_eq!(first.bonus_damage(), 36.0);
        assert!(!bag.has(StatusKind::Frozen));
        assert!(registry.trigger(&mut bag, Element::Thermal).is_none());
    }

    #[test]
    fn test_below_threshold_does_not_trigger() {
        let registry = ReactionRegistry::standard();
        let mut bag = StatusBag::default();
        bag.apply(StatusKind::Frozen, 1, 2.0);
        assert!(registry.trigger(&mut bag, Element::Thermal).is_none());
        assert_eq!(bag.stacks(StatusKind::Frozen), 1);
    }

    #[test]
    fn test_reactions_are_asymmetric() {
        let registry = ReactionRegistry::standard();
        let mut bag = StatusBag::default();
        bag.apply(StatusKind::Burning, 3, 2.0);
        // Thermal on burning is not a reaction; cryo on burning neither.
        assert!(registry.trigger(&mut bag, Element::Thermal).is_none());
        assert!(registry.trigger(&mut bag, Element::Cryo).is_none());
        assert!(registry.trigger(&mut bag, Element::Electric).is_some());
    }

    #[test]
    fn test_combust_scales_with_remaining_poison() {
        let registry = ReactionRegistry::standard();
        let mut bag = StatusBag::default();
        bag.apply(StatusKind::Poisoned, 4, 2.0);
        let triggered = registry.trigger(&mut bag, Element::Thermal).unwrap();
        assert_eq!(triggered.reaction.kind, ReactionKind::Combust);
        assert!((triggered.bonus_damage() - 2.5 * 4.0 * 2.0).abs() < 1e-4);
    }
}
