//! Behaviour composition.
//!
//! A unit's behaviour is the ordered list of trait bindings it carries. Each
//! trait is a stateless object with optional lifecycle hooks; the driver folds
//! every bound trait's hooks over the unit in list order. New archetypes are
//! new binding lists, never new code paths in the driver.
//!
//! Traits never touch the resolver. They read the world through a
//! [`HookContext`] and push [`CombatRequest`]s onto the bus.

pub mod library;

use crate::combat::{CombatBus, CombatRequest};
use crate::components::Unit;
use crate::config::SimConfig;
use crate::events::{EventStream, SimEvent};
use crate::flowfield::FlowField;
use crate::pool::UnitView;
use crate::spatial::SpatialIndex;
use crate::terrain::ObstacleSet;
use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Named `f32` parameters of one binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitParams(HashMap<String, f32>);

impl TraitParams {
    #[inline]
    pub fn get(&self, name: &str, default: f32) -> f32 {
        self.0.get(name).copied().unwrap_or(default)
    }

    pub fn set(&mut self, name: &str, value: f32) {
        self.0.insert(name.to_string(), value);
    }
}

/// Index of a registered trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraitKey(pub u16);

/// A trait bound to a unit with its parameters.
#[derive(Debug, Clone)]
pub struct TraitBinding {
    pub key: TraitKey,
    pub params: Arc<TraitParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackDecision {
    Allow,
    Veto,
}

/// Everything a hook may read, plus the two mutation surfaces it may write.
pub struct HookContext<'a> {
    /// Every other unit. The unit a hook is running on is excluded when the
    /// hook holds it mutably.
    pub units: UnitView<'a>,
    pub spatial: &'a SpatialIndex,
    pub flow: &'a FlowField,
    pub obstacles: &'a ObstacleSet,
    pub config: &'a SimConfig,
    pub bus: &'a mut CombatBus,
    pub events: &'a mut EventStream,
}

impl HookContext<'_> {
    #[inline]
    pub fn request(&mut self, request: CombatRequest) {
        self.bus.push(request);
    }

    #[inline]
    pub fn emit(&mut self, event: SimEvent) {
        self.events.emit(event);
    }
}

/// A behaviour module. Every hook defaults to a no-op.
#[allow(unused_variables)]
pub trait BehaviorTrait: Send + Sync {
    fn id(&self) -> &'static str;

    /// Per-tick effect.
    fn on_tick(&self, unit: &mut Unit, dt: f32, ctx: &mut HookContext, params: &TraitParams) {}

    /// Steering contribution, accumulated into `velocity`.
    fn on_move(&self, unit: &Unit, velocity: &mut Vec2, dt: f32, ctx: &mut HookContext, params: &TraitParams) {}

    /// Target acquisition. Throttled by the unit's retarget timer.
    fn on_update_target(&self, unit: &mut Unit, dt: f32, ctx: &mut HookContext, params: &TraitParams) {}

    fn on_pre_attack(&self, unit: &Unit, target: &Unit, ctx: &HookContext, params: &TraitParams) -> AttackDecision {
        AttackDecision::Allow
    }

    /// Runs before mitigation with the pre-mitigation damage.
    fn on_hit(&self, attacker: &Unit, target: &Unit, damage: f32, ctx: &mut HookContext, params: &TraitParams) {}

    /// Transform incoming damage after mitigation.
    fn on_was_hit(
        &self,
        defender: &Unit,
        attacker: &Unit,
        damage: f32,
        ctx: &mut HookContext,
        params: &TraitParams,
    ) -> f32 {
        damage
    }

    fn on_kill(&self, attacker: &Unit, victim: &Unit, ctx: &mut HookContext, params: &TraitParams) {}

    fn on_death(&self, unit: &Unit, ctx: &mut HookContext, params: &TraitParams) {}
}

/// Registry of behaviour traits, addressed by identifier at setup and by
/// [`TraitKey`] at runtime.
#[derive(Resource, Default)]
pub struct TraitRegistry {
    traits: Vec<Box<dyn BehaviorTrait>>,
    ids: HashMap<&'static str, TraitKey>,
}

impl TraitRegistry {
    /// Register a trait, replacing any trait with the same id.
    pub fn register(&mut self, behavior: impl BehaviorTrait + 'static) -> TraitKey {
        let id = behavior.id();
        if let Some(&key) = self.ids.get(id) {
            self.traits[key.0 as usize] = Box::new(behavior);
            return key;
        }
        let key = TraitKey(self.traits.len() as u16);
        self.traits.push(Box::new(behavior));
        self.ids.insert(id, key);
        key
    }

    pub fn key_of(&self, id: &str) -> Option<TraitKey> {
        self.ids.get(id).copied()
    }

    #[inline]
    pub fn get(&self, key: TraitKey) -> Option<&dyn BehaviorTrait> {
        self.traits.get(key.0 as usize).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Registry with every built-in trait.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        library::register_all(&mut registry);
        registry
    }

    /// Iterate the resolved traits of a binding list, in order.
    pub fn bound<'r, 'b>(
        &'r self,
        bindings: &'b [TraitBinding],
    ) -> impl Iterator<Item = (&'r dyn BehaviorTrait, &'b TraitParams)> + 'r
    where
        'b: 'r,
    {
        bindings
            .iter()
            .filter_map(move |b| self.get(b.key).map(|t| (t, b.params.as_ref())))
    }
}

impl std::fmt::Debug for TraitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.ids.keys().collect();
        ids.sort();
        f.debug_struct("TraitRegistry").field("traits", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    impl BehaviorTrait for Marker {
        fn id(&self) -> &'static str {
            "marker"
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TraitRegistry::default();
        let key = registry.register(Marker);
        assert_eq!(registry.key_of("marker"), Some(key));
        assert_eq!(registry.get(key).unwrap().id(), "marker");
        assert!(registry.key_of("missing").is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = TraitRegistry::default();
        let a = registry.register(Marker);
        let b = registry.register(Marker);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_params_default() {
        let mut params = TraitParams::default();
        assert_eq!(params.get("radius", 12.0), 12.0);
        params.set("radius", 3.0);
        assert_eq!(params.get("radius", 12.0), 3.0);
    }

    #[test]
    fn test_standard_registry_ids() {
        let registry = TraitRegistry::standard();
        for id in [
            "seek_nearest", "target_walls", "flow_follow", "chase", "advance", "separation",
            "ranged", "melee", "marksman", "ignite", "chill", "shock", "venom", "sunder",
            "cleave", "lifesteal", "frenzy_on_kill", "thorns", "bulwark", "volatile", "regenerate",
        ] {
            assert!(registry.key_of(id).is_some(), "{} not registered", id);
        }
    }
}
