//! Unit archetypes and global modifiers.
//!
//! Archetypes are content tables supplied by the host (or the built-in
//! defaults below). At setup they are resolved against the trait registry
//! into a `UnitRoster`, so spawning never looks up trait names.

use crate::behavior::{TraitBinding, TraitParams, TraitRegistry};
use crate::components::{CombatStats, Element, Faction, UnitKind};
use crate::error::{Result, SimError};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Radius used when a unit type has no archetype.
pub const DEFAULT_RADIUS: f32 = 8.0;

/// Global modifiers applied to friendly units at stat computation.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalModifiers {
    pub damage_multiplier: f32,
    pub max_hp_multiplier: f32,
    pub resource_rate_multiplier: f32,
    pub explode_on_death: bool,
    /// Probability that a friendly spawn produces a second unit.
    pub double_spawn_chance: f32,
}

impl Default for GlobalModifiers {
    fn default() -> Self {
        Self {
            damage_multiplier: 1.0,
            max_hp_multiplier: 1.0,
            resource_rate_multiplier: 1.0,
            explode_on_death: false,
            double_spawn_chance: 0.0,
        }
    }
}

/// A trait reference inside an archetype, by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitSpec {
    pub id: String,
    #[serde(default)]
    pub params: TraitParams,
}

impl TraitSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            params: TraitParams::default(),
        }
    }

    pub fn with(mut self, name: &str, value: f32) -> Self {
        self.params.set(name, value);
        self
    }
}

/// Stat curve and trait template for one unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub hp: f32,
    pub damage: f32,
    pub range: f32,
    pub move_speed: f32,
    pub attack_interval: f32,
    #[serde(default)]
    pub armor: f32,
    #[serde(default)]
    pub crit_chance: f32,
    #[serde(default = "default_crit_multiplier")]
    pub crit_multiplier: f32,
    #[serde(default)]
    pub element: Element,
    pub radius: f32,
    /// Fractional hp gain per level above 1.
    #[serde(default)]
    pub hp_growth: f32,
    /// Fractional damage gain per level above 1.
    #[serde(default)]
    pub damage_growth: f32,
    /// Resources granted on death (hostile units).
    #[serde(default)]
    pub bounty: f32,
    #[serde(default)]
    pub traits: Vec<TraitSpec>,
}

fn default_crit_multiplier() -> f32 {
    1.5
}

impl Archetype {
    /// Level-scaled stats. Global modifiers only apply to friendly units.
    pub fn stats_at(&self, level: u32, faction: Faction, modifiers: &GlobalModifiers) -> CombatStats {
        let steps = level.max(1).saturating_sub(1) as f32;
        let mut max_hp = self.hp * (1.0 + self.hp_growth * steps);
        let mut damage = self.damage * (1.0 + self.damage_growth * steps);
        if faction == Faction::Friendly {
            max_hp *= modifiers.max_hp_multiplier;
            damage *= modifiers.damage_multiplier;
        }
        CombatStats {
            hp: max_hp,
            max_hp,
            damage,
            range: self.range,
            move_speed: self.move_speed,
            attack_interval: self.attack_interval.max(0.05),
            armor: self.armor.max(0.0),
            crit_chance: self.crit_chance.clamp(0.0, 1.0),
            crit_multiplier: self.crit_multiplier,
            element: self.element,
        }
    }
}

/// Archetype definitions keyed by unit type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeCatalog {
    pub archetypes: HashMap<UnitKind, Archetype>,
}

impl ArchetypeCatalog {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let catalog: ArchetypeCatalog = serde_json::from_str(json)?;
        for (kind, archetype) in &catalog.archetypes {
            if archetype.hp <= 0.0 || archetype.radius <= 0.0 {
                return Err(SimError::InvalidContent(format!(
                    "archetype {:?} needs positive hp and radius",
                    kind
                )));
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, kind: UnitKind, archetype: Archetype) {
        self.archetypes.insert(kind, archetype);
    }

    pub fn get(&self, kind: UnitKind) -> Option<&Archetype> {
        self.archetypes.get(&kind)
    }

    /// Default content for every `UnitKind`.
    pub fn builtin() -> Self {
        let mut catalog = Self::default();

        let frontline = |aggro: f32| {
            vec![
                TraitSpec::new("seek_nearest").with("aggro", aggro),
                TraitSpec::new("target_walls").with("reach", 420.0),
                TraitSpec::new("chase"),
                TraitSpec::new("flow_follow"),
                TraitSpec::new("separation").with("radius", 24.0).with("strength", 40.0),
            ]
        };
        let horde = |aggro: f32| {
            vec![
                TraitSpec::new("seek_nearest").with("aggro", aggro),
                TraitSpec::new("chase"),
                TraitSpec::new("advance"),
                TraitSpec::new("separation").with("radius", 22.0).with("strength", 35.0),
            ]
        };
        let base = |hp, damage, range, speed, interval, radius| Archetype {
            hp,
            damage,
            range,
            move_speed: speed,
            attack_interval: interval,
            armor: 0.0,
            crit_chance: 0.05,
            crit_multiplier: 1.5,
            element: Element::Physical,
            radius,
            hp_growth: 0.12,
            damage_growth: 0.08,
            bounty: 0.0,
            traits: Vec::new(),
        };

        let mut militia = base(60.0, 8.0, 20.0, 60.0, 1.0, 10.0);
        militia.armor = 5.0;
        militia.traits = frontline(260.0);
        militia.traits.push(TraitSpec::new("melee"));
        catalog.insert(UnitKind::Militia, militia);

        let mut archer = base(40.0, 10.0, 170.0, 55.0, 1.2, 9.0);
        archer.crit_chance = 0.15;
        archer.crit_multiplier = 2.0;
        archer.traits = frontline(300.0);
        archer.traits.push(TraitSpec::new("ranged"));
        archer.traits.push(TraitSpec::new("marksman").with("min_range", 30.0));
        catalog.insert(UnitKind::Archer, archer);

        let mut knight = base(140.0, 14.0, 22.0, 45.0, 1.3, 12.0);
        knight.armor = 40.0;
        knight.traits = frontline(240.0);
        knight.traits.push(TraitSpec::new("melee"));
        knight.traits.push(TraitSpec::new("bulwark").with("reduction", 0.2));
        knight.traits.push(TraitSpec::new("cleave").with("fraction", 0.3).with("radius", 30.0));
        catalog.insert(UnitKind::Knight, knight);

        let caster = |element: Element, on_hit: TraitSpec| {
            let mut a = base(45.0, 9.0, 150.0, 50.0, 1.4, 9.0);
            a.crit_chance = 0.1;
            a.crit_multiplier = 1.8;
            a.element = element;
            a.traits = frontline(280.0);
            a.traits.push(TraitSpec::new("ranged"));
            a.traits.push(on_hit);
            a
        };
        catalog.insert(
            UnitKind::Pyromancer,
            caster(Element::Thermal, TraitSpec::new("ignite").with("stacks", 1.0).with("duration", 3.0)),
        );
        catalog.insert(
            UnitKind::Cryomancer,
            caster(Element::Cryo, TraitSpec::new("chill").with("stacks", 1.0).with("duration", 2.5)),
        );
        catalog.insert(
            UnitKind::Stormcaller,
            caster(Element::Electric, TraitSpec::new("shock").with("stacks", 1.0).with("duration", 3.0)),
        );

        let mut sapper = base(70.0, 12.0, 20.0, 55.0, 1.1, 10.0);
        sapper.traits = vec![
            TraitSpec::new("target_walls").with("reach", 640.0),
            TraitSpec::new("seek_nearest").with("aggro", 120.0),
            TraitSpec::new("chase"),
            TraitSpec::new("flow_follow").with("weight", 1.2),
            TraitSpec::new("separation").with("radius", 22.0).with("strength", 30.0),
            TraitSpec::new("melee"),
            TraitSpec::new("volatile").with("radius", 50.0).with("damage", 30.0),
        ];
        catalog.insert(UnitKind::Sapper, sapper);

        let mut berserker = base(90.0, 12.0, 20.0, 65.0, 0.9, 11.0);
        berserker.armor = 10.0;
        berserker.traits = frontline(280.0);
        berserker.traits.extend([
            TraitSpec::new("melee"),
            TraitSpec::new("frenzy_on_kill").with("stacks", 1.0).with("duration", 5.0),
            TraitSpec::new("lifesteal").with("fraction", 0.2),
            TraitSpec::new("regenerate").with("per_second", 1.0),
        ]);
        catalog.insert(UnitKind::Berserker, berserker);

        let mut grunt = base(50.0, 7.0, 18.0, 40.0, 1.1, 10.0);
        grunt.armor = 5.0;
        grunt.bounty = 2.0;
        grunt.traits = horde(240.0);
        grunt.traits.push(TraitSpec::new("melee"));
        catalog.insert(UnitKind::Grunt, grunt);

        let mut raider = base(35.0, 6.0, 18.0, 75.0, 0.8, 9.0);
        raider.crit_chance = 0.1;
        raider.bounty = 3.0;
        raider.traits = horde(300.0);
        raider.traits.push(TraitSpec::new("melee"));
        raider.traits.push(TraitSpec::new("venom").with("stacks", 1.0).with("duration", 4.0));
        catalog.insert(UnitKind::Raider, raider);

        let mut brute = base(180.0, 18.0, 24.0, 30.0, 1.8, 16.0);
        brute.armor = 30.0;
        brute.bounty = 8.0;
        brute.traits = horde(200.0);
        brute.traits.extend([
            TraitSpec::new("melee"),
            TraitSpec::new("thorns").with("fraction", 0.15),
            TraitSpec::new("sunder").with("duration", 4.0),
        ]);
        catalog.insert(UnitKind::Brute, brute);

        let mut spitter = base(40.0, 8.0, 140.0, 40.0, 1.5, 9.0);
        spitter.element = Element::Toxic;
        spitter.bounty = 4.0;
        spitter.traits = horde(260.0);
        spitter.traits.push(TraitSpec::new("ranged"));
        spitter.traits.push(TraitSpec::new("venom").with("stacks", 2.0).with("duration", 3.0));
        catalog.insert(UnitKind::Spitter, spitter);

        let mut shaman = base(55.0, 9.0, 130.0, 38.0, 1.6, 10.0);
        shaman.element = Element::Thermal;
        shaman.bounty = 5.0;
        shaman.traits = horde(260.0);
        shaman.traits.extend([
            TraitSpec::new("ranged"),
            TraitSpec::new("ignite").with("stacks", 1.0).with("duration", 2.0),
            TraitSpec::new("regenerate").with("per_second", 2.0),
        ]);
        catalog.insert(UnitKind::Shaman, shaman);

        let mut bomber = base(30.0, 4.0, 16.0, 55.0, 1.0, 9.0);
        bomber.bounty = 3.0;
        bomber.traits = horde(220.0);
        bomber.traits.push(TraitSpec::new("melee"));
        bomber.traits.push(TraitSpec::new("volatile").with("radius", 60.0).with("damage", 25.0));
        catalog.insert(UnitKind::Bomber, bomber);

        catalog
    }
}

/// An archetype with its trait list resolved against the registry.
#[derive(Debug, Clone)]
pub struct ResolvedArchetype {
    pub archetype: Archetype,
    pub bindings: Vec<TraitBinding>,
}

/// Resolved archetypes, consulted by the pool at spawn time.
#[derive(Resource, Debug, Clone, Default)]
pub struct UnitRoster {
    entries: HashMap<UnitKind, ResolvedArchetype>,
}

impl UnitRoster {
    /// Resolve trait identifiers once. Unknown identifiers are skipped.
    pub fn resolve(catalog: &ArchetypeCatalog, registry: &TraitRegistry) -> Self {
        let mut entries = HashMap::with_capacity(catalog.archetypes.len());
        for (kind, archetype) in &catalog.archetypes {
            let mut bindings = Vec::with_capacity(archetype.traits.len());
            for spec in &archetype.traits {
                match registry.key_of(&spec.id) {
                    Some(key) => bindings.push(TraitBinding {
                        key,
                        params: Arc::new(spec.params.clone()),
                    }),
                    None => tracing::warn!(kind = ?kind, id = %spec.id, "unknown trait skipped"),
                }
            }
            entries.insert(
                *kind,
                ResolvedArchetype {
                    archetype: archetype.clone(),
                    bindings,
                },
            );
        }
        Self { entries }
    }

    pub fn get(&self, kind: UnitKind) -> Option<&ResolvedArchetype> {
        self.entries.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_kind() {
        let catalog = ArchetypeCatalog::builtin();
        for kind in UnitKind::ALL {
            assert!(catalog.get(kind).is_some(), "{:?} missing", kind);
        }
    }

    #[test]
    fn test_builtin_traits_all_resolve() {
        let catalog = ArchetypeCatalog::builtin();
        let roster = UnitRoster::resolve(&catalog, &TraitRegistry::standard());
        for (kind, archetype) in &catalog.archetypes {
            assert_eq!(
                roster.get(*kind).unwrap().bindings.len(),
                archetype.traits.len(),
                "{:?} has unresolved traits",
                kind
            );
        }
    }

    #[test]
    fn test_level_scaling() {
        let catalog = ArchetypeCatalog::builtin();
        let grunt = catalog.get(UnitKind::Grunt).unwrap();
        let mods = GlobalModifiers::default();
        let l1 = grunt.stats_at(1, Faction::Hostile, &mods);
        let l3 = grunt.stats_at(3, Faction::Hostile, &mods);
        assert_eq!(l1.max_hp, grunt.hp);
        assert!((l3.max_hp - grunt.hp * (1.0 + 2.0 * grunt.hp_growth)).abs() < 1e-4);
        assert!(l3.damage > l1.damage);
    }

    #[test]
    fn test_modifiers_apply_to_friendly_only() {
        let catalog = ArchetypeCatalog::builtin();
        let militia = catalog.get(UnitKind::Militia).unwrap();
        let mods = GlobalModifiers {
            damage_multiplier: 2.0,
            max_hp_multiplier: 1.5,
            ..Default::default()
        };
        let friendly = militia.stats_at(1, Faction::Friendly, &mods);
        let hostile = militia.stats_at(1, Faction::Hostile, &mods);
        assert_eq!(friendly.damage, militia.damage * 2.0);
        assert_eq!(friendly.max_hp, militia.hp * 1.5);
        assert_eq!(hostile.damage, militia.damage);
    }

    #[test]
    fn test_unknown_trait_is_skipped() {
        let mut catalog = ArchetypeCatalog::default();
        let mut archetype = ArchetypeCatalog::builtin().get(UnitKind::Grunt).unwrap().clone();
        archetype.traits = vec![TraitSpec::new("melee"), TraitSpec::new("does_not_exist")];
        catalog.insert(UnitKind::Grunt, archetype);

        let roster = UnitRoster::resolve(&catalog, &TraitRegistry::standard());
        assert_eq!(roster.get(UnitKind::Grunt).unwrap().bindings.len(), 1);
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "archetypes": {
                "grunt": {
                    "hp": 20.0, "damage": 3.0, "range": 10.0, "move_speed": 30.0,
                    "attack_interval": 1.0, "radius": 8.0,
                    "traits": [ { "id": "melee" }, { "id": "advance", "params": { "weight": 2.0 } } ]
                }
            }
        }"#;
        let catalog = ArchetypeCatalog::from_json_str(json).unwrap();
        let grunt = catalog.get(UnitKind::Grunt).unwrap();
        assert_eq!(grunt.crit_multiplier, 1.5);
        assert_eq!(grunt.traits[1].params.get("weight", 1.0), 2.0);
    }

    #[test]
    fn test_catalog_rejects_zero_hp() {
        let json = r#"{ "archetypes": { "grunt": {
            "hp": 0.0, "damage": 3.0, "range": 10.0, "move_speed": 30.0,
            "attack_interval": 1.0, "radius": 8.0 } } }"#;
        assert!(matches!(
            ArchetypeCatalog::from_json_str(json),
            Err(SimError::InvalidContent(_))
        ));
    }
}
