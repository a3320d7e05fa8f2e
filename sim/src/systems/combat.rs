//! Combat resolution - drains the request bus.
//!
//! ## Pipeline
//!
//! `Attack` runs every source trait's pre-attack check and stops at the first
//! veto. `DamagePipeline` then resolves in a fixed order:
//!
//! 1. base damage from the source's stats
//! 2. independent crit roll
//! 3. frenzy multiplier
//! 4. source `on_hit` hooks (pre-mitigation damage)
//! 5. armor mitigation (physical only, halved armor when broken)
//! 6. target `on_was_hit` hooks, each transforming the damage in turn
//! 7. hit points are reduced
//! 8. damage pop event
//! 9. elemental reaction check, consuming the trigger status
//! 10. death finalization and source `on_kill` hooks
//!
//! Requests against dead or missing units are ignored. Death is idempotent,
//! so a kill requested from an `on_kill` or `on_death` hook cannot loop.

use crate::archetype::GlobalModifiers;
use crate::behavior::{AttackDecision, HookContext, TraitRegistry};
use crate::combat::{mitigate, CombatBus, CombatRequest, ReactionKind, ReactionRegistry, Triggered};
use crate::components::{Element, Faction, Lifecycle};
use crate::config::SimConfig;
use crate::economy::{Economy, ResourceKind, SimRng};
use crate::events::{EventStream, SimEvent, TerrainChange};
use crate::flowfield::FlowField;
use crate::pool::{UnitHandle, UnitPool};
use crate::spatial::SpatialIndex;
use crate::status::StatusKind;
use crate::terrain::{ObstacleHit, ObstacleSet};
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;
use glam::Vec2;

/// Blast from a dying friendly unit when `explode_on_death` is set.
const DEATH_BLAST_RADIUS: f32 = 48.0;
const DEATH_BLAST_DAMAGE: f32 = 20.0;

/// Mutable view over everything the resolver touches.
pub struct Resolver<'a> {
    pub pool: &'a mut UnitPool,
    pub bus: &'a mut CombatBus,
    pub events: &'a mut EventStream,
    pub spatial: &'a mut SpatialIndex,
    pub obstacles: &'a mut ObstacleSet,
    pub rng: &'a mut SimRng,
    pub economy: &'a mut Economy,
    pub flow: &'a FlowField,
    pub registry: &'a TraitRegistry,
    pub reactions: &'a ReactionRegistry,
    pub modifiers: &'a GlobalModifiers,
    pub config: &'a SimConfig,
}

impl<'a> Resolver<'a> {
    /// Process up to `budget` requests in FIFO order. Requests queued while
    /// draining are processed in the same call. Returns the number handled.
    pub fn drain(&mut self, budget: usize) -> usize {
        let mut processed = 0;
        while processed < budget {
            let Some(request) = self.bus.pop() else {
                break;
            };
            self.handle(request);
            processed += 1;
        }
        if !self.bus.is_empty() {
            tracing::warn!(
                pending = self.bus.len(),
                budget,
                "combat request budget exhausted, deferring the rest"
            );
        }
        processed
    }

    pub fn handle(&mut self, request: CombatRequest) {
        match request {
            CombatRequest::TrueDamage { target, amount } => self.true_damage(target, amount),
            CombatRequest::Kill { target } => {
                self.finalize_death(target);
            }
            CombatRequest::Status { target, kind, stacks, duration } => {
                if let Some(unit) = self.pool.get_alive_mut(target) {
                    unit.statuses.apply(kind, stacks, duration);
                }
            }
            CombatRequest::DamagePipeline { source, target } => self.pipeline(source, target),
            CombatRequest::Attack { source, target } => {
                if self.pre_attack(source, target) == AttackDecision::Allow {
                    self.pipeline(source, target);
                }
            }
            CombatRequest::Heal { target, amount } => {
                if let Some(unit) = self.pool.get_alive_mut(target) {
                    unit.stats.hp = (unit.stats.hp + amount.max(0.0)).min(unit.stats.max_hp);
                }
            }
            CombatRequest::DamageObstacle { obstacle, amount } => {
                if let ObstacleHit::Destroyed(destroyed) = self.obstacles.damage(obstacle, amount) {
                    self.events.emit(SimEvent::Shockwave {
                        x: destroyed.pos.x,
                        y: destroyed.pos.y,
                        radius: destroyed.half_extents.max_element(),
                    });
                    self.events.emit(SimEvent::TerrainChanged {
                        change: TerrainChange::ObstacleDestroyed(obstacle),
                    });
                }
            }
        }
    }

    /// Hook context over an immutable pool, plus the pool itself.
    fn parts(&mut self) -> (&UnitPool, HookContext<'_>) {
        let pool = &*self.pool;
        (
            pool,
            HookContext {
                units: pool.view(),
                spatial: &*self.spatial,
                flow: self.flow,
                obstacles: &*self.obstacles,
                config: self.config,
                bus: &mut *self.bus,
                events: &mut *self.events,
            },
        )
    }

    fn pre_attack(&mut self, source: UnitHandle, target: UnitHandle) -> AttackDecision {
        let registry = self.registry;
        let (pool, ctx) = self.parts();
        let (Some(attacker), Some(defender)) = (pool.get_alive(source), pool.get_alive(target)) else {
            return AttackDecision::Veto;
        };
        let allowed = registry
            .bound(&attacker.traits)
            .all(|(behavior, params)| behavior.on_pre_attack(attacker, defender, &ctx, params) == AttackDecision::Allow);
        if allowed {
            AttackDecision::Allow
        } else {
            AttackDecision::Veto
        }
    }

    fn pipeline(&mut self, source: UnitHandle, target: UnitHandle) {
        let registry = self.registry;

        // 1-3: base, crit, frenzy.
        let (mut damage, crit_chance, crit_multiplier, element) = {
            let (Some(attacker), Some(_)) = (self.pool.get_alive(source), self.pool.get_alive(target)) else {
                return;
            };
            (
                attacker.stats.damage,
                attacker.stats.crit_chance,
                attacker.stats.crit_multiplier,
                attacker.stats.element,
            )
        };
        let crit = self.rng.roll(crit_chance);
        if crit {
            damage *= crit_multiplier;
        }

        // 4-6: hooks around mitigation.
        let damage = {
            let (pool, mut ctx) = self.parts();
            let (Some(attacker), Some(defender)) = (pool.get(source), pool.get(target)) else {
                return;
            };
            damage *= attacker.statuses.damage_multiplier();
            for (behavior, params) in registry.bound(&attacker.traits) {
                behavior.on_hit(attacker, defender, damage, &mut ctx, params);
            }
            let mut damage = mitigate(
                damage,
                element,
                defender.stats.armor,
                defender.statuses.is_armor_broken(),
            );
            for (behavior, params) in registry.bound(&defender.traits) {
                damage = behavior.on_was_hit(defender, attacker, damage, &mut ctx, params);
            }
            damage.max(0.0)
        };

        // 7-9: apply, report, react.
        let Some(defender) = self.pool.get_alive_mut(target) else {
            return;
        };
        defender.stats.hp -= damage;
        let pos = defender.pos;
        let faction = defender.faction;
        let lethal = defender.stats.hp <= 0.0;
        let triggered = self.reactions.trigger(&mut defender.statuses, element);

        self.events.emit(SimEvent::DamagePop {
            x: pos.x,
            y: pos.y,
            amount: damage,
            crit,
            element: Some(element),
        });
        if let Some(triggered) = triggered {
            self.apply_reaction(target, pos, faction, triggered);
        }

        // 10: death and kill hooks.
        if lethal && self.finalize_death(target) {
            let (pool, mut ctx) = self.parts();
            if let (Some(attacker), Some(victim)) = (pool.get(source), pool.get(target)) {
                for (behavior, params) in registry.bound(&attacker.traits) {
                    behavior.on_kill(attacker, victim, &mut ctx, params);
                }
            }
        }
    }

    fn true_damage(&mut self, target: UnitHandle, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        let Some(unit) = self.pool.get_alive_mut(target) else {
            return;
        };
        unit.stats.hp -= amount;
        let (pos, lethal) = (unit.pos, unit.stats.hp <= 0.0);
        // Sub-point ticks (damage over time) are not worth a number on screen.
        if amount >= 1.0 {
            self.events.emit(SimEvent::DamagePop {
                x: pos.x,
                y: pos.y,
                amount,
                crit: false,
                element: None,
            });
        }
        if lethal {
            self.finalize_death(target);
        }
    }

    fn apply_reaction(&mut self, target: UnitHandle, pos: Vec2, faction: Faction, triggered: Triggered) {
        let reaction = triggered.reaction;
        self.events.emit(SimEvent::FloatingText {
            x: pos.x,
            y: pos.y,
            text: reaction.kind.label(),
        });
        match reaction.kind {
            ReactionKind::Shatter => {
                self.bus.push(CombatRequest::TrueDamage { target, amount: triggered.bonus_damage() });
                self.events.emit(SimEvent::Particles { x: pos.x, y: pos.y, count: 12, element: Element::Cryo });
            }
            ReactionKind::Combust => {
                self.bus.push(CombatRequest::TrueDamage { target, amount: triggered.bonus_damage() });
                self.events.emit(SimEvent::Particles { x: pos.x, y: pos.y, count: 16, element: Element::Toxic });
            }
            ReactionKind::Superconduct => {
                self.bus.push(CombatRequest::Status {
                    target,
                    kind: StatusKind::Frozen,
                    stacks: StatusKind::Frozen.max_stacks(),
                    duration: reaction.power,
                });
                self.bus.push(CombatRequest::Status {
                    target,
                    kind: StatusKind::Stunned,
                    stacks: 1,
                    duration: reaction.power * 0.5,
                });
                self.events.emit(SimEvent::Flash { x: pos.x, y: pos.y });
            }
            ReactionKind::Overload => {
                let amount = triggered.bonus_damage();
                let bus = &mut *self.bus;
                self.spatial.for_each_in_radius(pos.x, pos.y, reaction.radius, |e| {
                    if e.faction == faction {
                        bus.push(CombatRequest::TrueDamage { target: e.handle, amount });
                    }
                });
                self.events.emit(SimEvent::Explosion { x: pos.x, y: pos.y, radius: reaction.radius });
            }
        }
    }

    /// Mark a unit dead. Returns `false` if it was not alive.
    pub fn finalize_death(&mut self, handle: UnitHandle) -> bool {
        let Some(unit) = self.pool.get_alive_mut(handle) else {
            return false;
        };
        unit.lifecycle = Lifecycle::Decaying;
        unit.decay_timer = self.config.decay_delay;
        unit.velocity = Vec2::ZERO;
        unit.stats.hp = unit.stats.hp.min(0.0);
        unit.statuses.clear();
        let (faction, kind, pos, bounty) = (unit.faction, unit.kind, unit.pos, unit.bounty);

        self.spatial.evict(handle);
        self.events.emit(SimEvent::UnitDied { handle, faction, kind, x: pos.x, y: pos.y });

        let registry = self.registry;
        {
            let (pool, mut ctx) = self.parts();
            if let Some(unit) = pool.get(handle) {
                for (behavior, params) in registry.bound(&unit.traits) {
                    behavior.on_death(unit, &mut ctx, params);
                }
            }
        }

        match faction {
            Faction::Hostile => {
                let reward = bounty as f64 * self.modifiers.resource_rate_multiplier as f64;
                if reward > 0.0 {
                    let total = self.economy.credit(ResourceKind::Gold, reward);
                    self.events.emit(SimEvent::StockpileChanged {
                        kind: ResourceKind::Gold,
                        delta: reward,
                        total,
                    });
                }
            }
            Faction::Friendly => {
                if self.modifiers.explode_on_death {
                    self.events.emit(SimEvent::Explosion { x: pos.x, y: pos.y, radius: DEATH_BLAST_RADIUS });
                    let bus = &mut *self.bus;
                    self.spatial.for_each_in_radius(pos.x, pos.y, DEATH_BLAST_RADIUS, |e| {
                        if e.faction == Faction::Hostile {
                            bus.push(CombatRequest::TrueDamage { target: e.handle, amount: DEATH_BLAST_DAMAGE });
                        }
                    });
                }
            }
        }
        true
    }
}

#[derive(SystemParam)]
pub struct CombatParams<'w> {
    pool: ResMut<'w, UnitPool>,
    bus: ResMut<'w, CombatBus>,
    events: ResMut<'w, EventStream>,
    spatial: ResMut<'w, SpatialIndex>,
    obstacles: ResMut<'w, ObstacleSet>,
    rng: ResMut<'w, SimRng>,
    economy: ResMut<'w, Economy>,
    flow: Res<'w, FlowField>,
    registry: Res<'w, TraitRegistry>,
    reactions: Res<'w, ReactionRegistry>,
    modifiers: Res<'w, GlobalModifiers>,
    config: Res<'w, SimConfig>,
}

impl CombatParams<'_> {
    pub fn resolver(&mut self) -> Resolver<'_> {
        Resolver {
            pool: &mut self.pool,
            bus: &mut self.bus,
            events: &mut self.events,
            spatial: &mut self.spatial,
            obstacles: &mut self.obstacles,
            rng: &mut self.rng,
            economy: &mut self.economy,
            flow: &self.flow,
            registry: &self.registry,
            reactions: &self.reactions,
            modifiers: &self.modifiers,
            config: &self.config,
        }
    }

    fn drain(&mut self) -> usize {
        let budget = self.config.request_budget;
        self.resolver().drain(budget)
    }
}

/// Resolve requests queued by unit hooks and auto-attacks.
pub fn combat_resolution_system(mut params: CombatParams) {
    params.drain();
}

/// Resolve requests queued late in the tick (obstacle lifecycle, streaming).
pub fn late_combat_resolution_system(mut params: CombatParams) {
    params.drain();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{ArchetypeCatalog, UnitRoster};
    use crate::components::UnitKind;
    use crate::pool::SpawnRequest;
    use crate::terrain::{Obstacle, ObstacleId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        pool: UnitPool,
        bus: CombatBus,
        events: EventStream,
        spatial: SpatialIndex,
        obstacles: ObstacleSet,
        rng: SimRng,
        economy: Economy,
        flow: FlowField,
        registry: TraitRegistry,
        reactions: ReactionRegistry,
        modifiers: GlobalModifiers,
        config: SimConfig,
        roster: UnitRoster,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = TraitRegistry::standard();
            let roster = UnitRoster::resolve(&ArchetypeCatalog::builtin(), &registry);
            Self {
                pool: UnitPool::new(32),
                bus: CombatBus::default(),
                events: EventStream::new(),
                spatial: SpatialIndex::new(64.0),
                obstacles: ObstacleSet::new(),
                rng: SimRng::seeded(1),
                economy: Economy::default(),
                flow: FlowField::new(),
                registry,
                reactions: ReactionRegistry::standard(),
                modifiers: GlobalModifiers::default(),
                config: SimConfig::default(),
                roster,
            }
        }

        fn spawn(&mut self, faction: Faction, kind: UnitKind, pos: Vec2) -> UnitHandle {
            let handle = self
                .pool
                .spawn(SpawnRequest::new(faction, kind, pos, 1), &self.roster, &self.modifiers)
                .unwrap();
            let unit = self.pool.get_mut(handle).unwrap();
            unit.stats.crit_chance = 0.0;
            self.spatial.insert(handle, pos, unit.radius, faction);
            handle
        }

        fn resolver(&mut self) -> Resolver<'_> {
            Resolver {
                pool: &mut self.pool,
                bus: &mut self.bus,
                events: &mut self.events,
                spatial: &mut self.spatial,
                obstacles: &mut self.obstacles,
                rng: &mut self.rng,
                economy: &mut self.economy,
                flow: &self.flow,
                registry: &self.registry,
                reactions: &self.reactions,
                modifiers: &self.modifiers,
                config: &self.config,
            }
        }

        fn resolve(&mut self, request: CombatRequest) {
            self.bus.push(request);
            let budget = self.config.request_budget;
            self.resolver().drain(budget);
        }

        fn hp(&self, handle: UnitHandle) -> f32 {
            self.pool.get(handle).unwrap().stats.hp
        }

        fn count_events(&self, pred: impl Fn(&SimEvent) -> bool) -> usize {
            self.events.pending().iter().filter(|e| pred(e)).count()
        }
    }

    #[test]
    fn test_attack_deals_mitigated_damage_and_kills_on_third() {
        let mut fx = Fixture::new();
        let defender = fx.spawn(Faction::Friendly, UnitKind::Militia, Vec2::new(100.0, 100.0));
        let attacker = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(120.0, 100.0));
        {
            let unit = fx.pool.get_mut(defender).unwrap();
            unit.stats.hp = 60.0;
            unit.stats.max_hp = 60.0;
            unit.stats.armor = 0.0;
            unit.stats.element = Element::Physical;
        }
        {
            let unit = fx.pool.get_mut(attacker).unwrap();
            unit.stats.damage = 20.0;
            unit.stats.element = Element::Physical;
        }

        fx.resolve(CombatRequest::Attack { source: attacker, target: defender });
        assert_eq!(fx.hp(defender), 40.0);
        fx.resolve(CombatRequest::Attack { source: attacker, target: defender });
        assert_eq!(fx.hp(defender), 20.0);
        assert!(fx.pool.is_alive(defender));
        fx.resolve(CombatRequest::Attack { source: attacker, target: defender });
        assert!(!fx.pool.is_alive(defender));
        assert!(fx.pool.get(defender).unwrap().is_dead());
        assert!(!fx.spatial.contains(defender));
    }

    #[test]
    fn test_armor_reduces_physical_hits() {
        let mut fx = Fixture::new();
        let defender = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::ZERO);
        let attacker = fx.spawn(Faction::Friendly, UnitKind::Militia, Vec2::new(10.0, 0.0));
        fx.pool.get_mut(defender).unwrap().stats.armor = 100.0;
        fx.pool.get_mut(attacker).unwrap().stats.damage = 10.0;
        let before = fx.hp(defender);

        fx.resolve(CombatRequest::DamagePipeline { source: attacker, target: defender });
        assert!((before - fx.hp(defender) - 5.0).abs() < 1e-4);

        fx.pool.get_mut(defender).unwrap().statuses.apply(StatusKind::ArmorBroken, 1, 5.0);
        let before = fx.hp(defender);
        fx.resolve(CombatRequest::DamagePipeline { source: attacker, target: defender });
        assert!((before - fx.hp(defender) - 10.0 * 100.0 / 150.0).abs() < 1e-4);
    }

    #[test]
    fn test_kill_is_idempotent() {
        let mut fx = Fixture::new();
        let victim = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::ZERO);
        let bounty = fx.pool.get(victim).unwrap().bounty as f64;
        assert!(bounty > 0.0);

        fx.resolve(CombatRequest::Kill { target: victim });
        fx.resolve(CombatRequest::Kill { target: victim });
        fx.resolve(CombatRequest::TrueDamage { target: victim, amount: 50.0 });

        assert_eq!(fx.economy.amount(ResourceKind::Gold), bounty);
        assert_eq!(fx.count_events(|e| matches!(e, SimEvent::UnitDied { .. })), 1);
        assert_eq!(fx.count_events(|e| matches!(e, SimEvent::StockpileChanged { .. })), 1);
    }

    #[test]
    fn test_on_death_hook_runs_once() {
        let mut fx = Fixture::new();
        // Bombers carry `volatile`, which explodes on death.
        let bomber = fx.spawn(Faction::Hostile, UnitKind::Bomber, Vec2::ZERO);
        let bystander = fx.spawn(Faction::Friendly, UnitKind::Knight, Vec2::new(20.0, 0.0));
        let before = fx.hp(bystander);

        fx.resolve(CombatRequest::Kill { target: bomber });
        fx.resolve(CombatRequest::Kill { target: bomber });

        assert_eq!(fx.count_events(|e| matches!(e, SimEvent::Explosion { .. })), 1);
        assert!((before - fx.hp(bystander) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_dead_target_ignored() {
        let mut fx = Fixture::new();
        let a = fx.spawn(Faction::Friendly, UnitKind::Militia, Vec2::ZERO);
        let b = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(10.0, 0.0));
        fx.resolve(CombatRequest::Kill { target: b });
        fx.events.clear();

        fx.resolve(CombatRequest::Attack { source: a, target: b });
        fx.resolve(CombatRequest::Status { target: b, kind: StatusKind::Burning, stacks: 2, duration: 3.0 });
        fx.resolve(CombatRequest::Heal { target: b, amount: 100.0 });
        assert!(fx.events.pending().is_empty());
        assert!(fx.pool.get(b).unwrap().statuses.is_empty());
        assert!(fx.pool.get(b).unwrap().stats.hp <= 0.0);
    }

    #[test]
    fn test_marksman_veto_short_circuits() {
        let mut fx = Fixture::new();
        let archer = fx.spawn(Faction::Friendly, UnitKind::Archer, Vec2::new(0.0, 0.0));
        let close = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(10.0, 0.0));
        let far = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(100.0, 0.0));
        let (hp_close, hp_far) = (fx.hp(close), fx.hp(far));

        fx.resolve(CombatRequest::Attack { source: archer, target: close });
        assert_eq!(fx.hp(close), hp_close);
        assert_eq!(fx.count_events(|e| matches!(e, SimEvent::Projectile { .. })), 0);

        fx.resolve(CombatRequest::Attack { source: archer, target: far });
        assert!(fx.hp(far) < hp_far);
        assert_eq!(fx.count_events(|e| matches!(e, SimEvent::Projectile { .. })), 1);

        // The pipeline itself skips the pre-attack check.
        fx.resolve(CombatRequest::DamagePipeline { source: archer, target: close });
        assert!(fx.hp(close) < hp_close);
    }

    #[test]
    fn test_shatter_consumed_once_per_resolution() {
        let mut fx = Fixture::new();
        let pyro = fx.spawn(Faction::Friendly, UnitKind::Pyromancer, Vec2::new(0.0, 0.0));
        let brute = fx.spawn(Faction::Hostile, UnitKind::Brute, Vec2::new(100.0, 0.0));
        fx.pool.get_mut(brute).unwrap().statuses.apply(StatusKind::Frozen, 3, 5.0);
        let damage = fx.pool.get(pyro).unwrap().stats.damage;
        let before = fx.hp(brute);

        fx.bus.push(CombatRequest::DamagePipeline { source: pyro, target: brute });
        fx.bus.push(CombatRequest::DamagePipeline { source: pyro, target: brute });
        let budget = fx.config.request_budget;
        fx.resolver().drain(budget);

        let shatters = fx.count_events(|e| matches!(e, SimEvent::FloatingText { text: "SHATTER", .. }));
        assert_eq!(shatters, 1);
        assert!(!fx.pool.get(brute).unwrap().statuses.has(StatusKind::Frozen));
        let expected = before - 2.0 * damage - 12.0 * 3.0;
        assert!((fx.hp(brute) - expected).abs() < 1e-3);
    }

    #[test]
    fn test_superconduct_freezes_solid() {
        let mut fx = Fixture::new();
        let cryo = fx.spawn(Faction::Friendly, UnitKind::Cryomancer, Vec2::ZERO);
        let grunt = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(100.0, 0.0));
        fx.pool.get_mut(grunt).unwrap().statuses.apply(StatusKind::Shocked, 1, 3.0);

        fx.resolve(CombatRequest::DamagePipeline { source: cryo, target: grunt });
        let unit = fx.pool.get(grunt).unwrap();
        assert!(!unit.statuses.has(StatusKind::Shocked));
        assert!(unit.statuses.has(StatusKind::Stunned));
        assert!(!unit.statuses.can_act());
    }

    #[test]
    fn test_kill_hooks_fire_for_killer() {
        let mut fx = Fixture::new();
        let berserker = fx.spawn(Faction::Friendly, UnitKind::Berserker, Vec2::ZERO);
        let grunt = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(15.0, 0.0));
        fx.pool.get_mut(grunt).unwrap().stats.hp = 1.0;

        fx.resolve(CombatRequest::Attack { source: berserker, target: grunt });
        assert!(!fx.pool.is_alive(grunt));
        assert!(fx.pool.get(berserker).unwrap().statuses.has(StatusKind::Frenzied));
    }

    #[test]
    fn test_budget_defers_leftovers() {
        let mut fx = Fixture::new();
        let grunt = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::ZERO);
        for _ in 0..5 {
            fx.bus.push(CombatRequest::TrueDamage { target: grunt, amount: 1.0 });
        }
        assert_eq!(fx.resolver().drain(3), 3);
        assert_eq!(fx.bus.len(), 2);
        assert_eq!(fx.resolver().drain(10), 2);
    }

    #[test]
    fn test_heal_clamps_to_max_hp() {
        let mut fx = Fixture::new();
        let knight = fx.spawn(Faction::Friendly, UnitKind::Knight, Vec2::ZERO);
        let max = fx.pool.get(knight).unwrap().stats.max_hp;
        fx.pool.get_mut(knight).unwrap().stats.hp = max - 4.0;

        fx.resolve(CombatRequest::Heal { target: knight, amount: 3.0 });
        assert!((fx.hp(knight) - (max - 1.0)).abs() < 1e-4);
        fx.resolve(CombatRequest::Heal { target: knight, amount: 3.0 });
        assert_eq!(fx.hp(knight), max);
    }

    #[test]
    fn test_explode_on_death_modifier() {
        let mut fx = Fixture::new();
        fx.modifiers.explode_on_death = true;
        let militia = fx.spawn(Faction::Friendly, UnitKind::Militia, Vec2::ZERO);
        let grunt = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(20.0, 0.0));
        let before = fx.hp(grunt);

        fx.resolve(CombatRequest::Kill { target: militia });
        assert!((before - fx.hp(grunt) - DEATH_BLAST_DAMAGE).abs() < 1e-4);
    }

    #[test]
    fn test_wall_destruction_marks_terrain_dirty() {
        let mut fx = Fixture::new();
        fx.obstacles.insert(Obstacle::wall(ObstacleId(3), Vec2::new(50.0, 50.0), Vec2::new(8.0, 40.0), 30.0));
        fx.obstacles.take_dirty();

        fx.resolve(CombatRequest::DamageObstacle { obstacle: ObstacleId(3), amount: 20.0 });
        assert!(!fx.obstacles.is_dirty());
        fx.resolve(CombatRequest::DamageObstacle { obstacle: ObstacleId(3), amount: 20.0 });
        assert!(fx.obstacles.is_dirty());
        assert!(fx.obstacles.is_empty());
        assert_eq!(
            fx.count_events(|e| matches!(
                e,
                SimEvent::TerrainChanged { change: TerrainChange::ObstacleDestroyed(ObstacleId(3)) }
            )),
            1
        );
    }

    #[test]
    fn test_listener_sees_combat_events() {
        let mut fx = Fixture::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        fx.events.subscribe(move |e| {
            if matches!(e, SimEvent::DamagePop { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let a = fx.spawn(Faction::Friendly, UnitKind::Militia, Vec2::ZERO);
        let b = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::new(10.0, 0.0));
        fx.resolve(CombatRequest::DamagePipeline { source: a, target: b });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resolution_system_drains_bus() {
        let mut fx = Fixture::new();
        let grunt = fx.spawn(Faction::Hostile, UnitKind::Grunt, Vec2::ZERO);
        fx.bus.push(CombatRequest::Kill { target: grunt });

        let mut world = World::new();
        world.insert_resource(fx.pool);
        world.insert_resource(fx.bus);
        world.insert_resource(fx.events);
        world.insert_resource(fx.spatial);
        world.insert_resource(fx.obstacles);
        world.insert_resource(fx.rng);
        world.insert_resource(fx.economy);
        world.insert_resource(fx.flow);
        world.insert_resource(fx.registry);
        world.insert_resource(fx.reactions);
        world.insert_resource(fx.modifiers);
        world.insert_resource(fx.config);

        let mut schedule = Schedule::default();
        schedule.add_systems(combat_resolution_system);
        schedule.run(&mut world);

        assert!(world.resource::<CombatBus>().is_empty());
        assert!(!world.resource::<UnitPool>().is_alive(grunt));
    }
}
