//! Built-in behaviour traits.

use super::{AttackDecision, BehaviorTrait, HookContext, TraitParams, TraitRegistry};
use crate::combat::CombatRequest;
use crate::components::{Unit, FLAG_ENGAGED, FLAG_SIEGING};
use crate::events::SimEvent;
use crate::status::StatusKind;
use glam::Vec2;

pub fn register_all(registry: &mut TraitRegistry) {
    // Targeting
    registry.register(SeekNearest);
    registry.register(TargetWalls);
    // Steering
    registry.register(FlowFollow);
    registry.register(Chase);
    registry.register(Advance);
    registry.register(Separation);
    // Attacks
    registry.register(Ranged);
    registry.register(Melee);
    registry.register(Marksman);
    registry.register(OnHitStatus::new("ignite", StatusKind::Burning, 1.0, 3.0));
    registry.register(OnHitStatus::new("chill", StatusKind::Frozen, 1.0, 2.5));
    registry.register(OnHitStatus::new("shock", StatusKind::Shocked, 1.0, 3.0));
    registry.register(OnHitStatus::new("venom", StatusKind::Poisoned, 1.0, 4.0));
    registry.register(OnHitStatus::new("sunder", StatusKind::ArmorBroken, 1.0, 4.0));
    registry.register(Cleave);
    registry.register(Lifesteal);
    registry.register(FrenzyOnKill);
    // Defence and lifecycle
    registry.register(Thorns);
    registry.register(Bulwark);
    registry.register(Volatile);
    registry.register(Regenerate);
}

// ============================================================================
// TARGETING
// ============================================================================

/// Keep the current enemy while it stays within `aggro`, else pick the nearest.
pub struct SeekNearest;

impl BehaviorTrait for SeekNearest {
    fn id(&self) -> &'static str {
        "seek_nearest"
    }

    fn on_update_target(&self, unit: &mut Unit, _dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        let aggro = params.get("aggro", 250.0);
        let current = unit.context.target.and_then(|h| ctx.units.get_alive(h));
        if let Some(target) = current {
            if target.pos.distance_squared(unit.pos) <= aggro * aggro {
                return;
            }
        }
        unit.context.target = ctx
            .spatial
            .nearest_enemy(unit.pos.x, unit.pos.y, aggro, unit.faction)
            .map(|e| e.handle);
    }
}

/// Track the nearest destructible obstacle within `reach`.
pub struct TargetWalls;

impl BehaviorTrait for TargetWalls {
    fn id(&self) -> &'static str {
        "target_walls"
    }

    fn on_update_target(&self, unit: &mut Unit, _dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        let reach = params.get("reach", 400.0);
        let keep = unit
            .context
            .obstacle_target
            .and_then(|id| ctx.obstacles.get(id))
            .map_or(false, |o| !o.is_destroyed() && o.distance_to(unit.pos) <= reach);
        if !keep {
            unit.context.obstacle_target = ctx.obstacles.nearest_destructible(unit.pos, reach).map(|o| o.id);
        }
    }
}

// ============================================================================
// STEERING
// ============================================================================

fn has_goal(unit: &Unit) -> bool {
    unit.context.target.is_some() || unit.context.obstacle_target.is_some()
}

/// Follow the flow field while no target is set.
pub struct FlowFollow;

impl BehaviorTrait for FlowFollow {
    fn id(&self) -> &'static str {
        "flow_follow"
    }

    fn on_move(&self, unit: &Unit, velocity: &mut Vec2, _dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        if has_goal(unit) {
            return;
        }
        *velocity += ctx.flow.vector_at(unit.pos) * unit.stats.move_speed * params.get("weight", 1.0);
    }
}

/// Close in on the current target; hold once in reach.
pub struct Chase;

impl BehaviorTrait for Chase {
    fn id(&self) -> &'static str {
        "chase"
    }

    fn on_move(&self, unit: &Unit, velocity: &mut Vec2, _dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        if unit.context.has_flag(FLAG_ENGAGED) || unit.context.has_flag(FLAG_SIEGING) {
            return;
        }
        let speed = unit.stats.move_speed * params.get("weight", 1.0);
        if let Some(target) = unit.context.target.and_then(|h| ctx.units.get_alive(h)) {
            *velocity += (target.pos - unit.pos).normalize_or_zero() * speed;
        } else if let Some(obstacle) = unit.context.obstacle_target.and_then(|id| ctx.obstacles.get(id)) {
            *velocity += (obstacle.closest_point(unit.pos) - unit.pos).normalize_or_zero() * speed;
        }
    }
}

/// March straight toward the opposing edge while no target is set.
pub struct Advance;

impl BehaviorTrait for Advance {
    fn id(&self) -> &'static str {
        "advance"
    }

    fn on_move(&self, unit: &Unit, velocity: &mut Vec2, _dt: f32, _ctx: &mut HookContext, params: &TraitParams) {
        if has_goal(unit) {
            return;
        }
        velocity.x += unit.faction.forward() * unit.stats.move_speed * params.get("weight", 1.0);
    }
}

/// Push away from crowded allies.
pub struct Separation;

impl BehaviorTrait for Separation {
    fn id(&self) -> &'static str {
        "separation"
    }

    fn on_move(&self, unit: &Unit, velocity: &mut Vec2, _dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        let radius = params.get("radius", 24.0);
        let strength = params.get("strength", 40.0);
        if radius <= 0.0 {
            return;
        }
        let mut push = Vec2::ZERO;
        ctx.spatial.for_each_in_radius(unit.pos.x, unit.pos.y, radius, |e| {
            if e.handle == unit.handle || e.faction != unit.faction {
                return;
            }
            let away = unit.pos - e.pos;
            let dist = away.length();
            if dist > 1e-4 {
                push += away / dist * (1.0 - dist / radius);
            } else {
                // Stacked exactly: split by slot order.
                let side = if unit.handle.index < e.handle.index { -1.0 } else { 1.0 };
                push.y += side;
            }
        });
        *velocity += push * strength;
    }
}

// ============================================================================
// ATTACKS
// ============================================================================

/// Visual projectile for ranged attacks.
pub struct Ranged;

impl BehaviorTrait for Ranged {
    fn id(&self) -> &'static str {
        "ranged"
    }

    fn on_hit(&self, attacker: &Unit, target: &Unit, _damage: f32, ctx: &mut HookContext, _params: &TraitParams) {
        ctx.emit(SimEvent::Projectile {
            from_x: attacker.pos.x,
            from_y: attacker.pos.y,
            to_x: target.pos.x,
            to_y: target.pos.y,
            element: attacker.stats.element,
        });
    }
}

/// Visual slash for melee attacks.
pub struct Melee;

impl BehaviorTrait for Melee {
    fn id(&self) -> &'static str {
        "melee"
    }

    fn on_hit(&self, attacker: &Unit, target: &Unit, _damage: f32, ctx: &mut HookContext, _params: &TraitParams) {
        ctx.emit(SimEvent::Slash {
            x: target.pos.x,
            y: target.pos.y,
            facing: attacker.facing,
        });
    }
}

/// Refuse to shoot at targets closer than `min_range`.
pub struct Marksman;

impl BehaviorTrait for Marksman {
    fn id(&self) -> &'static str {
        "marksman"
    }

    fn on_pre_attack(&self, unit: &Unit, target: &Unit, _ctx: &HookContext, params: &TraitParams) -> AttackDecision {
        let min_range = params.get("min_range", 30.0);
        if unit.pos.distance_squared(target.pos) < min_range * min_range {
            AttackDecision::Veto
        } else {
            AttackDecision::Allow
        }
    }
}

/// Apply a status to the target on every hit.
pub struct OnHitStatus {
    id: &'static str,
    kind: StatusKind,
    stacks: f32,
    duration: f32,
}

impl OnHitStatus {
    pub const fn new(id: &'static str, kind: StatusKind, stacks: f32, duration: f32) -> Self {
        Self { id, kind, stacks, duration }
    }
}

impl BehaviorTrait for OnHitStatus {
    fn id(&self) -> &'static str {
        self.id
    }

    fn on_hit(&self, _attacker: &Unit, target: &Unit, _damage: f32, ctx: &mut HookContext, params: &TraitParams) {
        let stacks = params.get("stacks", self.stacks).clamp(0.0, u8::MAX as f32) as u8;
        ctx.request(CombatRequest::Status {
            target: target.handle,
            kind: self.kind,
            stacks,
            duration: params.get("duration", self.duration),
        });
    }
}

/// Splash a fraction of the hit onto enemies around the target.
pub struct Cleave;

impl BehaviorTrait for Cleave {
    fn id(&self) -> &'static str {
        "cleave"
    }

    fn on_hit(&self, attacker: &Unit, target: &Unit, damage: f32, ctx: &mut HookContext, params: &TraitParams) {
        let amount = damage * params.get("fraction", 0.3);
        if amount <= 0.0 {
            return;
        }
        let radius = params.get("radius", 30.0);
        let spatial = ctx.spatial;
        let bus = &mut *ctx.bus;
        spatial.for_each_in_radius(target.pos.x, target.pos.y, radius, |e| {
            if e.handle != target.handle && e.faction != attacker.faction {
                bus.push(CombatRequest::TrueDamage { target: e.handle, amount });
            }
        });
    }
}

/// Heal the attacker for a fraction of each hit.
pub struct Lifesteal;

impl BehaviorTrait for Lifesteal {
    fn id(&self) -> &'static str {
        "lifesteal"
    }

    fn on_hit(&self, attacker: &Unit, _target: &Unit, damage: f32, ctx: &mut HookContext, params: &TraitParams) {
        let amount = damage * params.get("fraction", 0.2);
        if amount > 0.0 {
            ctx.request(CombatRequest::Heal { target: attacker.handle, amount });
        }
    }
}

/// Gain frenzy stacks on every kill.
pub struct FrenzyOnKill;

impl BehaviorTrait for FrenzyOnKill {
    fn id(&self) -> &'static str {
        "frenzy_on_kill"
    }

    fn on_kill(&self, attacker: &Unit, _victim: &Unit, ctx: &mut HookContext, params: &TraitParams) {
        ctx.request(CombatRequest::Status {
            target: attacker.handle,
            kind: StatusKind::Frenzied,
            stacks: params.get("stacks", 1.0).clamp(0.0, u8::MAX as f32) as u8,
            duration: params.get("duration", 5.0),
        });
        ctx.emit(SimEvent::FloatingText {
            x: attacker.pos.x,
            y: attacker.pos.y,
            text: "FRENZY",
        });
    }
}

// ============================================================================
// DEFENCE & LIFECYCLE
// ============================================================================

/// Reflect a fraction of incoming damage as true damage.
pub struct Thorns;

impl BehaviorTrait for Thorns {
    fn id(&self) -> &'static str {
        "thorns"
    }

    fn on_was_hit(
        &self,
        _defender: &Unit,
        attacker: &Unit,
        damage: f32,
        ctx: &mut HookContext,
        params: &TraitParams,
    ) -> f32 {
        let reflected = damage * params.get("fraction", 0.15);
        if reflected > 0.0 {
            ctx.request(CombatRequest::TrueDamage { target: attacker.handle, amount: reflected });
        }
        damage
    }
}

/// Flat fractional damage reduction.
pub struct Bulwark;

impl BehaviorTrait for Bulwark {
    fn id(&self) -> &'static str {
        "bulwark"
    }

    fn on_was_hit(
        &self,
        _defender: &Unit,
        _attacker: &Unit,
        damage: f32,
        _ctx: &mut HookContext,
        params: &TraitParams,
    ) -> f32 {
        damage * (1.0 - params.get("reduction", 0.2).clamp(0.0, 0.9))
    }
}

/// Explode on death, dealing true damage to nearby enemies.
pub struct Volatile;

impl BehaviorTrait for Volatile {
    fn id(&self) -> &'static str {
        "volatile"
    }

    fn on_death(&self, unit: &Unit, ctx: &mut HookContext, params: &TraitParams) {
        let radius = params.get("radius", 50.0);
        let amount = params.get("damage", 30.0);
        ctx.emit(SimEvent::Explosion { x: unit.pos.x, y: unit.pos.y, radius });
        let spatial = ctx.spatial;
        let bus = &mut *ctx.bus;
        spatial.for_each_in_radius(unit.pos.x, unit.pos.y, radius, |e| {
            if e.faction != unit.faction {
                bus.push(CombatRequest::TrueDamage { target: e.handle, amount });
            }
        });
    }
}

/// Heal a fixed amount per second. The resolver clamps to max hp.
pub struct Regenerate;

impl BehaviorTrait for Regenerate {
    fn id(&self) -> &'static str {
        "regenerate"
    }

    fn on_tick(&self, unit: &mut Unit, dt: f32, ctx: &mut HookContext, params: &TraitParams) {
        let stats = &unit.stats;
        let amount = params.get("per_second", 1.0) * dt;
        if amount > 0.0 && stats.hp > 0.0 && stats.hp < stats.max_hp {
            ctx.request(CombatRequest::Heal { target: unit.handle, amount });
        }
    }
}
