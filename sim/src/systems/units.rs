//! Per-unit status decay, tick hooks, target acquisition and auto-attack.

use super::movement::DeltaTime;
use crate::behavior::{HookContext, TraitRegistry};
use crate::combat::{CombatBus, CombatRequest};
use crate::components::{FLAG_ENGAGED, FLAG_SIEGING};
use crate::config::SimConfig;
use crate::events::{EventStream, SimEvent};
use crate::flowfield::FlowField;
use crate::pool::{UnitHandle, UnitPool};
use crate::spatial::SpatialIndex;
use crate::terrain::ObstacleSet;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;

#[derive(SystemParam)]
pub struct UnitTickParams<'w, 's> {
    dt: Res<'w, DeltaTime>,
    config: Res<'w, SimConfig>,
    pool: ResMut<'w, UnitPool>,
    spatial: Res<'w, SpatialIndex>,
    flow: Res<'w, FlowField>,
    obstacles: Res<'w, ObstacleSet>,
    registry: Res<'w, TraitRegistry>,
    bus: ResMut<'w, CombatBus>,
    events: ResMut<'w, EventStream>,
    handles: Local<'s, Vec<UnitHandle>>,
}

/// Fold tick and targeting hooks over every active unit, then queue attacks.
///
/// Damage is never applied here; DoT and attacks become bus requests that
/// the resolver drains right after.
pub fn unit_tick_system(params: UnitTickParams) {
    let UnitTickParams {
        dt,
        config,
        mut pool,
        spatial,
        flow,
        obstacles,
        registry,
        mut bus,
        mut events,
        mut handles,
    } = params;
    let dt = dt.0;

    pool.active_handles(&mut handles);
    for handle in handles.iter() {
        let Some((unit, view)) = pool.split_active_mut(handle.index as usize) else {
            continue;
        };

        // Status decay and damage over time.
        let dot = unit.statuses.tick(dt);
        if dot > 0.0 {
            bus.push(CombatRequest::TrueDamage { target: unit.handle, amount: dot });
        }
        unit.attack_timer = (unit.attack_timer - dt * unit.statuses.attack_rate_multiplier()).max(0.0);

        // Drop references that went stale since last tick.
        if unit.context.target.map_or(false, |t| view.get_alive(t).is_none()) {
            unit.context.target = None;
        }
        if unit.context.obstacle_target.map_or(false, |id| !obstacles.contains(id)) {
            unit.context.obstacle_target = None;
        }

        let mut ctx = HookContext {
            units: view,
            spatial: &spatial,
            flow: &flow,
            obstacles: &obstacles,
            config: &config,
            bus: &mut bus,
            events: &mut events,
        };

        let traits = std::mem::take(&mut unit.traits);
        for (behavior, params) in registry.bound(&traits) {
            behavior.on_tick(unit, dt, &mut ctx, params);
        }
        unit.context.retarget_timer -= dt;
        if unit.context.retarget_timer <= 0.0 {
            unit.context.retarget_timer = config.retarget_interval;
            for (behavior, params) in registry.bound(&traits) {
                behavior.on_update_target(unit, dt, &mut ctx, params);
            }
        }
        unit.traits = traits;

        // Engagement state, read by steering.
        let target = unit.context.target.and_then(|t| view.get_alive(t));
        let engaged = target.map_or(false, |t| unit.in_reach_of(t));
        let obstacle = unit.context.obstacle_target.and_then(|id| obstacles.get(id));
        let sieging = !engaged
            && obstacle.map_or(false, |o| o.distance_to(unit.pos) <= unit.stats.range + unit.radius);
        unit.context.set_flag(FLAG_ENGAGED, engaged);
        unit.context.set_flag(FLAG_SIEGING, sieging);

        if !unit.statuses.can_act() || unit.attack_timer > 0.0 {
            continue;
        }
        if let (true, Some(target)) = (engaged, target) {
            bus.push(CombatRequest::Attack { source: unit.handle, target: target.handle });
            unit.attack_timer = unit.stats.attack_interval;
        } else if let (true, Some(obstacle)) = (sieging, obstacle) {
            let amount = unit.stats.damage * unit.statuses.damage_multiplier();
            bus.push(CombatRequest::DamageObstacle { obstacle: obstacle.id, amount });
            let hit = obstacle.closest_point(unit.pos);
            events.emit(SimEvent::Slash { x: hit.x, y: hit.y, facing: unit.facing });
            unit.attack_timer = unit.stats.attack_interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{ArchetypeCatalog, GlobalModifiers, UnitRoster};
    use crate::components::{Faction, UnitKind};
    use crate::pool::SpawnRequest;
    use crate::spatial::spatial_index_rebuild_system;
    use crate::status::StatusKind;
    use crate::terrain::{Obstacle, ObstacleId};
    use glam::Vec2;

    fn world_with(units: &[(Faction, UnitKind, Vec2)]) -> (World, Vec<UnitHandle>) {
        let registry = TraitRegistry::standard();
        let roster = UnitRoster::resolve(&ArchetypeCatalog::builtin(), &registry);
        let mut pool = UnitPool::new(16);
        let handles = units
            .iter()
            .map(|&(faction, kind, pos)| {
                pool.spawn(SpawnRequest::new(faction, kind, pos, 1), &roster, &GlobalModifiers::default())
                    .unwrap()
            })
            .collect();

        let mut world = World::new();
        world.insert_resource(DeltaTime(0.1));
        world.insert_resource(SimConfig::default());
        world.insert_resource(pool);
        world.insert_resource(SpatialIndex::new(64.0));
        world.insert_resource(FlowField::new());
        world.insert_resource(ObstacleSet::new());
        world.insert_resource(registry);
        world.insert_resource(CombatBus::default());
        world.insert_resource(EventStream::new());
        (world, handles)
    }

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems((spatial_index_rebuild_system, unit_tick_system).chain());
        schedule.run(world);
    }

    #[test]
    fn test_acquires_target_and_attacks_in_reach() {
        let (mut world, h) = world_with(&[
            (Faction::Friendly, UnitKind::Militia, Vec2::new(100.0, 100.0)),
            (Faction::Hostile, UnitKind::Grunt, Vec2::new(120.0, 100.0)),
        ]);
        run(&mut world);

        let pool = world.resource::<UnitPool>();
        assert_eq!(pool.get(h[0]).unwrap().context.target, Some(h[1]));
        assert!(pool.get(h[0]).unwrap().context.has_flag(FLAG_ENGAGED));

        let mut bus = world.resource_mut::<CombatBus>();
        let mut attacks = 0;
        while let Some(request) = bus.pop() {
            if let CombatRequest::Attack { source, target } = request {
                assert!((source == h[0] && target == h[1]) || (source == h[1] && target == h[0]));
                attacks += 1;
            }
        }
        assert_eq!(attacks, 2);
    }

    #[test]
    fn test_stunned_unit_does_not_attack() {
        let (mut world, h) = world_with(&[
            (Faction::Friendly, UnitKind::Militia, Vec2::new(100.0, 100.0)),
            (Faction::Hostile, UnitKind::Grunt, Vec2::new(120.0, 100.0)),
        ]);
        world
            .resource_mut::<UnitPool>()
            .get_mut(h[0])
            .unwrap()
            .statuses
            .apply(StatusKind::Stunned, 1, 5.0);
        run(&mut world);

        let mut bus = world.resource_mut::<CombatBus>();
        while let Some(request) = bus.pop() {
            if let CombatRequest::Attack { source, .. } = request {
                assert_ne!(source, h[0]);
            }
        }
    }

    #[test]
    fn test_burning_queues_true_damage() {
        let (mut world, h) = world_with(&[(Faction::Hostile, UnitKind::Grunt, Vec2::new(50.0, 50.0))]);
        world
            .resource_mut::<UnitPool>()
            .get_mut(h[0])
            .unwrap()
            .statuses
            .apply(StatusKind::Burning, 2, 3.0);
        run(&mut world);

        let request = world.resource_mut::<CombatBus>().pop().unwrap();
        match request {
            CombatRequest::TrueDamage { target, amount } => {
                assert_eq!(target, h[0]);
                assert!((amount - 0.8).abs() < 1e-4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sieges_wall_in_reach() {
        let (mut world, h) = world_with(&[(Faction::Friendly, UnitKind::Sapper, Vec2::new(100.0, 100.0))]);
        world.resource_mut::<ObstacleSet>().insert(Obstacle::wall(
            ObstacleId(9),
            Vec2::new(125.0, 100.0),
            Vec2::new(10.0, 60.0),
            200.0,
        ));
        run(&mut world);

        let unit = world.resource::<UnitPool>().get(h[0]).unwrap().clone();
        assert_eq!(unit.context.obstacle_target, Some(ObstacleId(9)));
        assert!(unit.context.has_flag(FLAG_SIEGING));
        let request = world.resource_mut::<CombatBus>().pop().unwrap();
        assert!(matches!(request, CombatRequest::DamageObstacle { obstacle: ObstacleId(9), .. }));
    }
}
