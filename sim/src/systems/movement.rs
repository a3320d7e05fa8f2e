//! Movement system - folds steering hooks into one velocity and integrates it.

use crate::behavior::{HookContext, TraitRegistry};
use crate::combat::CombatBus;
use crate::config::SimConfig;
use crate::events::EventStream;
use crate::flowfield::FlowField;
use crate::pool::{UnitHandle, UnitPool};
use crate::spatial::SpatialIndex;
use crate::terrain::ObstacleSet;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;
use glam::Vec2;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

#[derive(SystemParam)]
pub struct MovementParams<'w, 's> {
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

/// System that applies steering to position.
///
/// Every bound trait adds into one velocity, which is clamped to the unit's
/// status-adjusted speed, integrated once, then resolved against obstacles
/// and the lane bounds.
pub fn movement_system(params: MovementParams) {
    let MovementParams {
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
    let delta = dt.0;

    pool.active_handles(&mut handles);
    for handle in handles.iter() {
        let Some((unit, view)) = pool.split_active_mut(handle.index as usize) else {
            continue;
        };

        let speed_mult = unit.statuses.move_speed_multiplier();
        if speed_mult <= 0.0 {
            unit.velocity = Vec2::ZERO;
            continue;
        }

        let mut velocity = Vec2::ZERO;
        {
            let mut ctx = HookContext {
                units: view,
                spatial: &spatial,
                flow: &flow,
                obstacles: &obstacles,
                config: &config,
                bus: &mut bus,
                events: &mut events,
            };
            for (behavior, params) in registry.bound(&unit.traits) {
                behavior.on_move(unit, &mut velocity, delta, &mut ctx, params);
            }
        }

        let max_speed = unit.stats.move_speed * speed_mult;
        velocity = velocity.clamp_length_max(max_speed);
        unit.velocity = velocity;
        if velocity.x.abs() > 1e-3 {
            unit.facing = velocity.x.signum();
        }

        let mut pos = unit.pos + velocity * delta;
        pos = obstacles.resolve_circle(pos, unit.radius);
        pos.y = pos.y.clamp(config.lane_min_y + unit.radius, config.lane_max_y - unit.radius);
        unit.pos = pos;
    }
}
