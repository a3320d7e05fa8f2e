//! Camera follow, chunk generation and culling, run once per tick after movement.

use super::movement::DeltaTime;
use crate::archetype::{GlobalModifiers, UnitRoster};
use crate::config::SimConfig;
use crate::events::EventStream;
use crate::pool::{SpawnRequest, UnitPool};
use crate::streaming::{spawn_pending, ChunkTemplates, StreamingManager};
use crate::terrain::ObstacleSet;
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemParam;

#[derive(SystemParam)]
pub struct StreamingParams<'w, 's> {
    dt: Res<'w, DeltaTime>,
    config: Res<'w, SimConfig>,
    templates: Res<'w, ChunkTemplates>,
    roster: Res<'w, UnitRoster>,
    modifiers: Res<'w, GlobalModifiers>,
    manager: ResMut<'w, StreamingManager>,
    pool: ResMut<'w, UnitPool>,
    obstacles: ResMut<'w, ObstacleSet>,
    events: ResMut<'w, EventStream>,
    spawns: Local<'s, Vec<SpawnRequest>>,
}

pub fn streaming_system(params: StreamingParams) {
    let StreamingParams {
        dt,
        config,
        templates,
        roster,
        modifiers,
        mut manager,
        mut pool,
        mut obstacles,
        mut events,
        mut spawns,
    } = params;

    manager.update_camera(&pool, &obstacles, &config, dt.0);
    manager.advance(&config, &templates, &mut obstacles, &mut events, &mut spawns);
    if !spawns.is_empty() {
        spawn_pending(&mut pool, &roster, &modifiers, &mut spawns);
    }
}
