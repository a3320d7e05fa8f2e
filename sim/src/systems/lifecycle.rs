//! Slot reclamation for dead units.

use super::movement::DeltaTime;
use crate::pool::{UnitHandle, UnitPool};
use bevy_ecs::prelude::*;

/// Resource tracking the current simulation tick.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Count down decay timers and return expired slots to the free list.
///
/// Runs first in the tick, so no handle read later in the same tick can
/// observe a slot that was reused during it.
pub fn reclaim_system(dt: Res<DeltaTime>, mut pool: ResMut<UnitPool>, mut expired: Local<Vec<UnitHandle>>) {
    expired.clear();
    for unit in pool.iter_occupied_mut() {
        if !unit.is_dead() {
            continue;
        }
        unit.decay_timer -= dt.0;
        if unit.decay_timer <= 0.0 {
            expired.push(unit.handle);
        }
    }
    for handle in expired.iter() {
        pool.recycle(*handle);
    }
}
