//! Fixed-capacity unit pool.
//!
//! Slots are allocated once at startup and recycled through a free list.
//! Handles carry a generation so a reference to a reclaimed slot reads as
//! missing instead of silently pointing at the next occupant.

use crate::archetype::{GlobalModifiers, UnitRoster};
use crate::components::*;
use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Generational reference to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitHandle {
    pub index: u32,
    pub generation: u32,
}

/// Parameters of a spawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub faction: Faction,
    pub kind: UnitKind,
    pub pos: Vec2,
    pub level: u32,
}

impl SpawnRequest {
    pub fn new(faction: Faction, kind: UnitKind, pos: Vec2, level: u32) -> Self {
        Self { faction, kind, pos, level }
    }
}

/// Arena of reusable unit records.
#[derive(Resource, Debug)]
pub struct UnitPool {
    slots: Vec<Unit>,
    /// Free slot indices; popped from the back.
    free: Vec<u32>,
}

impl UnitPool {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity as u32)
            .map(|index| Unit::vacant(UnitHandle { index, generation: 0 }))
            .collect();
        // Reverse so the lowest index is handed out first.
        let free = (0..capacity as u32).rev().collect();
        Self { slots, free }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots (active or decaying).
    pub fn occupied(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|u| u.is_alive()).count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    /// Claim a slot and initialize it from the unit's archetype.
    ///
    /// Returns `None` when the pool is exhausted; callers drop the spawn.
    pub fn spawn(
        &mut self,
        request: SpawnRequest,
        roster: &UnitRoster,
        modifiers: &GlobalModifiers,
    ) -> Option<UnitHandle> {
        let Some(index) = self.free.pop() else {
            tracing::debug!(kind = ?request.kind, "unit pool exhausted, spawn dropped");
            return None;
        };
        let unit = &mut self.slots[index as usize];
        unit.reset_transient();

        unit.faction = request.faction;
        unit.kind = request.kind;
        unit.level = request.level.max(1);
        unit.pos = request.pos;
        unit.facing = request.faction.forward();

        match roster.get(request.kind) {
            Some(resolved) => {
                let archetype = &resolved.archetype;
                unit.stats = archetype.stats_at(unit.level, request.faction, modifiers);
                unit.radius = archetype.radius;
                unit.bounty = archetype.bounty;
                unit.traits.extend(resolved.bindings.iter().cloned());
            }
            None => {
                tracing::warn!(kind = ?request.kind, "no archetype registered, spawning inert unit");
                unit.stats = CombatStats::inert();
                unit.radius = crate::archetype::DEFAULT_RADIUS;
                unit.bounty = 0.0;
            }
        }

        unit.lifecycle = Lifecycle::Active;
        Some(unit.handle)
    }

    /// Return a slot to the free list. Stale or free handles are ignored.
    pub fn recycle(&mut self, handle: UnitHandle) -> bool {
        let Some(unit) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if unit.handle != handle || unit.lifecycle == Lifecycle::Free {
            return false;
        }
        unit.reset_transient();
        unit.lifecycle = Lifecycle::Free;
        unit.handle.generation = unit.handle.generation.wrapping_add(1);
        self.free.push(handle.index);
        true
    }

    /// Recycle every occupied slot.
    pub fn release_all(&mut self) -> usize {
        self.release_where(|_| true)
    }

    /// Recycle every occupied slot of one faction.
    pub fn release_faction(&mut self, faction: Faction) -> usize {
        self.release_where(|u| u.faction == faction)
    }

    fn release_where(&mut self, mut predicate: impl FnMut(&Unit) -> bool) -> usize {
        let mut released = 0;
        for i in 0..self.slots.len() {
            let unit = &self.slots[i];
            if unit.lifecycle != Lifecycle::Free && predicate(unit) {
                let handle = unit.handle;
                if self.recycle(handle) {
                    released += 1;
                }
            }
        }
        released
    }

    /// Any occupied slot matching the handle (active or decaying).
    pub fn get(&self, handle: UnitHandle) -> Option<&Unit> {
        self.slots
            .get(handle.index as usize)
            .filter(|u| u.handle == handle && u.lifecycle != Lifecycle::Free)
    }

    pub fn get_mut(&mut self, handle: UnitHandle) -> Option<&mut Unit> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|u| u.handle == handle && u.lifecycle != Lifecycle::Free)
    }

    pub fn get_alive_mut(&mut self, handle: UnitHandle) -> Option<&mut Unit> {
        self.get_mut(handle).filter(|u| u.is_alive())
    }

    /// Only live (not dead, not decaying) units.
    pub fn get_alive(&self, handle: UnitHandle) -> Option<&Unit> {
        self.get(handle).filter(|u| u.is_alive())
    }

    pub fn is_alive(&self, handle: UnitHandle) -> bool {
        self.get_alive(handle).is_some()
    }

    /// Fill `out` with the handles of all active units. Order follows slot
    /// index and is stable for the duration of a tick.
    pub fn active_handles(&self, out: &mut Vec<UnitHandle>) -> usize {
        out.clear();
        out.extend(self.iter_active().map(|u| u.handle));
        out.len()
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter(|u| u.is_alive())
    }

    /// Active and decaying units.
    pub fn iter_occupied(&self) -> impl Iterator<Item = &Unit> {
        self.slots.iter().filter(|u| u.lifecycle != Lifecycle::Free)
    }

    pub fn iter_occupied_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.slots.iter_mut().filter(|u| u.lifecycle != Lifecycle::Free)
    }

    /// Read-only view of every slot.
    pub fn view(&self) -> UnitView<'_> {
        UnitView {
            before: &self.slots,
            after: &[],
            split: self.slots.len(),
        }
    }

    /// Mutable access to the active unit in slot `index` plus a read-only view
    /// of every other slot.
    pub fn split_active_mut(&mut self, index: usize) -> Option<(&mut Unit, UnitView<'_>)> {
        if index >= self.slots.len() || !self.slots[index].is_alive() {
            return None;
        }
        let (before, rest) = self.slots.split_at_mut(index);
        let (unit, after) = rest.split_first_mut()?;
        Some((
            unit,
            UnitView {
                before,
                after,
                split: index,
            },
        ))
    }
}

/// Read-only view over the pool, optionally excluding one slot that is
/// currently borrowed mutably.
#[derive(Debug, Clone, Copy)]
pub struct UnitView<'a> {
    before: &'a [Unit],
    after: &'a [Unit],
    split: usize,
}

impl<'a> UnitView<'a> {
    fn slot(&self, index: usize) -> Option<&'a Unit> {
        let (before, after) = (self.before, self.after);
        if index < self.split {
            before.get(index)
        } else if index == self.split {
            None
        } else {
            after.get(index - self.split - 1)
        }
    }

    /// Occupied slot matching the handle. The excluded slot reads as `None`.
    pub fn get(&self, handle: UnitHandle) -> Option<&'a Unit> {
        self.slot(handle.index as usize)
            .filter(|u| u.handle == handle && u.lifecycle != Lifecycle::Free)
    }

    pub fn get_alive(&self, handle: UnitHandle) -> Option<&'a Unit> {
        self.get(handle).filter(|u| u.is_alive())
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &'a Unit> {
        let (before, after) = (self.before, self.after);
        before.iter().chain(after.iter()).filter(|u| u.is_alive())
    }
}
