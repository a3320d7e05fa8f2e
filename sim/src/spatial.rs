//! Spatial partitioning for efficient neighbor queries.
//!
//! Provides O(1) cell lookup and O(k) neighbor queries where k is the number
//! of units in nearby cells, rather than O(n) for brute force.
//!
//! ## Cell keys
//!
//! Cell coordinates are `floor(pos / cell_size)` as `i32` and are packed into
//! one `u64` key (x in the high 32 bits, y in the low 32). The packing is
//! lossless, so two distinct cells never share a bucket. The float-to-int cast
//! saturates, which means positions beyond `±cell_size * 2^31` all land in the
//! edge cell. With the default 64-unit cells that bound is about 1.4e11 world
//! units, far outside any streamed battlefield.

use crate::components::Faction;
use crate::pool::{UnitHandle, UnitPool};
use bevy_ecs::prelude::*;
use glam::Vec2;
use std::collections::HashMap;

/// Idle buckets kept around before a clear drops the empty ones.
const MAX_IDLE_BUCKETS: usize = 4096;

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub handle: UnitHandle,
    pub pos: Vec2,
    pub radius: f32,
    pub faction: Faction,
}

/// Grid-based spatial partitioning of live units.
#[derive(Resource, Debug)]
pub struct SpatialIndex {
    /// Cell size in world units.
    pub cell_size: f32,
    cells: HashMap<u64, Vec<SpatialEntry>>,
    /// Reverse lookup: slot index to cell key, for eviction.
    slot_cells: Vec<Option<u64>>,
    len: usize,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(64.0)
    }
}

/// Pack signed cell coordinates into a single key.
#[inline]
pub fn pack_cell(cx: i32, cy: i32) -> u64 {
    ((cx as u32 as u64) << 32) | (cy as u32 as u64)
}

/// Inverse of [`pack_cell`].
#[inline]
pub fn unpack_cell(key: u64) -> (i32, i32) {
    ((key >> 32) as u32 as i32, key as u32 as i32)
}

impl SpatialIndex {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            slot_cells: Vec::new(),
            len: 0,
        }
    }

    /// Convert world coordinates to cell coordinates.
    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
        )
    }

    /// Empty every bucket, keeping their allocations for the next rebuild.
    pub fn clear(&mut self) {
        if self.cells.len() > MAX_IDLE_BUCKETS {
            self.cells.retain(|_, entries| !entries.is_empty());
        }
        for entries in self.cells.values_mut() {
            entries.clear();
        }
        for slot in self.slot_cells.iter_mut() {
            *slot = None;
        }
        self.len = 0;
    }

    /// Drop all buckets and their storage.
    pub fn reset(&mut self) {
        self.cells.clear();
        self.slot_cells.clear();
        self.len = 0;
    }

    /// Bucket a unit by its current cell.
    pub fn insert(&mut self, handle: UnitHandle, pos: Vec2, radius: f32, faction: Faction) {
        let (cx, cy) = self.world_to_cell(pos.x, pos.y);
        let key = pack_cell(cx, cy);
        self.cells.entry(key).or_default().push(SpatialEntry {
            handle,
            pos,
            radius,
            faction,
        });

        let slot = handle.index as usize;
        if self.slot_cells.len() <= slot {
            self.slot_cells.resize(slot + 1, None);
        }
        self.slot_cells[slot] = Some(key);
        self.len += 1;
    }

    /// Remove a unit that died after the index was built.
    pub fn evict(&mut self, handle: UnitHandle) -> bool {
        let Some(key) = self.slot_cells.get_mut(handle.index as usize).and_then(Option::take) else {
            return false;
        };
        let Some(entries) = self.cells.get_mut(&key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.handle != handle);
        let removed = before - entries.len();
        self.len -= removed;
        removed > 0
    }

    /// Drop entries whose handle no longer resolves to a live unit, such as
    /// units recycled in bulk between rebuilds. Returns the number removed.
    pub fn evict_stale(&mut self, pool: &UnitPool) -> usize {
        let mut removed = 0;
        for entries in self.cells.values_mut() {
            entries.retain(|e| {
                let live = pool.is_alive(e.handle);
                if !live {
                    removed += 1;
                }
                live
            });
        }
        for (slot, key) in self.slot_cells.iter_mut().enumerate() {
            let Some(k) = *key else { continue };
            let present = self
                .cells
                .get(&k)
                .map_or(false, |entries| entries.iter().any(|e| e.handle.index as usize == slot));
            if !present {
                *key = None;
            }
        }
        self.len -= removed;
        removed
    }

    pub fn contains(&self, handle: UnitHandle) -> bool {
        self.slot_cells
            .get(handle.index as usize)
            .copied()
            .flatten()
            .and_then(|key| self.cells.get(&key))
            .map_or(false, |entries| entries.iter().any(|e| e.handle == handle))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Visit every entry whose center lies within `radius` of `(x, y)`.
    ///
    /// Scans only the cells overlapping the circle's bounding box and
    /// filters by squared distance.
    pub fn for_each_in_radius(&self, x: f32, y: f32, radius: f32, mut f: impl FnMut(&SpatialEntry)) {
        if radius < 0.0 {
            return;
        }
        let radius_sq = radius * radius;
        let (min_cx, min_cy) = self.world_to_cell(x - radius, y - radius);
        let (max_cx, max_cy) = self.world_to_cell(x + radius, y + radius);

        for cx in min_cx..=max_cx {
            for cy in min_cy..=max_cy {
                let Some(entries) = self.cells.get(&pack_cell(cx, cy)) else {
                    continue;
                };
                for entry in entries {
                    let dx = entry.pos.x - x;
                    let dy = entry.pos.y - y;
                    if dx * dx + dy * dy <= radius_sq {
                        f(entry);
                    }
                }
            }
        }
    }

    /// Fill `out` with all units within the radius. Returns the count.
    pub fn query(&self, x: f32, y: f32, radius: f32, out: &mut Vec<SpatialEntry>) -> usize {
        out.clear();
        self.for_each_in_radius(x, y, radius, |e| out.push(*e));
        out.len()
    }

    /// Like [`query`](Self::query) but only units of the opposing faction.
    pub fn query_enemies(
        &self,
        x: f32,
        y: f32,
        radius: f32,
        my_faction: Faction,
        out: &mut Vec<SpatialEntry>,
    ) -> usize {
        out.clear();
        self.for_each_in_radius(x, y, radius, |e| {
            if e.faction != my_faction {
                out.push(*e);
            }
        });
        out.len()
    }

    /// Nearest opposing unit within `max_radius`. Ties go to the lower slot.
    pub fn nearest_enemy(&self, x: f32, y: f32, max_radius: f32, my_faction: Faction) -> Option<SpatialEntry> {
        let mut best: Option<(f32, SpatialEntry)> = None;
        self.for_each_in_radius(x, y, max_radius, |e| {
            if e.faction == my_faction {
                return;
            }
            let d = e.pos.distance_squared(Vec2::new(x, y));
            let better = match &best {
                None => true,
                Some((bd, be)) => d < *bd || (d == *bd && e.handle.index < be.handle.index),
            };
            if better {
                best = Some((d, *e));
            }
        });
        best.map(|(_, e)| e)
    }

    /// Number of units in one cell.
    pub fn cell_count(&self, cell: (i32, i32)) -> usize {
        self.cells.get(&pack_cell(cell.0, cell.1)).map_or(0, Vec::len)
    }
}

/// System that rebuilds the spatial index each tick from the live units.
pub fn spatial_index_rebuild_system(mut index: ResMut<SpatialIndex>, pool: Res<UnitPool>) {
    index.clear();
    for unit in pool.iter_active() {
        index.insert(unit.handle, unit.pos, unit.radius, unit.faction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn handle(index: u32) -> UnitHandle {
        UnitHandle { index, generation: 0 }
    }

    #[test]
    fn test_insert_query() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(handle(1), Vec2::new(5.0, 5.0), 4.0, Faction::Friendly);
        index.insert(handle(2), Vec2::new(15.0, 5.0), 4.0, Faction::Friendly);
        index.insert(handle(3), Vec2::new(100.0, 100.0), 4.0, Faction::Hostile);

        let mut out = Vec::new();
        assert_eq!(index.query(5.0, 5.0, 15.0, &mut out), 2);
        assert_eq!(index.query(5.0, 5.0, 5.0, &mut out), 1);
        assert_eq!(index.query(100.0, 100.0, 10.0, &mut out), 1);
        assert_eq!(out[0].handle, handle(3));
    }

    #[test]
    fn test_negative_coordinates() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(handle(0), Vec2::new(-0.5, -0.5), 1.0, Faction::Friendly);
        index.insert(handle(1), Vec2::new(0.5, 0.5), 1.0, Faction::Friendly);
        assert_eq!(index.cell_count((-1, -1)), 1);
        assert_eq!(index.cell_count((0, 0)), 1);

        let mut out = Vec::new();
        assert_eq!(index.query(0.0, 0.0, 1.0, &mut out), 2);
    }

    #[test]
    fn test_pack_is_lossless() {
        for &(cx, cy) in &[(0, 0), (-1, 0), (0, -1), (i32::MAX, i32::MIN), (123, -456)] {
            assert_eq!(unpack_cell(pack_cell(cx, cy)), (cx, cy));
        }
        assert_ne!(pack_cell(-1, 0), pack_cell(0, -1));
    }

    #[test]
    fn test_enemy_queries() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(handle(1), Vec2::new(0.0, 0.0), 4.0, Faction::Friendly);
        index.insert(handle(2), Vec2::new(30.0, 0.0), 4.0, Faction::Hostile);
        index.insert(handle(3), Vec2::new(20.0, 0.0), 4.0, Faction::Hostile);

        let mut out = Vec::new();
        assert_eq!(index.query_enemies(0.0, 0.0, 50.0, Faction::Friendly, &mut out), 2);

        let nearest = index.nearest_enemy(0.0, 0.0, 50.0, Faction::Friendly).unwrap();
        assert_eq!(nearest.handle, handle(3));
        assert!(index.nearest_enemy(0.0, 0.0, 10.0, Faction::Friendly).is_none());
    }

    #[test]
    fn test_evict_and_clear() {
        let mut index = SpatialIndex::new(10.0);
        index.insert(handle(0), Vec2::new(1.0, 1.0), 4.0, Faction::Friendly);
        index.insert(handle(1), Vec2::new(2.0, 2.0), 4.0, Faction::Hostile);
        assert!(index.evict(handle(1)));
        assert!(!index.evict(handle(1)));
        assert!(!index.contains(handle(1)));
        assert_eq!(index.len(), 1);

        index.clear();
        assert!(index.is_empty());
        let mut out = Vec::new();
        assert_eq!(index.query(0.0, 0.0, 100.0, &mut out), 0);
    }

    #[test]
    fn test_rebuild_skips_dead_units() {
        use crate::archetype::{ArchetypeCatalog, GlobalModifiers, UnitRoster};
        use crate::behavior::TraitRegistry;
        use crate::components::{Lifecycle, UnitKind};
        use crate::pool::SpawnRequest;

        let roster = UnitRoster::resolve(&ArchetypeCatalog::builtin(), &TraitRegistry::standard());
        let mods = GlobalModifiers::default();
        let mut world = World::new();
        let mut pool = UnitPool::new(4);
        let alive = pool
            .spawn(SpawnRequest::new(Faction::Friendly, UnitKind::Militia, Vec2::ZERO, 1), &roster, &mods)
            .unwrap();
        let dead = pool
            .spawn(SpawnRequest::new(Faction::Hostile, UnitKind::Grunt, Vec2::ONE, 1), &roster, &mods)
            .unwrap();
        pool.get_mut(dead).unwrap().lifecycle = Lifecycle::Decaying;
        world.insert_resource(pool);
        world.insert_resource(SpatialIndex::new(16.0));

        let mut schedule = Schedule::default();
        schedule.add_systems(spatial_index_rebuild_system);
        schedule.run(&mut world);

        let index = world.resource::<SpatialIndex>();
        assert!(index.contains(alive));
        assert!(!index.contains(dead));
    }

    #[test]
    fn test_evict_stale_drops_released_units() {
        use crate::archetype::{ArchetypeCatalog, GlobalModifiers, UnitRoster};
        use crate::behavior::TraitRegistry;
        use crate::components::UnitKind;
        use crate::pool::SpawnRequest;

        let roster = UnitRoster::resolve(&ArchetypeCatalog::builtin(), &TraitRegistry::standard());
        let mods = GlobalModifiers::default();
        let mut pool = UnitPool::new(4);
        let mut index = SpatialIndex::new(16.0);
        let mut spawn = |pool: &mut UnitPool, faction: Faction, kind: UnitKind, x: f32| {
            let h = pool
                .spawn(SpawnRequest::new(faction, kind, Vec2::new(x, 0.0), 1), &roster, &mods)
                .unwrap();
            index.insert(h, Vec2::new(x, 0.0), 4.0, faction);
            h
        };
        let friend = spawn(&mut pool, Faction::Friendly, UnitKind::Militia, 0.0);
        let foe_a = spawn(&mut pool, Faction::Hostile, UnitKind::Grunt, 5.0);
        let foe_b = spawn(&mut pool, Faction::Hostile, UnitKind::Grunt, 40.0);

        assert_eq!(pool.release_faction(Faction::Hostile), 2);
        assert_eq!(index.evict_stale(&pool), 2);
        assert_eq!(index.len(), 1);
        assert!(index.contains(friend));
        assert!(!index.contains(foe_a) && !index.contains(foe_b));

        let mut out = Vec::new();
        index.query(0.0, 0.0, 100.0, &mut out);
        assert!(out.iter().all(|e| pool.is_alive(e.handle)));
        assert_eq!(index.evict_stale(&pool), 0);
    }

    proptest! {
        #[test]
        fn test_query_matches_brute_force(
            points in prop::collection::vec((-500.0f32..500.0, -500.0f32..500.0), 0..80),
            cx in -500.0f32..500.0,
            cy in -500.0f32..500.0,
            radius in 0.0f32..300.0,
            cell_size in 4.0f32..100.0,
        ) {
            let mut index = SpatialIndex::new(cell_size);
            for (i, (x, y)) in points.iter().enumerate() {
                index.insert(handle(i as u32), Vec2::new(*x, *y), 1.0, Faction::Friendly);
            }

            let mut out = Vec::new();
            index.query(cx, cy, radius, &mut out);
            let mut got: Vec<u32> = out.iter().map(|e| e.handle.index).collect();
            got.sort_unstable();

            let expected: Vec<u32> = points
                .iter()
                .enumerate()
                .filter(|(_, (x, y))| {
                    let dx = x - cx;
                    let dy = y - cy;
                    dx * dx + dy * dy <= radius * radius
                })
                .map(|(i, _)| i as u32)
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
