//! Snapshot types handed to the presentation and UI layers.
//!
//! `Snapshot` is the per-frame visual state. `BattleSummary` is the coarse
//! view a UI polls at its own refresh rate.

use crate::components::{Faction, UnitKind};
use crate::pool::UnitPool;
use crate::status::StatusKind;
use crate::streaming::StreamingManager;
use crate::terrain::{Obstacle, ObstacleSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound of the squash/stretch hint at full speed.
const MAX_STRETCH: f32 = 0.25;

/// Visual state of one occupied pool slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitVisual {
    pub slot: u32,
    pub kind: UnitKind,
    pub faction: Faction,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub facing: f32,
    /// 1.0 at rest, up to 1.25 at full speed.
    pub stretch: f32,
    pub hp_fraction: f32,
    /// Status with the most stacks, for tinting.
    pub tint: Option<StatusKind>,
    /// Dead and waiting for its slot to be reclaimed.
    pub dying: bool,
}

/// Complete visual snapshot for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f32,
    pub camera_x: f32,
    pub units: Vec<UnitVisual>,
    pub obstacles: Vec<Obstacle>,
}

impl Snapshot {
    /// Capture every occupied slot (alive and decaying) in slot order.
    pub fn capture(
        pool: &UnitPool,
        obstacles: &ObstacleSet,
        streaming: &StreamingManager,
        tick: u64,
        time: f32,
    ) -> Self {
        let units = pool
            .iter_occupied()
            .map(|u| {
                let speed_fraction = if u.stats.move_speed > 0.0 {
                    (u.velocity.length() / u.stats.move_speed).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                UnitVisual {
                    slot: u.handle.index,
                    kind: u.kind,
                    faction: u.faction,
                    x: u.pos.x,
                    y: u.pos.y,
                    vx: u.velocity.x,
                    vy: u.velocity.y,
                    facing: u.facing,
                    stretch: 1.0 + MAX_STRETCH * speed_fraction,
                    hp_fraction: u.stats.hp_fraction(),
                    tint: u.statuses.dominant(),
                    dying: u.is_dead(),
                }
            })
            .collect();

        let mut obstacles: Vec<Obstacle> = obstacles.iter().cloned().collect();
        obstacles.sort_by_key(|o| o.id);

        Self {
            tick,
            time,
            camera_x: streaming.camera_x(),
            units,
            obstacles,
        }
    }
}

/// Coarse battle state for menus and HUDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattleSummary {
    pub tick: u64,
    pub stage: u32,
    pub furthest_stage: u32,
    pub camera_x: f32,
    pub paused: bool,
    pub friendly: usize,
    pub hostile: usize,
    /// Live units per kind.
    pub by_kind: BTreeMap<UnitKind, usize>,
}

impl BattleSummary {
    pub fn capture(pool: &UnitPool, streaming: &StreamingManager, stage: u32, tick: u64, paused: bool) -> Self {
        let mut summary = Self {
            tick,
            stage,
            furthest_stage: streaming.furthest_stage(),
            camera_x: streaming.camera_x(),
            paused,
            ..Default::default()
        };
        for unit in pool.iter_active() {
            match unit.faction {
                Faction::Friendly => summary.friendly += 1,
                Faction::Hostile => summary.hostile += 1,
            }
            *summary.by_kind.entry(unit.kind).or_insert(0) += 1;
        }
        summary
    }

    pub fn count(&self, kind: UnitKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{ArchetypeCatalog, GlobalModifiers, UnitRoster};
    use crate::behavior::TraitRegistry;
    use crate::components::Lifecycle;
    use crate::pool::SpawnRequest;
    use crate::terrain::ObstacleId;
    use glam::Vec2;

    fn pool_with(units: &[(Faction, UnitKind)]) -> UnitPool {
        let roster = UnitRoster::resolve(&ArchetypeCatalog::builtin(), &TraitRegistry::standard());
        let mut pool = UnitPool::new(16);
        for (i, &(faction, kind)) in units.iter().enumerate() {
            pool.spawn(
                SpawnRequest::new(faction, kind, Vec2::new(i as f32 * 10.0, 50.0), 1),
                &roster,
                &GlobalModifiers::default(),
            )
            .unwrap();
        }
        pool
    }

    #[test]
    fn test_snapshot_marks_dying_units() {
        let mut pool = pool_with(&[(Faction::Friendly, UnitKind::Militia), (Faction::Hostile, UnitKind::Grunt)]);
        let victim = pool.iter_active().nth(1).unwrap().handle;
        {
            let unit = pool.get_mut(victim).unwrap();
            unit.lifecycle = Lifecycle::Decaying;
            unit.stats.hp = 0.0;
            unit.statuses.apply(StatusKind::Burning, 2, 1.0);
        }
        let mut obstacles = ObstacleSet::new();
        obstacles.insert(Obstacle::rock(ObstacleId(4), Vec2::new(1.0, 2.0), Vec2::ONE));

        let snapshot = Snapshot::capture(&pool, &obstacles, &StreamingManager::new(), 7, 0.5);
        assert_eq!(snapshot.tick, 7);
        assert_eq!(snapshot.units.len(), 2);
        assert!(!snapshot.units[0].dying);
        assert!(snapshot.units[1].dying);
        assert_eq!(snapshot.units[1].hp_fraction, 0.0);
        assert_eq!(snapshot.units[1].tint, Some(StatusKind::Burning));
        assert_eq!(snapshot.obstacles.len(), 1);
    }

    #[test]
    fn test_stretch_follows_speed() {
        let mut pool = pool_with(&[(Faction::Friendly, UnitKind::Militia)]);
        let handle = pool.iter_active().next().unwrap().handle;
        let speed = pool.get(handle).unwrap().stats.move_speed;
        pool.get_mut(handle).unwrap().velocity = Vec2::new(speed, 0.0);

        let snapshot = Snapshot::capture(&pool, &ObstacleSet::new(), &StreamingManager::new(), 0, 0.0);
        assert!((snapshot.units[0].stretch - 1.25).abs() < 1e-5);
    }

    #[test]
    fn test_summary_counts_live_units() {
        let pool = pool_with(&[
            (Faction::Friendly, UnitKind::Militia),
            (Faction::Friendly, UnitKind::Militia),
            (Faction::Friendly, UnitKind::Archer),
            (Faction::Hostile, UnitKind::Grunt),
        ]);
        let summary = BattleSummary::capture(&pool, &StreamingManager::new(), 0, 12, true);
        assert_eq!(summary.friendly, 3);
        assert_eq!(summary.hostile, 1);
        assert_eq!(summary.count(UnitKind::Militia), 2);
        assert_eq!(summary.count(UnitKind::Knight), 0);
        assert!(summary.paused);
    }
}
