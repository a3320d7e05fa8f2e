//! Level streaming - chunk generation ahead of the camera and culling behind.
//!
//! The battlefield is a strip of fixed-width chunks, one per stage index.
//! Chunk content is a pure function of the stage index: the template is
//! `stage % template_count`, obstacle ids are derived from the stage, and
//! difficulty scales with the stage. Re-entering a region therefore rebuilds
//! exactly the same terrain.

use crate::archetype::{GlobalModifiers, UnitRoster};
use crate::components::{Faction, UnitKind};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::events::{EventStream, SimEvent, TerrainChange};
use crate::pool::{SpawnRequest, UnitPool};
use crate::terrain::{Obstacle, ObstacleId, ObstacleKind, ObstacleSet};
use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Low bits of an obstacle id hold its index within the chunk.
const CHUNK_ID_SHIFT: u32 = 8;
/// Wall health gain per stage.
const WALL_HEALTH_GROWTH: f32 = 0.15;
/// Vertical spacing between units of one spawn group.
const GROUP_SPACING: f32 = 18.0;

/// Most obstacles one chunk template may place.
pub const MAX_CHUNK_OBSTACLES: usize = 1 << CHUNK_ID_SHIFT;
/// Highest stage whose obstacle ids fit the packing.
pub const MAX_STAGE: u32 = u32::MAX >> CHUNK_ID_SHIFT;

/// Obstacle id for the `index`-th obstacle of a stage. Requires
/// `stage <= MAX_STAGE` and `index < MAX_CHUNK_OBSTACLES`.
pub fn chunk_obstacle_id(stage: u32, index: usize) -> ObstacleId {
    debug_assert!(stage <= MAX_STAGE && index < MAX_CHUNK_OBSTACLES);
    ObstacleId((stage << CHUNK_ID_SHIFT) | index as u32)
}

/// Stage that generated an obstacle id.
pub fn stage_of(id: ObstacleId) -> u32 {
    id.0 >> CHUNK_ID_SHIFT
}

/// Level of hostile units spawned by a stage.
pub fn hostile_level(stage: u32) -> u32 {
    1 + stage / 2
}

// ============================================================================
// TEMPLATES
// ============================================================================

/// Obstacle placement, relative to the chunk's left edge and the lane bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleTemplate {
    pub kind: ObstacleKind,
    pub x: f32,
    pub y: f32,
    pub half_width: f32,
    pub half_height: f32,
    /// Base health for walls, ignored for rocks.
    #[serde(default)]
    pub health: f32,
}

/// A group of hostile units, relative to the chunk's left edge and lane bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnTemplate {
    pub kind: UnitKind,
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTemplate {
    pub name: String,
    #[serde(default)]
    pub obstacles: Vec<ObstacleTemplate>,
    #[serde(default)]
    pub spawns: Vec<SpawnTemplate>,
}

/// Ordered chunk templates. Never empty.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTemplates {
    templates: Vec<ChunkTemplate>,
}

/// Output of generating one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedChunk {
    pub stage: u32,
    pub template: usize,
    pub obstacles: Vec<Obstacle>,
    pub spawns: Vec<SpawnRequest>,
}

impl ChunkTemplates {
    pub fn new(templates: Vec<ChunkTemplate>) -> Result<Self> {
        if templates.is_empty() {
            return Err(SimError::InvalidContent("at least one chunk template is required".into()));
        }
        if let Some(t) = templates.iter().find(|t| t.obstacles.len() > MAX_CHUNK_OBSTACLES) {
            return Err(SimError::InvalidContent(format!(
                "chunk template '{}' places {} obstacles, the limit is {}",
                t.name,
                t.obstacles.len(),
                MAX_CHUNK_OBSTACLES
            )));
        }
        Ok(Self { templates })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let templates: Vec<ChunkTemplate> = serde_json::from_str(json)?;
        Self::new(templates)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChunkTemplate> {
        self.templates.get(index)
    }

    /// Template index used for a stage.
    pub fn index_for(&self, stage: u32) -> usize {
        stage as usize % self.templates.len()
    }

    /// Build a stage's obstacles and hostile spawns. Pure in `stage`.
    pub fn generate_chunk(&self, stage: u32, config: &SimConfig) -> GeneratedChunk {
        let template_index = self.index_for(stage);
        let template = &self.templates[template_index];
        let origin = Vec2::new(stage as f32 * config.chunk_width, config.lane_min_y);
        let health_scale = 1.0 + WALL_HEALTH_GROWTH * stage as f32;

        let obstacles = template
            .obstacles
            .iter()
            .take(MAX_CHUNK_OBSTACLES)
            .enumerate()
            .map(|(i, t)| {
                let id = chunk_obstacle_id(stage, i);
                let pos = origin + Vec2::new(t.x, t.y);
                let half = Vec2::new(t.half_width, t.half_height);
                match t.kind {
                    ObstacleKind::Rock => Obstacle::rock(id, pos, half),
                    ObstacleKind::Wall => Obstacle::wall(id, pos, half, t.health.max(1.0) * health_scale),
                }
            })
            .collect();

        let level = hostile_level(stage);
        let mut spawns = Vec::new();
        for group in &template.spawns {
            let center = origin + Vec2::new(group.x, group.y);
            let spread = (group.count.saturating_sub(1)) as f32 * 0.5;
            for i in 0..group.count {
                let y = (center.y + (i as f32 - spread) * GROUP_SPACING).clamp(config.lane_min_y, config.lane_max_y);
                spawns.push(SpawnRequest::new(Faction::Hostile, group.kind, Vec2::new(center.x, y), level));
            }
        }

        GeneratedChunk {
            stage,
            template: template_index,
            obstacles,
            spawns,
        }
    }

    /// Three stock layouts sized for the default 640x320 chunk.
    pub fn builtin() -> Self {
        let rock = |x, y, hw, hh| ObstacleTemplate {
            kind: ObstacleKind::Rock,
            x,
            y,
            half_width: hw,
            half_height: hh,
            health: 0.0,
        };
        let wall = |x, y, hw, hh, health| ObstacleTemplate {
            kind: ObstacleKind::Wall,
            x,
            y,
            half_width: hw,
            half_height: hh,
            health,
        };
        let group = |kind, x, y, count| SpawnTemplate { kind, x, y, count };

        Self {
            templates: vec![
                ChunkTemplate {
                    name: "open_field".into(),
                    obstacles: vec![rock(320.0, 90.0, 24.0, 30.0)],
                    spawns: vec![
                        group(UnitKind::Grunt, 520.0, 160.0, 4),
                        group(UnitKind::Raider, 600.0, 90.0, 2),
                    ],
                },
                ChunkTemplate {
                    name: "barricade".into(),
                    obstacles: vec![
                        rock(200.0, 60.0, 30.0, 40.0),
                        rock(200.0, 260.0, 30.0, 40.0),
                        wall(480.0, 160.0, 16.0, 160.0, 300.0),
                    ],
                    spawns: vec![
                        group(UnitKind::Brute, 560.0, 160.0, 1),
                        group(UnitKind::Grunt, 600.0, 110.0, 3),
                        group(UnitKind::Spitter, 620.0, 240.0, 2),
                    ],
                },
                ChunkTemplate {
                    name: "gauntlet".into(),
                    obstacles: vec![
                        rock(260.0, 110.0, 24.0, 60.0),
                        rock(380.0, 220.0, 24.0, 60.0),
                        wall(560.0, 160.0, 12.0, 160.0, 220.0),
                    ],
                    spawns: vec![
                        group(UnitKind::Shaman, 610.0, 160.0, 1),
                        group(UnitKind::Bomber, 500.0, 70.0, 2),
                        group(UnitKind::Grunt, 520.0, 250.0, 4),
                    ],
                },
            ],
        }
    }
}

impl Default for ChunkTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// STREAMING MANAGER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    #[default]
    Unloaded,
    /// The entry stage and the one after it are generated.
    Loading,
    /// Chunks are generated on demand as the camera advances.
    Streaming,
}

/// Rolling window of generated stages plus the camera that drives it.
#[derive(Resource, Debug, Default)]
pub struct StreamingManager {
    state: RegionState,
    region_stage: u32,
    loaded: BTreeSet<u32>,
    furthest_stage: u32,
    camera_x: f32,
    camera_target: f32,
    culled: Vec<Obstacle>,
}

impl StreamingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RegionState {
        self.state
    }

    pub fn camera_x(&self) -> f32 {
        self.camera_x
    }

    pub fn camera_target(&self) -> f32 {
        self.camera_target
    }

    /// Stage the current region was entered at.
    pub fn region_stage(&self) -> u32 {
        self.region_stage
    }

    /// Highest stage the camera has reached.
    pub fn furthest_stage(&self) -> u32 {
        self.furthest_stage
    }

    pub fn loaded_stages(&self) -> impl Iterator<Item = u32> + '_ {
        self.loaded.iter().copied()
    }

    pub fn is_loaded(&self, stage: u32) -> bool {
        self.loaded.contains(&stage)
    }

    /// Stage under the camera.
    pub fn current_stage(&self, config: &SimConfig) -> u32 {
        stage_at(self.camera_x, config)
    }

    /// Reset to `stage`: drop hostile units and all terrain, then generate
    /// `stage` and `stage + 1`. Hostile spawns are appended to `spawns`.
    #[allow(clippy::too_many_arguments)]
    pub fn enter_region(
        &mut self,
        stage: u32,
        config: &SimConfig,
        templates: &ChunkTemplates,
        pool: &mut UnitPool,
        obstacles: &mut ObstacleSet,
        events: &mut EventStream,
        spawns: &mut Vec<SpawnRequest>,
    ) {
        let released = pool.release_faction(Faction::Hostile);
        obstacles.clear();
        obstacles.mark_dirty();
        self.loaded.clear();
        self.region_stage = stage;
        self.furthest_stage = stage;
        self.camera_x = stage as f32 * config.chunk_width;
        self.camera_target = self.camera_x;
        self.state = RegionState::Loading;

        events.emit(SimEvent::TerrainChanged {
            change: TerrainChange::RegionEntered(stage),
        });
        self.load(stage, config, templates, obstacles, events, spawns);
        self.load(stage.saturating_add(1), config, templates, obstacles, events, spawns);
        tracing::info!(stage, released, "entered region");
    }

    /// Generate stages up to the camera's look-ahead and cull stages that
    /// fell behind. No-op before a region is entered.
    pub fn advance(
        &mut self,
        config: &SimConfig,
        templates: &ChunkTemplates,
        obstacles: &mut ObstacleSet,
        events: &mut EventStream,
        spawns: &mut Vec<SpawnRequest>,
    ) {
        if self.state == RegionState::Unloaded {
            return;
        }

        let ahead = stage_at(self.camera_x + config.look_ahead, config).min(MAX_STAGE);
        let mut next = self.loaded.iter().next_back().map_or(self.region_stage, |s| s + 1);
        while next <= ahead {
            self.load(next, config, templates, obstacles, events, spawns);
            self.state = RegionState::Streaming;
            next += 1;
        }

        let current = self.current_stage(config);
        while let Some(&oldest) = self.loaded.iter().next() {
            if oldest.saturating_add(config.cull_behind_stages) >= current {
                break;
            }
            self.loaded.remove(&oldest);
            self.culled.clear();
            obstacles.remove_where(|o| stage_of(o.id) == oldest, &mut self.culled);
            events.emit(SimEvent::TerrainChanged {
                change: TerrainChange::ChunkCulled(oldest),
            });
            tracing::debug!(stage = oldest, obstacles = self.culled.len(), "chunk culled");
        }
    }

    /// Chase the furthest friendly unit plus a lead, held short of the
    /// nearest standing wall ahead, with exponential smoothing.
    pub fn update_camera(&mut self, pool: &UnitPool, obstacles: &ObstacleSet, config: &SimConfig, dt: f32) {
        if self.state == RegionState::Unloaded {
            return;
        }
        let furthest = pool
            .iter_active()
            .filter(|u| u.faction == Faction::Friendly)
            .map(|u| u.pos.x)
            .reduce(f32::max);

        if let Some(front) = furthest {
            let mut target = front + config.camera_lead;
            if let Some(wall) = obstacles.nearest_wall_ahead(front) {
                target = target.min(wall.min().x - config.wall_clamp_margin);
            }
            self.camera_target = target;
        }

        let alpha = 1.0 - (-config.camera_smoothing * dt).exp();
        self.camera_x += (self.camera_target - self.camera_x) * alpha;
        self.furthest_stage = self.furthest_stage.max(self.current_stage(config));
    }

    /// Forget everything. The next region entry starts fresh.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn load(
        &mut self,
        stage: u32,
        config: &SimConfig,
        templates: &ChunkTemplates,
        obstacles: &mut ObstacleSet,
        events: &mut EventStream,
        spawns: &mut Vec<SpawnRequest>,
    ) {
        if stage > MAX_STAGE {
            tracing::warn!(stage, "stage beyond the last addressable chunk, skipped");
            return;
        }
        if !self.loaded.insert(stage) {
            return;
        }
        let chunk = templates.generate_chunk(stage, config);
        tracing::debug!(
            stage,
            template = chunk.template,
            obstacles = chunk.obstacles.len(),
            spawns = chunk.spawns.len(),
            "chunk generated"
        );
        for obstacle in chunk.obstacles {
            obstacles.insert(obstacle);
        }
        spawns.extend(chunk.spawns);
        events.emit(SimEvent::TerrainChanged {
            change: TerrainChange::ChunkGenerated(stage),
        });
    }
}

fn stage_at(x: f32, config: &SimConfig) -> u32 {
    (x / config.chunk_width).floor().max(0.0) as u32
}

/// Spawn queued requests. Requests that find the pool exhausted are dropped.
pub fn spawn_pending(
    pool: &mut UnitPool,
    roster: &UnitRoster,
    modifiers: &GlobalModifiers,
    requests: &mut Vec<SpawnRequest>,
) -> usize {
    requests
        .drain(..)
        .filter(|request| pool.spawn(*request, roster, modifiers).is_some())
        .count()
}
