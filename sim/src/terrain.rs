//! Battlefield obstacles - decorative rocks and destructible walls.
//!
//! Obstacles are axis-aligned boxes. Walls carry health and are removed from
//! the active set when it reaches zero; any insertion or removal marks the set
//! dirty so the flow field is recomputed on the next pathing pass.

use bevy_ecs::prelude::*;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Stable obstacle identifier. Streamed chunks derive ids from the stage
/// index so regenerating a stage reproduces the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleKind {
    /// Indestructible decoration.
    Rock,
    /// Destructible barrier.
    Wall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub kind: ObstacleKind,
    /// Center of the box.
    pub pos: Vec2,
    pub half_extents: Vec2,
    pub health: Option<f32>,
    pub max_health: Option<f32>,
    /// Explicit goal for the flow field (units path toward it, not around it).
    pub is_target: bool,
}

impl Obstacle {
    pub fn rock(id: ObstacleId, pos: Vec2, half_extents: Vec2) -> Self {
        Self {
            id,
            kind: ObstacleKind::Rock,
            pos,
            half_extents,
            health: None,
            max_health: None,
            is_target: false,
        }
    }

    pub fn wall(id: ObstacleId, pos: Vec2, half_extents: Vec2, health: f32) -> Self {
        Self {
            id,
            kind: ObstacleKind::Wall,
            pos,
            half_extents,
            health: Some(health),
            max_health: Some(health),
            is_target: true,
        }
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        self.pos - self.half_extents
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        self.pos + self.half_extents
    }

    pub fn is_destructible(&self) -> bool {
        self.health.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.health.map_or(false, |h| h <= 0.0)
    }

    /// Whether this obstacle counts as a flow-field goal right now.
    pub fn is_goal(&self) -> bool {
        self.is_target && !self.is_destroyed()
    }

    pub fn health_fraction(&self) -> f32 {
        match (self.health, self.max_health) {
            (Some(h), Some(m)) if m > 0.0 => (h / m).clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Distance from a point to the box surface (0 inside).
    pub fn distance_to(&self, point: Vec2) -> f32 {
        let d = ((point - self.pos).abs() - self.half_extents).max(Vec2::ZERO);
        d.length()
    }

    /// Closest point on (or in) the box.
    pub fn closest_point(&self, point: Vec2) -> Vec2 {
        point.clamp(self.min(), self.max())
    }
}

/// Outcome of damaging an obstacle.
#[derive(Debug, Clone, PartialEq)]
pub enum ObstacleHit {
    /// Unknown id or indestructible obstacle.
    Ignored,
    Damaged { remaining: f32 },
    /// Health reached zero; the obstacle has been removed.
    Destroyed(Obstacle),
}

/// The active obstacle set.
#[derive(Resource, Debug, Default)]
pub struct ObstacleSet {
    obstacles: Vec<Obstacle>,
    dirty: bool,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an obstacle, replacing any existing one with the same id.
    pub fn insert(&mut self, obstacle: Obstacle) {
        match self.obstacles.iter_mut().find(|o| o.id == obstacle.id) {
            Some(existing) => *existing = obstacle,
            None => self.obstacles.push(obstacle),
        }
        self.dirty = true;
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.iter().find(|o| o.id == id)
    }

    pub fn contains(&self, id: ObstacleId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.iter()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn remove(&mut self, id: ObstacleId) -> Option<Obstacle> {
        let index = self.obstacles.iter().position(|o| o.id == id)?;
        self.dirty = true;
        Some(self.obstacles.remove(index))
    }

    /// Remove every obstacle matching the predicate, appending them to `out`.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&Obstacle) -> bool, out: &mut Vec<Obstacle>) -> usize {
        let before = out.len();
        let mut i = 0;
        while i < self.obstacles.len() {
            if predicate(&self.obstacles[i]) {
                out.push(self.obstacles.remove(i));
            } else {
                i += 1;
            }
        }
        let removed = out.len() - before;
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Apply damage to a destructible obstacle, removing it at zero health.
    pub fn damage(&mut self, id: ObstacleId, amount: f32) -> ObstacleHit {
        let Some(index) = self.obstacles.iter().position(|o| o.id == id) else {
            return ObstacleHit::Ignored;
        };
        let obstacle = &mut self.obstacles[index];
        let Some(health) = obstacle.health.as_mut() else {
            return ObstacleHit::Ignored;
        };
        *health -= amount.max(0.0);
        if *health > 0.0 {
            return ObstacleHit::Damaged { remaining: *health };
        }
        self.dirty = true;
        ObstacleHit::Destroyed(self.obstacles.remove(index))
    }

    pub fn clear(&mut self) {
        if !self.obstacles.is_empty() {
            self.dirty = true;
        }
        self.obstacles.clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Read and reset the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Nearest standing wall whose near edge is at or ahead of `x`.
    pub fn nearest_wall_ahead(&self, x: f32) -> Option<&Obstacle> {
        self.obstacles
            .iter()
            .filter(|o| o.kind == ObstacleKind::Wall && !o.is_destroyed() && o.max().x >= x)
            .min_by(|a, b| a.min().x.total_cmp(&b.min().x).then(a.id.cmp(&b.id)))
    }

    /// Nearest destructible obstacle within `reach` of `point`.
    pub fn nearest_destructible(&self, point: Vec2, reach: f32) -> Option<&Obstacle> {
        self.obstacles
            .iter()
            .filter(|o| o.is_destructible() && !o.is_destroyed())
            .map(|o| (o.distance_to(point), o))
            .filter(|(d, _)| *d <= reach)
            .min_by(|(da, a), (db, b)| da.total_cmp(db).then(a.id.cmp(&b.id)))
            .map(|(_, o)| o)
    }

    /// Push a circle out of every obstacle it overlaps.
    pub fn resolve_circle(&self, mut pos: Vec2, radius: f32) -> Vec2 {
        for obstacle in &self.obstacles {
            let closest = obstacle.closest_point(pos);
            let delta = pos - closest;
            let dist_sq = delta.length_squared();
            if dist_sq >= radius * radius {
                continue;
            }
            if dist_sq > 1e-8 {
                let dist = dist_sq.sqrt();
                pos += delta / dist * (radius - dist);
            } else {
                // Center is inside the box: exit along the shallowest axis.
                let local = pos - obstacle.pos;
                let pen = obstacle.half_extents - local.abs();
                if pen.x < pen.y {
                    let dir = if local.x < 0.0 { -1.0 } else { 1.0 };
                    pos.x = obstacle.pos.x + dir * (obstacle.half_extents.x + radius);
                } else {
                    let dir = if local.y < 0.0 { -1.0 } else { 1.0 };
                    pos.y = obstacle.pos.y + dir * (obstacle.half_extents.y + radius);
                }
            }
        }
        pos
    }
}
