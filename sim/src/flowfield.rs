//! Flow-field pathfinding over a window around the camera.
//!
//! One breadth-first flood fill from the goal cells yields a distance field;
//! every cell then points at its strictly-closer neighbour. Units sample the
//! field instead of pathfinding individually.

use crate::config::SimConfig;
use crate::terrain::{Obstacle, ObstacleSet};
use bevy_ecs::prelude::*;
use glam::Vec2;
use std::collections::VecDeque;

/// Default direction: advance toward the forward map edge.
pub const FORWARD: Vec2 = Vec2::X;

/// Distance of a cell the flood fill never reached.
pub const UNREACHED: u32 = u32::MAX;

/// Neighbour order used for relaxation and tie-breaking: +x, -x, +y, -y.
const NEIGHBOURS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Grid-aligned region the field covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowWindow {
    /// First cell column in absolute cell coordinates.
    pub start_col: i32,
    pub origin: Vec2,
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
}

impl FlowWindow {
    /// Window spanning `[camera_x - behind, camera_x + ahead]` across the lane,
    /// snapped to whole cells so small camera moves keep the same grid.
    pub fn around(camera_x: f32, config: &SimConfig) -> Self {
        let cell_size = config.flow_cell_size;
        let start_col = ((camera_x - config.flow_window_behind) / cell_size).floor() as i32;
        let width = ((config.flow_window_behind + config.flow_window_ahead) / cell_size).ceil() as usize;
        let height = (config.lane_height() / cell_size).ceil() as usize;
        Self {
            start_col,
            origin: Vec2::new(start_col as f32 * cell_size, config.lane_min_y),
            width: width.max(1),
            height: height.max(1),
            cell_size,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Cell containing a world position, if inside the window.
    #[inline]
    pub fn cell_of(&self, pos: Vec2) -> Option<(usize, usize)> {
        let local = (pos - self.origin) / self.cell_size;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let (cx, cy) = (local.x as usize, local.y as usize);
        (cx < self.width && cy < self.height).then_some((cx, cy))
    }

    #[inline]
    pub fn index(&self, cx: usize, cy: usize) -> usize {
        cy * self.width + cx
    }

    /// World-space center of a cell.
    pub fn cell_center(&self, cx: usize, cy: usize) -> Vec2 {
        self.origin + (Vec2::new(cx as f32, cy as f32) + 0.5) * self.cell_size
    }

    /// Inclusive cell range overlapped by an obstacle, clamped to the window.
    fn cells_overlapping(&self, obstacle: &Obstacle) -> Option<(usize, usize, usize, usize)> {
        let min = (obstacle.min() - self.origin) / self.cell_size;
        let max = (obstacle.max() - self.origin) / self.cell_size;
        if max.x <= 0.0 || max.y <= 0.0 || min.x >= self.width as f32 || min.y >= self.height as f32 {
            return None;
        }
        let x0 = min.x.floor().max(0.0) as usize;
        let y0 = min.y.floor().max(0.0) as usize;
        let x1 = (max.x.ceil() as usize).min(self.width).saturating_sub(1);
        let y1 = (max.y.ceil() as usize).min(self.height).saturating_sub(1);
        Some((x0, y0, x1, y1))
    }
}

/// Dense vector field toward the current goals.
#[derive(Resource, Debug, Default)]
pub struct FlowField {
    window: Option<FlowWindow>,
    vectors: Vec<Vec2>,
    distances: Vec<u32>,
    blocked: Vec<bool>,
    frontier: VecDeque<usize>,
    explicit_goals: bool,
    computations: u64,
}

impl FlowField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> Option<&FlowWindow> {
        self.window.as_ref()
    }

    /// Number of completed computations.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Whether the last computation found explicit targets in the window.
    pub fn has_explicit_goals(&self) -> bool {
        self.explicit_goals
    }

    pub fn vectors(&self) -> &[Vec2] {
        &self.vectors
    }

    pub fn distances(&self) -> &[u32] {
        &self.distances
    }

    /// Forget the computed window. Buffers keep their capacity.
    pub fn clear(&mut self) {
        self.window = None;
        self.vectors.clear();
        self.distances.clear();
        self.blocked.clear();
        self.frontier.clear();
        self.explicit_goals = false;
    }

    /// Whether `window` differs enough from the computed one to recompute.
    pub fn needs_recompute(&self, window: &FlowWindow, shift_threshold: i32) -> bool {
        match &self.window {
            None => true,
            Some(current) => {
                current.width != window.width
                    || current.height != window.height
                    || current.cell_size != window.cell_size
                    || current.origin.y != window.origin.y
                    || (current.start_col - window.start_col).abs() >= shift_threshold.max(1)
            }
        }
    }

    /// Recompute the field for `window` against the current obstacle set.
    pub fn compute(&mut self, window: FlowWindow, obstacles: &ObstacleSet) {
        let cells = window.cell_count();
        self.vectors.clear();
        self.vectors.resize(cells, FORWARD);
        self.distances.clear();
        self.distances.resize(cells, UNREACHED);
        self.blocked.clear();
        self.blocked.resize(cells, false);
        self.frontier.clear();

        // Non-goal obstacles block.
        for obstacle in obstacles.iter().filter(|o| !o.is_goal()) {
            if let Some((x0, y0, x1, y1)) = window.cells_overlapping(obstacle) {
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        self.blocked[window.index(cx, cy)] = true;
                    }
                }
            }
        }

        // Seed explicit targets first, falling back to the forward column.
        for obstacle in obstacles.iter().filter(|o| o.is_goal()) {
            if let Some((x0, y0, x1, y1)) = window.cells_overlapping(obstacle) {
                for cy in y0..=y1 {
                    for cx in x0..=x1 {
                        self.seed(window.index(cx, cy));
                    }
                }
            }
        }
        self.explicit_goals = !self.frontier.is_empty();
        if !self.explicit_goals {
            let last = window.width - 1;
            for cy in 0..window.height {
                self.seed(window.index(last, cy));
            }
        }

        // Uniform-cost flood fill.
        while let Some(index) = self.frontier.pop_front() {
            let next = self.distances[index] + 1;
            let (cx, cy) = ((index % window.width) as i32, (index / window.width) as i32);
            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx < 0 || ny < 0 || nx >= window.width as i32 || ny >= window.height as i32 {
                    continue;
                }
                let n = window.index(nx as usize, ny as usize);
                if !self.blocked[n] && self.distances[n] == UNREACHED {
                    self.distances[n] = next;
                    self.frontier.push_back(n);
                }
            }
        }

        self.fill_vectors(&window);
        self.window = Some(window);
        self.computations += 1;
    }

    fn seed(&mut self, index: usize) {
        if !self.blocked[index] && self.distances[index] == UNREACHED {
            self.distances[index] = 0;
            self.frontier.push_back(index);
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn fill_vectors(&mut self, window: &FlowWindow) {
        let distances = &self.distances;
        let blocked = &self.blocked;
        for (index, vector) in self.vectors.iter_mut().enumerate() {
            *vector = direction_for(index, window, distances, blocked);
        }
    }

    #[cfg(feature = "parallel")]
    fn fill_vectors(&mut self, window: &FlowWindow) {
        use rayon::prelude::*;
        let distances = &self.distances;
        let blocked = &self.blocked;
        self.vectors
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, vector)| *vector = direction_for(index, window, distances, blocked));
    }

    /// Steering vector at a world position; forward outside the window.
    pub fn vector_at(&self, pos: Vec2) -> Vec2 {
        self.window
            .as_ref()
            .and_then(|w| w.cell_of(pos).map(|(cx, cy)| w.index(cx, cy)))
            .and_then(|i| self.vectors.get(i).copied())
            .unwrap_or(FORWARD)
    }

    /// BFS distance (in cells) to the nearest goal, if reachable.
    pub fn distance_at(&self, pos: Vec2) -> Option<u32> {
        let window = self.window.as_ref()?;
        let (cx, cy) = window.cell_of(pos)?;
        let d = *self.distances.get(window.index(cx, cy))?;
        (d != UNREACHED).then_some(d)
    }

    pub fn is_blocked(&self, pos: Vec2) -> bool {
        self.window
            .as_ref()
            .and_then(|w| w.cell_of(pos).map(|(cx, cy)| w.index(cx, cy)))
            .and_then(|i| self.blocked.get(i).copied())
            .unwrap_or(false)
    }
}

/// Direction of one cell toward its strictly-lowest neighbour.
///
/// Goal, blocked and unreachable cells fall back to `FORWARD`.
fn direction_for(index: usize, window: &FlowWindow, distances: &[u32], blocked: &[bool]) -> Vec2 {
    let own = distances[index];
    if blocked[index] || own == 0 || own == UNREACHED {
        return FORWARD;
    }
    let (cx, cy) = ((index % window.width) as i32, (index / window.width) as i32);
    let mut best = own;
    let mut best_dir = FORWARD;
    for (dx, dy) in NEIGHBOURS {
        let (nx, ny) = (cx + dx, cy + dy);
        if nx < 0 || ny < 0 || nx >= window.width as i32 || ny >= window.height as i32 {
            continue;
        }
        let d = distances[window.index(nx as usize, ny as usize)];
        if d < best {
            best = d;
            best_dir = Vec2::new(dx as f32, dy as f32);
        }
    }
    best_dir
}
