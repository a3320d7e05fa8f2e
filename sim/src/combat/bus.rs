//! Combat request bus.
//!
//! Traits and systems push requests; the resolver drains them synchronously
//! in FIFO order within the same tick. Nothing outside the resolver mutates
//! hit points.

use crate::pool::UnitHandle;
use crate::status::StatusKind;
use crate::terrain::ObstacleId;
use bevy_ecs::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombatRequest {
    /// Damage that bypasses mitigation and hooks.
    TrueDamage { target: UnitHandle, amount: f32 },
    Kill { target: UnitHandle },
    Status {
        target: UnitHandle,
        kind: StatusKind,
        stacks: u8,
        duration: f32,
    },
    /// Full damage resolution without the pre-attack check.
    DamagePipeline { source: UnitHandle, target: UnitHandle },
    /// Pre-attack veto check, then the damage pipeline.
    Attack { source: UnitHandle, target: UnitHandle },
    Heal { target: UnitHandle, amount: f32 },
    DamageObstacle { obstacle: ObstacleId, amount: f32 },
}

#[derive(Resource, Debug, Default)]
pub struct CombatBus {
    queue: VecDeque<CombatRequest>,
    submitted: u64,
}

impl CombatBus {
    pub fn push(&mut self, request: CombatRequest) {
        self.submitted += 1;
        self.queue.push_back(request);
    }

    pub fn pop(&mut self) -> Option<CombatRequest> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total requests ever submitted.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
