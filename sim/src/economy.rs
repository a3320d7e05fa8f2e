//! Economy interface and the simulation RNG.
//!
//! The simulation never owns the stockpile. It credits rewards through an
//! injected [`ResourceLedger`] so the persistence layer stays outside.

use bevy_ecs::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Gold,
    Scrap,
    Essence,
}

/// Read/write access to the host's resource stockpile.
pub trait ResourceLedger: Send + Sync {
    /// Apply `delta` and return the new total.
    fn modify_resource(&mut self, kind: ResourceKind, delta: f64) -> f64;

    fn amount(&self, kind: ResourceKind) -> f64;
}

/// Ledger kept in memory, for hosts without persistence and for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    totals: HashMap<ResourceKind, f64>,
}

impl ResourceLedger for InMemoryLedger {
    fn modify_resource(&mut self, kind: ResourceKind, delta: f64) -> f64 {
        let total = self.totals.entry(kind).or_insert(0.0);
        *total = (*total + delta).max(0.0);
        *total
    }

    fn amount(&self, kind: ResourceKind) -> f64 {
        self.totals.get(&kind).copied().unwrap_or(0.0)
    }
}

/// The injected ledger as a resource.
#[derive(Resource)]
pub struct Economy(pub Box<dyn ResourceLedger>);

impl Economy {
    pub fn new(ledger: impl ResourceLedger + 'static) -> Self {
        Self(Box::new(ledger))
    }

    pub fn credit(&mut self, kind: ResourceKind, delta: f64) -> f64 {
        self.0.modify_resource(kind, delta)
    }

    pub fn amount(&self, kind: ResourceKind) -> f64 {
        self.0.amount(kind)
    }
}

impl Default for Economy {
    fn default() -> Self {
        Self::new(InMemoryLedger::default())
    }
}

/// Single seeded RNG for every random roll in the simulation.
#[derive(Resource, Debug, Clone)]
pub struct SimRng(ChaCha8Rng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Independent Bernoulli trial.
    pub fn roll(&mut self, chance: f32) -> bool {
        if chance <= 0.0 {
            return false;
        }
        self.0.gen::<f32>() < chance
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        self.0.gen_range(min..max)
    }
}
