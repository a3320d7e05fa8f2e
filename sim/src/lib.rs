//! Vanguard - Simulation Core
//!
//! A deterministic, fixed-timestep combat simulation for a side-scrolling
//! battlefield where two factions clash across streamed terrain.
//! Uses `bevy_ecs` resources and schedules for the tick pipeline.
//!
//! Units live in a fixed-capacity pool and get their behaviour from an
//! ordered list of stateless traits. Damage, statuses and kills travel over
//! a request bus and are resolved in one place.

pub mod api;
pub mod archetype;
pub mod behavior;
pub mod combat;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod events;
pub mod flowfield;
pub mod pool;
pub mod render_bridge;
pub mod spatial;
pub mod status;
pub mod streaming;
pub mod systems;
pub mod terrain;
pub mod world;

pub use api::{SimServices, SimWorld};
pub use archetype::{Archetype, ArchetypeCatalog, GlobalModifiers, TraitSpec};
pub use behavior::{BehaviorTrait, HookContext, TraitParams, TraitRegistry};
pub use combat::{CombatBus, CombatRequest};
pub use components::*;
pub use config::SimConfig;
pub use economy::{InMemoryLedger, ResourceKind, ResourceLedger};
pub use error::{Result, SimError};
pub use events::{EventStream, SimEvent, TerrainChange};
pub use pool::{SpawnRequest, UnitHandle, UnitPool};
pub use status::{StatusBag, StatusKind};
pub use streaming::{ChunkTemplates, RegionState};
pub use terrain::{Obstacle, ObstacleId, ObstacleKind};
pub use world::{BattleSummary, Snapshot, UnitVisual};
