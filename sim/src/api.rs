//! Public API for the simulation.
//!
//! `SimWorld` owns the ECS world and the tick schedule. Hosts drive it with
//! `step(dt)`, push spawns and combat requests between steps, and read back
//! snapshots, summaries and events.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 30 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed, so results do not depend on the host frame rate.
//!
//! ## Tick Order
//!
//! 1. reclaim decayed slots
//! 2. rebuild the spatial index
//! 3. status decay, tick hooks, throttled retarget, auto-attack
//! 4. resolve combat requests
//! 5. steering fold, integration, obstacle and lane collision
//! 6. camera, chunk streaming and culling
//! 7. flow-field recompute when terrain or the window changed
//! 8. resolve requests queued late in the tick

use crate::archetype::{ArchetypeCatalog, GlobalModifiers, UnitRoster};
use crate::behavior::TraitRegistry;
use crate::combat::{CombatBus, CombatRequest, ReactionRegistry};
use crate::components::{Faction, Unit, UnitKind};
use crate::config::SimConfig;
use crate::economy::{Economy, InMemoryLedger, ResourceKind, ResourceLedger, SimRng};
use crate::error::Result;
use crate::events::{EventStream, ListenerId, SimEvent, TerrainChange};
use crate::flowfield::FlowField;
use crate::pool::{SpawnRequest, UnitHandle, UnitPool};
use crate::spatial::{spatial_index_rebuild_system, SpatialIndex};
use crate::streaming::{spawn_pending, ChunkTemplates, StreamingManager};
use crate::systems::*;
use crate::terrain::{Obstacle, ObstacleSet};
use crate::world::{BattleSummary, Snapshot};
use bevy_ecs::prelude::*;
use bevy_ecs::system::SystemState;
use glam::Vec2;

/// Vertical offset of the extra unit from a double spawn.
const DOUBLE_SPAWN_OFFSET: f32 = 14.0;

/// Collaborators injected at setup.
pub struct SimServices {
    pub catalog: ArchetypeCatalog,
    pub templates: ChunkTemplates,
    pub modifiers: GlobalModifiers,
    pub ledger: Box<dyn ResourceLedger>,
    pub registry: TraitRegistry,
}

impl Default for SimServices {
    fn default() -> Self {
        Self {
            catalog: ArchetypeCatalog::builtin(),
            templates: ChunkTemplates::builtin(),
            modifiers: GlobalModifiers::default(),
            ledger: Box::new(InMemoryLedger::default()),
            registry: TraitRegistry::standard(),
        }
    }
}

/// The main simulation world container.
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    paused: bool,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    /// Create a new empty simulation world.
    pub fn new() -> Self {
        Self::build(SimConfig::default(), SimServices::default())
    }

    /// Create a world with custom configuration. Invalid configurations fall
    /// back to the defaults.
    pub fn with_config(config: SimConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                tracing::warn!(%err, "invalid configuration, using defaults");
                SimConfig::default()
            }
        };
        Self::build(config, SimServices::default())
    }

    /// Create a world with custom configuration and injected collaborators.
    pub fn try_with_services(config: SimConfig, services: SimServices) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, services))
    }

    fn build(config: SimConfig, services: SimServices) -> Self {
        let SimServices {
            catalog,
            templates,
            modifiers,
            ledger,
            registry,
        } = services;

        let mut world = World::new();
        let roster = UnitRoster::resolve(&catalog, &registry);
        tracing::info!(
            capacity = config.pool_capacity,
            archetypes = roster.len(),
            traits = registry.len(),
            templates = templates.len(),
            seed = config.seed,
            "simulation created"
        );

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(SimTick(0));
        world.insert_resource(UnitPool::new(config.pool_capacity));
        world.insert_resource(SpatialIndex::new(config.spatial_cell_size));
        world.insert_resource(FlowField::new());
        world.insert_resource(ObstacleSet::new());
        world.insert_resource(StreamingManager::new());
        world.insert_resource(CombatBus::default());
        world.insert_resource(EventStream::new());
        world.insert_resource(ReactionRegistry::standard());
        world.insert_resource(SimRng::seeded(config.seed));
        world.insert_resource(Economy(ledger));
        world.insert_resource(roster);
        world.insert_resource(registry);
        world.insert_resource(modifiers);
        world.insert_resource(templates);
        world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                reclaim_system,
                spatial_index_rebuild_system,
                unit_tick_system,
                combat_resolution_system,
                movement_system,
                streaming_system,
                flow_field_system,
                late_combat_resolution_system,
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            paused: false,
        }
    }

    /// Step the simulation forward by `dt` seconds. No-op while paused.
    pub fn step(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        let fixed_dt = self.config().fixed_timestep;
        if fixed_dt <= 0.0 {
            return;
        }

        self.time_accumulator += dt.max(0.0);
        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }
        if let Some(mut tick_res) = self.world.get_resource_mut::<SimTick>() {
            tick_res.increment();
        }

        self.schedule.run(&mut self.world);

        self.tick += 1;
        self.time += dt;
    }

    /// Spawn a unit. Friendly spawns may produce a second unit when the
    /// global double-spawn chance hits. Returns `None` when the pool is full.
    pub fn spawn_unit(&mut self, faction: Faction, kind: UnitKind, x: f32, y: f32, level: u32) -> Option<UnitHandle> {
        let mut state: SystemState<(
            ResMut<UnitPool>,
            ResMut<SimRng>,
            Res<UnitRoster>,
            Res<GlobalModifiers>,
        )> = SystemState::new(&mut self.world);
        let (mut pool, mut rng, roster, modifiers) = state.get_mut(&mut self.world);

        let request = SpawnRequest::new(faction, kind, Vec2::new(x, y), level);
        let handle = pool.spawn(request, &roster, &modifiers)?;
        if faction == Faction::Friendly && rng.roll(modifiers.double_spawn_chance) {
            let twin = SpawnRequest {
                pos: request.pos + Vec2::new(0.0, DOUBLE_SPAWN_OFFSET),
                ..request
            };
            if pool.spawn(twin, &roster, &modifiers).is_some() {
                tracing::debug!(kind = ?kind, "double spawn");
            }
        }
        Some(handle)
    }

    /// Queue a combat request for the next resolution pass.
    pub fn submit(&mut self, request: CombatRequest) {
        self.world.resource_mut::<CombatBus>().push(request);
    }

    /// Resolve queued requests now, outside the tick. Returns the number handled.
    pub fn resolve_requests(&mut self) -> usize {
        let mut state: SystemState<CombatParams> = SystemState::new(&mut self.world);
        let mut params = state.get_mut(&mut self.world);
        let mut resolver = params.resolver();
        let budget = resolver.config.request_budget;
        resolver.drain(budget)
    }

    /// Add an obstacle outside the streamed chunks.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        let id = obstacle.id;
        self.world.resource_mut::<ObstacleSet>().insert(obstacle);
        self.world.resource_mut::<EventStream>().emit(SimEvent::TerrainChanged {
            change: TerrainChange::ObstacleAdded(id),
        });
    }

    /// Enter a region at a persisted stage index. Hostile units and all
    /// terrain are dropped and the first two stages regenerated. Returns the
    /// number of hostile units spawned.
    pub fn enter_region(&mut self, stage: u32) -> usize {
        let mut state: SystemState<(
            ResMut<StreamingManager>,
            ResMut<UnitPool>,
            ResMut<ObstacleSet>,
            ResMut<EventStream>,
            ResMut<CombatBus>,
            ResMut<SpatialIndex>,
            Res<SimConfig>,
            Res<ChunkTemplates>,
            Res<UnitRoster>,
            Res<GlobalModifiers>,
        )> = SystemState::new(&mut self.world);
        let (
            mut manager,
            mut pool,
            mut obstacles,
            mut events,
            mut bus,
            mut spatial,
            config,
            templates,
            roster,
            modifiers,
        ) = state.get_mut(&mut self.world);

        bus.clear();
        let mut spawns = Vec::new();
        manager.enter_region(stage, &config, &templates, &mut pool, &mut obstacles, &mut events, &mut spawns);
        spatial.evict_stale(&pool);
        spawn_pending(&mut pool, &roster, &modifiers, &mut spawns)
    }

    /// Recycle all units, detach listeners and clear derived state. Safe to
    /// call on a world that never entered a region.
    pub fn teardown(&mut self) {
        if let Some(mut pool) = self.world.get_resource_mut::<UnitPool>() {
            let released = pool.release_all();
            tracing::debug!(released, "teardown");
        }
        if let Some(mut events) = self.world.get_resource_mut::<EventStream>() {
            events.clear_listeners();
            events.clear();
        }
        if let Some(mut spatial) = self.world.get_resource_mut::<SpatialIndex>() {
            spatial.reset();
        }
        if let Some(mut flow) = self.world.get_resource_mut::<FlowField>() {
            flow.clear();
        }
        if let Some(mut bus) = self.world.get_resource_mut::<CombatBus>() {
            bus.clear();
        }
        if let Some(mut obstacles) = self.world.get_resource_mut::<ObstacleSet>() {
            obstacles.clear();
        }
        if let Some(mut manager) = self.world.get_resource_mut::<StreamingManager>() {
            manager.reset();
        }
        self.time_accumulator = 0.0;
    }

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(
            self.world.resource::<UnitPool>(),
            self.world.resource::<ObstacleSet>(),
            self.world.resource::<StreamingManager>(),
            self.tick,
            self.time,
        )
    }

    /// Get the snapshot as a JSON string.
    pub fn snapshot_json(&self) -> String {
        snapshot_to_json_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Coarse state for UI polling.
    pub fn summary(&self) -> BattleSummary {
        let manager = self.world.resource::<StreamingManager>();
        let stage = manager.current_stage(self.config());
        BattleSummary::capture(self.world.resource::<UnitPool>(), manager, stage, self.tick, self.paused)
    }

    /// Take every buffered event in emission order.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        self.world.resource_mut::<EventStream>().drain()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SimEvent) + Send + Sync + 'static) -> ListenerId {
        self.world.resource_mut::<EventStream>().subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.world.resource_mut::<EventStream>().unsubscribe(id)
    }

    /// Steering vector of the flow field at a world position.
    pub fn flow_vector(&self, x: f32, y: f32) -> Vec2 {
        self.world.resource::<FlowField>().vector_at(Vec2::new(x, y))
    }

    /// Any occupied slot (alive or decaying) behind a handle.
    pub fn unit(&self, handle: UnitHandle) -> Option<&Unit> {
        self.world.resource::<UnitPool>().get(handle)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn resource_amount(&self, kind: ResourceKind) -> f64 {
        self.world.resource::<Economy>().amount(kind)
    }

    pub fn camera_x(&self) -> f32 {
        self.world.resource::<StreamingManager>().camera_x()
    }

    pub fn config(&self) -> &SimConfig {
        self.world.resource::<SimConfig>()
    }

    pub fn pool(&self) -> &UnitPool {
        self.world.resource::<UnitPool>()
    }

    /// Proximity index as of the last rebuild, minus units released since.
    pub fn spatial(&self) -> &SpatialIndex {
        self.world.resource::<SpatialIndex>()
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        self.world.resource::<ObstacleSet>()
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Get the elapsed simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    /// Direct world access for hosts that add their own resources.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
