//! ECS systems for the combat simulation.
//!
//! Every system reads and writes resources only; units live in the
//! `UnitPool` rather than as entities. The tick schedule chains them in a
//! fixed order (see `api`):
//!
//! - `reclaim_system` - returns decayed slots to the pool
//! - `spatial_index_rebuild_system` - rebuilds the proximity grid
//! - `unit_tick_system` - statuses, tick hooks, retargeting, auto-attack
//! - `combat_resolution_system` - drains the request bus
//! - `movement_system` - steering fold, integration, collision
//! - `streaming_system` - camera, chunk generation and culling
//! - `flow_field_system` - recomputes the flow field when needed
//! - `late_combat_resolution_system` - drains requests queued late in the tick

pub mod combat;
pub mod lifecycle;
pub mod movement;
pub mod pathing;
pub mod serialization;
pub mod streaming;
pub mod units;

pub use combat::*;
pub use lifecycle::*;
pub use movement::*;
pub use pathing::*;
pub use serialization::*;
pub use streaming::*;
pub use units::*;
