//! Flat buffer export for renderers.
//!
//! Converts a `Snapshot` into a contiguous `f32` buffer a host engine can copy
//! in one call (for example into a packed float array) without touching serde.
//!
//! # Buffer Layout
//!
//! ```text
//! [0]                      unit_count
//! For each unit i at offset HEADER_SIZE + i * UNIT_STRIDE:
//!   [+0]  slot         pool slot index
//!   [+1]  kind         index into UnitKind::ALL
//!   [+2]  faction      0.0 = friendly, 1.0 = hostile
//!   [+3]  x
//!   [+4]  y
//!   [+5]  vx
//!   [+6]  vy
//!   [+7]  facing       -1.0 or 1.0
//!   [+8]  stretch      squash/stretch hint
//!   [+9]  hp_fraction  0.0 ..= 1.0
//!   [+10] tint         index into StatusKind::ALL, -1.0 for none
//!   [+11] dying        1.0 while decaying
//! ```
//!
//! Units appear in snapshot order, so equal snapshots give equal buffers.

use crate::components::{Faction, UnitKind};
use crate::status::StatusKind;
use crate::world::Snapshot;

/// Number of f32 values per unit. Changing this breaks renderers.
pub const UNIT_STRIDE: usize = 12;

/// Number of f32 values in the buffer header.
pub const HEADER_SIZE: usize = 1;

pub const FACTION_FRIENDLY: f32 = 0.0;
pub const FACTION_HOSTILE: f32 = 1.0;
pub const NO_TINT: f32 = -1.0;

pub const FIELD_SLOT: usize = 0;
pub const FIELD_KIND: usize = 1;
pub const FIELD_FACTION: usize = 2;
pub const FIELD_X: usize = 3;
pub const FIELD_Y: usize = 4;
pub const FIELD_VX: usize = 5;
pub const FIELD_VY: usize = 6;
pub const FIELD_FACING: usize = 7;
pub const FIELD_STRETCH: usize = 8;
pub const FIELD_HP: usize = 9;
pub const FIELD_TINT: usize = 10;
pub const FIELD_DYING: usize = 11;

#[inline]
pub fn faction_to_id(faction: Faction) -> f32 {
    match faction {
        Faction::Friendly => FACTION_FRIENDLY,
        Faction::Hostile => FACTION_HOSTILE,
    }
}

#[inline]
pub fn kind_to_id(kind: UnitKind) -> f32 {
    UnitKind::ALL.iter().position(|k| *k == kind).unwrap_or(0) as f32
}

#[inline]
pub fn tint_to_id(tint: Option<StatusKind>) -> f32 {
    tint.and_then(|t| StatusKind::ALL.iter().position(|k| *k == t))
        .map_or(NO_TINT, |i| i as f32)
}

/// Write the snapshot into `buffer`, reusing its allocation.
pub fn fill_flatbuffer(snapshot: &Snapshot, buffer: &mut Vec<f32>) {
    let count = snapshot.units.len();
    buffer.clear();
    buffer.reserve(buffer_size(count));
    buffer.push(count as f32);
    for unit in &snapshot.units {
        buffer.extend_from_slice(&[
            unit.slot as f32,
            kind_to_id(unit.kind),
            faction_to_id(unit.faction),
            unit.x,
            unit.y,
            unit.vx,
            unit.vy,
            unit.facing,
            unit.stretch,
            unit.hp_fraction,
            tint_to_id(unit.tint),
            if unit.dying { 1.0 } else { 0.0 },
        ]);
    }
    debug_assert_eq!(buffer.len(), buffer_size(count));
}

pub fn snapshot_to_flatbuffer(snapshot: &Snapshot) -> Vec<f32> {
    let mut buffer = Vec::new();
    fill_flatbuffer(snapshot, &mut buffer);
    buffer
}

#[inline]
pub fn buffer_size(unit_count: usize) -> usize {
    HEADER_SIZE + unit_count * UNIT_STRIDE
}

/// Unit count from a buffer header, `None` for an empty buffer.
#[inline]
pub fn parse_unit_count(buffer: &[f32]) -> Option<usize> {
    buffer.first().map(|n| *n as usize)
}

#[inline]
pub const fn unit_offset(index: usize) -> usize {
    HEADER_SIZE + index * UNIT_STRIDE
}
