//! Typed event stream for the presentation layer.
//!
//! The simulation emits events without knowing who listens. Hosts either
//! drain the buffer once per frame or register listener callbacks; both see
//! every event in emission order.

use crate::components::{Element, Faction, UnitKind};
use crate::economy::ResourceKind;
use crate::pool::UnitHandle;
use crate::terrain::ObstacleId;
use bevy_ecs::prelude::*;
use serde::Serialize;

/// Buffered events beyond this are dropped until the host drains.
pub const MAX_BUFFERED_EVENTS: usize = 8192;

/// What changed in the terrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainChange {
    ObstacleDestroyed(ObstacleId),
    ObstacleAdded(ObstacleId),
    ChunkGenerated(u32),
    ChunkCulled(u32),
    RegionEntered(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    Explosion {
        x: f32,
        y: f32,
        radius: f32,
    },
    Flash {
        x: f32,
        y: f32,
    },
    Projectile {
        from_x: f32,
        from_y: f32,
        to_x: f32,
        to_y: f32,
        element: Element,
    },
    FloatingText {
        x: f32,
        y: f32,
        text: &'static str,
    },
    DamagePop {
        x: f32,
        y: f32,
        amount: f32,
        crit: bool,
        element: Option<Element>,
    },
    Slash {
        x: f32,
        y: f32,
        facing: f32,
    },
    Shockwave {
        x: f32,
        y: f32,
        radius: f32,
    },
    Particles {
        x: f32,
        y: f32,
        count: u32,
        element: Element,
    },
    UnitDied {
        handle: UnitHandle,
        faction: Faction,
        kind: UnitKind,
        x: f32,
        y: f32,
    },
    TerrainChanged {
        change: TerrainChange,
    },
    StockpileChanged {
        kind: ResourceKind,
        delta: f64,
        total: f64,
    },
}

/// Identifier returned by [`EventStream::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

type Listener = Box<dyn FnMut(&SimEvent) + Send + Sync>;

/// Event buffer plus listener registry.
#[derive(Resource, Default)]
pub struct EventStream {
    buffer: Vec<SimEvent>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u32,
    dropped: u64,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify listeners and buffer the event.
    pub fn emit(&mut self, event: SimEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
        if self.buffer.len() < MAX_BUFFERED_EVENTS {
            self.buffer.push(event);
        } else {
            self.dropped += 1;
        }
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.buffer)
    }

    pub fn pending(&self) -> &[SimEvent] {
        &self.buffer
    }

    /// Events discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SimEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Drop buffered events (listeners stay attached).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("buffered", &self.buffer.len())
            .field("listeners", &self.listeners.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}
