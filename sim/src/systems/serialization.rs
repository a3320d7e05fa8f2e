//! Serialization utilities for simulation state.

use crate::events::SimEvent;
use crate::world::{BattleSummary, Snapshot};

/// Serialize a snapshot to a JSON string.
pub fn snapshot_to_json_string(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(snapshot)
}

/// Deserialize a snapshot from a JSON string.
pub fn snapshot_from_json_string(data: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(data)
}

pub fn summary_to_json_string(summary: &BattleSummary) -> Result<String, serde_json::Error> {
    serde_json::to_string(summary)
}

/// Serialize drained events as a JSON array of tagged objects.
pub fn events_to_json_string(events: &[SimEvent]) -> Result<String, serde_json::Error> {
    serde_json::to_string(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Element, Faction, UnitKind};
    use crate::world::UnitVisual;

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = Snapshot {
            tick: 42,
            time: 1.4,
            camera_x: 100.0,
            units: vec![UnitVisual {
                slot: 3,
                kind: UnitKind::Knight,
                faction: Faction::Friendly,
                x: 10.0,
                y: 20.0,
                vx: 1.0,
                vy: 0.0,
                facing: 1.0,
                stretch: 1.1,
                hp_fraction: 0.5,
                tint: None,
                dying: false,
            }],
            obstacles: vec![],
        };

        let json = snapshot_to_json_string(&snapshot).unwrap();
        assert!(json.contains("\"kind\":\"knight\""));
        assert!(json.contains("\"faction\":\"friendly\""));
        let restored = snapshot_from_json_string(&json).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_events_are_tagged() {
        let events = vec![
            SimEvent::Flash { x: 1.0, y: 2.0 },
            SimEvent::Particles { x: 0.0, y: 0.0, count: 4, element: Element::Cryo },
        ];
        let json = events_to_json_string(&events).unwrap();
        assert!(json.starts_with("[{\"type\":\"flash\""));
        assert!(json.contains("\"type\":\"particles\""));
    }
}
