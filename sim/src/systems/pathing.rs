//! Flow-field upkeep.

use crate::config::SimConfig;
use crate::flowfield::{FlowField, FlowWindow};
use crate::streaming::StreamingManager;
use crate::terrain::ObstacleSet;
use bevy_ecs::prelude::*;

/// Recompute the flow field when obstacles changed or the camera window
/// moved far enough to matter.
pub fn flow_field_system(
    config: Res<SimConfig>,
    manager: Res<StreamingManager>,
    mut obstacles: ResMut<ObstacleSet>,
    mut flow: ResMut<FlowField>,
) {
    let window = FlowWindow::around(manager.camera_x(), &config);
    let dirty = obstacles.take_dirty();
    if dirty || flow.needs_recompute(&window, config.flow_recompute_shift) {
        flow.compute(window, &obstacles);
        tracing::trace!(
            dirty,
            start_col = window.start_col,
            computations = flow.computations(),
            "flow field recomputed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::{Obstacle, ObstacleId};
    use glam::Vec2;

    fn world() -> World {
        let mut world = World::new();
        world.insert_resource(SimConfig::default());
        world.insert_resource(StreamingManager::new());
        world.insert_resource(ObstacleSet::new());
        world.insert_resource(FlowField::new());
        world
    }

    fn run(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(flow_field_system);
        schedule.run(world);
    }

    #[test]
    fn test_recomputes_only_when_needed() {
        let mut world = world();
        run(&mut world);
        assert_eq!(world.resource::<FlowField>().computations(), 1);

        run(&mut world);
        assert_eq!(world.resource::<FlowField>().computations(), 1);

        world
            .resource_mut::<ObstacleSet>()
            .insert(Obstacle::rock(ObstacleId(1), Vec2::new(200.0, 160.0), Vec2::new(20.0, 20.0)));
        run(&mut world);
        assert_eq!(world.resource::<FlowField>().computations(), 2);
        assert!(!world.resource::<ObstacleSet>().is_dirty());
        assert!(world.resource::<FlowField>().is_blocked(Vec2::new(200.0, 160.0)));
    }
}
