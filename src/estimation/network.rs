use bevy_app::prelude::*;
use bevy_ecs::{component::Mutable, prelude::*, world::error::EntityMutableFetchError};

use super::plugin::GridStudyPlugin;

/// An estimation study workspace, managing the ECS world holding the network
/// elements, measurement plan and comparison results.
#[derive(Default)]
pub struct SensorGrid {
    data_storage: App,
}

/// Trait for performing operations on ECS data, such as getting and mutating components of entities.
pub trait DataOps {
    fn get_entity_mut(
        &mut self,
        entity: Entity,
    ) -> Result<EntityWorldMut<'_>, EntityMutableFetchError>;
    fn get_mut<T>(&'_ mut self, entity: Entity) -> Option<Mut<'_, T>>
    where
        T: Component<Mutability = Mutable>;
    fn get<T>(&self, entity: Entity) -> Option<&T>
    where
        T: Component;
    fn world_mut(&mut self) -> &mut World;
    fn world(&self) -> &World;
}

impl SensorGrid {
    pub fn app(&self) -> &App {
        &self.data_storage
    }

    pub fn app_mut(&mut self) -> &mut App {
        &mut self.data_storage
    }

    /// Builds the element world from the loaded network and installs the
    /// default study resources. Runs the startup schedule once.
    pub fn init_net(&mut self) {
        self.app_mut().add_plugins(GridStudyPlugin);
        let world = self.world_mut();
        let mut schedules = world.get_resource_mut::<Schedules>().unwrap();
        let mut s = schedules.remove(Startup).unwrap();
        s.run(world);
    }
}

impl DataOps for SensorGrid {
    fn world(&self) -> &World {
        self.data_storage.world()
    }
    fn world_mut(&mut self) -> &mut World {
        self.data_storage.world_mut()
    }
    fn get_entity_mut(
        &mut self,
        entity: Entity,
    ) -> Result<EntityWorldMut<'_>, EntityMutableFetchError> {
        self.world_mut().get_entity_mut(entity)
    }
    fn get_mut<T>(&mut self, entity: Entity) -> Option<Mut<'_, T>>
    where
        T: Component<Mutability = Mutable>,
    {
        self.world_mut().get_mut(entity)
    }
    fn get<T>(&self, entity: Entity) -> Option<&T>
    where
        T: Component,
    {
        self.world().get(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::elements::{BusID, NodeLookup, PPNetwork};
    use crate::estimation::measurement::MeasurementPlan;
    use crate::testcases;

    #[test]
    fn test_init_net_spawns_elements() {
        let mut grid = SensorGrid::default();
        grid.world_mut()
            .insert_resource(PPNetwork(testcases::case9()));
        grid.init_net();

        let lookup = grid.world().resource::<NodeLookup>();
        assert_eq!(lookup.len(), 9);
        assert!(grid.world().contains_resource::<MeasurementPlan>());

        let entity = lookup.get_entity(3).unwrap();
        assert_eq!(grid.get::<BusID>(entity).unwrap().0, 3);
    }
}
