use bevy_ecs::prelude::*;

use crate::estimation::elements::*;
use crate::estimation::network::{DataOps, SensorGrid};
use crate::io::pandapower::Network;

/// Converts a pandapower network into ECS entities: one entity per bus, line
/// and transformer, plus the lookup and base-data resources.
pub trait LoadNetwork {
    fn load_network(&mut self, net: &Network);
}

impl LoadNetwork for SensorGrid {
    fn load_network(&mut self, net: &Network) {
        self.world_mut().load_network(net);
    }
}

impl LoadNetwork for World {
    fn load_network(&mut self, net: &Network) {
        let mut lookup = NodeLookup::default();
        for bus in &net.bus {
            let entity = self.spawn(BusBundle::from(bus)).id();
            lookup.insert(bus.index, entity);
        }
        if let Some(lines) = &net.line {
            for (idx, line) in lines.iter().enumerate() {
                self.spawn(LineBundle::new(idx, line));
            }
        }
        if let Some(trafos) = &net.trafo {
            for (idx, t) in trafos.iter().enumerate() {
                self.spawn(TrafoBundle::new(idx, t));
            }
        }
        if let Some(trafos) = &net.trafo3w {
            for (idx, t) in trafos.iter().enumerate() {
                self.spawn(Trafo3wBundle::new(idx, t));
            }
        }
        self.insert_resource(lookup);
        self.insert_resource(GridCommonData {
            f_hz: net.f_hz,
            sbase: net.sn_mva,
        });
    }
}

/// Startup system: builds the element world from the `PPNetwork` resource.
///
/// The resource stays in place afterwards; the engine seam needs the full
/// network description at estimation time.
pub fn grid_init_system(world: &mut World) {
    let net = world.get_resource::<PPNetwork>().cloned();
    if let Some(net) = net {
        world.load_network(&net.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases;

    #[test]
    fn test_load_case9_world() {
        let net = testcases::case9();
        let mut world = World::new();
        world.load_network(&net);

        let mut buses = world.query::<&BusID>();
        assert_eq!(buses.iter(&world).count(), 9);
        let mut lines = world.query_filtered::<&ElemIdx, With<ELine>>();
        assert_eq!(lines.iter(&world).count(), 9);

        let lookup = world.resource::<NodeLookup>();
        assert_eq!(lookup.len(), 9);
        assert!(lookup.contains_id(5));

        let common = world.resource::<GridCommonData>();
        assert_eq!(common.sbase, 100.0);
    }

    #[test]
    fn test_load_trafo3w_world() {
        let net = testcases::mv_trafo3w();
        let mut world = World::new();
        world.load_network(&net);

        let mut t2 = world.query_filtered::<&Port2, With<ETrafo>>();
        assert_eq!(t2.iter(&world).count(), 1);
        let mut t3 = world.query_filtered::<&Port3, With<ETrafo3w>>();
        let ports: Vec<_> = t3.iter(&world).collect();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].0, [0, 1, 2]);
    }
}
