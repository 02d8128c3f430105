use bevy_app::prelude::*;
use bevy_ecs::prelude::*;

use crate::io::pandapower::ecs_net_conv::grid_init_system;

use super::comparison::DeviationPolicy;
use super::measurement::{MeasurementPlan, MeasurementPolicy, NoisePolicy, VoltageBias};

/// Represents the grid initialization stage for Bevy's ECS system.
#[derive(Debug, SystemSet, Hash, Eq, PartialEq, Clone)]
pub struct GridInitStage;

/// Base plugin for estimation studies.
///
/// Installs the default measurement and comparison policies and registers the
/// startup system that turns the loaded network description into ECS entities.
/// The network itself is loaded separately, as a `PPNetwork` resource, before
/// the startup schedule runs.
pub struct GridStudyPlugin;

impl Plugin for GridStudyPlugin {
    fn build(&self, app: &mut bevy_app::App) {
        app.world_mut().insert_resource(MeasurementPolicy::default());
        app.world_mut().insert_resource(VoltageBias::default());
        app.world_mut().insert_resource(NoisePolicy::default());
        app.world_mut().insert_resource(DeviationPolicy::default());
        app.world_mut().insert_resource(MeasurementPlan::default());
        app.add_systems(Startup, grid_init_system.in_set(GridInitStage));
    }
}

/// Builds an `App` with the study plugin installed.
pub fn default_app() -> App {
    let mut app = App::new();
    app.add_plugins(GridStudyPlugin);
    app
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::elements::{NodeLookup, PPNetwork};
    use crate::testcases;

    #[test]
    fn test_default_app_initializes_grid() {
        let mut app = default_app();
        app.world_mut()
            .insert_resource(PPNetwork(testcases::case9()));
        app.update();

        assert_eq!(app.world().resource::<NodeLookup>().len(), 9);
        assert!(app.world().resource::<MeasurementPlan>().is_empty());
        let policy = app.world().resource::<MeasurementPolicy>();
        assert_eq!(policy.v_stddev, 0.025);
    }

    #[test]
    fn test_default_bias_targets_bus_5() {
        let app = default_app();
        let bias = app.world().resource::<VoltageBias>();
        assert_eq!(bias.offset(5), 0.25);
        assert_eq!(bias.offset(0), 0.0);
    }
}
