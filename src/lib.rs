pub mod estimation;
pub mod io;
pub mod testcases;
pub mod prelude {
    pub use crate::estimation::*;
    pub use crate::io::pandapower;

    pub use backend::{
        EstimationOptions, PassthroughEstimator, PowerFlowEngine, PowerFlowOptions, ReplayEngine,
        StateEstimator,
    };
    pub use comparison::{DeviationPolicy, DeviationReport, DeviationSummary};
    pub use elements::PPNetwork;
    pub use measurement::{MeasurementPolicy, NoisePolicy, VoltageBias};
    pub use network::{DataOps, SensorGrid};
    pub use plugin::default_app;
    pub use study::{StudyOutcome, StudyRunner};
}
