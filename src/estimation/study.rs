use bevy_app::prelude::*;
use bevy_ecs::system::RunSystemOnce;
use thiserror::Error;
use tracing::{info, warn};

use super::backend::{
    BackendError, EstimationOptions, PowerFlowEngine, PowerFlowOptions, StateEstimator,
};
use super::comparison::{DeviationReport, DeviationSummary};
use super::elements::PPNetwork;
use super::measurement::{self, MeasurementPlan};
use super::network::SensorGrid;
use super::solution::PowerFlowSolution;

/// Errors raised while driving a study.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("no network has been loaded into the world")]
    NetworkMissing,
    #[error("baseline power flow is missing or did not converge")]
    BaselineNotReady,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// How a study run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StudyOutcome {
    /// The chi-squared test saw nothing suspicious, so no estimate was made.
    NoBadDataFound,
    /// Bad data was suspected but the removal pass could not produce a clean estimate.
    CleanupFailed,
    /// A cleaned estimate was produced and compared against the baseline.
    Estimated { summary: DeviationSummary },
}

/// Drives a perturbation study: baseline power flow, measurement synthesis,
/// bad-data handling and baseline comparison.
pub trait StudyRunner {
    /// Solves the noiseless baseline and stores it as the reference solution.
    fn run_baseline(
        &mut self,
        engine: &mut dyn PowerFlowEngine,
        options: &PowerFlowOptions,
    ) -> Result<(), StudyError>;

    /// Builds the measurement plan from the baseline solution.
    fn synthesize_measurements(&mut self) -> Result<(), StudyError>;

    /// Chi-squared test, bad-data removal and baseline comparison, in that order.
    fn run_study(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<StudyOutcome, StudyError>;

    /// Estimates the current plan as-is and compares against the baseline,
    /// skipping the bad-data handling.
    fn estimate_and_compare(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<DeviationSummary, StudyError>;
}

impl StudyRunner for App {
    fn run_baseline(
        &mut self,
        engine: &mut dyn PowerFlowEngine,
        options: &PowerFlowOptions,
    ) -> Result<(), StudyError> {
        // run the startup schedule so the element world exists
        self.update();
        let net = self
            .world()
            .get_resource::<PPNetwork>()
            .ok_or(StudyError::NetworkMissing)?
            .clone();
        let solution = engine.run_pf(&net.0, options)?;
        info!(
            iterations = solution.iterations,
            converged = solution.converged,
            "baseline power flow finished"
        );
        let converged = solution.converged;
        self.world_mut().insert_resource(solution);
        if !converged {
            return Err(StudyError::BaselineNotReady);
        }
        Ok(())
    }

    fn synthesize_measurements(&mut self) -> Result<(), StudyError> {
        let ready = self
            .world()
            .get_resource::<PowerFlowSolution>()
            .is_some_and(|s| s.converged);
        if !ready {
            return Err(StudyError::BaselineNotReady);
        }
        // start from an empty plan so repeat runs do not accumulate
        self.world_mut()
            .insert_resource(MeasurementPlan::default());
        let world = self.world_mut();
        world
            .run_system_once(measurement::synthesize_bus_measurements)
            .unwrap();
        world
            .run_system_once(measurement::synthesize_line_measurements)
            .unwrap();
        world
            .run_system_once(measurement::synthesize_trafo_measurements)
            .unwrap();
        world
            .run_system_once(measurement::synthesize_trafo3w_measurements)
            .unwrap();
        world
            .run_system_once(measurement::apply_measurement_noise)
            .unwrap();
        let count = world.resource::<MeasurementPlan>().len();
        info!(measurements = count, "measurement plan synthesized");
        Ok(())
    }

    fn run_study(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<StudyOutcome, StudyError> {
        let net = self
            .world()
            .get_resource::<PPNetwork>()
            .ok_or(StudyError::NetworkMissing)?
            .clone();
        let mut plan = self
            .world()
            .get_resource::<MeasurementPlan>()
            .filter(|p| !p.is_empty())
            .ok_or(StudyError::BaselineNotReady)?
            .clone();

        if !estimator.chi2_analysis(&net.0, &plan)? {
            info!("no bad data found");
            return Ok(StudyOutcome::NoBadDataFound);
        }
        info!("bad data found, removing flagged measurements");
        let Some(estimate) = estimator.remove_bad_data(&net.0, &mut plan, options)? else {
            warn!("bad data removal did not produce a clean estimate");
            return Ok(StudyOutcome::CleanupFailed);
        };
        self.world_mut().insert_resource(plan);
        estimate.print_voltages();
        self.world_mut().insert_resource(estimate);
        self.compare_estimates();
        self.print_deviations();
        let summary = self.deviation_summary().unwrap_or_default();
        Ok(StudyOutcome::Estimated { summary })
    }

    fn estimate_and_compare(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<DeviationSummary, StudyError> {
        let net = self
            .world()
            .get_resource::<PPNetwork>()
            .ok_or(StudyError::NetworkMissing)?
            .clone();
        let plan = self
            .world()
            .get_resource::<MeasurementPlan>()
            .filter(|p| !p.is_empty())
            .ok_or(StudyError::BaselineNotReady)?
            .clone();
        let estimate = estimator.estimate(&net.0, &plan, options)?;
        self.world_mut().insert_resource(estimate);
        self.compare_estimates();
        Ok(self.deviation_summary().unwrap_or_default())
    }
}

impl StudyRunner for SensorGrid {
    fn run_baseline(
        &mut self,
        engine: &mut dyn PowerFlowEngine,
        options: &PowerFlowOptions,
    ) -> Result<(), StudyError> {
        self.app_mut().run_baseline(engine, options)
    }

    fn synthesize_measurements(&mut self) -> Result<(), StudyError> {
        self.app_mut().synthesize_measurements()
    }

    fn run_study(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<StudyOutcome, StudyError> {
        self.app_mut().run_study(estimator, options)
    }

    fn estimate_and_compare(
        &mut self,
        estimator: &mut dyn StateEstimator,
        options: &EstimationOptions,
    ) -> Result<DeviationSummary, StudyError> {
        self.app_mut().estimate_and_compare(estimator, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::backend::{PassthroughEstimator, ReplayEngine};
    use crate::estimation::measurement::MeasurementKind;
    use crate::estimation::plugin::default_app;
    use crate::estimation::solution::{SolutionTables, StateEstimate};
    use crate::io::pandapower::Network;
    use crate::testcases;

    /// Estimator with scripted answers: flags bad data, drops the biased
    /// voltage measurement and returns a canned estimate.
    struct ScriptedEstimator {
        tables: SolutionTables,
        bad_bus: i64,
        succeed: bool,
    }

    impl StateEstimator for ScriptedEstimator {
        fn chi2_analysis(
            &mut self,
            _net: &Network,
            _plan: &MeasurementPlan,
        ) -> Result<bool, BackendError> {
            Ok(true)
        }

        fn remove_bad_data(
            &mut self,
            _net: &Network,
            plan: &mut MeasurementPlan,
            _options: &EstimationOptions,
        ) -> Result<Option<StateEstimate>, BackendError> {
            if !self.succeed {
                return Ok(None);
            }
            let bad = self.bad_bus;
            plan.retain(|m| !(m.kind == MeasurementKind::V && m.index == bad && m.side.is_none()));
            Ok(Some(StateEstimate {
                tables: self.tables.clone(),
            }))
        }

        fn estimate(
            &mut self,
            _net: &Network,
            _plan: &MeasurementPlan,
            _options: &EstimationOptions,
        ) -> Result<StateEstimate, BackendError> {
            Ok(StateEstimate {
                tables: self.tables.clone(),
            })
        }
    }

    fn prepared_case9() -> App {
        let mut app = default_app();
        app.world_mut()
            .insert_resource(crate::estimation::elements::PPNetwork(testcases::case9()));
        let mut engine = ReplayEngine::new(testcases::case9_solution());
        app.run_baseline(&mut engine, &PowerFlowOptions::default())
            .unwrap();
        app.synthesize_measurements().unwrap();
        app
    }

    #[test]
    fn test_baseline_requires_network() {
        let mut app = default_app();
        let mut engine = ReplayEngine::new(testcases::case9_solution());
        let err = app.run_baseline(&mut engine, &PowerFlowOptions::default());
        assert!(matches!(err, Err(StudyError::NetworkMissing)));
    }

    #[test]
    fn test_synthesis_requires_baseline() {
        let mut app = default_app();
        app.world_mut()
            .insert_resource(crate::estimation::elements::PPNetwork(testcases::case9()));
        app.update();
        let err = app.synthesize_measurements();
        assert!(matches!(err, Err(StudyError::BaselineNotReady)));
    }

    #[test]
    fn test_study_reports_clean_plan() {
        let mut app = prepared_case9();
        let mut estimator = PassthroughEstimator;
        let outcome = app
            .run_study(&mut estimator, &EstimationOptions::default())
            .unwrap();
        assert_eq!(outcome, StudyOutcome::NoBadDataFound);
    }

    #[test]
    fn test_study_removes_bad_data_and_compares() {
        let mut app = prepared_case9();
        let baseline = app.world().resource::<PowerFlowSolution>().tables.clone();
        let before = app.world().resource::<MeasurementPlan>().len();

        let mut estimator = ScriptedEstimator {
            tables: baseline,
            bad_bus: 5,
            succeed: true,
        };
        let outcome = app
            .run_study(&mut estimator, &EstimationOptions::default())
            .unwrap();
        // estimate equals the baseline, so nothing may alarm
        let StudyOutcome::Estimated { summary } = outcome else {
            panic!("expected an estimate");
        };
        assert_eq!(summary.total(), 0);
        // the biased voltage measurement is gone from the stored plan
        let after = app.world().resource::<MeasurementPlan>();
        assert_eq!(after.len(), before - 1);
        assert!(after.find_bus(MeasurementKind::V, 5).is_none());
    }

    #[test]
    fn test_study_reports_failed_cleanup() {
        let mut app = prepared_case9();
        let mut estimator = ScriptedEstimator {
            tables: SolutionTables::default(),
            bad_bus: 5,
            succeed: false,
        };
        let outcome = app
            .run_study(&mut estimator, &EstimationOptions::default())
            .unwrap();
        assert_eq!(outcome, StudyOutcome::CleanupFailed);
    }

    #[test]
    fn test_estimate_and_compare_flags_offsets() {
        let mut app = prepared_case9();
        let mut tables = app.world().resource::<PowerFlowSolution>().tables.clone();
        // nudge one bus injection past the alarm threshold
        tables.bus[4].p_mw *= 1.05;
        let mut estimator = ScriptedEstimator {
            tables,
            bad_bus: 5,
            succeed: true,
        };
        let summary = app
            .estimate_and_compare(&mut estimator, &EstimationOptions::default())
            .unwrap();
        assert_eq!(summary.bus_alarms, 1);
        assert_eq!(summary.total(), 1);
    }
}
