use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::measurement::{MeasuredElement, MeasurementKind, MeasurementPlan, MeasurementSide};
use super::solution::{PowerFlowSolution, SolutionTables, StateEstimate};
use crate::io::pandapower::{self, Network};

/// Seam to the external power-systems analysis engine.
///
/// Power-flow solving, weighted-least-squares estimation and chi-squared
/// bad-data testing are deliberately not implemented here; an engine binding
/// (a wrapped native library, a subprocess, an RPC client) implements these
/// traits and the rest of the crate drives it.

/// Errors reported by an engine binding.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("power flow did not converge after {0} iterations")]
    NotConverged(usize),
    #[error("estimation failed: {0}")]
    Estimation(String),
    #[error("engine error: {0}")]
    Engine(String),
}

/// Options forwarded to the power-flow run, mirroring `runpp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerFlowOptions {
    pub calculate_voltage_angles: bool,
    pub enforce_q_lims: bool,
    pub max_it: Option<usize>,
    pub tol: Option<f64>,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            calculate_voltage_angles: true,
            enforce_q_lims: false,
            max_it: None,
            tol: None,
        }
    }
}

/// Initial state the estimator starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMethod {
    #[default]
    Flat,
    Results,
}

/// How zero-injection buses are treated by the estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroInjection {
    #[default]
    Auto,
    None,
}

/// Options forwarded to the estimation run, mirroring `estimate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationOptions {
    pub calculate_voltage_angles: bool,
    pub init: InitMethod,
    pub zero_injection: ZeroInjection,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            calculate_voltage_angles: true,
            init: InitMethod::Flat,
            zero_injection: ZeroInjection::Auto,
        }
    }
}

/// Computes the noiseless power-flow baseline.
pub trait PowerFlowEngine {
    fn run_pf(
        &mut self,
        net: &Network,
        options: &PowerFlowOptions,
    ) -> Result<PowerFlowSolution, BackendError>;
}

/// Runs state estimation and bad-data handling on a measurement plan.
pub trait StateEstimator {
    /// Chi-squared goodness-of-fit test; `true` means bad data is suspected.
    fn chi2_analysis(
        &mut self,
        net: &Network,
        plan: &MeasurementPlan,
    ) -> Result<bool, BackendError>;

    /// Drops measurements flagged as bad and re-estimates. Returns the cleaned
    /// estimate, or `None` when the cleanup did not succeed.
    fn remove_bad_data(
        &mut self,
        net: &Network,
        plan: &mut MeasurementPlan,
        options: &EstimationOptions,
    ) -> Result<Option<StateEstimate>, BackendError>;

    /// Plain weighted-least-squares estimation of the current plan.
    fn estimate(
        &mut self,
        net: &Network,
        plan: &MeasurementPlan,
        options: &EstimationOptions,
    ) -> Result<StateEstimate, BackendError>;
}

/// Engine that replays a previously computed solution.
///
/// Useful for driving studies from recorded engine output (or the reference
/// solutions bundled with the test cases) without a live engine binding.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    solution: PowerFlowSolution,
}

impl ReplayEngine {
    pub fn new(solution: PowerFlowSolution) -> Self {
        Self { solution }
    }
}

impl PowerFlowEngine for ReplayEngine {
    fn run_pf(
        &mut self,
        _net: &Network,
        _options: &PowerFlowOptions,
    ) -> Result<PowerFlowSolution, BackendError> {
        if !self.solution.converged {
            return Err(BackendError::NotConverged(self.solution.iterations));
        }
        Ok(self.solution.clone())
    }
}

/// Estimator that echoes the measurement plan back as the estimate.
///
/// Contains no estimation mathematics: unmeasured quantities stay zero and the
/// chi-squared test never fires. Intended for validating the synthesis and
/// comparison pipeline end to end.
#[derive(Debug, Default, Clone)]
pub struct PassthroughEstimator;

fn find_branch(
    plan: &MeasurementPlan,
    kind: MeasurementKind,
    element: MeasuredElement,
    index: i64,
    side: MeasurementSide,
) -> f64 {
    plan.iter()
        .find(|m| {
            m.kind == kind && m.element == element && m.index == index && m.side == Some(side)
        })
        .map_or(0.0, |m| m.value)
}

fn find_bus(plan: &MeasurementPlan, kind: MeasurementKind, bus: i64) -> f64 {
    plan.find_bus(kind, bus).map_or(0.0, |m| m.value)
}

impl PassthroughEstimator {
    fn tables_from_plan(net: &Network, plan: &MeasurementPlan) -> SolutionTables {
        use MeasuredElement::*;
        use MeasurementKind::*;
        use MeasurementSide::*;

        let bus = net
            .bus
            .iter()
            .map(|b| super::solution::BusRes {
                vm_pu: find_bus(plan, V, b.index),
                va_degree: 0.0,
                p_mw: find_bus(plan, P, b.index),
                q_mvar: find_bus(plan, Q, b.index),
            })
            .collect();

        let line = (0..pandapower::table_len(&net.line))
            .map(|i| super::solution::LineRes {
                p_from_mw: find_branch(plan, P, Line, i as i64, From),
                q_from_mvar: find_branch(plan, Q, Line, i as i64, From),
                p_to_mw: find_branch(plan, P, Line, i as i64, To),
                q_to_mvar: find_branch(plan, Q, Line, i as i64, To),
                i_from_ka: find_branch(plan, I, Line, i as i64, From),
                i_to_ka: find_branch(plan, I, Line, i as i64, To),
            })
            .collect();

        let trafo = (0..pandapower::table_len(&net.trafo))
            .map(|i| super::solution::TrafoRes {
                p_hv_mw: find_branch(plan, P, Trafo, i as i64, Hv),
                q_hv_mvar: find_branch(plan, Q, Trafo, i as i64, Hv),
                p_lv_mw: find_branch(plan, P, Trafo, i as i64, Lv),
                q_lv_mvar: find_branch(plan, Q, Trafo, i as i64, Lv),
                i_hv_ka: find_branch(plan, I, Trafo, i as i64, Hv),
                i_lv_ka: find_branch(plan, I, Trafo, i as i64, Lv),
            })
            .collect();

        let trafo3w = (0..pandapower::table_len(&net.trafo3w))
            .map(|i| super::solution::Trafo3wRes {
                p_hv_mw: find_branch(plan, P, Trafo3w, i as i64, Hv),
                q_hv_mvar: find_branch(plan, Q, Trafo3w, i as i64, Hv),
                p_mv_mw: find_branch(plan, P, Trafo3w, i as i64, Mv),
                q_mv_mvar: find_branch(plan, Q, Trafo3w, i as i64, Mv),
                p_lv_mw: find_branch(plan, P, Trafo3w, i as i64, Lv),
                q_lv_mvar: find_branch(plan, Q, Trafo3w, i as i64, Lv),
                i_hv_ka: find_branch(plan, I, Trafo3w, i as i64, Hv),
                i_mv_ka: find_branch(plan, I, Trafo3w, i as i64, Mv),
                i_lv_ka: find_branch(plan, I, Trafo3w, i as i64, Lv),
            })
            .collect();

        SolutionTables {
            bus,
            line,
            trafo,
            trafo3w,
        }
    }
}

impl StateEstimator for PassthroughEstimator {
    fn chi2_analysis(
        &mut self,
        _net: &Network,
        _plan: &MeasurementPlan,
    ) -> Result<bool, BackendError> {
        Ok(false)
    }

    fn remove_bad_data(
        &mut self,
        net: &Network,
        plan: &mut MeasurementPlan,
        options: &EstimationOptions,
    ) -> Result<Option<StateEstimate>, BackendError> {
        // nothing is ever flagged, so nothing gets removed
        self.estimate(net, plan, options).map(Some)
    }

    fn estimate(
        &mut self,
        net: &Network,
        plan: &MeasurementPlan,
        _options: &EstimationOptions,
    ) -> Result<StateEstimate, BackendError> {
        Ok(StateEstimate {
            tables: Self::tables_from_plan(net, plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::measurement::Measurement;

    fn two_bus_net() -> Network {
        let mut net = Network::default();
        net.bus = vec![
            pandapower::Bus {
                index: 0,
                in_service: true,
                vn_kv: 110.0,
                ..Default::default()
            },
            pandapower::Bus {
                index: 1,
                in_service: true,
                vn_kv: 110.0,
                ..Default::default()
            },
        ];
        net.line = Some(vec![pandapower::Line {
            from_bus: 0,
            to_bus: 1,
            in_service: true,
            length_km: 1.0,
            r_ohm_per_km: 0.1,
            x_ohm_per_km: 0.4,
            ..Default::default()
        }]);
        net
    }

    #[test]
    fn test_passthrough_echoes_plan() {
        let net = two_bus_net();
        let mut plan = MeasurementPlan::default();
        plan.push(Measurement::bus(MeasurementKind::V, 0, 1.01, 0.025));
        plan.push(Measurement::bus(MeasurementKind::V, 1, 0.99, 0.025));
        plan.push(Measurement::branch(
            MeasurementKind::P,
            MeasuredElement::Line,
            0,
            MeasurementSide::From,
            12.5,
            0.025,
        ));

        let mut est = PassthroughEstimator;
        let res = est
            .estimate(&net, &plan, &EstimationOptions::default())
            .unwrap();
        assert_eq!(res.tables.bus.len(), 2);
        assert_eq!(res.tables.bus[0].vm_pu, 1.01);
        assert_eq!(res.tables.line[0].p_from_mw, 12.5);
        // unmeasured quantity stays zero
        assert_eq!(res.tables.line[0].q_to_mvar, 0.0);
    }

    #[test]
    fn test_passthrough_never_flags_bad_data() {
        let net = two_bus_net();
        let plan = MeasurementPlan::default();
        let mut est = PassthroughEstimator;
        assert!(!est.chi2_analysis(&net, &plan).unwrap());
    }

    #[test]
    fn test_replay_engine_reports_divergence() {
        let mut engine = ReplayEngine::new(PowerFlowSolution {
            converged: false,
            iterations: 10,
            ..Default::default()
        });
        let err = engine.run_pf(&two_bus_net(), &PowerFlowOptions::default());
        assert!(matches!(err, Err(BackendError::NotConverged(10))));
    }
}
