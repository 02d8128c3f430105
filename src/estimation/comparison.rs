use std::fmt;

use bevy_app::App;
use bevy_ecs::{prelude::*, system::RunSystemOnce};
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

pub(crate) mod res_display;
use res_display::*;

use super::elements::*;
use super::solution::{PowerFlowSolution, StateEstimate};

/// Compares estimated quantities against the noiseless baseline and flags
/// relative deviations beyond the alarm threshold.

/// Thresholds for the deviation check.
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct DeviationPolicy {
    /// Relative deviation (percent) above which a quantity raises an alarm.
    pub alarm_threshold_pct: f64,
    /// Quantities with baseline or estimate magnitude below this floor are
    /// treated as measurement noise and never flagged.
    pub noise_floor: f64,
}

impl Default for DeviationPolicy {
    fn default() -> Self {
        Self {
            alarm_threshold_pct: 1.0,
            noise_floor: 0.001,
        }
    }
}

/// Outcome of diffing one (baseline, estimate) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Deviation {
    /// Either value sits below the noise floor.
    Negligible,
    /// Relative deviation within the alarm threshold.
    Within,
    /// Relative deviation above the alarm threshold.
    Alarm { abs: f64, rel_pct: f64 },
}

impl Deviation {
    /// Classifies one quantity pair under the given policy.
    pub fn classify(reference: f64, estimate: f64, policy: &DeviationPolicy) -> Self {
        if reference.abs() < policy.noise_floor || estimate.abs() < policy.noise_floor {
            return Deviation::Negligible;
        }
        let abs = reference - estimate;
        let rel_pct = (100.0 * abs / reference).abs();
        if rel_pct > policy.alarm_threshold_pct {
            Deviation::Alarm { abs, rel_pct }
        } else {
            Deviation::Within
        }
    }

    pub fn is_alarm(&self) -> bool {
        matches!(self, Deviation::Alarm { .. })
    }
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deviation::Negligible | Deviation::Within => write!(f, "+"),
            Deviation::Alarm { abs, rel_pct } => write!(f, "{:.3e}({:.2}%)", abs, rel_pct),
        }
    }
}

/// Deviations of one bus.
#[derive(Debug, Clone, Component)]
pub struct BusDeviation {
    pub vm_pu: Deviation,
    pub p_mw: Deviation,
    pub q_mvar: Deviation,
}

impl BusDeviation {
    pub fn alarms(&self) -> usize {
        [self.vm_pu, self.p_mw, self.q_mvar]
            .iter()
            .filter(|d| d.is_alarm())
            .count()
    }
}

/// Deviations of one line, both sides.
#[derive(Debug, Clone, Component)]
pub struct LineDeviation {
    pub p_from_mw: Deviation,
    pub q_from_mvar: Deviation,
    pub p_to_mw: Deviation,
    pub q_to_mvar: Deviation,
    pub i_from_ka: Deviation,
    pub i_to_ka: Deviation,
}

impl LineDeviation {
    pub fn alarms(&self) -> usize {
        [
            self.p_from_mw,
            self.q_from_mvar,
            self.p_to_mw,
            self.q_to_mvar,
            self.i_from_ka,
            self.i_to_ka,
        ]
        .iter()
        .filter(|d| d.is_alarm())
        .count()
    }
}

/// Deviations of one two-winding transformer.
#[derive(Debug, Clone, Component)]
pub struct TrafoDeviation {
    pub p_hv_mw: Deviation,
    pub q_hv_mvar: Deviation,
    pub p_lv_mw: Deviation,
    pub q_lv_mvar: Deviation,
    pub i_hv_ka: Deviation,
    pub i_lv_ka: Deviation,
}

impl TrafoDeviation {
    pub fn alarms(&self) -> usize {
        [
            self.p_hv_mw,
            self.q_hv_mvar,
            self.p_lv_mw,
            self.q_lv_mvar,
            self.i_hv_ka,
            self.i_lv_ka,
        ]
        .iter()
        .filter(|d| d.is_alarm())
        .count()
    }
}

/// Deviations of one three-winding transformer.
#[derive(Debug, Clone, Component)]
pub struct Trafo3wDeviation {
    pub p_hv_mw: Deviation,
    pub q_hv_mvar: Deviation,
    pub p_mv_mw: Deviation,
    pub q_mv_mvar: Deviation,
    pub p_lv_mw: Deviation,
    pub q_lv_mvar: Deviation,
    pub i_hv_ka: Deviation,
    pub i_mv_ka: Deviation,
    pub i_lv_ka: Deviation,
}

impl Trafo3wDeviation {
    pub fn alarms(&self) -> usize {
        [
            self.p_hv_mw,
            self.q_hv_mvar,
            self.p_mv_mw,
            self.q_mv_mvar,
            self.p_lv_mw,
            self.q_lv_mvar,
            self.i_hv_ka,
            self.i_mv_ka,
            self.i_lv_ka,
        ]
        .iter()
        .filter(|d| d.is_alarm())
        .count()
    }
}

/// Alarm counts per element class.
#[derive(Debug, Default, Clone, Copy, Resource, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationSummary {
    pub bus_alarms: usize,
    pub line_alarms: usize,
    pub trafo_alarms: usize,
    pub trafo3w_alarms: usize,
}

impl DeviationSummary {
    pub fn total(&self) -> usize {
        self.bus_alarms + self.line_alarms + self.trafo_alarms + self.trafo3w_alarms
    }
}

/// Diffs estimated bus quantities against the baseline.
pub fn compare_bus_results(
    mut cmd: Commands,
    net: Res<PPNetwork>,
    lookup: Res<NodeLookup>,
    baseline: Res<PowerFlowSolution>,
    est: Res<StateEstimate>,
    policy: Res<DeviationPolicy>,
) {
    for ((bus, reference), estimate) in net
        .bus
        .iter()
        .zip(baseline.tables.bus.iter())
        .zip(est.tables.bus.iter())
    {
        let Some(entity) = lookup.get_entity(bus.index) else {
            continue;
        };
        cmd.entity(entity).insert(BusDeviation {
            vm_pu: Deviation::classify(reference.vm_pu, estimate.vm_pu, &policy),
            p_mw: Deviation::classify(reference.p_mw, estimate.p_mw, &policy),
            q_mvar: Deviation::classify(reference.q_mvar, estimate.q_mvar, &policy),
        });
    }
}

/// Diffs estimated line flows against the baseline.
pub fn compare_line_results(
    mut cmd: Commands,
    baseline: Res<PowerFlowSolution>,
    est: Res<StateEstimate>,
    policy: Res<DeviationPolicy>,
    lines: Query<(Entity, &ElemIdx), With<ELine>>,
) {
    for (entity, idx) in lines.iter() {
        let (Some(reference), Some(estimate)) = (
            baseline.tables.line.get(idx.0),
            est.tables.line.get(idx.0),
        ) else {
            continue;
        };
        cmd.entity(entity).insert(LineDeviation {
            p_from_mw: Deviation::classify(reference.p_from_mw, estimate.p_from_mw, &policy),
            q_from_mvar: Deviation::classify(reference.q_from_mvar, estimate.q_from_mvar, &policy),
            p_to_mw: Deviation::classify(reference.p_to_mw, estimate.p_to_mw, &policy),
            q_to_mvar: Deviation::classify(reference.q_to_mvar, estimate.q_to_mvar, &policy),
            i_from_ka: Deviation::classify(reference.i_from_ka, estimate.i_from_ka, &policy),
            i_to_ka: Deviation::classify(reference.i_to_ka, estimate.i_to_ka, &policy),
        });
    }
}

/// Diffs estimated two-winding transformer flows against the baseline.
pub fn compare_trafo_results(
    mut cmd: Commands,
    baseline: Res<PowerFlowSolution>,
    est: Res<StateEstimate>,
    policy: Res<DeviationPolicy>,
    trafos: Query<(Entity, &ElemIdx), With<ETrafo>>,
) {
    for (entity, idx) in trafos.iter() {
        let (Some(reference), Some(estimate)) = (
            baseline.tables.trafo.get(idx.0),
            est.tables.trafo.get(idx.0),
        ) else {
            continue;
        };
        cmd.entity(entity).insert(TrafoDeviation {
            p_hv_mw: Deviation::classify(reference.p_hv_mw, estimate.p_hv_mw, &policy),
            q_hv_mvar: Deviation::classify(reference.q_hv_mvar, estimate.q_hv_mvar, &policy),
            p_lv_mw: Deviation::classify(reference.p_lv_mw, estimate.p_lv_mw, &policy),
            q_lv_mvar: Deviation::classify(reference.q_lv_mvar, estimate.q_lv_mvar, &policy),
            i_hv_ka: Deviation::classify(reference.i_hv_ka, estimate.i_hv_ka, &policy),
            i_lv_ka: Deviation::classify(reference.i_lv_ka, estimate.i_lv_ka, &policy),
        });
    }
}

/// Diffs estimated three-winding transformer flows against the baseline.
pub fn compare_trafo3w_results(
    mut cmd: Commands,
    baseline: Res<PowerFlowSolution>,
    est: Res<StateEstimate>,
    policy: Res<DeviationPolicy>,
    trafos: Query<(Entity, &ElemIdx), With<ETrafo3w>>,
) {
    for (entity, idx) in trafos.iter() {
        let (Some(reference), Some(estimate)) = (
            baseline.tables.trafo3w.get(idx.0),
            est.tables.trafo3w.get(idx.0),
        ) else {
            continue;
        };
        cmd.entity(entity).insert(Trafo3wDeviation {
            p_hv_mw: Deviation::classify(reference.p_hv_mw, estimate.p_hv_mw, &policy),
            q_hv_mvar: Deviation::classify(reference.q_hv_mvar, estimate.q_hv_mvar, &policy),
            p_mv_mw: Deviation::classify(reference.p_mv_mw, estimate.p_mv_mw, &policy),
            q_mv_mvar: Deviation::classify(reference.q_mv_mvar, estimate.q_mv_mvar, &policy),
            p_lv_mw: Deviation::classify(reference.p_lv_mw, estimate.p_lv_mw, &policy),
            q_lv_mvar: Deviation::classify(reference.q_lv_mvar, estimate.q_lv_mvar, &policy),
            i_hv_ka: Deviation::classify(reference.i_hv_ka, estimate.i_hv_ka, &policy),
            i_mv_ka: Deviation::classify(reference.i_mv_ka, estimate.i_mv_ka, &policy),
            i_lv_ka: Deviation::classify(reference.i_lv_ka, estimate.i_lv_ka, &policy),
        });
    }
}

/// Tallies alarms over all deviation components.
pub fn summarize_deviations(
    mut cmd: Commands,
    buses: Query<&BusDeviation>,
    lines: Query<&LineDeviation>,
    trafos: Query<&TrafoDeviation>,
    trafo3ws: Query<&Trafo3wDeviation>,
) {
    let summary = DeviationSummary {
        bus_alarms: buses.iter().map(|d| d.alarms()).sum(),
        line_alarms: lines.iter().map(|d| d.alarms()).sum(),
        trafo_alarms: trafos.iter().map(|d| d.alarms()).sum(),
        trafo3w_alarms: trafo3ws.iter().map(|d| d.alarms()).sum(),
    };
    cmd.insert_resource(summary);
}

/// Prints the bus deviation table.
pub fn print_dev_bus(q: Query<(&BusID, &BusDeviation)>) {
    let rows = q
        .iter()
        .sort_by::<&BusID>(|a, b| a.cmp(b))
        .map(|(bus, d)| BusDevTable {
            bus: bus.0,
            vm_pu: d.vm_pu,
            p_mw: d.p_mw,
            q_mvar: d.q_mvar,
        });
    let table = Table::new(rows).with(Style::markdown()).to_string();
    println!(">>> bus deviations:\n{table}");
}

/// Prints the line deviation table.
pub fn print_dev_line(q: Query<(&ElemIdx, &Port2, &LineDeviation)>) {
    let mut rows: Vec<_> = q
        .iter()
        .map(|(idx, p, d)| LineDevTable {
            line: idx.0,
            from: p[0],
            to: p[1],
            p_from_mw: d.p_from_mw,
            q_from_mvar: d.q_from_mvar,
            p_to_mw: d.p_to_mw,
            q_to_mvar: d.q_to_mvar,
            i_from_ka: d.i_from_ka,
            i_to_ka: d.i_to_ka,
        })
        .collect();
    rows.sort_by_key(|r| r.line);
    let table = Table::new(rows).with(Style::markdown()).to_string();
    println!(">>> line deviations:\n{table}");
}

/// Prints the two-winding transformer deviation table.
pub fn print_dev_trafo(q: Query<(&ElemIdx, &Port2, &TrafoDeviation)>) {
    let mut rows: Vec<_> = q
        .iter()
        .map(|(idx, p, d)| TrafoDevTable {
            trafo: idx.0,
            hv: p[0],
            lv: p[1],
            p_hv_mw: d.p_hv_mw,
            q_hv_mvar: d.q_hv_mvar,
            p_lv_mw: d.p_lv_mw,
            q_lv_mvar: d.q_lv_mvar,
            i_hv_ka: d.i_hv_ka,
            i_lv_ka: d.i_lv_ka,
        })
        .collect();
    rows.sort_by_key(|r| r.trafo);
    let table = Table::new(rows).with(Style::markdown()).to_string();
    println!(">>> trafo deviations:\n{table}");
}

/// Prints the three-winding transformer deviation table.
pub fn print_dev_trafo3w(q: Query<(&ElemIdx, &Port3, &Trafo3wDeviation)>) {
    let mut rows: Vec<_> = q
        .iter()
        .map(|(idx, p, d)| Trafo3wDevTable {
            trafo3w: idx.0,
            hv: p[0],
            mv: p[1],
            lv: p[2],
            p_hv_mw: d.p_hv_mw,
            q_hv_mvar: d.q_hv_mvar,
            p_mv_mw: d.p_mv_mw,
            q_mv_mvar: d.q_mv_mvar,
            p_lv_mw: d.p_lv_mw,
            q_lv_mvar: d.q_lv_mvar,
            i_hv_ka: d.i_hv_ka,
            i_mv_ka: d.i_mv_ka,
            i_lv_ka: d.i_lv_ka,
        })
        .collect();
    rows.sort_by_key(|r| r.trafo3w);
    let table = Table::new(rows).with(Style::markdown()).to_string();
    println!(">>> trafo3w deviations:\n{table}");
}

/// Trait for running and rendering the deviation analysis.
pub trait DeviationReport {
    /// Diffs all estimated tables against the baseline and tallies alarms.
    fn compare_estimates(&mut self);

    /// Prints all deviation tables.
    fn print_deviations(&mut self);

    /// Alarm tally of the last comparison, if one ran.
    fn deviation_summary(&self) -> Option<DeviationSummary>;
}

impl DeviationReport for App {
    fn compare_estimates(&mut self) {
        let world = self.world_mut();
        world.run_system_once(compare_bus_results).unwrap();
        world.run_system_once(compare_line_results).unwrap();
        world.run_system_once(compare_trafo_results).unwrap();
        world.run_system_once(compare_trafo3w_results).unwrap();
        world.run_system_once(summarize_deviations).unwrap();
    }

    fn print_deviations(&mut self) {
        let world = self.world_mut();
        world.run_system_once(print_dev_bus).unwrap();
        world.run_system_once(print_dev_line).unwrap();
        world.run_system_once(print_dev_trafo).unwrap();
        world.run_system_once(print_dev_trafo3w).unwrap();
    }

    fn deviation_summary(&self) -> Option<DeviationSummary> {
        self.world().get_resource::<DeviationSummary>().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DeviationPolicy {
        DeviationPolicy::default()
    }

    #[test]
    fn test_classify_noise_floor() {
        // both sides below the floor
        assert_eq!(
            Deviation::classify(0.0001, 0.0009, &policy()),
            Deviation::Negligible
        );
        // one side below the floor wins even with a huge relative gap
        assert_eq!(
            Deviation::classify(100.0, 0.0, &policy()),
            Deviation::Negligible
        );
    }

    #[test]
    fn test_classify_within_threshold() {
        assert_eq!(
            Deviation::classify(100.0, 99.5, &policy()),
            Deviation::Within
        );
        assert_eq!(Deviation::classify(1.0, 1.0, &policy()), Deviation::Within);
    }

    #[test]
    fn test_classify_alarm() {
        let d = Deviation::classify(1.0, 1.25, &policy());
        match d {
            Deviation::Alarm { abs, rel_pct } => {
                assert!((abs - (-0.25)).abs() < 1e-12);
                assert!((rel_pct - 25.0).abs() < 1e-9);
            }
            other => panic!("expected alarm, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_negative_reference() {
        // relative deviation is an absolute percentage
        let d = Deviation::classify(-90.0, -80.0, &policy());
        match d {
            Deviation::Alarm { abs, rel_pct } => {
                assert!((abs - (-10.0)).abs() < 1e-12);
                assert!((rel_pct - 11.111111).abs() < 1e-3);
            }
            other => panic!("expected alarm, got {other:?}"),
        }
    }

    #[test]
    fn test_deviation_display() {
        assert_eq!(Deviation::Within.to_string(), "+");
        assert_eq!(Deviation::Negligible.to_string(), "+");
        let alarm = Deviation::Alarm {
            abs: -0.25,
            rel_pct: 25.0,
        };
        assert_eq!(alarm.to_string(), "-2.500e-1(25.00%)");
    }

    #[test]
    fn test_alarm_counting() {
        let d = BusDeviation {
            vm_pu: Deviation::Alarm {
                abs: 0.3,
                rel_pct: 30.0,
            },
            p_mw: Deviation::Within,
            q_mvar: Deviation::Negligible,
        };
        assert_eq!(d.alarms(), 1);

        let summary = DeviationSummary {
            bus_alarms: 2,
            line_alarms: 1,
            trafo_alarms: 0,
            trafo3w_alarms: 3,
        };
        assert_eq!(summary.total(), 6);
    }
}
