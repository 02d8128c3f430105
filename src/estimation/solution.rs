use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use tabled::{Table, settings::Style};

use super::comparison::res_display::FloatWrapper;

/// Result tables shared by the power-flow baseline and the state estimate.
///
/// Rows are aligned with the corresponding pandapower element tables, exactly
/// like `res_bus`/`res_bus_est` and friends.

/// Electrical quantities of one bus.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusRes {
    pub vm_pu: f64,     // Voltage magnitude (p.u.)
    pub va_degree: f64, // Voltage angle (degrees)
    pub p_mw: f64,      // Active power injection (MW)
    pub q_mvar: f64,    // Reactive power injection (MVAr)
}

/// Flows of one line, per side.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRes {
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub i_from_ka: f64,
    pub i_to_ka: f64,
}

/// Flows of one two-winding transformer, per side.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoRes {
    pub p_hv_mw: f64,
    pub q_hv_mvar: f64,
    pub p_lv_mw: f64,
    pub q_lv_mvar: f64,
    pub i_hv_ka: f64,
    pub i_lv_ka: f64,
}

/// Flows of one three-winding transformer, per winding.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trafo3wRes {
    pub p_hv_mw: f64,
    pub q_hv_mvar: f64,
    pub p_mv_mw: f64,
    pub q_mv_mvar: f64,
    pub p_lv_mw: f64,
    pub q_lv_mvar: f64,
    pub i_hv_ka: f64,
    pub i_mv_ka: f64,
    pub i_lv_ka: f64,
}

/// One full set of per-element result tables.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionTables {
    pub bus: Vec<BusRes>,
    pub line: Vec<LineRes>,
    pub trafo: Vec<TrafoRes>,
    pub trafo3w: Vec<Trafo3wRes>,
}

/// Noiseless power-flow baseline produced by the external engine.
#[derive(Debug, Default, Clone, Resource, Serialize, Deserialize)]
pub struct PowerFlowSolution {
    pub tables: SolutionTables,
    pub converged: bool,
    pub iterations: usize,
}

/// State estimate produced by the external engine from the measurement plan.
#[derive(Debug, Default, Clone, Resource, Serialize, Deserialize)]
pub struct StateEstimate {
    pub tables: SolutionTables,
}

/// Table row for displaying estimated bus voltages.
#[derive(Debug, tabled::Tabled)]
pub(crate) struct VoltageTable {
    pub(crate) bus: usize,
    pub(crate) vm_pu: FloatWrapper,
    pub(crate) va_degree: FloatWrapper,
}

impl StateEstimate {
    /// Renders the estimated voltage magnitudes and angles as a markdown table.
    pub fn voltage_table(&self) -> String {
        let rows = self.tables.bus.iter().enumerate().map(|(i, b)| VoltageTable {
            bus: i,
            vm_pu: FloatWrapper::new(b.vm_pu, 5),
            va_degree: FloatWrapper::new(b.va_degree, 5),
        });
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Prints estimated voltages, as the study reports them on success.
    pub fn print_voltages(&self) {
        println!("{}", self.voltage_table());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_table_render() {
        let est = StateEstimate {
            tables: SolutionTables {
                bus: vec![
                    BusRes {
                        vm_pu: 1.0,
                        va_degree: 0.0,
                        ..Default::default()
                    },
                    BusRes {
                        vm_pu: 1.025,
                        va_degree: 9.28,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        };
        let table = est.voltage_table();
        assert!(table.contains("vm_pu"));
        assert!(table.contains("1.02500"));
    }
}
