use std::fmt;
use tabled::Tabled;

use super::Deviation;

/// A wrapper around a float that limits the number of decimal places when printed.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize, // Number of decimal places to display
}

impl FloatWrapper {
    /// Creates a new `FloatWrapper` with the given value and precision.
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl Default for FloatWrapper {
    fn default() -> Self {
        Self {
            value: Default::default(),
            precision: 3,
        }
    }
}

impl fmt::Display for FloatWrapper {
    /// Formats the float with the specified precision.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

/// Table row for displaying bus deviations.
#[derive(Debug, Tabled)]
pub(crate) struct BusDevTable {
    pub(crate) bus: i64,
    pub(crate) vm_pu: Deviation,
    pub(crate) p_mw: Deviation,
    pub(crate) q_mvar: Deviation,
}

/// Table row for displaying line deviations.
#[derive(Debug, Tabled)]
pub(crate) struct LineDevTable {
    pub(crate) line: usize,
    pub(crate) from: i64,
    pub(crate) to: i64,
    pub(crate) p_from_mw: Deviation,
    pub(crate) q_from_mvar: Deviation,
    pub(crate) p_to_mw: Deviation,
    pub(crate) q_to_mvar: Deviation,
    pub(crate) i_from_ka: Deviation,
    pub(crate) i_to_ka: Deviation,
}

/// Table row for displaying two-winding transformer deviations.
#[derive(Debug, Tabled)]
pub(crate) struct TrafoDevTable {
    pub(crate) trafo: usize,
    pub(crate) hv: i64,
    pub(crate) lv: i64,
    pub(crate) p_hv_mw: Deviation,
    pub(crate) q_hv_mvar: Deviation,
    pub(crate) p_lv_mw: Deviation,
    pub(crate) q_lv_mvar: Deviation,
    pub(crate) i_hv_ka: Deviation,
    pub(crate) i_lv_ka: Deviation,
}

/// Table row for displaying three-winding transformer deviations.
#[derive(Debug, Tabled)]
pub(crate) struct Trafo3wDevTable {
    pub(crate) trafo3w: usize,
    pub(crate) hv: i64,
    pub(crate) mv: i64,
    pub(crate) lv: i64,
    pub(crate) p_hv_mw: Deviation,
    pub(crate) q_hv_mvar: Deviation,
    pub(crate) p_mv_mw: Deviation,
    pub(crate) q_mv_mvar: Deviation,
    pub(crate) p_lv_mw: Deviation,
    pub(crate) q_lv_mvar: Deviation,
    pub(crate) i_hv_ka: Deviation,
    pub(crate) i_mv_ka: Deviation,
    pub(crate) i_lv_ka: Deviation,
}
