pub mod measurements;
pub mod pandapower;
