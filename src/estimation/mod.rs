pub mod backend;
pub mod comparison;
pub mod elements;
pub mod measurement;
pub mod network;
pub mod plugin;
pub mod solution;
pub mod study;
