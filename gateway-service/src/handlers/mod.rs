pub mod actions;
pub mod bff;
pub mod debug;
pub mod metrics;
