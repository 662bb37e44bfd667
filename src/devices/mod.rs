//! Simulated field devices.

/// Battery inverter mode state machine.
pub mod battery;
/// Open/closed recloser aggregating contributor power.
pub mod recloser;
/// Curve-driven output loop for solar inverters and load meters.
pub mod solar;
pub mod types;
