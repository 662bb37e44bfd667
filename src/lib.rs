//! Behavioral simulator for microgrid field devices on a publish/subscribe bus.
//!
//! A battery inverter, a recloser, a solar inverter and a load meter publish
//! telemetry; an islanding balance controller commands the battery so that an
//! open recloser carries no flow.

pub mod bus;
pub mod cli;
pub mod config;
pub mod curve;
pub mod devices;
pub mod error;
pub mod io;
pub mod profile;
pub mod runner;
/// Clock, contributor bookkeeping and the balance controller.
pub mod sim;
pub mod telemetry;
