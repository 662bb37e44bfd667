//! Boundary code: publishers onto the bus and curve data files.

pub mod curve_file;
pub mod publisher;
