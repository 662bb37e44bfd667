//! Common types and traits shared by the simulated devices.

use std::fmt;

use rand::{Rng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Immutable identity attached to every outbound message.
///
/// # Fields
/// * `logical_device_id` - Bus-level id; also the last topic segment
/// * `mrid` - Resource id of the physical equipment
/// * `name` - Display name
/// * `description` - Free-form description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceId {
    pub logical_device_id: String,
    pub mrid: String,
    pub name: String,
    pub description: String,
}

impl DeviceId {
    pub fn new(
        logical_device_id: impl Into<String>,
        mrid: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            logical_device_id: logical_device_id.into(),
            mrid: mrid.into(),
            name: name.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.logical_device_id, self.name)
    }
}

/// Receives power readings from every contributor on the bus.
///
/// Implemented by the recloser (to aggregate through-flow) and by the
/// balance controller (to compute the island imbalance).
pub trait PowerObserver: Send + Sync {
    fn update_battery_power(&self, id: &str, power_kw: f64);
    fn update_load_power(&self, id: &str, power_kw: f64);
    fn update_solar_power(&self, id: &str, power_kw: f64);
}

/// Receives switch-state changes from a recloser.
pub trait RecloserStatusObserver: Send + Sync {
    fn update_recloser_status(&self, is_closed: bool);
}

/// Width of the uniform jitter band as a fraction of nominal.
pub const NOMINAL_JITTER_BAND: f64 = 0.001;

/// Returns `nominal` perturbed by a uniform amount centred on zero.
///
/// The band is [`NOMINAL_JITTER_BAND`] of nominal wide, so the result stays
/// within half of that on either side.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `nominal` - Baseline value (volts or hertz)
pub fn nominal_jitter(rng: &mut StdRng, nominal: f64) -> f64 {
    let band = NOMINAL_JITTER_BAND * nominal;
    nominal + (rng.random::<f64>() * band - band / 2.0)
}
