//! Per-contributor power bookkeeping for the recloser and the balancer.

use std::collections::HashMap;
use std::fmt;

/// The three classes of power source/sink that report onto the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerClass {
    Battery,
    Load,
    Solar,
}

impl fmt::Display for PowerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerClass::Battery => write!(f, "battery"),
            PowerClass::Load => write!(f, "load"),
            PowerClass::Solar => write!(f, "solar"),
        }
    }
}

/// Last reported power (kW) for every contributor, keyed by logical device id.
///
/// Entries are last-write-wins and are never removed: a contributor that stops
/// reporting keeps its last value until the process restarts.
///
/// Sign convention is whatever the reporting device publishes: batteries
/// report positive when discharging, loads report negative consumption and
/// solar reports positive generation, so the plain sum is the flow the
/// recloser would carry.
#[derive(Debug, Clone, Default)]
pub struct Contributors {
    batteries: HashMap<String, f64>,
    loads: HashMap<String, f64>,
    solars: HashMap<String, f64>,
}

impl Contributors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest power reported by `id` within `class`.
    pub fn upsert(&mut self, class: PowerClass, id: &str, power_kw: f64) {
        let map = self.map_mut(class);
        match map.get_mut(id) {
            Some(value) => *value = power_kw,
            None => {
                map.insert(id.to_string(), power_kw);
            }
        }
    }

    /// Last known value for one contributor.
    pub fn get(&self, class: PowerClass, id: &str) -> Option<f64> {
        self.map(class).get(id).copied()
    }

    /// Sum of all contributors in one class; zero when none have reported.
    pub fn class_total_kw(&self, class: PowerClass) -> f64 {
        self.map(class).values().sum()
    }

    /// Sum across every class.
    pub fn net_kw(&self) -> f64 {
        self.class_total_kw(PowerClass::Battery)
            + self.class_total_kw(PowerClass::Load)
            + self.class_total_kw(PowerClass::Solar)
    }

    fn map(&self, class: PowerClass) -> &HashMap<String, f64> {
        match class {
            PowerClass::Battery => &self.batteries,
            PowerClass::Load => &self.loads,
            PowerClass::Solar => &self.solars,
        }
    }

    fn map_mut(&mut self, class: PowerClass) -> &mut HashMap<String, f64> {
        match class {
            PowerClass::Battery => &mut self.batteries,
            PowerClass::Load => &mut self.loads,
            PowerClass::Solar => &mut self.solars,
        }
    }
}
