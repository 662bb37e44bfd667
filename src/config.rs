//! TOML configuration describing the devices one process hosts.
//!
//! Every device section is optional so a process can host any subset of the
//! microgrid; within a present section, identity, physical limits and
//! `interval_ms` are required.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::devices::battery::BatterySpec;
use crate::devices::recloser::RecloserSpec;
use crate::devices::solar::{OutputParams, SignConvention};
use crate::devices::types::DeviceId;
use crate::profile::ProfileKind;

/// Top-level simulator configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Process-wide parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Topic bases per profile type.
    #[serde(default)]
    pub topics: TopicConfig,
    pub battery: Option<BatteryConfig>,
    pub recloser: Option<RecloserConfig>,
    pub solar: Option<OutputConfig>,
    /// Load meter; publishes resource readings.
    pub load: Option<OutputConfig>,
    pub balancer: Option<BalancerConfig>,
}

/// Process-wide parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Master random seed; each device derives its own from this.
    pub seed: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            log_filter: "info".to_string(),
        }
    }
}

/// Topic base for each profile type. Device topics append `/<logical id>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicConfig {
    pub battery_reading: String,
    pub battery_event: String,
    pub battery_control: String,
    pub recloser_reading: String,
    pub recloser_event: String,
    pub recloser_control: String,
    pub solar_reading: String,
    pub solar_event: String,
    pub resource_reading: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        let name = |kind: ProfileKind| kind.type_name().to_string();
        Self {
            battery_reading: name(ProfileKind::BatteryReading),
            battery_event: name(ProfileKind::BatteryEvent),
            battery_control: name(ProfileKind::BatteryControl),
            recloser_reading: name(ProfileKind::RecloserReading),
            recloser_event: name(ProfileKind::RecloserEvent),
            recloser_control: name(ProfileKind::RecloserControl),
            solar_reading: name(ProfileKind::SolarReading),
            solar_event: name(ProfileKind::SolarEvent),
            resource_reading: name(ProfileKind::ResourceReading),
        }
    }
}

impl TopicConfig {
    pub fn base(&self, kind: ProfileKind) -> &str {
        match kind {
            ProfileKind::BatteryReading => &self.battery_reading,
            ProfileKind::BatteryEvent => &self.battery_event,
            ProfileKind::BatteryControl => &self.battery_control,
            ProfileKind::RecloserReading => &self.recloser_reading,
            ProfileKind::RecloserEvent => &self.recloser_event,
            ProfileKind::RecloserControl => &self.recloser_control,
            ProfileKind::SolarReading => &self.solar_reading,
            ProfileKind::SolarEvent => &self.solar_event,
            ProfileKind::ResourceReading => &self.resource_reading,
        }
    }

    fn entries(&self) -> [(&'static str, &str); 9] {
        [
            ("topics.battery_reading", &self.battery_reading),
            ("topics.battery_event", &self.battery_event),
            ("topics.battery_control", &self.battery_control),
            ("topics.recloser_reading", &self.recloser_reading),
            ("topics.recloser_event", &self.recloser_event),
            ("topics.recloser_control", &self.recloser_control),
            ("topics.solar_reading", &self.solar_reading),
            ("topics.solar_event", &self.solar_event),
            ("topics.resource_reading", &self.resource_reading),
        ]
    }
}

fn default_initial_soc() -> f64 {
    0.5
}

/// Battery inverter parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatteryConfig {
    pub device: DeviceId,
    /// Tick period (ms, must be > 0).
    pub interval_ms: u64,
    /// Maximum charge rate (kW).
    pub max_charge_rate_kw: f64,
    /// Maximum discharge rate (kW).
    pub max_discharge_rate_kw: f64,
    /// Nameplate energy (kWh).
    pub energy_rating_kwh: f64,
    /// Stored energy ceiling (kWh).
    pub energy_max_kwh: f64,
    /// Stored energy floor (kWh).
    pub energy_min_kwh: f64,
    /// Round-trip efficiency (0.0–1.0].
    pub efficiency_ratio: f64,
    /// Nominal voltage (V).
    pub voltage: f64,
    /// Nominal frequency (Hz).
    pub hertz: f64,
    /// Starting state of charge.
    #[serde(default = "default_initial_soc")]
    pub initial_soc: f64,
}

impl BatteryConfig {
    pub fn spec(&self) -> BatterySpec {
        BatterySpec {
            max_charge_rate_kw: self.max_charge_rate_kw,
            max_discharge_rate_kw: self.max_discharge_rate_kw,
            energy_rating_kwh: self.energy_rating_kwh,
            energy_max_kwh: self.energy_max_kwh,
            energy_min_kwh: self.energy_min_kwh,
            efficiency_ratio: self.efficiency_ratio,
            voltage: self.voltage,
            hertz: self.hertz,
        }
    }
}

/// Recloser parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecloserConfig {
    pub device: DeviceId,
    /// Heartbeat period (ms, must be > 0).
    pub interval_ms: u64,
    /// Nominal voltage (V).
    pub voltage: f64,
    /// Nominal frequency (Hz).
    pub hertz: f64,
}

impl RecloserConfig {
    pub fn spec(&self) -> RecloserSpec {
        RecloserSpec {
            voltage: self.voltage,
            hertz: self.hertz,
        }
    }
}

/// Curve-driven output source (solar inverter or load meter).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub device: DeviceId,
    /// Publish period (ms, must be > 0).
    pub interval_ms: u64,
    /// One day of samples, one value per line. Relative paths resolve
    /// against the config file's directory.
    pub data_file: PathBuf,
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    /// Probability a tick is perturbed (0.0–1.0).
    #[serde(default)]
    pub jitter_chance: f64,
    /// Perturbation band as a fraction of the scaled value.
    #[serde(default)]
    pub jitter_percent: f64,
    /// Overrides the source's usual sign convention (direct for solar,
    /// negated for loads).
    pub sign: Option<SignConvention>,
}

impl OutputConfig {
    pub fn params(&self, default_sign: SignConvention) -> OutputParams {
        OutputParams {
            scale: self.scale,
            offset: self.offset,
            jitter_chance: self.jitter_chance,
            jitter_percent: self.jitter_percent,
            sign: self.sign.unwrap_or(default_sign),
        }
    }
}

/// Islanding balance controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalancerConfig {
    /// Identity stamped on control profiles. Its logical id addresses the
    /// battery, so it must equal the battery's.
    pub device: DeviceId,
    /// Recloser whose status drives islanding.
    pub recloser_logical_device_id: String,
    /// Setpoint changes at or below this (kW) are not re-sent.
    #[serde(default)]
    pub deadband_kw: f64,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"battery.interval_ms"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn check_positive(errors: &mut Vec<ConfigError>, field: String, value: f64) {
    if !(value > 0.0 && value.is_finite()) {
        errors.push(ConfigError::new(field, "must be > 0"));
    }
}

fn check_non_negative(errors: &mut Vec<ConfigError>, field: String, value: f64) {
    if !(value >= 0.0 && value.is_finite()) {
        errors.push(ConfigError::new(field, "must be finite and >= 0"));
    }
}

fn check_interval(errors: &mut Vec<ConfigError>, section: &str, interval_ms: u64) {
    if interval_ms == 0 {
        errors.push(ConfigError::new(format!("{section}.interval_ms"), "must be > 0"));
    }
}

fn check_device(errors: &mut Vec<ConfigError>, section: &str, device: &DeviceId) {
    let id = &device.logical_device_id;
    if id.is_empty() {
        errors.push(ConfigError::new(
            format!("{section}.device.logical_device_id"),
            "must not be empty",
        ));
    } else if id.contains(['/', '+', '#']) {
        errors.push(ConfigError::new(
            format!("{section}.device.logical_device_id"),
            format!("\"{id}\" must be a single topic level (no '/', '+' or '#')"),
        ));
    }
}

impl SimulatorConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// Relative `data_file` paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        let mut cfg = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            cfg.resolve_paths(dir);
        }
        Ok(cfg)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid, contains unknown fields
    /// or misses a required field.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Makes relative data file paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for output in [self.solar.as_mut(), self.load.as_mut()].into_iter().flatten() {
            if output.data_file.is_relative() {
                output.data_file = base.join(&output.data_file);
            }
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (field, base) in self.topics.entries() {
            if base.is_empty() || base.contains(['+', '#']) {
                errors.push(ConfigError::new(field, "must be non-empty without wildcards"));
            }
        }

        if let Some(bat) = &self.battery {
            check_device(&mut errors, "battery", &bat.device);
            check_interval(&mut errors, "battery", bat.interval_ms);
            check_positive(&mut errors, "battery.energy_rating_kwh".into(), bat.energy_rating_kwh);
            check_positive(&mut errors, "battery.voltage".into(), bat.voltage);
            check_positive(&mut errors, "battery.hertz".into(), bat.hertz);
            check_non_negative(&mut errors, "battery.max_charge_rate_kw".into(), bat.max_charge_rate_kw);
            check_non_negative(
                &mut errors,
                "battery.max_discharge_rate_kw".into(),
                bat.max_discharge_rate_kw,
            );
            check_non_negative(&mut errors, "battery.energy_min_kwh".into(), bat.energy_min_kwh);
            check_non_negative(&mut errors, "battery.energy_max_kwh".into(), bat.energy_max_kwh);
            if bat.energy_min_kwh > bat.energy_max_kwh {
                errors.push(ConfigError::new(
                    "battery.energy_min_kwh",
                    "must be <= battery.energy_max_kwh",
                ));
            }
            if bat.energy_max_kwh > bat.energy_rating_kwh {
                errors.push(ConfigError::new(
                    "battery.energy_max_kwh",
                    "must be <= battery.energy_rating_kwh",
                ));
            }
            if !(bat.efficiency_ratio > 0.0 && bat.efficiency_ratio <= 1.0) {
                errors.push(ConfigError::new("battery.efficiency_ratio", "must be in (0.0, 1.0]"));
            }
            let energy = bat.initial_soc * bat.energy_rating_kwh;
            if !(bat.energy_min_kwh..=bat.energy_max_kwh).contains(&energy) {
                errors.push(ConfigError::new(
                    "battery.initial_soc",
                    "stored energy must lie within [energy_min_kwh, energy_max_kwh]",
                ));
            }
        }

        if let Some(rec) = &self.recloser {
            check_device(&mut errors, "recloser", &rec.device);
            check_interval(&mut errors, "recloser", rec.interval_ms);
            check_positive(&mut errors, "recloser.voltage".into(), rec.voltage);
            check_positive(&mut errors, "recloser.hertz".into(), rec.hertz);
        }

        for (section, output) in [("solar", &self.solar), ("load", &self.load)] {
            let Some(out) = output else { continue };
            check_device(&mut errors, section, &out.device);
            check_interval(&mut errors, section, out.interval_ms);
            if !out.scale.is_finite() || !out.offset.is_finite() {
                errors.push(ConfigError::new(
                    format!("{section}.scale"),
                    "scale and offset must be finite",
                ));
            }
            if !(0.0..=1.0).contains(&out.jitter_chance) {
                errors.push(ConfigError::new(
                    format!("{section}.jitter_chance"),
                    "must be in [0.0, 1.0]",
                ));
            }
            check_non_negative(&mut errors, format!("{section}.jitter_percent"), out.jitter_percent);
        }

        if let Some(bal) = &self.balancer {
            check_device(&mut errors, "balancer", &bal.device);
            if bal.recloser_logical_device_id.is_empty() {
                errors.push(ConfigError::new(
                    "balancer.recloser_logical_device_id",
                    "must not be empty",
                ));
            }
            check_non_negative(&mut errors, "balancer.deadband_kw".into(), bal.deadband_kw);
            if let Some(bat) = &self.battery
                && bat.device.logical_device_id != bal.device.logical_device_id
            {
                errors.push(ConfigError::new(
                    "balancer.device.logical_device_id",
                    format!(
                        "must equal the battery's \"{}\" so controls reach it",
                        bat.device.logical_device_id
                    ),
                ));
            }
            if let Some(rec) = &self.recloser
                && rec.device.logical_device_id != bal.recloser_logical_device_id
            {
                errors.push(ConfigError::new(
                    "balancer.recloser_logical_device_id",
                    format!("must equal the recloser's \"{}\"", rec.device.logical_device_id),
                ));
            }
        }

        errors
    }
}
