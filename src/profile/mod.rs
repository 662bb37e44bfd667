//! Typed bus messages ("profiles") exchanged between devices.
//!
//! Every payload on the bus decodes to exactly one [`Profile`] variant, so
//! handlers match on the enum rather than probing message types.

pub mod codec;
pub mod model;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::devices::types::DeviceId;

/// Identity and time of origin carried by every profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileHeader {
    pub device: DeviceId,
    pub timestamp: DateTime<Utc>,
}

impl ProfileHeader {
    pub fn new(device: &DeviceId, timestamp: DateTime<Utc>) -> Self {
        Self {
            device: device.clone(),
            timestamp,
        }
    }

    pub fn logical_device_id(&self) -> &str {
        &self.device.logical_device_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitSymbol {
    W,
    V,
    Hz,
    VAr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMultiplier {
    None,
    Kilo,
}

impl UnitMultiplier {
    pub const fn factor(self) -> f64 {
        match self {
            UnitMultiplier::None => 1.0,
            UnitMultiplier::Kilo => 1_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Total,
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhaseCode {
    Abcn,
    Abc,
}

/// What a reading measures and how its value is scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingType {
    pub unit: UnitSymbol,
    pub multiplier: UnitMultiplier,
    pub flow_direction: FlowDirection,
    pub phases: PhaseCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub reading_type: ReadingType,
    pub source: String,
    pub quality_flag: [u8; 2],
    pub time_period: TimeInterval,
}

impl Reading {
    /// Real power in kW, or `None` if this is not a power reading.
    pub fn power_kw(&self) -> Option<f64> {
        match self.reading_type.unit {
            UnitSymbol::W => Some(self.value * self.reading_type.multiplier.factor() / 1_000.0),
            _ => None,
        }
    }
}

/// Measurement profile shared by every device class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingProfile {
    pub header: ProfileHeader,
    pub readings: Vec<Reading>,
}

impl ReadingProfile {
    /// Every real-power value carried, in kW.
    pub fn power_values_kw(&self) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().filter_map(Reading::power_kw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryEventProfile {
    pub header: ProfileHeader,
    pub is_connected: bool,
    pub is_charging: bool,
    pub mode: String,
    /// State of charge in percent.
    pub state_of_charge: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlType {
    SetMode,
    SetRealPower,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetPoint {
    pub control_type: ControlType,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryControlProfile {
    pub header: ProfileHeader,
    pub is_islanded: bool,
    pub set_points: Vec<SetPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecloserEventProfile {
    pub header: ProfileHeader,
    pub status: SwitchStatus,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchAction {
    Trip,
    Close,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecloserControlProfile {
    pub header: ProfileHeader,
    pub action: SwitchAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarEventProfile {
    pub header: ProfileHeader,
    pub is_connected: bool,
}

/// The profile kinds, used for topic naming and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    BatteryReading,
    BatteryEvent,
    BatteryControl,
    RecloserReading,
    RecloserEvent,
    RecloserControl,
    SolarReading,
    SolarEvent,
    ResourceReading,
}

impl ProfileKind {
    /// Wire name of the kind; also the default topic base.
    pub const fn type_name(self) -> &'static str {
        match self {
            ProfileKind::BatteryReading => "BatteryReadingProfile",
            ProfileKind::BatteryEvent => "BatteryEventProfile",
            ProfileKind::BatteryControl => "BatteryControlProfile",
            ProfileKind::RecloserReading => "RecloserReadingProfile",
            ProfileKind::RecloserEvent => "RecloserEventProfile",
            ProfileKind::RecloserControl => "RecloserControlProfile",
            ProfileKind::SolarReading => "SolarReadingProfile",
            ProfileKind::SolarEvent => "SolarEventProfile",
            ProfileKind::ResourceReading => "ResourceReadingProfile",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Every message that travels on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "profile")]
pub enum Profile {
    #[serde(rename = "BatteryReadingProfile")]
    BatteryReading(ReadingProfile),
    #[serde(rename = "BatteryEventProfile")]
    BatteryEvent(BatteryEventProfile),
    #[serde(rename = "BatteryControlProfile")]
    BatteryControl(BatteryControlProfile),
    #[serde(rename = "RecloserReadingProfile")]
    RecloserReading(ReadingProfile),
    #[serde(rename = "RecloserEventProfile")]
    RecloserEvent(RecloserEventProfile),
    #[serde(rename = "RecloserControlProfile")]
    RecloserControl(RecloserControlProfile),
    #[serde(rename = "SolarReadingProfile")]
    SolarReading(ReadingProfile),
    #[serde(rename = "SolarEventProfile")]
    SolarEvent(SolarEventProfile),
    #[serde(rename = "ResourceReadingProfile")]
    ResourceReading(ReadingProfile),
}

impl Profile {
    pub fn kind(&self) -> ProfileKind {
        match self {
            Profile::BatteryReading(_) => ProfileKind::BatteryReading,
            Profile::BatteryEvent(_) => ProfileKind::BatteryEvent,
            Profile::BatteryControl(_) => ProfileKind::BatteryControl,
            Profile::RecloserReading(_) => ProfileKind::RecloserReading,
            Profile::RecloserEvent(_) => ProfileKind::RecloserEvent,
            Profile::RecloserControl(_) => ProfileKind::RecloserControl,
            Profile::SolarReading(_) => ProfileKind::SolarReading,
            Profile::SolarEvent(_) => ProfileKind::SolarEvent,
            Profile::ResourceReading(_) => ProfileKind::ResourceReading,
        }
    }

    pub fn header(&self) -> &ProfileHeader {
        match self {
            Profile::BatteryReading(p)
            | Profile::RecloserReading(p)
            | Profile::SolarReading(p)
            | Profile::ResourceReading(p) => &p.header,
            Profile::BatteryEvent(p) => &p.header,
            Profile::BatteryControl(p) => &p.header,
            Profile::RecloserEvent(p) => &p.header,
            Profile::RecloserControl(p) => &p.header,
            Profile::SolarEvent(p) => &p.header,
        }
    }

    pub fn logical_device_id(&self) -> &str {
        self.header().logical_device_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f64, unit: UnitSymbol, multiplier: UnitMultiplier) -> Reading {
        let now = Utc::now();
        Reading {
            value,
            reading_type: ReadingType {
                unit,
                multiplier,
                flow_direction: FlowDirection::Total,
                phases: PhaseCode::Abcn,
            },
            source: String::new(),
            quality_flag: [0, 0],
            time_period: TimeInterval {
                start: now,
                end: now,
            },
        }
    }

    #[test]
    fn power_kw_converts_multiplier() {
        assert_eq!(
            reading(3.0, UnitSymbol::W, UnitMultiplier::Kilo).power_kw(),
            Some(3.0)
        );
        assert_eq!(
            reading(1_500.0, UnitSymbol::W, UnitMultiplier::None).power_kw(),
            Some(1.5)
        );
        assert_eq!(
            reading(480.0, UnitSymbol::V, UnitMultiplier::None).power_kw(),
            None
        );
    }

    #[test]
    fn reading_profile_yields_only_power_values() {
        let profile = ReadingProfile {
            header: ProfileHeader::new(&DeviceId::new("b", "m", "n", "d"), Utc::now()),
            readings: vec![
                reading(7.0, UnitSymbol::W, UnitMultiplier::Kilo),
                reading(480.0, UnitSymbol::V, UnitMultiplier::None),
                reading(60.0, UnitSymbol::Hz, UnitMultiplier::None),
            ],
        };
        assert_eq!(profile.power_values_kw().collect::<Vec<_>>(), vec![7.0]);
    }

    #[test]
    fn kind_names_match_wire_tags() {
        assert_eq!(ProfileKind::BatteryControl.to_string(), "BatteryControlProfile");
        assert_eq!(
            ProfileKind::ResourceReading.type_name(),
            "ResourceReadingProfile"
        );
    }
}
