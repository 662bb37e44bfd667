//! Builders that turn device state into outbound profiles.
//!
//! Power values are carried in kW (`W` with a kilo multiplier); voltage and
//! frequency use no multiplier.

use chrono::{DateTime, Utc};

use crate::devices::battery::BatteryMode;
use crate::devices::types::DeviceId;
use crate::profile::{
    BatteryControlProfile, BatteryEventProfile, ControlType, FlowDirection, PhaseCode, Profile,
    ProfileHeader, Reading, ReadingProfile, ReadingType, RecloserControlProfile,
    RecloserEventProfile, SetPoint, SolarEventProfile, SwitchAction, SwitchStatus, TimeInterval,
    UnitMultiplier, UnitSymbol,
};

fn build_reading(
    value: f64,
    at: DateTime<Utc>,
    unit: UnitSymbol,
    multiplier: UnitMultiplier,
) -> Reading {
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
        time_period: TimeInterval { start: at, end: at },
    }
}

pub fn power_reading(power_kw: f64, at: DateTime<Utc>) -> Reading {
    build_reading(power_kw, at, UnitSymbol::W, UnitMultiplier::Kilo)
}

pub fn voltage_reading(volts: f64, at: DateTime<Utc>) -> Reading {
    build_reading(volts, at, UnitSymbol::V, UnitMultiplier::None)
}

pub fn frequency_reading(hertz: f64, at: DateTime<Utc>) -> Reading {
    build_reading(hertz, at, UnitSymbol::Hz, UnitMultiplier::None)
}

fn electrical_readings(
    id: &DeviceId,
    at: DateTime<Utc>,
    power_kw: f64,
    volts: f64,
    hertz: f64,
) -> ReadingProfile {
    ReadingProfile {
        header: ProfileHeader::new(id, at),
        readings: vec![
            power_reading(power_kw, at),
            voltage_reading(volts, at),
            frequency_reading(hertz, at),
        ],
    }
}

fn power_only(id: &DeviceId, at: DateTime<Utc>, power_kw: f64) -> ReadingProfile {
    ReadingProfile {
        header: ProfileHeader::new(id, at),
        readings: vec![power_reading(power_kw, at)],
    }
}

pub fn battery_reading(
    id: &DeviceId,
    at: DateTime<Utc>,
    power_kw: f64,
    volts: f64,
    hertz: f64,
) -> Profile {
    Profile::BatteryReading(electrical_readings(id, at, power_kw, volts, hertz))
}

pub fn battery_event(
    id: &DeviceId,
    at: DateTime<Utc>,
    is_connected: bool,
    is_charging: bool,
    mode: BatteryMode,
    soc_percent: f64,
) -> Profile {
    Profile::BatteryEvent(BatteryEventProfile {
        header: ProfileHeader::new(id, at),
        is_connected,
        is_charging,
        mode: mode.description().to_string(),
        state_of_charge: soc_percent,
    })
}

fn battery_control(
    id: &DeviceId,
    at: DateTime<Utc>,
    is_islanded: bool,
    set_points: Vec<SetPoint>,
) -> Profile {
    Profile::BatteryControl(BatteryControlProfile {
        header: ProfileHeader::new(id, at),
        is_islanded,
        set_points,
    })
}

/// Control asking the battery to enter islanded mode.
pub fn battery_islanded_control(id: &DeviceId, at: DateTime<Utc>) -> Profile {
    battery_control(id, at, true, Vec::new())
}

/// Control carrying a single real-power set point in kW.
pub fn battery_power_control(id: &DeviceId, at: DateTime<Utc>, power_kw: f64) -> Profile {
    battery_control(
        id,
        at,
        false,
        vec![SetPoint {
            control_type: ControlType::SetRealPower,
            value: power_kw,
        }],
    )
}

/// Control carrying a single mode set point.
pub fn battery_mode_control(id: &DeviceId, at: DateTime<Utc>, mode: BatteryMode) -> Profile {
    battery_control(
        id,
        at,
        false,
        vec![SetPoint {
            control_type: ControlType::SetMode,
            value: mode.code() as f64,
        }],
    )
}

pub fn recloser_reading(
    id: &DeviceId,
    at: DateTime<Utc>,
    power_kw: f64,
    volts: f64,
    hertz: f64,
) -> Profile {
    Profile::RecloserReading(electrical_readings(id, at, power_kw, volts, hertz))
}

pub fn recloser_event(
    id: &DeviceId,
    at: DateTime<Utc>,
    is_closed: bool,
    is_blocked: bool,
) -> Profile {
    Profile::RecloserEvent(RecloserEventProfile {
        header: ProfileHeader::new(id, at),
        status: if is_closed {
            SwitchStatus::Closed
        } else {
            SwitchStatus::Open
        },
        is_blocked,
    })
}

pub fn recloser_control(id: &DeviceId, at: DateTime<Utc>, action: SwitchAction) -> Profile {
    Profile::RecloserControl(RecloserControlProfile {
        header: ProfileHeader::new(id, at),
        action,
    })
}

pub fn solar_reading(id: &DeviceId, at: DateTime<Utc>, power_kw: f64) -> Profile {
    Profile::SolarReading(power_only(id, at, power_kw))
}

pub fn solar_event(id: &DeviceId, at: DateTime<Utc>) -> Profile {
    Profile::SolarEvent(SolarEventProfile {
        header: ProfileHeader::new(id, at),
        is_connected: true,
    })
}

pub fn resource_reading(id: &DeviceId, at: DateTime<Utc>, power_kw: f64) -> Profile {
    Profile::ResourceReading(power_only(id, at, power_kw))
}
