//! Inbound payload handlers: decode once, match the profile, drive a device.
//!
//! Decode failures and profiles meant for another device are logged and
//! dropped; no handler can fail its subscription task.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::devices::battery::{BatteryMachine, BatteryMode};
use crate::devices::recloser::RecloserMachine;
use crate::devices::types::{PowerObserver, RecloserStatusObserver};
use crate::profile::codec::Marshaller;
use crate::profile::{ControlType, Profile, SwitchAction, SwitchStatus};
use crate::sim::power_balance::PowerClass;

/// Consumes raw payloads delivered on one subscription.
pub trait PayloadHandler: Send + Sync {
    fn handle(&self, topic: &str, payload: &[u8]);
}

fn decode(codec: &dyn Marshaller, topic: &str, payload: &[u8]) -> Option<Profile> {
    match codec.decode(payload) {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(topic, error = %e, "dropping undecodable payload");
            None
        }
    }
}

/// Applies battery control profiles addressed to one battery.
pub struct BatteryControlHandler {
    battery: Arc<BatteryMachine>,
    logical_device_id: String,
    codec: Arc<dyn Marshaller>,
}

impl BatteryControlHandler {
    pub fn new(
        battery: Arc<BatteryMachine>,
        logical_device_id: impl Into<String>,
        codec: Arc<dyn Marshaller>,
    ) -> Self {
        Self {
            battery,
            logical_device_id: logical_device_id.into(),
            codec,
        }
    }
}

impl PayloadHandler for BatteryControlHandler {
    fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(profile) = decode(self.codec.as_ref(), topic, payload) else {
            return;
        };
        let control = match profile {
            Profile::BatteryControl(c) if c.header.logical_device_id() == self.logical_device_id => c,
            other => {
                debug!(topic, kind = %other.kind(), id = other.logical_device_id(), "ignoring profile");
                return;
            }
        };

        // Rejected transitions are logged by the machine itself.
        if control.is_islanded {
            let _ = self.battery.set_mode_control(BatteryMode::Islanded);
        }
        for set_point in &control.set_points {
            match set_point.control_type {
                ControlType::SetMode => match BatteryMode::from_code(set_point.value as i64) {
                    Some(mode) => {
                        let _ = self.battery.set_mode_control(mode);
                    }
                    None => warn!(code = set_point.value, "unknown battery mode"),
                },
                ControlType::SetRealPower => self.battery.set_power_setpoint(set_point.value),
                ControlType::Unknown => debug!("ignoring unsupported set point"),
            }
        }
    }
}

/// Applies trip/close commands addressed to one recloser.
pub struct RecloserControlHandler {
    recloser: Arc<RecloserMachine>,
    logical_device_id: String,
    codec: Arc<dyn Marshaller>,
}

impl RecloserControlHandler {
    pub fn new(
        recloser: Arc<RecloserMachine>,
        logical_device_id: impl Into<String>,
        codec: Arc<dyn Marshaller>,
    ) -> Self {
        Self {
            recloser,
            logical_device_id: logical_device_id.into(),
            codec,
        }
    }
}

impl PayloadHandler for RecloserControlHandler {
    fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(profile) = decode(self.codec.as_ref(), topic, payload) else {
            return;
        };
        match profile {
            Profile::RecloserControl(c) if c.header.logical_device_id() == self.logical_device_id => {
                match c.action {
                    SwitchAction::Trip => self.recloser.handle_open(),
                    SwitchAction::Close => self.recloser.handle_close(),
                    SwitchAction::Unknown => warn!(topic, "unsupported recloser action"),
                }
            }
            other => {
                debug!(topic, kind = %other.kind(), id = other.logical_device_id(), "ignoring profile");
            }
        }
    }
}

/// Feeds power readings of one contributor class to a [`PowerObserver`].
///
/// Batteries are read from battery readings, solar from solar readings and
/// loads from resource readings. Every real-power value in the profile is
/// reported under the publisher's logical device id.
pub struct PowerReadingHandler {
    class: PowerClass,
    observer: Arc<dyn PowerObserver>,
    codec: Arc<dyn Marshaller>,
}

impl PowerReadingHandler {
    pub fn new(class: PowerClass, observer: Arc<dyn PowerObserver>, codec: Arc<dyn Marshaller>) -> Self {
        Self {
            class,
            observer,
            codec,
        }
    }
}

impl PayloadHandler for PowerReadingHandler {
    fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(profile) = decode(self.codec.as_ref(), topic, payload) else {
            return;
        };
        let readings = match (self.class, &profile) {
            (PowerClass::Battery, Profile::BatteryReading(r))
            | (PowerClass::Solar, Profile::SolarReading(r))
            | (PowerClass::Load, Profile::ResourceReading(r)) => r,
            (_, other) => {
                debug!(topic, class = %self.class, kind = %other.kind(), "ignoring profile");
                return;
            }
        };

        let id = readings.header.logical_device_id();
        for power_kw in readings.power_values_kw() {
            match self.class {
                PowerClass::Battery => self.observer.update_battery_power(id, power_kw),
                PowerClass::Load => self.observer.update_load_power(id, power_kw),
                PowerClass::Solar => self.observer.update_solar_power(id, power_kw),
            }
        }
    }
}

/// Forwards one recloser's switch status.
pub struct RecloserStatusHandler {
    recloser_id: String,
    observer: Arc<dyn RecloserStatusObserver>,
    codec: Arc<dyn Marshaller>,
}

impl RecloserStatusHandler {
    pub fn new(
        recloser_id: impl Into<String>,
        observer: Arc<dyn RecloserStatusObserver>,
        codec: Arc<dyn Marshaller>,
    ) -> Self {
        Self {
            recloser_id: recloser_id.into(),
            observer,
            codec,
        }
    }
}

impl PayloadHandler for RecloserStatusHandler {
    fn handle(&self, topic: &str, payload: &[u8]) {
        let Some(profile) = decode(self.codec.as_ref(), topic, payload) else {
            return;
        };
        match profile {
            Profile::RecloserEvent(e) if e.header.logical_device_id() == self.recloser_id => {
                self.observer
                    .update_recloser_status(e.status == SwitchStatus::Closed);
            }
            other => {
                debug!(topic, kind = %other.kind(), id = other.logical_device_id(), "ignoring profile");
            }
        }
    }
}
