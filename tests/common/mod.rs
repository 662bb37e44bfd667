//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use tracing::Span;

use microgrid_sim::config::SimulatorConfig;
use microgrid_sim::devices::battery::{BatteryMachine, BatteryMode, BatteryObserver, BatterySpec};
use microgrid_sim::devices::recloser::{RecloserMachine, RecloserObserver, RecloserSpec};
use microgrid_sim::error::PublishError;
use microgrid_sim::sim::clock::ManualClock;
use microgrid_sim::sim::controller::BatteryControlIssuer;

/// 2024-06-01T12:00:00Z, solar noon on the shipped curve.
pub const NOON_MILLIS: i64 = 1_717_243_200_000;

/// Default battery (100 kWh, 10–90 kWh usable, 25 kW charge, 50 kW discharge).
pub fn default_battery_spec() -> BatterySpec {
    BatterySpec {
        max_charge_rate_kw: 25.0,
        max_discharge_rate_kw: 50.0,
        energy_rating_kwh: 100.0,
        energy_max_kwh: 90.0,
        energy_min_kwh: 10.0,
        efficiency_ratio: 0.9,
        voltage: 480.0,
        hertz: 60.0,
    }
}

/// Default recloser (12.47 kV, 60 Hz).
pub fn default_recloser_spec() -> RecloserSpec {
    RecloserSpec {
        voltage: 12_470.0,
        hertz: 60.0,
    }
}

/// Everything a battery published, in order.
#[derive(Default)]
pub struct RecordingBattery {
    pub reads: Mutex<Vec<f64>>,
    pub events: Mutex<Vec<(bool, BatteryMode, f64)>>,
}

impl BatteryObserver for RecordingBattery {
    fn battery_read_update(&self, power_kw: f64, _volts: f64, _hertz: f64) -> Result<(), PublishError> {
        self.reads.lock().push(power_kw);
        Ok(())
    }

    fn battery_event_update(
        &self,
        _is_connected: bool,
        is_charging: bool,
        mode: BatteryMode,
        soc_percent: f64,
    ) -> Result<(), PublishError> {
        self.events.lock().push((is_charging, mode, soc_percent));
        Ok(())
    }
}

/// Everything a recloser published, in order.
#[derive(Default)]
pub struct RecordingRecloser {
    pub reads: Mutex<Vec<f64>>,
    pub events: Mutex<Vec<bool>>,
}

impl RecordingRecloser {
    pub fn last_read(&self) -> Option<f64> {
        self.reads.lock().last().copied()
    }
}

impl RecloserObserver for RecordingRecloser {
    fn read_update(&self, power_kw: f64, _volts: f64, _hertz: f64, _kvars: f64) -> Result<(), PublishError> {
        self.reads.lock().push(power_kw);
        Ok(())
    }

    fn event_update(&self, is_closed: bool, _is_blocked: bool) -> Result<(), PublishError> {
        self.events.lock().push(is_closed);
        Ok(())
    }
}

/// Battery at SoC 0.5 on a manual clock, publishing into a recorder.
pub fn battery() -> (Arc<BatteryMachine>, Arc<RecordingBattery>, ManualClock) {
    let rec = Arc::new(RecordingBattery::default());
    let clock = ManualClock::new(NOON_MILLIS);
    let machine = Arc::new(BatteryMachine::new(
        default_battery_spec(),
        0.5,
        rec.clone(),
        Arc::new(clock.clone()),
        StdRng::seed_from_u64(42),
        Span::none(),
    ));
    (machine, rec, clock)
}

/// Closed recloser publishing into a recorder.
pub fn recloser() -> (Arc<RecloserMachine>, Arc<RecordingRecloser>) {
    let rec = Arc::new(RecordingRecloser::default());
    let machine = Arc::new(RecloserMachine::new(
        default_recloser_spec(),
        rec.clone(),
        StdRng::seed_from_u64(42),
        Span::none(),
    ));
    (machine, rec)
}

/// Delivers controller commands straight to a battery, bypassing the bus.
pub struct DirectIssuer(pub Arc<BatteryMachine>);

impl BatteryControlIssuer for DirectIssuer {
    fn set_islanded(&self) -> Result<(), PublishError> {
        let _ = self.0.set_mode_control(BatteryMode::Islanded);
        Ok(())
    }

    fn set_power_setpoint(&self, power_kw: f64) -> Result<(), PublishError> {
        self.0.set_power_setpoint(power_kw);
        Ok(())
    }

    fn leave_islanded(&self) -> Result<(), PublishError> {
        let _ = self.0.set_mode_control(BatteryMode::LeavingIslanded);
        Ok(())
    }
}

pub fn manifest_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}

/// The shipped demo configuration with fast timers and no output jitter.
pub fn demo_config() -> SimulatorConfig {
    let mut cfg = SimulatorConfig::from_toml_file(&manifest_path("config/microgrid.toml"))
        .expect("shipped config should load");
    if let Some(b) = cfg.battery.as_mut() {
        b.interval_ms = 20;
    }
    if let Some(r) = cfg.recloser.as_mut() {
        r.interval_ms = 20;
    }
    for out in [cfg.solar.as_mut(), cfg.load.as_mut()].into_iter().flatten() {
        out.interval_ms = 20;
        out.jitter_chance = 0.0;
    }
    cfg
}

/// Polls `cond` every 10 ms until it holds or two seconds pass.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
