use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{Span, debug, error, info, warn};

use crate::devices::types::nominal_jitter;
use crate::error::PublishError;
use crate::sim::clock::Clock;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// SoC below which a battery returning to standby starts charging.
const STANDBY_SOC_THRESHOLD: f64 = 0.5;

/// Operating mode of the battery inverter.
///
/// Each mode carries the numeric code used by `SetMode` set points on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatteryMode {
    MaintainStandby,
    ProgramPq,
    Islanded,
    LeavingIslanded,
}

impl BatteryMode {
    pub const ALL: [BatteryMode; 4] = [
        BatteryMode::MaintainStandby,
        BatteryMode::ProgramPq,
        BatteryMode::Islanded,
        BatteryMode::LeavingIslanded,
    ];

    /// Wire-level mode number.
    pub const fn code(self) -> i64 {
        match self {
            BatteryMode::MaintainStandby => 4,
            BatteryMode::ProgramPq => 12,
            BatteryMode::Islanded => 13,
            BatteryMode::LeavingIslanded => 14,
        }
    }

    /// Looks up a mode by wire number; `None` for unknown codes.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    /// Human-readable description published in battery events.
    pub const fn description(self) -> &'static str {
        match self {
            BatteryMode::MaintainStandby => "Maintain Minimum Battery SoC",
            BatteryMode::ProgramPq => "Programmed P/Q",
            BatteryMode::Islanded => "Islanded",
            BatteryMode::LeavingIslanded => "Leaving Islanded",
        }
    }

    /// Modes in which the pending setpoint drives instantaneous power.
    pub const fn is_setpoint_driven(self) -> bool {
        matches!(self, BatteryMode::ProgramPq | BatteryMode::Islanded)
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A mode change the state machine does not permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("transition from {from} to {to} not supported")]
pub struct InvalidTransition {
    pub from: BatteryMode,
    pub to: BatteryMode,
}

/// Immutable physical limits of a battery, loaded at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySpec {
    /// Maximum charge rate in kW (positive magnitude).
    pub max_charge_rate_kw: f64,
    /// Maximum discharge rate in kW (positive magnitude).
    pub max_discharge_rate_kw: f64,
    /// Nameplate energy in kWh; SoC is stored energy over this.
    pub energy_rating_kwh: f64,
    /// Stored energy ceiling in kWh.
    pub energy_max_kwh: f64,
    /// Stored energy floor in kWh.
    pub energy_min_kwh: f64,
    /// Round-trip efficiency. Carried for completeness; the energy model is lossless.
    pub efficiency_ratio: f64,
    /// Nominal terminal voltage.
    pub voltage: f64,
    /// Nominal frequency.
    pub hertz: f64,
}

impl BatterySpec {
    /// Clamps a power command to `[-max_charge_rate, +max_discharge_rate]`.
    pub fn clamp_setpoint(&self, power_kw: f64) -> f64 {
        if power_kw < -self.max_charge_rate_kw {
            -self.max_charge_rate_kw
        } else if power_kw > self.max_discharge_rate_kw {
            self.max_discharge_rate_kw
        } else {
            power_kw
        }
    }

    /// Clamps stored energy to `[energy_min, energy_max]`.
    pub fn clamp_energy(&self, energy_kwh: f64) -> f64 {
        if energy_kwh > self.energy_max_kwh {
            self.energy_max_kwh
        } else if energy_kwh < self.energy_min_kwh {
            self.energy_min_kwh
        } else {
            energy_kwh
        }
    }

    /// Lowest and highest SoC the energy limits allow.
    pub fn soc_bounds(&self) -> (f64, f64) {
        (
            self.energy_min_kwh / self.energy_rating_kwh,
            self.energy_max_kwh / self.energy_rating_kwh,
        )
    }
}

/// Outbound side of the battery: receives every state publication.
pub trait BatteryObserver: Send + Sync {
    /// Instantaneous measurements. `power_kw` is positive when discharging.
    fn battery_read_update(&self, power_kw: f64, volts: f64, hertz: f64)
    -> Result<(), PublishError>;

    /// Status: connection, charging flag, mode and SoC in percent.
    fn battery_event_update(
        &self,
        is_connected: bool,
        is_charging: bool,
        mode: BatteryMode,
        soc_percent: f64,
    ) -> Result<(), PublishError>;
}

/// Point-in-time copy of the battery's runtime state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySnapshot {
    pub mode: BatteryMode,
    pub soc: f64,
    pub power_kw: f64,
    pub volts: f64,
    pub hertz: f64,
    pub setpoint_kw: f64,
}

struct BatteryState {
    mode: BatteryMode,
    soc: f64,
    power_kw: f64,
    volts: f64,
    hertz: f64,
    setpoint_kw: f64,
    last_soc_update_ms: Option<i64>,
    rng: StdRng,
}

impl BatteryState {
    /// Integrates power over the time since the previous call.
    ///
    /// Positive power is discharge, so energy leaves the battery. The first
    /// call only anchors the clock.
    fn update_soc(&mut self, spec: &BatterySpec, now_ms: i64) {
        if let Some(last_ms) = self.last_soc_update_ms {
            let elapsed_hours = (now_ms - last_ms).max(0) as f64 / MILLIS_PER_HOUR;
            let energy_delta = self.power_kw * elapsed_hours;
            let prev_energy = self.soc * spec.energy_rating_kwh;
            let next_energy = spec.clamp_energy(prev_energy - energy_delta);
            self.soc = next_energy / spec.energy_rating_kwh;
        }
        self.last_soc_update_ms = Some(now_ms);
    }

    /// Standby never discharges once above half charge.
    fn check_standby(&mut self) {
        if self.mode == BatteryMode::MaintainStandby
            && self.power_kw != 0.0
            && self.soc > STANDBY_SOC_THRESHOLD
        {
            self.power_kw = 0.0;
        }
    }

    fn jitter(&mut self, spec: &BatterySpec) {
        self.hertz = nominal_jitter(&mut self.rng, spec.hertz);
        self.volts = nominal_jitter(&mut self.rng, spec.voltage);
    }

    fn snapshot(&self) -> BatterySnapshot {
        BatterySnapshot {
            mode: self.mode,
            soc: self.soc,
            power_kw: self.power_kw,
            volts: self.volts,
            hertz: self.hertz,
            setpoint_kw: self.setpoint_kw,
        }
    }
}

/// Simulated battery inverter: mode state machine plus SoC integration.
///
/// All operations run under one lock per battery, including the publish at
/// the end, so timer ticks and inbound commands never interleave.
///
/// # Power Convention
/// - Positive power: discharging (energy leaves the battery)
/// - Negative power: charging
pub struct BatteryMachine {
    spec: BatterySpec,
    observer: Arc<dyn BatteryObserver>,
    clock: Arc<dyn Clock>,
    state: Mutex<BatteryState>,
    span: Span,
}

impl BatteryMachine {
    /// Creates a battery in `MaintainStandby` with zero power and setpoint.
    ///
    /// # Arguments
    ///
    /// * `spec` - Physical limits
    /// * `initial_soc` - Starting SoC, pulled into the energy limits if outside them
    /// * `observer` - Publisher for readings and events
    /// * `clock` - Time source for SoC integration
    /// * `rng` - Random source for voltage/frequency jitter
    /// * `span` - Logging span every operation runs inside
    pub fn new(
        spec: BatterySpec,
        initial_soc: f64,
        observer: Arc<dyn BatteryObserver>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
        span: Span,
    ) -> Self {
        let soc = spec.clamp_energy(initial_soc * spec.energy_rating_kwh) / spec.energy_rating_kwh;
        let state = BatteryState {
            mode: BatteryMode::MaintainStandby,
            soc,
            power_kw: 0.0,
            volts: spec.voltage,
            hertz: spec.hertz,
            setpoint_kw: 0.0,
            last_soc_update_ms: None,
            rng,
        };
        Self {
            spec,
            observer,
            clock,
            state: Mutex::new(state),
            span,
        }
    }

    pub fn spec(&self) -> &BatterySpec {
        &self.spec
    }

    pub fn snapshot(&self) -> BatterySnapshot {
        self.state.lock().snapshot()
    }

    /// One periodic update: integrate SoC, apply the standby clamp, jitter
    /// voltage/frequency and publish.
    pub fn tick(&self) {
        let _entered = self.span.enter();
        let mut st = self.state.lock();
        st.update_soc(&self.spec, self.clock.now_millis());
        st.check_standby();
        st.jitter(&self.spec);
        debug!(
            mode = %st.mode,
            soc = st.soc,
            power_kw = st.power_kw,
            "battery tick"
        );
        self.publish_state(&st);
    }

    /// Stores a clamped power command; applies it at once in setpoint-driven modes.
    pub fn set_power_setpoint(&self, power_kw: f64) {
        let _entered = self.span.enter();
        let clamped = self.spec.clamp_setpoint(power_kw);
        debug!(requested_kw = power_kw, clamped_kw = clamped, "set power");

        let mut st = self.state.lock();
        st.setpoint_kw = clamped;
        if st.mode.is_setpoint_driven() {
            st.update_soc(&self.spec, self.clock.now_millis());
            st.power_kw = clamped;
            self.publish_state(&st);
        }
    }

    /// Requests a mode change.
    ///
    /// Unsupported transitions are logged and leave the state untouched.
    /// A request to leave islanded mode settles directly in `MaintainStandby`.
    pub fn set_mode_control(&self, next: BatteryMode) -> Result<(), InvalidTransition> {
        let _entered = self.span.enter();
        debug!(next = %next, "set mode");

        let mut st = self.state.lock();
        match (st.mode, next) {
            (BatteryMode::MaintainStandby, BatteryMode::ProgramPq | BatteryMode::Islanded)
            | (BatteryMode::ProgramPq, BatteryMode::Islanded) => {
                self.enter_setpoint_driven(&mut st, next);
                Ok(())
            }
            (BatteryMode::ProgramPq, BatteryMode::MaintainStandby)
            | (BatteryMode::Islanded, BatteryMode::LeavingIslanded) => {
                self.enter_standby(&mut st);
                Ok(())
            }
            (from, to) => {
                warn!(from = %from, to = %to, "mode transition not supported");
                Err(InvalidTransition { from, to })
            }
        }
    }

    /// Ticks forever at `interval`. Never returns.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    fn enter_setpoint_driven(&self, st: &mut BatteryState, next: BatteryMode) {
        st.update_soc(&self.spec, self.clock.now_millis());
        info!(from = %st.mode, to = %next, power_kw = st.setpoint_kw, "mode transition");
        st.mode = next;
        st.power_kw = st.setpoint_kw;
        self.publish_state(st);
    }

    fn enter_standby(&self, st: &mut BatteryState) {
        st.update_soc(&self.spec, self.clock.now_millis());
        st.power_kw = if st.soc < STANDBY_SOC_THRESHOLD {
            -self.spec.max_charge_rate_kw
        } else {
            0.0
        };
        info!(
            from = %st.mode,
            to = %BatteryMode::MaintainStandby,
            power_kw = st.power_kw,
            "mode transition"
        );
        st.mode = BatteryMode::MaintainStandby;
        self.publish_state(st);
    }

    fn publish_state(&self, st: &BatteryState) {
        let result = self
            .observer
            .battery_read_update(st.power_kw, st.volts, st.hertz)
            .and_then(|()| {
                self.observer.battery_event_update(
                    true,
                    st.power_kw < 0.0,
                    st.mode,
                    st.soc * 100.0,
                )
            });
        if let Err(e) = result {
            error!(error = %e, "failed to publish battery state");
        }
    }
}
