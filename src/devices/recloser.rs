use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use tokio::time::MissedTickBehavior;
use tracing::{Span, debug, error, info};

use crate::devices::types::{PowerObserver, nominal_jitter};
use crate::error::PublishError;
use crate::sim::power_balance::{Contributors, PowerClass};

/// Nominal electrical values used as the jitter baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecloserSpec {
    pub voltage: f64,
    pub hertz: f64,
}

/// Outbound side of the recloser.
pub trait RecloserObserver: Send + Sync {
    /// Through-flow reading. Reactive power is always zero in this model.
    fn read_update(&self, power_kw: f64, volts: f64, hertz: f64, kvars: f64)
    -> Result<(), PublishError>;

    fn event_update(&self, is_closed: bool, is_blocked: bool) -> Result<(), PublishError>;
}

/// Point-in-time copy of the recloser's runtime state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecloserSnapshot {
    pub is_closed: bool,
    /// Power the recloser currently reports: the contributor sum when
    /// closed, zero when open.
    pub through_flow_kw: f64,
    pub volts: f64,
    pub hertz: f64,
}

struct RecloserState {
    is_closed: bool,
    contributors: Contributors,
    volts: f64,
    hertz: f64,
    rng: StdRng,
}

impl RecloserState {
    fn through_flow_kw(&self) -> f64 {
        if self.is_closed {
            self.contributors.net_kw()
        } else {
            0.0
        }
    }
}

/// Simulated recloser: an open/closed switch that reports the sum of every
/// contributor behind it.
///
/// An open recloser reports zero through-flow whatever its contributors say.
/// Contributor values persist once reported.
pub struct RecloserMachine {
    spec: RecloserSpec,
    observer: Arc<dyn RecloserObserver>,
    state: Mutex<RecloserState>,
    span: Span,
}

impl RecloserMachine {
    /// Creates a closed recloser with no contributors.
    pub fn new(
        spec: RecloserSpec,
        observer: Arc<dyn RecloserObserver>,
        rng: StdRng,
        span: Span,
    ) -> Self {
        let state = RecloserState {
            is_closed: true,
            contributors: Contributors::new(),
            volts: spec.voltage,
            hertz: spec.hertz,
            rng,
        };
        Self {
            spec,
            observer,
            state: Mutex::new(state),
            span,
        }
    }

    pub fn snapshot(&self) -> RecloserSnapshot {
        let st = self.state.lock();
        RecloserSnapshot {
            is_closed: st.is_closed,
            through_flow_kw: st.through_flow_kw(),
            volts: st.volts,
            hertz: st.hertz,
        }
    }

    /// Copy of the contributor registry.
    pub fn contributors(&self) -> Contributors {
        self.state.lock().contributors.clone()
    }

    /// Heartbeat: recompute and publish whether or not anything changed.
    pub fn push(&self) {
        let _entered = self.span.enter();
        let mut st = self.state.lock();
        self.compute_update(&mut st);
    }

    /// Trips the recloser. No-op when already open.
    pub fn handle_open(&self) {
        self.set_closed(false);
    }

    /// Closes the recloser. No-op when already closed.
    pub fn handle_close(&self) {
        self.set_closed(true);
    }

    /// Pushes forever at `interval`. Never returns.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.push();
        }
    }

    fn set_closed(&self, closed: bool) {
        let _entered = self.span.enter();
        let mut st = self.state.lock();
        if st.is_closed == closed {
            debug!(closed, "recloser already in requested state");
            return;
        }
        st.is_closed = closed;
        info!(closed, "recloser switched");
        self.compute_update(&mut st);
    }

    fn upsert(&self, class: PowerClass, id: &str, power_kw: f64) {
        let _entered = self.span.enter();
        let mut st = self.state.lock();
        st.contributors.upsert(class, id, power_kw);
        debug!(%class, id, power_kw, "contributor updated");
        self.compute_update(&mut st);
    }

    fn compute_update(&self, st: &mut RecloserState) {
        st.volts = nominal_jitter(&mut st.rng, self.spec.voltage);
        st.hertz = nominal_jitter(&mut st.rng, self.spec.hertz);
        let power_kw = st.through_flow_kw();

        let result = self
            .observer
            .read_update(power_kw, st.volts, st.hertz, 0.0)
            .and_then(|()| self.observer.event_update(st.is_closed, false));
        if let Err(e) = result {
            error!(error = %e, "failed to publish recloser state");
        }
    }
}

impl PowerObserver for RecloserMachine {
    fn update_battery_power(&self, id: &str, power_kw: f64) {
        self.upsert(PowerClass::Battery, id, power_kw);
    }

    fn update_load_power(&self, id: &str, power_kw: f64) {
        self.upsert(PowerClass::Load, id, power_kw);
    }

    fn update_solar_power(&self, id: &str, power_kw: f64) {
        self.upsert(PowerClass::Solar, id, power_kw);
    }
}
