use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{Rng, rngs::StdRng};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tracing::{Span, debug, error};

use crate::curve::DailyCurve;
use crate::error::PublishError;
use crate::sim::clock::Clock;

/// How a raw curve sample maps onto the published value.
///
/// `Direct` publishes `raw * scale + offset` (solar inverter, generation
/// positive). `Negated` publishes `-raw * scale + offset` (load meter fed
/// by a consumption curve, so consumption comes out negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignConvention {
    #[default]
    Direct,
    Negated,
}

/// Scaling and jitter applied to every sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputParams {
    pub scale: f64,
    pub offset: f64,
    /// Probability in `[0, 1]` that a tick is perturbed.
    pub jitter_chance: f64,
    /// Width of the perturbation band as a fraction of the scaled value.
    pub jitter_percent: f64,
    pub sign: SignConvention,
}

impl OutputParams {
    /// Applies scale, offset and sign convention to a raw sample.
    pub fn scaled(&self, raw: f64) -> f64 {
        match self.sign {
            SignConvention::Direct => raw * self.scale + self.offset,
            SignConvention::Negated => -raw * self.scale + self.offset,
        }
    }
}

/// Outbound side of an output loop.
pub trait OutputObserver: Send + Sync {
    /// Publishes the sampled value in kW.
    fn read_update(&self, value_kw: f64) -> Result<(), PublishError>;

    /// Publishes the status event that follows every reading. Meters without
    /// an event profile keep the default.
    fn event_update(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Periodic output source driven by an expected daily curve.
///
/// Holds no state between ticks apart from its random source.
pub struct OutputSimulator {
    params: OutputParams,
    curve: Arc<dyn DailyCurve>,
    observer: Arc<dyn OutputObserver>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    span: Span,
}

impl OutputSimulator {
    pub fn new(
        params: OutputParams,
        curve: Arc<dyn DailyCurve>,
        observer: Arc<dyn OutputObserver>,
        clock: Arc<dyn Clock>,
        rng: StdRng,
        span: Span,
    ) -> Self {
        Self {
            params,
            curve,
            observer,
            clock,
            rng: Mutex::new(rng),
            span,
        }
    }

    /// Samples the curve at the current time and applies scaling and jitter.
    pub fn sample(&self) -> f64 {
        let raw = self.curve.at_time(self.clock.now_millis());
        let scaled = self.params.scaled(raw);
        let mut rng = self.rng.lock();
        if rng.random::<f64>() <= self.params.jitter_chance {
            let range = self.params.jitter_percent * scaled;
            scaled + (range * rng.random::<f64>() - range / 2.0)
        } else {
            scaled
        }
    }

    /// Samples and publishes a reading then an event.
    pub fn tick(&self) {
        let _entered = self.span.enter();
        let value = self.sample();
        debug!(value_kw = value, "output tick");
        let result = self
            .observer
            .read_update(value)
            .and_then(|()| self.observer.event_update());
        if let Err(e) = result {
            error!(error = %e, "failed to publish output");
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
}
