//! Expected daily output curves sampled by wall-clock time.

const MILLIS_PER_DAY: i64 = 86_400_000;

/// A time-indexed lookup of expected output.
///
/// Implementations must be pure: the same instant always yields the same value.
pub trait DailyCurve: Send + Sync {
    /// Expected raw output at `epoch_millis` (milliseconds since the Unix epoch).
    fn at_time(&self, epoch_millis: i64) -> f64;
}

impl<F> DailyCurve for F
where
    F: Fn(i64) -> f64 + Send + Sync,
{
    fn at_time(&self, epoch_millis: i64) -> f64 {
        self(epoch_millis)
    }
}

/// Evenly spaced samples covering one UTC day, linearly interpolated.
///
/// Sample `i` sits at `i * 24h / n` past midnight. Between the last sample and
/// midnight the curve interpolates back towards the first sample, so the day
/// wraps without a step.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedDay {
    samples: Vec<f64>,
}

impl InterpolatedDay {
    /// Builds a curve from one day of samples; `None` if `samples` is empty.
    pub fn new(samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Largest sample value.
    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(f64::MIN, f64::max)
    }
}

impl DailyCurve for InterpolatedDay {
    fn at_time(&self, epoch_millis: i64) -> f64 {
        let n = self.samples.len();
        let ms_of_day = epoch_millis.rem_euclid(MILLIS_PER_DAY);
        let position = ms_of_day as f64 / MILLIS_PER_DAY as f64 * n as f64;
        let idx = (position.floor() as usize).min(n - 1);
        let frac = position - idx as f64;
        let a = self.samples[idx];
        let b = self.samples[(idx + 1) % n];
        a + (b - a) * frac
    }
}
