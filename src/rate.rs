use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

/// Count and rate as of the most recent tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub count: i64,
    pub rate: f64,
}

#[derive(Default)]
struct Smoothing {
    rate: f64,
    last_events: i64,
    init: bool,
}

/// Exponentially weighted moving average of a per-second event rate.
///
/// Producers call [`increment`](Self::increment) from any thread. Something
/// external must call [`tick`](Self::tick) once every `sampling_interval`;
/// the estimator does not measure time itself, so a drifting cadence skews
/// the rate directly.
///
/// `smoothing_factor` and `sampling_interval` are not validated. A zero
/// interval yields a non-finite rate and a negative factor makes the average
/// oscillate; both are the caller's problem.
pub struct RateEstimator {
    events: AtomicI64,
    alpha: f64,
    interval: Duration,
    state: Mutex<Smoothing>,
}

impl RateEstimator {
    pub fn new(smoothing_factor: f64, sampling_interval: Duration) -> Self {
        Self {
            events: AtomicI64::new(0),
            alpha: smoothing_factor,
            interval: sampling_interval,
            state: Mutex::new(Smoothing::default()),
        }
    }

    /// Adds `n` events. Lock-free.
    pub fn increment(&self, n: i64) {
        self.events.fetch_add(n, Ordering::Release);
    }

    /// Samples the counter and folds the delta since the previous tick into
    /// the average. Expected to be called every `sampling_interval`.
    pub fn tick(&self) {
        let events = self.events.load(Ordering::Acquire);

        let mut state = self.lock();
        let delta = events - state.last_events;
        let instant_rate = delta as f64 / self.interval.as_secs_f64();
        state.last_events = events;

        if state.init {
            state.rate += self.alpha * (instant_rate - state.rate);
        } else if events > 0 {
            // Seed with the first nonzero sample instead of smoothing up from zero.
            state.init = true;
            state.rate = instant_rate;
            debug!(events, rate = instant_rate, "Rate seeded");
        }

        trace!(events, delta, instant_rate, rate = state.rate, "Rate tick");
    }

    /// Smoothed per-second rate. Zero until a tick has seen events.
    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    /// Event count captured by the last tick, not the live counter.
    pub fn count(&self) -> i64 {
        self.lock().last_events
    }

    pub fn snapshot(&self) -> RateSnapshot {
        let state = self.lock();
        RateSnapshot {
            count: state.last_events,
            rate: state.rate,
        }
    }

    pub fn smoothing_factor(&self) -> f64 {
        self.alpha
    }

    pub fn sampling_interval(&self) -> Duration {
        self.interval
    }

    // The guarded fields are written together, so a poisoned guard still
    // holds a consistent state.
    fn lock(&self) -> MutexGuard<'_, Smoothing> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for RateEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RateEstimator")
            .field("alpha", &self.alpha)
            .field("interval", &self.interval)
            .field("events", &self.events.load(Ordering::Relaxed))
            .field("last_events", &state.last_events)
            .field("rate", &state.rate)
            .field("init", &state.init)
            .finish()
    }
}
