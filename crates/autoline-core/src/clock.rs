//! Simulation clock: tick counter and scaled elapsed time.
//!
//! Real elapsed time between ticks is measured with [`tokio::time::Instant`]
//! so paused-clock tests drive it deterministically. Simulated time is the
//! real delta scaled by the time multiplier.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// Time step handed to the models for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickTime {
    /// The tick number being executed.
    pub tick: u64,
    /// Simulated seconds covered by this tick.
    pub dt: f64,
    /// Wall-clock time of the tick.
    pub now: DateTime<Utc>,
}

/// Tick counter plus accumulated simulated time.
#[derive(Debug, Clone, PartialEq)]
pub struct SimClock {
    tick: u64,
    sim_seconds: f64,
    last_tick_at: Option<Instant>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    /// Create a clock at tick 0.
    pub const fn new() -> Self {
        Self {
            tick: 0,
            sim_seconds: 0.0,
            last_tick_at: None,
        }
    }

    /// Advance by one tick covering `real_dt` seconds of real time.
    pub fn advance(
        &mut self,
        real_dt: f64,
        time_multiplier: f64,
        now: DateTime<Utc>,
    ) -> Result<TickTime, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        let dt = (real_dt * time_multiplier).max(0.0);
        self.sim_seconds += dt;
        Ok(TickTime {
            tick: self.tick,
            dt,
            now,
        })
    }

    /// Real seconds since the previous call, measured on the tokio clock.
    ///
    /// The first call reports `fallback` since there is no previous tick.
    pub fn measure_real_dt(&mut self, fallback: f64) -> f64 {
        let now = Instant::now();
        let dt = self
            .last_tick_at
            .map_or(fallback, |prev| now.duration_since(prev).as_secs_f64());
        self.last_tick_at = Some(now);
        dt
    }

    /// Forget the previous tick time.
    ///
    /// The next [`measure_real_dt`](Self::measure_real_dt) reports its
    /// fallback, so time spent paused is never simulated.
    pub const fn reset_baseline(&mut self) {
        self.last_tick_at = None;
    }

    /// Number of ticks executed.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds accumulated over all ticks.
    pub const fn sim_seconds(&self) -> f64 {
        self.sim_seconds
    }
}

/// Seconds between two timestamps, never negative.
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = now.signed_duration_since(start).num_milliseconds().max(0);
    ms as f64 / 1000.0
}

/// Whole seconds between two timestamps, never negative.
pub fn elapsed_whole_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from(now.signed_duration_since(start).num_seconds().max(0)).unwrap_or(0)
}

/// Format a duration in seconds as `"Xh Ym"`.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{hours}h {minutes}m")
}
