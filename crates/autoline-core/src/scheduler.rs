//! Scheduler: the background tick loop and its runtime controls.
//!
//! [`SchedulerControl`] is shared between the loop and whoever drives the
//! process (signal handler, API layer). Its fields are atomics so reading
//! them on every iteration takes no lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::info;

use crate::config::MIN_TICK_INTERVAL_MS;
use crate::engine::Engine;
use crate::tick::TickError;

/// Errors that end the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A tick failed unrecoverably.
    #[error("tick failed: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Shared control state for the tick loop.
#[derive(Debug)]
pub struct SchedulerControl {
    /// Whether the loop is paused.
    paused: AtomicBool,

    /// Wakes a paused loop on resume.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes a sleeping loop on stop.
    stop_notify: Notify,

    /// Tick interval in milliseconds.
    tick_interval_ms: AtomicU64,
}

impl SchedulerControl {
    /// Create control state with the given tick interval.
    ///
    /// Intervals below the minimum are raised to it.
    pub fn new(tick_interval_ms: u64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            tick_interval_ms: AtomicU64::new(tick_interval_ms.max(MIN_TICK_INTERVAL_MS)),
        }
    }

    /// Check whether the loop is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause ticking. Control operations keep working.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume ticking and wake the loop.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Request the loop to stop after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
        self.resume_notify.notify_one();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Get the current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Set the tick interval. Must be at least 100 ms.
    ///
    /// Returns the previous interval, or `None` if the value was rejected.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    async fn wait_while_paused(&self) {
        while self.is_paused() && !self.is_stop_requested() {
            self.resume_notify.notified().await;
        }
    }

    async fn wait_for_stop(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Totals reported when the loop ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerReport {
    /// Ticks executed by this loop.
    pub ticks: u64,
    /// Simulated seconds covered by those ticks.
    pub sim_seconds: f64,
}

/// Run the tick loop until a stop is requested.
///
/// The first tick, and the first tick after a resume, covers one
/// interval; later ticks cover the real time measured since the previous
/// one.
pub async fn run_scheduler(
    engine: &Engine,
    control: &SchedulerControl,
) -> Result<SchedulerReport, SchedulerError> {
    let mut report = SchedulerReport {
        ticks: 0,
        sim_seconds: 0.0,
    };
    info!(
        tick_interval_ms = control.tick_interval_ms(),
        "Scheduler starting"
    );

    loop {
        if control.is_paused() {
            info!("Scheduler paused, waiting for resume...");
            control.wait_while_paused().await;
            engine.reset_clock_baseline().await;
            info!("Scheduler resumed");
        }
        if control.is_stop_requested() {
            info!(ticks = report.ticks, "Scheduler stop requested");
            return Ok(report);
        }

        let interval_ms = control.tick_interval_ms();
        #[allow(clippy::cast_precision_loss)]
        let fallback_dt = interval_ms as f64 / 1000.0;
        let summary = engine.tick(fallback_dt).await?;
        report.ticks = report.ticks.saturating_add(1);
        report.sim_seconds += summary.dt;

        tokio::select! {
            () = tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)) => {}
            () = control.wait_for_stop() => {}
        }
    }
}
