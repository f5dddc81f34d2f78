//! Time-series history sink seam.
//!
//! The scheduler hands one batch of [`HistoryPoint`]s to the sink per
//! tick, and the engine hands over every new [`LogEntry`] as a timeline
//! marker, both after the state lock is released. Failures are logged by
//! the engine and never abort the owning operation.

use std::collections::VecDeque;
use std::sync::Mutex;

use autoline_types::{HistoryPoint, LogEntry};
use tracing::debug;

/// Errors a history sink may report.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The backing store rejected the batch.
    #[error("history store rejected batch: {message}")]
    Rejected {
        /// Description of the failure.
        message: String,
    },

    /// A lock guarding the in-memory buffer was poisoned.
    #[error("history buffer lock poisoned")]
    Poisoned,
}

/// Destination for per-tick time-series points.
pub trait HistorySink: Send + Sync {
    /// Record one tick's worth of points.
    fn record_batch(&self, points: &[HistoryPoint]) -> Result<(), HistoryError>;

    /// Record a system or operation event.
    fn record_event(&self, entry: &LogEntry) -> Result<(), HistoryError>;
}

/// Sink that only logs batch sizes at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHistorySink;

impl HistorySink for TracingHistorySink {
    fn record_batch(&self, points: &[HistoryPoint]) -> Result<(), HistoryError> {
        let with_readings = points
            .iter()
            .filter(|p| p.temperature.is_some() || p.vacuum.is_some())
            .count();
        debug!(
            points = points.len(),
            with_readings,
            "History batch recorded"
        );
        Ok(())
    }

    fn record_event(&self, entry: &LogEntry) -> Result<(), HistoryError> {
        debug!(
            kind = ?entry.kind,
            level = ?entry.level,
            content = %entry.content,
            "History event recorded"
        );
        Ok(())
    }
}

/// Bounded in-memory ring of the most recent points and events.
#[derive(Debug)]
pub struct MemoryHistorySink {
    capacity: usize,
    points: Mutex<VecDeque<HistoryPoint>>,
    events: Mutex<VecDeque<LogEntry>>,
}

impl MemoryHistorySink {
    /// Create a sink retaining at most `capacity` points and `capacity`
    /// events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: Mutex::new(VecDeque::with_capacity(capacity)),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Copy of the retained events, oldest first.
    pub fn events(&self) -> Vec<LogEntry> {
        self.events
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the retained points, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryPoint> {
        self.points
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Points retained for one entity, oldest first.
    pub fn points_for(&self, entity_id: &str) -> Vec<HistoryPoint> {
        self.snapshot()
            .into_iter()
            .filter(|p| p.entity_id == entity_id)
            .collect()
    }

    /// Number of retained points.
    pub fn len(&self) -> usize {
        self.points.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for MemoryHistorySink {
    fn record_batch(&self, points: &[HistoryPoint]) -> Result<(), HistoryError> {
        let mut buffer = self
            .points
            .lock()
            .map_err(|_poisoned| HistoryError::Poisoned)?;
        for point in points {
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(point.clone());
        }
        Ok(())
    }

    fn record_event(&self, entry: &LogEntry) -> Result<(), HistoryError> {
        let mut buffer = self
            .events
            .lock()
            .map_err(|_poisoned| HistoryError::Poisoned)?;
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use autoline_types::{LogKind, LogLevel};
    use chrono::Utc;

    use super::*;

    fn point(entity: &str, temperature: f64) -> HistoryPoint {
        HistoryPoint {
            entity_id: entity.to_owned(),
            timestamp: Utc::now(),
            temperature: Some(temperature),
            vacuum: None,
        }
    }

    fn event(content: &str) -> LogEntry {
        LogEntry {
            id: autoline_types::EventId::new(),
            timestamp: Utc::now(),
            kind: LogKind::Operation,
            level: LogLevel::Success,
            content: content.to_owned(),
        }
    }

    #[test]
    fn memory_sink_keeps_most_recent_points() {
        let sink = MemoryHistorySink::new(3);
        let batch: Vec<_> = (0..5u8).map(|i| point("a-hk", f64::from(i))).collect();
        assert!(sink.record_batch(&batch).is_ok());
        assert_eq!(sink.len(), 3);
        let snapshot = sink.snapshot();
        let temps: Vec<_> = snapshot.iter().filter_map(|p| p.temperature).collect();
        assert_eq!(temps, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn points_filter_by_entity() {
        let sink = MemoryHistorySink::new(10);
        let batch = [point("a-hk", 1.0), point("c-hk", 2.0)];
        assert!(sink.record_batch(&batch).is_ok());
        assert_eq!(sink.points_for("c-hk").len(), 1);
        assert!(sink.points_for("a-jl").is_empty());
    }

    #[test]
    fn memory_sink_keeps_most_recent_events() {
        let sink = MemoryHistorySink::new(2);
        for content in ["opened", "closed", "moved"] {
            assert!(sink.record_event(&event(content)).is_ok());
        }
        let contents: Vec<_> = sink.events().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, ["closed", "moved"]);
    }

    #[test]
    fn tracing_sink_accepts_everything() {
        assert!(TracingHistorySink.record_batch(&[point("a-hk", 1.0)]).is_ok());
        assert!(TracingHistorySink.record_event(&event("opened")).is_ok());
    }
}
