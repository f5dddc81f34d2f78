//! Bounded system and operation event logs.
//!
//! Each log keeps its most recent entries, newest first. The engine
//! appends under the state lock and hands every new entry to the history
//! sink once the lock is released.

use std::collections::VecDeque;

use autoline_types::{EventId, LogEntry, LogKind, LogLevel};
use chrono::{DateTime, Utc};

/// Entries retained per log.
pub const EVENT_LOG_CAPACITY: usize = 50;

/// The system log and the operation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    system: VecDeque<LogEntry>,
    operation: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create empty logs retaining [`EVENT_LOG_CAPACITY`] entries each.
    pub const fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    /// Create empty logs retaining `capacity` entries each.
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            system: VecDeque::new(),
            operation: VecDeque::new(),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest one once the log is full.
    pub fn push(
        &mut self,
        kind: LogKind,
        level: LogLevel,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> LogEntry {
        let entry = LogEntry {
            id: EventId::new(),
            timestamp: now,
            kind,
            level,
            content: content.into(),
        };
        let capacity = self.capacity;
        let log = match kind {
            LogKind::System => &mut self.system,
            LogKind::Operation => &mut self.operation,
        };
        log.push_front(entry.clone());
        log.truncate(capacity);
        entry
    }

    /// Entries of one log, newest first.
    pub const fn entries(&self, kind: LogKind) -> &VecDeque<LogEntry> {
        match kind {
            LogKind::System => &self.system,
            LogKind::Operation => &self.operation,
        }
    }

    /// Owned copy of one log, newest first.
    pub fn to_vec(&self, kind: LogKind) -> Vec<LogEntry> {
        self.entries(kind).iter().cloned().collect()
    }

    /// Empty one log. Returns how many entries were removed.
    pub fn clear(&mut self, kind: LogKind) -> usize {
        let log = match kind {
            LogKind::System => &mut self.system,
            LogKind::Operation => &mut self.operation,
        };
        let count = log.len();
        log.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_entries_come_first_and_oldest_are_dropped() {
        let mut log = EventLog::with_capacity(3);
        let now = Utc::now();
        for i in 0..5 {
            let content = format!("op {i}");
            log.push(LogKind::Operation, LogLevel::Success, content, now);
        }
        let contents: Vec<_> = log
            .entries(LogKind::Operation)
            .iter()
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(contents, ["op 4", "op 3", "op 2"]);
        assert!(log.entries(LogKind::System).is_empty());
    }

    #[test]
    fn clearing_one_log_keeps_the_other() {
        let mut log = EventLog::new();
        let now = Utc::now();
        log.push(LogKind::System, LogLevel::Info, "line created", now);
        log.push(LogKind::Operation, LogLevel::Success, "opened", now);
        assert_eq!(log.clear(LogKind::Operation), 1);
        assert!(log.entries(LogKind::Operation).is_empty());
        assert_eq!(log.entries(LogKind::System).len(), 1);
    }

    #[test]
    fn default_capacity_is_fifty() {
        let mut log = EventLog::new();
        let now = Utc::now();
        for _ in 0..60 {
            log.push(LogKind::System, LogLevel::Info, "tick", now);
        }
        assert_eq!(log.entries(LogKind::System).len(), EVENT_LOG_CAPACITY);
    }
}
