use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use kubeai_types::{LogLevel, LogRecord};

/// Bounded, shareable window over the most recent records of a live stream
#[derive(Clone)]
pub struct LogBuffer {
    records: Arc<RwLock<VecDeque<LogRecord>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Push a record, evicting the oldest if at capacity
    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Every buffered record, oldest first
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// The last `n` records
    pub fn tail(&self, n: usize) -> Vec<LogRecord> {
        let records = self.records.read();
        let start = records.len().saturating_sub(n);
        records.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record count per level
    pub fn level_counts(&self) -> LevelCounts {
        let records = self.records.read();
        let mut counts = LevelCounts::default();

        for record in records.iter() {
            match record.level {
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Error => counts.error += 1,
                LogLevel::Fatal => counts.fatal += 1,
            }
        }

        counts
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
}

impl LevelCounts {
    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error + self.fatal
    }
}
