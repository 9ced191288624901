use mlstore_query::DataRow;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    30
}

/// When a batching step flushes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_secs", alias = "flush_interval")]
    pub flush_interval_secs: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl BatchSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

/// Rows waiting to be written, owned by a single step
#[derive(Debug)]
pub struct BatchBuffer {
    rows: Vec<DataRow>,
    settings: BatchSettings,
    last_flush: Instant,
}

impl BatchBuffer {
    pub fn new(settings: BatchSettings) -> Self {
        Self {
            rows: Vec::with_capacity(settings.batch_size.min(4096)),
            settings,
            last_flush: Instant::now(),
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn push(&mut self, row: DataRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn should_flush(&self) -> bool {
        self.should_flush_at(Instant::now())
    }

    /// Full, or the flush interval has passed since the last flush
    pub fn should_flush_at(&self, now: Instant) -> bool {
        self.rows.len() >= self.settings.batch_size
            || now.saturating_duration_since(self.last_flush) >= self.settings.flush_interval()
    }

    /// Take every buffered row and restart the interval. The buffer is empty
    /// afterwards whatever happens to the rows.
    pub fn take(&mut self) -> Vec<DataRow> {
        self.last_flush = Instant::now();
        std::mem::take(&mut self.rows)
    }
}
