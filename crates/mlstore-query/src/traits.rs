use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;
use downcast_rs::{impl_downcast, Downcast};

/// Core trait that every URI-addressed store must implement
#[async_trait]
pub trait DataStore: Send + Sync + Downcast {
    /// URI scheme this store serves (e.g. "influx")
    fn scheme(&self) -> &'static str;

    /// Get all capabilities supported by this store
    fn capabilities(&self) -> Vec<Capability>;

    /// Check if a specific capability is supported
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Fetch the dataset addressed by `key` (the URI without its scheme)
    async fn get(&self, key: &str) -> Result<DataItem>;

    /// Store a table under `key`
    async fn put(&self, key: &str, table: &Table, append: bool) -> Result<()>;
}

impl_downcast!(DataStore);

/// A named write destination configured by the host
#[async_trait]
pub trait StoreTarget: Send + Sync + Downcast {
    /// Target kind (e.g. "influx")
    fn kind(&self) -> &'static str;

    /// Display name of this target
    fn name(&self) -> &str;

    /// Whether the target holds historical data for offline use
    fn is_offline(&self) -> bool;

    /// Whether the target serves low-latency lookups
    fn is_online(&self) -> bool;

    fn capabilities(&self) -> Vec<Capability>;

    /// Write a frame; returns the number of records written
    async fn write_frame(
        &self,
        frame: Frame<'_>,
        key_columns: &[String],
        timestamp_key: Option<&str>,
    ) -> Result<usize>;

    /// Read the target's data back as a table
    async fn read_table(&self, options: ReadOptions) -> Result<Table>;

    /// Remove the target's data
    async fn purge(&self) -> Result<()>;
}

impl_downcast!(StoreTarget);

/// A step in a stream-processing graph that receives one event at a time
/// and hands the same event on to the next step
#[async_trait]
pub trait StreamStep: Send {
    async fn process(&mut self, event: Event) -> Result<Event>;

    /// Called once when the graph shuts down
    async fn teardown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Read.to_string(), "read");
        assert_eq!(Capability::Streaming.to_string(), "streaming");
        assert_eq!(Capability::TimeSeries.to_string(), "time-series");
    }
}
