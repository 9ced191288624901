use crate::client::{FluxTable, InfluxClient};
use crate::credentials::InfluxConnection;
use crate::line_protocol::Point;
use async_trait::async_trait;
use mlstore_query::{DataError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory client that records every call
#[derive(Default)]
pub struct RecordingClient {
    pub writes: Mutex<Vec<(String, Vec<Point>)>>,
    pub queries: Mutex<Vec<String>>,
    pub tables: Mutex<Vec<FluxTable>>,
    pub fail_writes: AtomicBool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let client = Self::default();
        client.fail_writes.store(true, Ordering::SeqCst);
        client
    }

    pub fn with_tables(tables: Vec<FluxTable>) -> Self {
        let client = Self::default();
        *client.tables.lock().unwrap() = tables;
        client
    }

    pub fn write_calls(&self) -> Vec<(String, Vec<Point>)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn query_calls(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl InfluxClient for RecordingClient {
    async fn query(&self, _conn: &InfluxConnection, flux: &str) -> Result<Vec<FluxTable>> {
        self.queries.lock().unwrap().push(flux.to_string());
        Ok(self.tables.lock().unwrap().clone())
    }

    async fn write(&self, _conn: &InfluxConnection, bucket: &str, points: &[Point]) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((bucket.to_string(), points.to_vec()));

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DataError::write_failed("simulated backend outage"));
        }
        Ok(())
    }
}

pub fn connection() -> InfluxConnection {
    InfluxConnection::new("http://influx.test:8086", "test-org", "test-token")
}
