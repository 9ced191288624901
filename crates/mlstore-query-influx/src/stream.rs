//! Stream-graph steps that write events to InfluxDB.
//!
//! Both steps hand every event on unchanged. With `fail_open` set, write
//! errors are logged and swallowed so one bad batch does not stop the graph.

use crate::batch::{BatchBuffer, BatchSettings};
use crate::target::InfluxWriter;
use async_trait::async_trait;
use mlstore_query::{DataRow, Event, EventBody, Result, StreamStep, Table};
use std::borrow::Cow;
use tracing::{debug, error, warn};

fn event_table(event: &Event) -> Option<Cow<'_, Table>> {
    match &event.body {
        EventBody::Row(row) => Some(Cow::Owned(Table::from_rows(vec![row.clone()]))),
        EventBody::Table(table) => Some(Cow::Borrowed(table)),
        EventBody::Other(serde_json::Value::Object(map)) => {
            let row: DataRow = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            Some(Cow::Owned(Table::from_rows(vec![row])))
        }
        EventBody::Other(_) => None,
    }
}

fn event_rows(event: &Event) -> Option<Vec<DataRow>> {
    match &event.body {
        EventBody::Row(row) => Some(vec![row.clone()]),
        EventBody::Table(table) => Some(table.rows.clone()),
        EventBody::Other(serde_json::Value::Object(map)) => Some(vec![map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()]),
        EventBody::Other(_) => None,
    }
}

/// Writes each event as soon as it arrives
pub struct InfluxStreamStep {
    writer: InfluxWriter,
    fail_open: bool,
}

impl InfluxStreamStep {
    pub fn new(writer: InfluxWriter, fail_open: bool) -> Self {
        Self { writer, fail_open }
    }
}

#[async_trait]
impl StreamStep for InfluxStreamStep {
    async fn process(&mut self, event: Event) -> Result<Event> {
        let outcome = match event_table(&event) {
            None => {
                warn!("Unsupported event body for {}, passing it on", self.writer.location());
                None
            }
            Some(table) if table.is_empty() => None,
            Some(table) => Some(self.writer.write(&table).await),
        };

        match outcome {
            Some(Ok(written)) => debug!("Wrote {} points to {}", written, self.writer.location()),
            Some(Err(e)) if self.fail_open => {
                error!("Error writing to {}: {}", self.writer.location(), e)
            }
            Some(Err(e)) => return Err(e),
            None => {}
        }

        Ok(event)
    }
}

/// Buffers row events and writes them once the batch is full or the flush
/// interval has passed
pub struct InfluxBatchStep {
    writer: InfluxWriter,
    buffer: BatchBuffer,
    fail_open: bool,
}

impl InfluxBatchStep {
    pub fn new(writer: InfluxWriter, settings: BatchSettings, fail_open: bool) -> Self {
        Self {
            writer,
            buffer: BatchBuffer::new(settings),
            fail_open,
        }
    }

    /// Rows waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Write everything buffered. The buffer is emptied before the write, so
    /// rows from a failed flush are dropped rather than retried.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let rows = self.buffer.take();
        let count = rows.len();
        let written = self.writer.write(&Table::from_rows(rows)).await?;
        debug!("Flushed {} events to {}", count, self.writer.location());
        Ok(written)
    }
}

#[async_trait]
impl StreamStep for InfluxBatchStep {
    async fn process(&mut self, event: Event) -> Result<Event> {
        let Some(rows) = event_rows(&event) else {
            warn!(
                "Unsupported event body for batching to {}, passing it on",
                self.writer.location()
            );
            return Ok(event);
        };

        for row in rows {
            self.buffer.push(row);
        }

        if self.buffer.should_flush() {
            match self.flush().await {
                Ok(_) => {}
                Err(e) if self.fail_open => {
                    error!("Error flushing batch to {}: {}", self.writer.location(), e)
                }
                Err(e) => return Err(e),
            }
        }

        Ok(event)
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.flush().await {
            warn!("Final flush to {} failed: {}", self.writer.location(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingClient;
    use mlstore_query::{DataError, StaticValues, StoreContext};
    use serde_json::json;
    use std::sync::Arc;

    fn writer(client: Arc<RecordingClient>) -> InfluxWriter {
        let env = StaticValues::new()
            .with("INFLUX_DEV_URL", "http://influx.test:8086")
            .with("INFLUX_DEV_ORG", "acme")
            .with("INFLUX_DEV_TOKEN", "dev-token");
        let ctx = StoreContext::default().with_env(Arc::new(env));
        InfluxWriter::new(client, ctx, "sensors", "temperature")
            .with_keys(&["sensor".to_string()], None)
    }

    fn reading(i: i64) -> Event {
        let row: DataRow = [
            ("time", json!(i)),
            ("sensor", json!("bridge01")),
            ("value", json!(i)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Event::row(row).with_id(format!("e{}", i))
    }

    fn settings(batch_size: usize) -> BatchSettings {
        BatchSettings {
            batch_size,
            flush_interval_secs: 3600,
        }
    }

    #[tokio::test]
    async fn test_stream_step_writes_each_event() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxStreamStep::new(writer(client.clone()), true);

        let out = step.process(reading(1)).await.unwrap();
        assert_eq!(out, reading(1));
        step.process(reading(2)).await.unwrap();

        let calls = client.write_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1[0].tags["sensor"], "bridge01");
    }

    #[tokio::test]
    async fn test_stream_step_passes_unsupported_events_through() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxStreamStep::new(writer(client.clone()), true);

        let event = Event::other(json!("not a row"));
        assert_eq!(step.process(event.clone()).await.unwrap(), event);

        let empty = Event::table(Table::default());
        assert_eq!(step.process(empty.clone()).await.unwrap(), empty);

        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_step_fail_open_swallows_errors() {
        let client = Arc::new(RecordingClient::failing());
        let mut step = InfluxStreamStep::new(writer(client.clone()), true);
        assert_eq!(step.process(reading(1)).await.unwrap(), reading(1));

        let mut strict = InfluxStreamStep::new(writer(client.clone()), false);
        let err = strict.process(reading(1)).await.unwrap_err();
        assert!(matches!(err, DataError::WriteFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_exactly_at_batch_size() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxBatchStep::new(writer(client.clone()), settings(5), true);

        for i in 0..4 {
            step.process(reading(i)).await.unwrap();
        }
        assert_eq!(client.write_count(), 0);
        assert_eq!(step.buffered(), 4);

        step.process(reading(4)).await.unwrap();
        let calls = client.write_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 5);
        assert_eq!(step.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_clears_buffer() {
        let client = Arc::new(RecordingClient::failing());
        let mut step = InfluxBatchStep::new(writer(client.clone()), settings(2), true);

        step.process(reading(0)).await.unwrap();
        step.process(reading(1)).await.unwrap();
        assert_eq!(client.write_count(), 1);
        assert_eq!(step.buffered(), 0);

        let mut strict = InfluxBatchStep::new(writer(client.clone()), settings(1), false);
        assert!(strict.process(reading(0)).await.is_err());
        assert_eq!(strict.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_flushes_after_interval() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxBatchStep::new(
            writer(client.clone()),
            BatchSettings {
                batch_size: 100,
                flush_interval_secs: 30,
            },
            true,
        );

        step.process(reading(0)).await.unwrap();
        assert_eq!(client.write_count(), 0);

        tokio::time::advance(std::time::Duration::from_secs(31)).await;
        step.process(reading(1)).await.unwrap();
        assert_eq!(client.write_count(), 1);
        assert_eq!(client.write_calls()[0].1.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_events_are_buffered_row_wise() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxBatchStep::new(writer(client.clone()), settings(10), true);

        let rows = (0..3)
            .filter_map(|i| match reading(i).body {
                EventBody::Row(row) => Some(row),
                _ => None,
            })
            .collect();
        step.process(Event::table(Table::from_rows(rows))).await.unwrap();
        assert_eq!(step.buffered(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_flushes_and_swallows_errors() {
        let client = Arc::new(RecordingClient::new());
        let mut step = InfluxBatchStep::new(writer(client.clone()), settings(10), true);
        step.process(reading(0)).await.unwrap();
        step.teardown().await;
        assert_eq!(client.write_count(), 1);
        assert_eq!(step.buffered(), 0);

        let failing = Arc::new(RecordingClient::failing());
        let mut step = InfluxBatchStep::new(writer(failing.clone()), settings(10), false);
        step.process(reading(0)).await.unwrap();
        step.teardown().await;
        assert_eq!(failing.write_count(), 1);
        assert_eq!(step.buffered(), 0);
    }
}
