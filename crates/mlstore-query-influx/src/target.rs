//! Feature-store write target for InfluxDB.

use crate::batch::BatchSettings;
use crate::client::InfluxClient;
use crate::credentials::resolve_connection;
use crate::store::InfluxStore;
use crate::stream::{InfluxBatchStep, InfluxStreamStep};
use crate::uri::{ConnectionOverrides, QueryDescriptor, DEFAULT_ENV, SCHEME};
use crate::write::{write_table, ColumnRoles};
use async_trait::async_trait;
use mlstore_query::{
    Capability, DataError, Frame, ReadOptions, Result, StoreContext, StoreTarget, Table,
    TargetFactory, TargetSpec,
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

fn default_env() -> String {
    DEFAULT_ENV.to_string()
}

fn default_fail_open() -> bool {
    true
}

/// Target attributes as handed over by the host
#[derive(Clone, Deserialize)]
pub struct InfluxTargetOptions {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(flatten)]
    pub roles: ColumnRoles,
    #[serde(flatten)]
    pub batch: BatchSettings,
    /// Stream steps log write errors and pass events on instead of failing
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

impl Default for InfluxTargetOptions {
    fn default() -> Self {
        Self {
            env: default_env(),
            url: None,
            org: None,
            token: None,
            token_secret: None,
            roles: ColumnRoles::default(),
            batch: BatchSettings::default(),
            fail_open: default_fail_open(),
        }
    }
}

impl fmt::Debug for InfluxTargetOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxTargetOptions")
            .field("env", &self.env)
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_secret", &self.token_secret)
            .field("roles", &self.roles)
            .field("batch", &self.batch)
            .field("fail_open", &self.fail_open)
            .finish()
    }
}

impl InfluxTargetOptions {
    pub fn from_attributes(
        attributes: &std::collections::HashMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let object: serde_json::Map<String, serde_json::Value> = attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            DataError::invalid_configuration(format!("Invalid influx target attributes: {}", e))
        })
    }

    pub fn overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides {
            url: self.url.clone(),
            org: self.org.clone(),
            token: self.token.clone(),
            token_secret: self.token_secret.clone(),
        }
    }
}

/// Writes tables to one `bucket/measurement`, resolving credentials per write
#[derive(Clone)]
pub struct InfluxWriter {
    client: Arc<dyn InfluxClient>,
    ctx: StoreContext,
    bucket: String,
    measurement: String,
    env: String,
    overrides: ConnectionOverrides,
    roles: ColumnRoles,
    key_columns: Vec<String>,
    timestamp_key: Option<String>,
}

impl InfluxWriter {
    pub fn new(
        client: Arc<dyn InfluxClient>,
        ctx: StoreContext,
        bucket: impl Into<String>,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ctx,
            bucket: bucket.into(),
            measurement: measurement.into(),
            env: default_env(),
            overrides: ConnectionOverrides::default(),
            roles: ColumnRoles::default(),
            key_columns: Vec::new(),
            timestamp_key: None,
        }
    }

    pub fn with_env(mut self, env: impl AsRef<str>) -> Self {
        self.env = env.as_ref().to_uppercase();
        self
    }

    pub fn with_overrides(mut self, overrides: ConnectionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_roles(mut self, roles: ColumnRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_keys(mut self, key_columns: &[String], timestamp_key: Option<&str>) -> Self {
        self.key_columns = key_columns.to_vec();
        self.timestamp_key = timestamp_key.map(str::to_string);
        self
    }

    /// `influx://bucket/measurement`, without any credentials
    pub fn location(&self) -> String {
        format!("{}://{}/{}", SCHEME, self.bucket, self.measurement)
    }

    pub async fn write(&self, table: &Table) -> Result<usize> {
        let conn = resolve_connection(&self.env, &self.overrides, &self.ctx)?;
        let desc = self.roles.resolve(
            &self.bucket,
            &self.measurement,
            &table.columns(),
            self.timestamp_key.as_deref(),
            &self.key_columns,
        );
        debug!(
            time = %desc.time_column,
            tags = ?desc.tag_columns,
            fields = ?desc.field_columns,
            "Writing {} rows to {}",
            table.len(),
            self.location()
        );

        write_table(self.client.as_ref(), &conn, &desc, table).await
    }
}

/// Offline write target addressed by a `bucket/measurement` path
pub struct InfluxTarget {
    name: String,
    path: Option<String>,
    options: InfluxTargetOptions,
    client: Arc<dyn InfluxClient>,
    ctx: StoreContext,
}

impl InfluxTarget {
    pub fn from_spec(
        spec: TargetSpec,
        client: Arc<dyn InfluxClient>,
        ctx: StoreContext,
    ) -> Result<Self> {
        let options = InfluxTargetOptions::from_attributes(&spec.attributes)?;
        let name = if spec.name.is_empty() {
            SCHEME.to_string()
        } else {
            spec.name
        };

        Ok(Self {
            name,
            path: spec.path.filter(|p| !p.is_empty()),
            options,
            client,
            ctx,
        })
    }

    pub fn options(&self) -> &InfluxTargetOptions {
        &self.options
    }

    fn location(&self) -> Result<(String, String)> {
        let path = self.path.as_deref().ok_or_else(|| {
            DataError::invalid_configuration(format!(
                "Influx target {} requires a path in format 'bucket/measurement'",
                self.name
            ))
        })?;
        let desc = QueryDescriptor::parse(path)?;
        Ok((desc.bucket, desc.measurement))
    }

    fn writer(&self, key_columns: &[String], timestamp_key: Option<&str>) -> Result<InfluxWriter> {
        let (bucket, measurement) = self.location()?;
        Ok(
            InfluxWriter::new(self.client.clone(), self.ctx.clone(), bucket, measurement)
                .with_env(&self.options.env)
                .with_overrides(self.options.overrides())
                .with_roles(self.options.roles.clone())
                .with_keys(key_columns, timestamp_key),
        )
    }

    /// Step that writes every event as it arrives
    pub fn writer_step(
        &self,
        key_columns: &[String],
        timestamp_key: Option<&str>,
    ) -> Result<InfluxStreamStep> {
        let writer = self.writer(key_columns, timestamp_key)?;
        debug!("Adding influx writer step for {}", writer.location());
        Ok(InfluxStreamStep::new(writer, self.options.fail_open))
    }

    /// Step that buffers row events and writes them in batches
    pub fn batch_writer_step(
        &self,
        key_columns: &[String],
        timestamp_key: Option<&str>,
    ) -> Result<InfluxBatchStep> {
        let writer = self.writer(key_columns, timestamp_key)?;
        debug!("Adding influx batch writer step for {}", writer.location());
        Ok(InfluxBatchStep::new(
            writer,
            self.options.batch.clone(),
            self.options.fail_open,
        ))
    }
}

#[async_trait]
impl StoreTarget for InfluxTarget {
    fn kind(&self) -> &'static str {
        SCHEME
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn is_online(&self) -> bool {
        false
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::Read,
            Capability::Write,
            Capability::Streaming,
            Capability::TimeSeries,
        ]
    }

    async fn write_frame(
        &self,
        frame: Frame<'_>,
        key_columns: &[String],
        timestamp_key: Option<&str>,
    ) -> Result<usize> {
        let table = match frame {
            Frame::Local(table) => table,
            Frame::Distributed { engine } => {
                return Err(DataError::UnsupportedWriteTarget(format!(
                    "Influx target {} does not accept {} frames",
                    self.name, engine
                )))
            }
        };

        let writer = self.writer(key_columns, timestamp_key)?;
        let written = writer.write(table).await?;
        info!("Wrote {} of {} rows to {}", written, table.len(), writer.location());
        Ok(written)
    }

    async fn read_table(&self, options: ReadOptions) -> Result<Table> {
        let (bucket, measurement) = self.location()?;
        let mut desc = QueryDescriptor::new(bucket, measurement)
            .with_env(&self.options.env)
            .with_overrides(self.options.overrides());

        if let (Some(start), Some(end)) = (options.start_time, options.end_time) {
            let seconds = (end - start).num_seconds();
            if seconds <= 0 {
                return Err(DataError::invalid_configuration(format!(
                    "start_time {} must be before end_time {}",
                    start, end
                )));
            }
            desc = desc.with_range(format!("-{}s", seconds));
        }

        if let Some([column]) = options.columns.as_deref() {
            desc = desc.with_field(column.as_str());
        }

        let store = InfluxStore::with_client(self.client.clone(), self.ctx.clone());
        Ok(store.query_table(&desc).await?.to_table())
    }

    async fn purge(&self) -> Result<()> {
        warn!(
            "Influx purge not implemented for target {}; use retention policies or drop the measurement manually",
            self.name
        );
        Ok(())
    }
}

/// Builds [`InfluxTarget`]s sharing one client and host context
pub struct InfluxTargetFactory {
    client: Arc<dyn InfluxClient>,
    ctx: StoreContext,
}

impl InfluxTargetFactory {
    pub fn new(client: Arc<dyn InfluxClient>, ctx: StoreContext) -> Self {
        Self { client, ctx }
    }
}

impl TargetFactory for InfluxTargetFactory {
    fn kind(&self) -> &'static str {
        SCHEME
    }

    fn create_target(&self, spec: TargetSpec) -> Result<Arc<dyn StoreTarget>> {
        Ok(Arc::new(InfluxTarget::from_spec(
            spec,
            self.client.clone(),
            self.ctx.clone(),
        )?))
    }
}
