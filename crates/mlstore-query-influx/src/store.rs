use crate::client::{HttpInfluxClient, InfluxClient};
use crate::credentials::resolve_connection;
use crate::flux::build_flux_query;
use crate::materialize::{materialize, ResultTable};
use crate::uri::{redacted_uri, QueryDescriptor, SCHEME};
use async_trait::async_trait;
use mlstore_query::{
    Capability, DataError, DataItem, DataStore, DataStoreFactory, ItemMeta, Result, StoreConfig,
    StoreContext, Table,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// What a fetched item records about its query. Never carries the token.
#[derive(Debug, Clone, Serialize)]
pub struct InfluxItemMeta {
    pub bucket: String,
    pub measurement: String,
    pub field: Option<String>,
    pub tags: Vec<String>,
    pub env: String,
    pub range: String,
    pub url: String,
    pub org: String,
    pub query: String,
    pub rows: usize,
}

/// Read-only datastore for `influx://bucket/measurement?...` URIs
pub struct InfluxStore {
    client: Arc<dyn InfluxClient>,
    ctx: StoreContext,
}

impl InfluxStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self::with_client(Arc::new(HttpInfluxClient::new()), ctx)
    }

    pub fn with_client(client: Arc<dyn InfluxClient>, ctx: StoreContext) -> Self {
        Self { client, ctx }
    }

    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    /// Run the query a descriptor describes and flatten its result
    pub async fn query_table(&self, desc: &QueryDescriptor) -> Result<ResultTable> {
        self.run(desc).await.map(|(result, _)| result)
    }

    async fn run(&self, desc: &QueryDescriptor) -> Result<(ResultTable, InfluxItemMeta)> {
        let conn = resolve_connection(&desc.environment, &desc.overrides, &self.ctx)?;
        let flux = build_flux_query(desc);
        debug!(
            bucket = %desc.bucket,
            measurement = %desc.measurement,
            env = %desc.environment,
            "Running Flux query ({} bytes)",
            flux.len()
        );

        let tables = self.client.query(&conn, &flux).await?;
        let result = materialize(tables);
        debug!("Materialized {} rows", result.len());

        let meta = InfluxItemMeta {
            bucket: desc.bucket.clone(),
            measurement: desc.measurement.clone(),
            field: desc.field_filter.clone(),
            tags: desc
                .tag_filters
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect(),
            env: desc.environment.clone(),
            range: desc.time_range.clone(),
            url: conn.url.clone(),
            org: conn.org.clone(),
            query: flux,
            rows: result.len(),
        };

        Ok((result, meta))
    }
}

#[async_trait]
impl DataStore for InfluxStore {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::Read, Capability::TimeSeries]
    }

    async fn get(&self, key: &str) -> Result<DataItem> {
        let desc = QueryDescriptor::parse(key)?;
        let (result, meta) = self.run(&desc).await?;

        let mut item_meta = ItemMeta::new(SCHEME);
        if let serde_json::Value::Object(attributes) = serde_json::to_value(&meta)? {
            item_meta.attributes = attributes.into_iter().collect();
        }

        Ok(DataItem::new(
            key,
            item_url(key),
            result.to_table(),
            item_meta,
        ))
    }

    async fn put(&self, key: &str, _table: &Table, _append: bool) -> Result<()> {
        Err(DataError::not_implemented(format!(
            "{} is read-only ({}); write through an influx target",
            SCHEME,
            redacted_uri(key)
        )))
    }
}

/// `influx://` URL for a key given with or without the scheme, token masked
fn item_url(key: &str) -> String {
    let key = key
        .strip_prefix(SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
        .unwrap_or(key);
    redacted_uri(&format!("{}://{}", SCHEME, key))
}

/// Builds [`InfluxStore`]s sharing one client and host context
pub struct InfluxStoreFactory {
    client: Arc<dyn InfluxClient>,
    ctx: StoreContext,
}

impl InfluxStoreFactory {
    pub fn new(client: Arc<dyn InfluxClient>, ctx: StoreContext) -> Self {
        Self { client, ctx }
    }
}

impl DataStoreFactory for InfluxStoreFactory {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn create_store(&self, config: StoreConfig) -> Result<Arc<dyn DataStore>> {
        debug!("Creating Influx store {}", config.name);
        Ok(Arc::new(InfluxStore::with_client(
            self.client.clone(),
            self.ctx.clone(),
        )))
    }
}
