//! InfluxDB implementation of the mlstore-query datastore and target traits
//!
//! Datasets are addressed with URIs like:
//!
//! ```text
//! influx://bucket/measurement?field=temp&tag=sensor:bridge01&env=staging&range=-24h
//! ```
//!
//! Connection settings come from inline `url`/`org`/`token`/`token_secret`
//! parameters, the host's run-context params and secrets, and finally the
//! environment (`INFLUX_<ENV>_URL`, `INFLUX_<ENV>_ORG`, `INFLUX_<ENV>_TOKEN`).
//!
//! Reads go through [`InfluxStore`] and come back as a table with the columns
//! `time, field, value, measurement, tags`. Writes go through [`InfluxTarget`],
//! either a whole frame at a time or from a stream graph via
//! [`InfluxStreamStep`] / [`InfluxBatchStep`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mlstore_query::{StoreContext, StoreRegistry};
//!
//! # async fn example() -> mlstore_query::Result<()> {
//! let registry = StoreRegistry::new();
//! mlstore_query_influx::register(&registry, StoreContext::from_process_env()).await?;
//!
//! let item = registry
//!     .get_dataitem("influx://sensors/temperature?field=temp&range=-24h")
//!     .await?;
//! println!("{} rows", item.body.len());
//! # Ok(())
//! # }
//! ```

pub mod annotated_csv;
pub mod batch;
pub mod client;
pub mod credentials;
pub mod flux;
pub mod line_protocol;
pub mod materialize;
pub mod store;
pub mod stream;
pub mod target;
pub mod uri;
pub mod write;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchBuffer, BatchSettings};
pub use client::{FluxRecord, FluxTable, HttpInfluxClient, InfluxClient};
pub use credentials::{resolve_connection, InfluxConnection};
pub use flux::build_flux_query;
pub use line_protocol::{FieldValue, Point};
pub use materialize::{materialize, result_schema, ResultRow, ResultTable};
pub use store::{InfluxItemMeta, InfluxStore, InfluxStoreFactory};
pub use stream::{InfluxBatchStep, InfluxStreamStep};
pub use target::{InfluxTarget, InfluxTargetFactory, InfluxTargetOptions, InfluxWriter};
pub use uri::{redacted_uri, ConnectionOverrides, QueryDescriptor, SCHEME};
pub use write::{ColumnRoles, WriteDescriptor};

use mlstore_query::{Result, StoreContext, StoreRegistry};
use std::sync::Arc;
use tracing::info;

/// Register the `influx` store and target factories, talking HTTP
pub async fn register(registry: &StoreRegistry, ctx: StoreContext) -> Result<()> {
    register_with_client(registry, ctx, Arc::new(HttpInfluxClient::new())).await
}

/// Register the `influx` store and target factories over a given client
pub async fn register_with_client(
    registry: &StoreRegistry,
    ctx: StoreContext,
    client: Arc<dyn InfluxClient>,
) -> Result<()> {
    registry
        .register_store_factory(Arc::new(InfluxStoreFactory::new(client.clone(), ctx.clone())))
        .await?;
    registry
        .register_target_factory(Arc::new(InfluxTargetFactory::new(client, ctx)))
        .await?;

    info!("Registered influx datastore and target");
    Ok(())
}
