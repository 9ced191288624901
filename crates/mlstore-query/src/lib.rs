//! # mlstore-query
//!
//! Host-side abstractions for URI-addressed datastores and write targets.
//!
//! A host application (a pipeline runner, a feature-store ingestion job, ...)
//! talks to heterogeneous backends through a small set of traits:
//!
//! - **DataStore**: fetch a dataset by `scheme://key` and get back a [`DataItem`]
//! - **StoreTarget**: write frames to a named destination and read them back
//! - **StreamStep**: receive one event at a time inside a stream graph
//!
//! Backends are plugged in by calling `register_*` on a [`StoreRegistry`] at
//! startup; nothing is registered implicitly.
//!
//! ## Example
//!
//! ```rust
//! use mlstore_query::{StoreConfig, StoreRegistry};
//!
//! # async fn example() -> mlstore_query::Result<()> {
//! let registry = StoreRegistry::new();
//!
//! // Backend crates expose a `register` function:
//! // mlstore_query_influx::register(&registry, StoreContext::default()).await?;
//!
//! let config = StoreConfig::new("influx").with_option("env", "DEV");
//! // let store = registry.create_store(config).await?;
//! // let item = registry.get_dataitem("influx://bucket/cpu?range=-1h").await?;
//! # let _ = config;
//! # Ok(())
//! # }
//! ```
//!
//! Host collaborators (run-context parameters, secrets, environment) are
//! passed in through [`StoreContext`].

pub mod context;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use context::{EnvSource, ParamSource, ProcessEnv, SecretStore, StaticValues, StoreContext};
pub use error::{DataError, Result};
pub use registry::{split_uri, DataStoreFactory, StoreConfig, StoreRegistry, TargetFactory};
pub use traits::{DataStore, StoreTarget, StreamStep};
pub use types::{
    Capability, DataItem, DataRow, DatasetSchema, Event, EventBody, FieldDef, FieldType, Frame,
    ItemMeta, ReadOptions, Table, TargetSpec,
};
