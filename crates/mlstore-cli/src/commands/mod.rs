pub mod read;
pub mod write;

pub use read::ReadCommand;
pub use write::WriteCommand;

use mlstore_query::{StoreContext, StoreRegistry};

/// Registry with the influx plugin, configured from the process environment
async fn influx_registry() -> anyhow::Result<StoreRegistry> {
    let registry = StoreRegistry::new();
    mlstore_query_influx::register(&registry, StoreContext::from_process_env()).await?;
    Ok(registry)
}
