use crate::error::{DataError, Result};
use crate::traits::{DataStore, StoreTarget};
use crate::types::{DataItem, TargetSpec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Configuration handed to a store factory
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// URI scheme (influx, s3, ...)
    pub scheme: String,
    /// Store name
    pub name: String,
    /// Optional endpoint override
    pub endpoint: Option<String>,
    /// Additional options as key-value pairs
    pub options: HashMap<String, String>,
}

impl StoreConfig {
    pub fn new(scheme: impl Into<String>) -> Self {
        let scheme = scheme.into();
        Self {
            name: scheme.clone(),
            scheme,
            endpoint: None,
            options: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Factory trait for creating stores from configurations
pub trait DataStoreFactory: Send + Sync {
    /// Get the URI scheme this factory handles
    fn scheme(&self) -> &'static str;

    /// Create a store from configuration
    fn create_store(&self, config: StoreConfig) -> Result<Arc<dyn DataStore>>;
}

/// Factory trait for creating targets from host-supplied specs
pub trait TargetFactory: Send + Sync {
    /// Get the target kind this factory handles
    fn kind(&self) -> &'static str;

    fn create_target(&self, spec: TargetSpec) -> Result<Arc<dyn StoreTarget>>;
}

/// Split `scheme://rest` into its two halves
pub fn split_uri(uri: &str) -> Result<(&str, &str)> {
    uri.split_once("://")
        .filter(|(scheme, _)| !scheme.is_empty())
        .ok_or_else(|| {
            let path = uri.split_once('?').map_or(uri, |(path, _)| path);
            DataError::malformed_uri(format!("{} has no scheme", path))
        })
}

/// Registry of store and target factories. Plugins are added by an explicit
/// `register_*` call from the host at startup.
pub struct StoreRegistry {
    store_factories: Arc<RwLock<HashMap<String, Arc<dyn DataStoreFactory>>>>,
    target_factories: Arc<RwLock<HashMap<String, Arc<dyn TargetFactory>>>>,
    stores: Arc<RwLock<HashMap<String, Arc<dyn DataStore>>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            store_factories: Arc::new(RwLock::new(HashMap::new())),
            target_factories: Arc::new(RwLock::new(HashMap::new())),
            stores: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a factory for a URI scheme
    pub async fn register_store_factory(&self, factory: Arc<dyn DataStoreFactory>) -> Result<()> {
        let scheme = factory.scheme();
        let mut factories = self.store_factories.write().await;

        if factories.contains_key(scheme) {
            warn!("Overwriting existing store factory for scheme: {}", scheme);
        }

        factories.insert(scheme.to_string(), factory);
        // a stale cached store would shadow the new factory
        self.stores.write().await.remove(scheme);
        debug!("Registered store factory for scheme: {}", scheme);
        Ok(())
    }

    /// Register a factory for a target kind
    pub async fn register_target_factory(&self, factory: Arc<dyn TargetFactory>) -> Result<()> {
        let kind = factory.kind();
        let mut factories = self.target_factories.write().await;

        if factories.contains_key(kind) {
            warn!("Overwriting existing target factory for kind: {}", kind);
        }

        factories.insert(kind.to_string(), factory);
        debug!("Registered target factory for kind: {}", kind);
        Ok(())
    }

    /// Create a store from an explicit configuration and cache it by scheme
    pub async fn create_store(&self, config: StoreConfig) -> Result<Arc<dyn DataStore>> {
        let factories = self.store_factories.read().await;

        let factory = factories
            .get(&config.scheme)
            .ok_or_else(|| DataError::UnknownScheme(config.scheme.clone()))?
            .clone();

        drop(factories);

        debug!("Creating store {} for scheme: {}", config.name, config.scheme);

        let scheme = config.scheme.clone();
        let store = factory.create_store(config)?;

        let mut stores = self.stores.write().await;
        stores.insert(scheme, store.clone());

        Ok(store)
    }

    /// Get the cached store for a scheme, creating it with defaults if needed
    pub async fn get_store(&self, scheme: &str) -> Result<Arc<dyn DataStore>> {
        if let Some(store) = self.stores.read().await.get(scheme) {
            return Ok(store.clone());
        }

        self.create_store(StoreConfig::new(scheme)).await
    }

    /// Resolve `scheme://key` to a store and fetch the item
    pub async fn get_dataitem(&self, uri: &str) -> Result<DataItem> {
        let (scheme, key) = split_uri(uri)?;
        let store = self.get_store(scheme).await?;
        store.get(key).await
    }

    /// Create a target from a host-supplied spec
    pub async fn create_target(&self, spec: TargetSpec) -> Result<Arc<dyn StoreTarget>> {
        let factories = self.target_factories.read().await;

        let factory = factories
            .get(&spec.kind)
            .ok_or_else(|| DataError::UnknownScheme(spec.kind.clone()))?
            .clone();

        drop(factories);

        debug!("Creating target {} of kind: {}", spec.name, spec.kind);
        factory.create_target(spec)
    }

    /// List registered store schemes
    pub async fn list_schemes(&self) -> Result<Vec<String>> {
        let factories = self.store_factories.read().await;
        Ok(factories.keys().cloned().collect())
    }

    /// List registered target kinds
    pub async fn list_target_kinds(&self) -> Result<Vec<String>> {
        let factories = self.target_factories.read().await;
        Ok(factories.keys().cloned().collect())
    }

    /// Check if a scheme is registered
    pub async fn has_scheme(&self, scheme: &str) -> Result<bool> {
        let factories = self.store_factories.read().await;
        Ok(factories.contains_key(scheme))
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ItemMeta, Table};
    use async_trait::async_trait;

    struct EchoStore;

    #[async_trait]
    impl DataStore for EchoStore {
        fn scheme(&self) -> &'static str {
            "echo"
        }

        fn capabilities(&self) -> Vec<Capability> {
            vec![Capability::Read]
        }

        async fn get(&self, key: &str) -> Result<DataItem> {
            Ok(DataItem::new(
                key,
                format!("echo://{}", key),
                Table::default(),
                ItemMeta::new("echo"),
            ))
        }

        async fn put(&self, _key: &str, _table: &Table, _append: bool) -> Result<()> {
            Err(DataError::not_implemented("echo is read-only"))
        }
    }

    struct EchoFactory;

    impl DataStoreFactory for EchoFactory {
        fn scheme(&self) -> &'static str {
            "echo"
        }

        fn create_store(&self, _config: StoreConfig) -> Result<Arc<dyn DataStore>> {
            Ok(Arc::new(EchoStore))
        }
    }

    #[test]
    fn test_store_config_creation() {
        let config = StoreConfig::new("influx")
            .with_endpoint("http://localhost:8086")
            .with_option("env", "DEV");

        assert_eq!(config.scheme, "influx");
        assert_eq!(config.name, "influx");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8086"));
        assert_eq!(config.options.get("env").map(String::as_str), Some("DEV"));
    }

    #[test]
    fn test_split_uri() {
        let (scheme, key) = split_uri("influx://bucket/m?env=dev").unwrap();
        assert_eq!(scheme, "influx");
        assert_eq!(key, "bucket/m?env=dev");

        assert!(matches!(
            split_uri("bucket/m"),
            Err(DataError::MalformedUri(_))
        ));

        let err = split_uri("bucket/m?token=hunter2").unwrap_err();
        assert!(err.to_string().contains("bucket/m"));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = StoreRegistry::new();
        assert!(registry.list_schemes().await.unwrap().is_empty());
        assert!(registry.list_target_kinds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_dataitem_dispatches_by_scheme() {
        let registry = StoreRegistry::new();
        registry
            .register_store_factory(Arc::new(EchoFactory))
            .await
            .unwrap();

        assert!(registry.has_scheme("echo").await.unwrap());

        let item = registry.get_dataitem("echo://a/b").await.unwrap();
        assert_eq!(item.key, "a/b");
        assert_eq!(item.artifact_url, "echo://a/b");

        let store = registry.get_store("echo").await.unwrap();
        assert!(store.downcast_ref::<EchoStore>().is_some());
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let registry = StoreRegistry::new();
        let err = registry.get_dataitem("nope://a/b").await.unwrap_err();
        assert!(matches!(err, DataError::UnknownScheme(s) if s == "nope"));
    }
}
