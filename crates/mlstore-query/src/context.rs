//! Host collaborators a store may consult while resolving a request:
//! run-context parameters, named secrets and process environment variables.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named secret lookup (project secrets, vault, ...)
pub trait SecretStore: Send + Sync {
    fn get_secret(&self, name: &str) -> Option<String>;
}

/// Parameters resolved by the host's run context
pub trait ParamSource: Send + Sync {
    fn get_param(&self, name: &str) -> Option<String>;
}

/// Environment variable lookup
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the current process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed map, usable for secrets, params or environment
#[derive(Default, Clone)]
pub struct StaticValues {
    values: HashMap<String, String>,
}

impl StaticValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl fmt::Debug for StaticValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keys only, values may be secrets
        f.debug_struct("StaticValues")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretStore for StaticValues {
    fn get_secret(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl ParamSource for StaticValues {
    fn get_param(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl EnvSource for StaticValues {
    fn var(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Bundle of host collaborators handed to stores and targets
#[derive(Clone)]
pub struct StoreContext {
    pub params: Arc<dyn ParamSource>,
    pub secrets: Arc<dyn SecretStore>,
    pub env: Arc<dyn EnvSource>,
}

impl StoreContext {
    /// No params, no secrets, process environment only
    pub fn from_process_env() -> Self {
        Self {
            params: Arc::new(StaticValues::new()),
            secrets: Arc::new(StaticValues::new()),
            env: Arc::new(ProcessEnv),
        }
    }

    pub fn with_params(mut self, params: Arc<dyn ParamSource>) -> Self {
        self.params = params;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::from_process_env()
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext").finish_non_exhaustive()
    }
}
