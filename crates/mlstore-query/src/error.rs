use thiserror::Error;

/// Unified error type for all datastore and target operations
#[derive(Error, Debug)]
pub enum DataError {
    /// The store key or URI does not have the expected `bucket/measurement` shape
    #[error("Malformed URI: {0}")]
    MalformedUri(String),

    /// Connection settings could not be resolved for an environment
    #[error(
        "Missing Influx config for env={env}: {} unset (expected {})",
        .missing.join(", "),
        expected_names(.env, .missing)
    )]
    MissingCredentials {
        env: String,
        missing: Vec<&'static str>,
    },

    /// The target cannot accept this kind of input (e.g. a distributed frame)
    #[error("Unsupported write target: {0}")]
    UnsupportedWriteTarget(String),

    /// The backend rejected or failed a write
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The backend rejected or failed a query
    #[error("Backend query failed: {0}")]
    BackendQueryFailed(String),

    /// Operation deliberately absent from this store variant
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// No factory registered for a URI scheme or target kind
    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn expected_names(env: &str, missing: &[&'static str]) -> String {
    missing
        .iter()
        .map(|field| format!("INFLUX_{}_{}", env, field.to_uppercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl DataError {
    pub fn malformed_uri(msg: impl Into<String>) -> Self {
        DataError::MalformedUri(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        DataError::NotImplemented(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        DataError::WriteFailed(msg.into())
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        DataError::BackendQueryFailed(msg.into())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_names_env_and_fields() {
        let err = DataError::MissingCredentials {
            env: "STAGING".to_string(),
            missing: vec!["url", "token"],
        };
        let msg = err.to_string();
        assert!(msg.contains("env=STAGING"));
        assert!(msg.contains("url, token unset"));
        assert!(msg.contains("INFLUX_STAGING_URL"));
        assert!(msg.contains("INFLUX_STAGING_TOKEN"));
        assert!(!msg.contains("INFLUX_STAGING_ORG"));
    }
}
