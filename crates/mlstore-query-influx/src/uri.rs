//! `influx://bucket/measurement?...` addressing.
//!
//! ```text
//! influx://<bucket>/<measurement>?field=<f>&tag=<k>:<v>[&tag=...]&env=<ENV>&range=<window>
//!           [&url=<override>&org=<override>&token=<override>|&token_secret=<name>]
//! ```
//!
//! Query parameters follow `application/x-www-form-urlencoded` rules. The
//! first occurrence of every parameter wins except `tag`, which may repeat.
//! Blank values are treated as absent.

use mlstore_query::{DataError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use url::form_urlencoded;

pub const SCHEME: &str = "influx";
pub const DEFAULT_ENV: &str = "DEV";
pub const DEFAULT_RANGE: &str = "-1h";
const REDACTED: &str = "redacted";

/// Connection settings carried inline in a URI
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub url: Option<String>,
    pub org: Option<String>,
    pub token: Option<String>,
    pub token_secret: Option<String>,
}

impl ConnectionOverrides {
    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.org.is_none() && self.token.is_none() && self.token_secret.is_none()
    }
}

impl fmt::Debug for ConnectionOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOverrides")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_secret", &self.token_secret)
            .finish()
    }
}

/// Structured form of an `influx://` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub bucket: String,
    pub measurement: String,
    pub field_filter: Option<String>,
    /// `(key, value)` pairs in the order they appeared
    pub tag_filters: Vec<(String, String)>,
    /// Upper-cased environment tag
    pub environment: String,
    /// Flux relative duration, passed through unvalidated
    pub time_range: String,
    pub overrides: ConnectionOverrides,
}

impl QueryDescriptor {
    pub fn new(bucket: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            measurement: measurement.into(),
            field_filter: None,
            tag_filters: Vec::new(),
            environment: DEFAULT_ENV.to_string(),
            time_range: DEFAULT_RANGE.to_string(),
            overrides: ConnectionOverrides::default(),
        }
    }

    /// Parse `bucket/measurement?params`, with or without the `influx://` prefix
    pub fn parse(key: &str) -> Result<Self> {
        let key = key
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .unwrap_or(key);

        let (path, query) = match key.split_once('?') {
            Some((path, query)) => (path, query),
            None => (key, ""),
        };

        let (bucket, measurement) = path
            .split_once('/')
            .filter(|(bucket, measurement)| !bucket.is_empty() && !measurement.is_empty())
            .ok_or_else(|| {
                DataError::malformed_uri(format!(
                    "Invalid key: {}. Expected format bucket/measurement",
                    path
                ))
            })?;

        let mut descriptor = Self::new(bucket, measurement);
        let mut env = None;
        let mut range = None;

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match name.as_ref() {
                "field" => set_once(&mut descriptor.field_filter, &value),
                "env" => set_once(&mut env, &value),
                "range" => set_once(&mut range, &value),
                "url" => set_once(&mut descriptor.overrides.url, &value),
                "org" => set_once(&mut descriptor.overrides.org, &value),
                "token" => set_once(&mut descriptor.overrides.token, &value),
                "token_secret" => set_once(&mut descriptor.overrides.token_secret, &value),
                "tag" => match value.split_once(':') {
                    Some((tag_key, tag_value)) if !tag_key.is_empty() => descriptor
                        .tag_filters
                        .push((tag_key.to_string(), tag_value.to_string())),
                    _ => debug!("Dropping tag filter without key:value shape: {}", value),
                },
                other => debug!("Ignoring unknown influx URI parameter: {}", other),
            }
        }

        if let Some(env) = env {
            descriptor.environment = env.to_uppercase();
        }
        if let Some(range) = range {
            descriptor.time_range = range;
        }

        Ok(descriptor)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field_filter = Some(field.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_filters.push((key.into(), value.into()));
        self
    }

    pub fn with_env(mut self, env: impl AsRef<str>) -> Self {
        self.environment = env.as_ref().to_uppercase();
        self
    }

    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.time_range = range.into();
        self
    }

    pub fn with_overrides(mut self, overrides: ConnectionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Canonical `bucket/measurement?...` form; parsing it yields `self` again
    pub fn to_key(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());

        if let Some(field) = &self.field_filter {
            query.append_pair("field", field);
        }
        for (key, value) in &self.tag_filters {
            query.append_pair("tag", &format!("{}:{}", key, value));
        }
        query.append_pair("env", &self.environment);
        query.append_pair("range", &self.time_range);

        let overrides = [
            ("url", &self.overrides.url),
            ("org", &self.overrides.org),
            ("token", &self.overrides.token),
            ("token_secret", &self.overrides.token_secret),
        ];
        for (name, value) in overrides {
            if let Some(value) = value {
                query.append_pair(name, value);
            }
        }

        format!("{}/{}?{}", self.bucket, self.measurement, query.finish())
    }

    pub fn to_uri(&self) -> String {
        format!("{}://{}", SCHEME, self.to_key())
    }
}

/// The URI with any inline `token` value masked, for logs and item URLs
pub fn redacted_uri(uri: &str) -> String {
    let Some((base, query)) = uri.split_once('?') else {
        return uri.to_string();
    };

    let pairs: Vec<_> = form_urlencoded::parse(query.as_bytes()).collect();
    if !pairs.iter().any(|(name, _)| name == "token") {
        return uri.to_string();
    }

    let mut redacted = form_urlencoded::Serializer::new(String::new());
    for (name, value) in &pairs {
        let value = if name == "token" { REDACTED } else { &**value };
        redacted.append_pair(name, value);
    }
    format!("{}?{}", base, redacted.finish())
}

impl FromStr for QueryDescriptor {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}
