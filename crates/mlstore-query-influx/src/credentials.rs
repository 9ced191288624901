//! Connection settings resolution.
//!
//! Per field, highest precedence first:
//!
//! | field | sources |
//! |-------|---------|
//! | url   | inline `url=` > run-context param `INFLUX_<ENV>_URL` > env var `INFLUX_<ENV>_URL` |
//! | org   | inline `org=` > run-context param `INFLUX_<ENV>_ORG` > env var `INFLUX_<ENV>_ORG` |
//! | token | inline `token=` > secret named by `token_secret=` (default `INFLUX_<ENV>_TOKEN`) > env var `INFLUX_<ENV>_TOKEN` |
//!
//! Empty values count as unset.

use crate::uri::ConnectionOverrides;
use mlstore_query::{DataError, Result, StoreContext};
use std::fmt;
use tracing::debug;

/// Resolved connection to one InfluxDB instance, valid for a single request
#[derive(Clone, PartialEq, Eq)]
pub struct InfluxConnection {
    pub url: String,
    pub org: String,
    token: String,
}

impl InfluxConnection {
    pub fn new(url: impl Into<String>, org: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for InfluxConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConnection")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// `INFLUX_<ENV>_<SUFFIX>`
pub fn env_var_name(env: &str, suffix: &str) -> String {
    format!("INFLUX_{}_{}", env.to_uppercase(), suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Inline,
    Secret,
    Environment,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn resolve_setting(
    inline: &Option<String>,
    name: &str,
    ctx: &StoreContext,
) -> Option<String> {
    non_empty(inline.clone())
        .or_else(|| non_empty(ctx.params.get_param(name)))
        .or_else(|| non_empty(ctx.env.var(name)))
}

fn resolve_token(
    env: &str,
    overrides: &ConnectionOverrides,
    ctx: &StoreContext,
) -> Option<(String, TokenSource)> {
    let default_name = env_var_name(env, "TOKEN");

    if let Some(token) = non_empty(overrides.token.clone()) {
        return Some((token, TokenSource::Inline));
    }

    let secret_name = overrides
        .token_secret
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(&default_name);

    if let Some(token) = non_empty(ctx.secrets.get_secret(secret_name)) {
        return Some((token, TokenSource::Secret));
    }

    non_empty(ctx.env.var(&default_name)).map(|token| (token, TokenSource::Environment))
}

/// Resolve url, org and token for `env`, failing with `MissingCredentials`
/// naming every field that stayed unset.
pub fn resolve_connection(
    env: &str,
    overrides: &ConnectionOverrides,
    ctx: &StoreContext,
) -> Result<InfluxConnection> {
    let env = env.to_uppercase();

    let url = resolve_setting(&overrides.url, &env_var_name(&env, "URL"), ctx);
    let org = resolve_setting(&overrides.org, &env_var_name(&env, "ORG"), ctx);
    let token = resolve_token(&env, overrides, ctx);

    match (url, org, token) {
        (Some(url), Some(org), Some((token, source))) => {
            debug!(
                env = %env,
                url = %url,
                org = %org,
                token_source = ?source,
                "Resolved Influx connection"
            );
            Ok(InfluxConnection::new(url, org, token))
        }
        (url, org, token) => {
            let missing = [
                ("url", url.is_none()),
                ("org", org.is_none()),
                ("token", token.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, unset)| unset.then_some(field))
            .collect();

            Err(DataError::MissingCredentials { env, missing })
        }
    }
}
