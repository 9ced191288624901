//! Backend client seam and its HTTP implementation against the InfluxDB v2 API.

use crate::annotated_csv::parse_annotated_csv;
use crate::credentials::InfluxConnection;
use crate::line_protocol::{encode_points, Point};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mlstore_query::{DataError, DataRow, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// One row of a Flux result, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    pub values: DataRow,
}

impl FluxRecord {
    pub fn new(values: DataRow) -> Self {
        Self { values }
    }

    /// `_time`, when present and RFC 3339
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.values
            .get("_time")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn field(&self) -> Option<&str> {
        self.values.get("_field").and_then(|v| v.as_str())
    }

    pub fn value(&self) -> &serde_json::Value {
        static NULL: serde_json::Value = serde_json::Value::Null;
        self.values.get("_value").unwrap_or(&NULL)
    }

    pub fn measurement(&self) -> Option<&str> {
        self.values.get("_measurement").and_then(|v| v.as_str())
    }
}

/// A logical Flux table: records sharing one group key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxTable {
    pub records: Vec<FluxRecord>,
}

/// What the plugin needs from an InfluxDB client
#[async_trait]
pub trait InfluxClient: Send + Sync {
    /// Run a Flux query and return its tables
    async fn query(&self, conn: &InfluxConnection, flux: &str) -> Result<Vec<FluxTable>>;

    /// Write points to a bucket
    async fn write(&self, conn: &InfluxConnection, bucket: &str, points: &[Point]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    query_type: &'static str,
    dialect: Dialect,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    delimiter: &'static str,
    annotations: [&'static str; 3],
    comment_prefix: &'static str,
    date_time_format: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ",",
            annotations: ["datatype", "group", "default"],
            comment_prefix: "#",
            date_time_format: "RFC3339",
        }
    }
}

/// Error body returned by the v2 API
#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    message: String,
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api) => match api.code {
            Some(code) => format!("HTTP {} ({}): {}", status, code, api.message),
            None => format!("HTTP {}: {}", status, api.message),
        },
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    }
}

/// InfluxDB v2 HTTP client
#[derive(Debug, Clone, Default)]
pub struct HttpInfluxClient {
    http: Client,
}

impl HttpInfluxClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Reuse a preconfigured reqwest client (proxies, TLS roots, timeouts)
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn endpoint(conn: &InfluxConnection, path: &str) -> String {
        format!("{}{}", conn.url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl InfluxClient for HttpInfluxClient {
    async fn query(&self, conn: &InfluxConnection, flux: &str) -> Result<Vec<FluxTable>> {
        let url = Self::endpoint(conn, "/api/v2/query");
        debug!("Querying {} ({} bytes of Flux)", url, flux.len());

        let response = self
            .http
            .post(&url)
            .query(&[("org", conn.org.as_str())])
            .header(AUTHORIZATION, format!("Token {}", conn.token()))
            .header(ACCEPT, "application/csv")
            .json(&QueryRequest {
                query: flux,
                query_type: "flux",
                dialect: Dialect::default(),
            })
            .send()
            .await
            .map_err(|e| {
                error!("Influx query request to {} failed: {}", url, e);
                DataError::query_failed(format!("Request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            DataError::query_failed(format!("Failed to read query response: {}", e))
        })?;

        if !status.is_success() {
            error!("Influx query rejected with status {}", status);
            return Err(DataError::query_failed(describe_failure(status, &body)));
        }

        let tables = parse_annotated_csv(&body)?;
        debug!("Query returned {} tables", tables.len());
        Ok(tables)
    }

    async fn write(&self, conn: &InfluxConnection, bucket: &str, points: &[Point]) -> Result<()> {
        let url = Self::endpoint(conn, "/api/v2/write");
        let body = encode_points(points);
        debug!("Writing {} points to {} (bucket {})", points.len(), url, bucket);

        let response = self
            .http
            .post(&url)
            .query(&[
                ("org", conn.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", conn.token()))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Influx write request to {} failed: {}", url, e);
                DataError::write_failed(format!("Request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Influx write rejected with status {}", status);
            return Err(DataError::write_failed(describe_failure(status, &body)));
        }

        Ok(())
    }
}
