//! Translating tables into points and writing them.

use crate::client::InfluxClient;
use crate::credentials::InfluxConnection;
use crate::line_protocol::{FieldValue, Point};
use chrono::DateTime;
use mlstore_query::{DataError, DataRow, Result, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Column used for point timestamps when nothing else is configured
pub const DEFAULT_TIME_COLUMN: &str = "time";

/// Fully resolved description of one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteDescriptor {
    pub bucket: String,
    pub measurement: String,
    pub time_column: String,
    pub tag_columns: Vec<String>,
    /// `None` when no column is left to carry a field
    pub field_columns: Option<Vec<String>>,
}

/// Explicitly configured column roles; unset roles are inferred
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRoles {
    pub time_col: Option<String>,
    pub tag_cols: Option<Vec<String>>,
    pub field_cols: Option<Vec<String>>,
}

impl ColumnRoles {
    /// Resolve every role against the columns actually present
    pub fn resolve(
        &self,
        bucket: &str,
        measurement: &str,
        columns: &[String],
        timestamp_key: Option<&str>,
        key_columns: &[String],
    ) -> WriteDescriptor {
        let time_column = resolve_time_column(self.time_col.as_deref(), timestamp_key);
        let tag_columns = resolve_tag_columns(self.tag_cols.as_deref(), key_columns);
        let field_columns =
            resolve_field_columns(self.field_cols.as_deref(), columns, &time_column, &tag_columns);

        WriteDescriptor {
            bucket: bucket.to_string(),
            measurement: measurement.to_string(),
            time_column,
            tag_columns,
            field_columns,
        }
    }
}

fn non_empty_str(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_slice(value: Option<&[String]>) -> Option<&[String]> {
    value.filter(|v| !v.is_empty())
}

/// explicit > timestamp key > `"time"`
pub fn resolve_time_column(explicit: Option<&str>, timestamp_key: Option<&str>) -> String {
    non_empty_str(explicit)
        .or(non_empty_str(timestamp_key))
        .unwrap_or(DEFAULT_TIME_COLUMN)
        .to_string()
}

/// explicit > key columns > none
pub fn resolve_tag_columns(explicit: Option<&[String]>, key_columns: &[String]) -> Vec<String> {
    non_empty_slice(explicit)
        .unwrap_or(key_columns)
        .to_vec()
}

/// explicit > every column that is neither the time column nor a tag
pub fn resolve_field_columns(
    explicit: Option<&[String]>,
    columns: &[String],
    time_column: &str,
    tag_columns: &[String],
) -> Option<Vec<String>> {
    if let Some(explicit) = non_empty_slice(explicit) {
        return Some(explicit.to_vec());
    }

    let inferred: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != time_column && !tag_columns.contains(c))
        .cloned()
        .collect();

    if inferred.is_empty() {
        None
    } else {
        Some(inferred)
    }
}

/// Pick exactly one field type per value: bool, int and float pass through,
/// anything else becomes a float when it parses as one and a string otherwise.
/// Nulls and non-finite floats yield no field.
pub fn coerce_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Some(FieldValue::Int(i)),
            (None, Some(u)) => Some(FieldValue::UInt(u)),
            _ => n.as_f64().filter(|f| f.is_finite()).map(FieldValue::Float),
        },
        Value::String(s) => Some(match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => FieldValue::Float(f),
            _ => FieldValue::String(s.clone()),
        }),
        other => Some(FieldValue::String(other.to_string())),
    }
}

/// Tag values are strings; nulls and empty strings yield no tag
pub fn coerce_tag_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Epoch nanoseconds from an RFC 3339 string or an integer; null means server time
pub fn parse_timestamp(value: &Value, row: usize) -> Result<Option<i64>> {
    let invalid = || {
        DataError::write_failed(format!(
            "row {}: cannot use {} as a timestamp",
            row, value
        ))
    };

    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_i64().map(Some).ok_or_else(invalid),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|t| t.timestamp_nanos_opt())
            .map(Some)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn is_integer(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Int(_) | FieldValue::UInt(_))
}

fn widen_to_float(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Int(i) => FieldValue::Float(i as f64),
        FieldValue::UInt(u) => FieldValue::Float(u as f64),
        other => other,
    }
}

/// Field columns holding both integers and floats. Every value in these
/// columns is written as a float so a batch never mixes numeric types.
pub fn mixed_numeric_columns<'a>(desc: &'a WriteDescriptor, table: &Table) -> HashSet<&'a str> {
    desc.field_columns
        .iter()
        .flatten()
        .filter(|column| {
            let (mut ints, mut floats) = (false, false);
            for value in table
                .rows
                .iter()
                .filter_map(|row| row.get(column.as_str()))
                .filter_map(coerce_field_value)
            {
                ints |= is_integer(&value);
                floats |= matches!(value, FieldValue::Float(_));
            }
            ints && floats
        })
        .map(String::as_str)
        .collect()
}

fn row_to_point(
    desc: &WriteDescriptor,
    row: &DataRow,
    idx: usize,
    float_columns: &HashSet<&str>,
) -> Result<Point> {
    let mut point = Point::new(desc.measurement.as_str());

    if let Some(ts) = row.get(&desc.time_column) {
        if let Some(nanos) = parse_timestamp(ts, idx)? {
            point = point.timestamp(nanos);
        }
    }

    for tag in &desc.tag_columns {
        if let Some(value) = row.get(tag).and_then(coerce_tag_value) {
            point = point.tag(tag.as_str(), value);
        }
    }

    for field in desc.field_columns.iter().flatten() {
        if let Some(value) = row.get(field).and_then(coerce_field_value) {
            let value = if float_columns.contains(field.as_str()) {
                widen_to_float(value)
            } else {
                value
            };
            point = point.field(field.as_str(), value);
        }
    }

    Ok(point)
}

/// One point per row, in row order
pub fn table_to_points(desc: &WriteDescriptor, table: &Table) -> Result<Vec<Point>> {
    let float_columns = mixed_numeric_columns(desc, table);
    if !float_columns.is_empty() {
        debug!(columns = ?float_columns, "Writing mixed numeric columns as floats");
    }

    table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| row_to_point(desc, row, idx, &float_columns))
        .collect()
}

/// Write a table; returns how many points were sent. Points without any
/// field are skipped, and nothing is sent when none remain.
pub async fn write_table(
    client: &dyn InfluxClient,
    conn: &InfluxConnection,
    desc: &WriteDescriptor,
    table: &Table,
) -> Result<usize> {
    let points: Vec<Point> = table_to_points(desc, table)?
        .into_iter()
        .filter(Point::has_fields)
        .collect();

    let skipped = table.len() - points.len();
    if skipped > 0 {
        debug!("Skipping {} rows without field values", skipped);
    }

    if points.is_empty() {
        return Ok(0);
    }

    client
        .write(conn, &desc.bucket, &points)
        .await
        .map_err(|e| match e {
            DataError::WriteFailed(_) => e,
            other => DataError::write_failed(other.to_string()),
        })?;

    debug!(
        bucket = %desc.bucket,
        measurement = %desc.measurement,
        "Wrote {} points",
        points.len()
    );
    Ok(points.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connection, RecordingClient};
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> DataRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_field_coercion_precedence() {
        assert_eq!(coerce_field_value(&json!(true)), Some(FieldValue::Bool(true)));
        assert_eq!(coerce_field_value(&json!(7)), Some(FieldValue::Int(7)));
        assert_eq!(coerce_field_value(&json!(2.5)), Some(FieldValue::Float(2.5)));
        assert_eq!(coerce_field_value(&json!("3.14")), Some(FieldValue::Float(3.14)));
        assert_eq!(
            coerce_field_value(&json!("abc")),
            Some(FieldValue::String("abc".to_string()))
        );
        assert_eq!(coerce_field_value(&Value::Null), None);
        assert_eq!(
            coerce_field_value(&json!(u64::MAX)),
            Some(FieldValue::UInt(u64::MAX))
        );
    }

    #[test]
    fn test_mixed_numeric_column_is_written_as_float() {
        let desc = WriteDescriptor {
            bucket: "b".into(),
            measurement: "m".into(),
            time_column: "time".into(),
            tag_columns: Vec::new(),
            field_columns: Some(strings(&["value", "count", "reading"])),
        };
        let table = Table::from_rows(vec![
            row(&[("value", json!(21.5)), ("count", json!(1)), ("reading", json!("0.5"))]),
            row(&[("value", json!(19)), ("count", json!(2)), ("reading", json!(3))]),
        ]);

        let points = table_to_points(&desc, &table).unwrap();
        assert_eq!(points[1].fields["value"], FieldValue::Float(19.0));
        assert_eq!(points[1].fields["reading"], FieldValue::Float(3.0));
        assert_eq!(points[1].fields["count"], FieldValue::Int(2));
        assert_eq!(
            crate::line_protocol::encode_points(&points),
            "m count=1i,reading=0.5,value=21.5\nm count=2i,reading=3,value=19"
        );
    }

    #[test]
    fn test_null_tag_is_omitted() {
        let desc = WriteDescriptor {
            bucket: "b".into(),
            measurement: "m".into(),
            time_column: "time".into(),
            tag_columns: strings(&["sensor", "site"]),
            field_columns: Some(strings(&["value"])),
        };
        let table = Table::from_rows(vec![row(&[
            ("sensor", Value::Null),
            ("site", json!("north")),
            ("value", json!(1.5)),
        ])]);

        let points = table_to_points(&desc, &table).unwrap();
        assert_eq!(points[0].tags.len(), 1);
        assert_eq!(points[0].tags["site"], "north");
        assert!(!points[0].tags.contains_key("sensor"));
    }

    #[test]
    fn test_field_columns_inferred_from_remaining_columns() {
        let columns = strings(&["time", "sensor", "value"]);
        let roles = ColumnRoles {
            tag_cols: Some(strings(&["sensor"])),
            ..ColumnRoles::default()
        };

        let desc = roles.resolve("sensors", "temperature", &columns, None, &[]);
        assert_eq!(desc.time_column, "time");
        assert_eq!(desc.tag_columns, strings(&["sensor"]));
        assert_eq!(desc.field_columns, Some(strings(&["value"])));
    }

    #[test]
    fn test_role_precedence() {
        let columns = strings(&["ts", "id", "a", "b"]);
        let keys = strings(&["id"]);

        let inferred = ColumnRoles::default().resolve("b", "m", &columns, Some("ts"), &keys);
        assert_eq!(inferred.time_column, "ts");
        assert_eq!(inferred.tag_columns, keys);
        assert_eq!(inferred.field_columns, Some(strings(&["a", "b"])));

        let explicit = ColumnRoles {
            time_col: Some("a".into()),
            tag_cols: Some(strings(&["b"])),
            field_cols: Some(strings(&["id"])),
        }
        .resolve("b", "m", &columns, Some("ts"), &keys);
        assert_eq!(explicit.time_column, "a");
        assert_eq!(explicit.tag_columns, strings(&["b"]));
        assert_eq!(explicit.field_columns, Some(strings(&["id"])));
    }

    #[test]
    fn test_no_remaining_columns_means_no_fields() {
        let columns = strings(&["time", "sensor"]);
        let desc = ColumnRoles::default().resolve("b", "m", &columns, None, &strings(&["sensor"]));
        assert_eq!(desc.field_columns, None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp(&Value::Null, 0).unwrap(), None);
        assert_eq!(parse_timestamp(&json!(42), 0).unwrap(), Some(42));
        assert_eq!(
            parse_timestamp(&json!("1970-01-01T00:00:01Z"), 0).unwrap(),
            Some(1_000_000_000)
        );

        let err = parse_timestamp(&json!("yesterday"), 3).unwrap_err();
        assert!(matches!(err, DataError::WriteFailed(ref msg) if msg.contains("row 3")));
    }

    #[tokio::test]
    async fn test_end_to_end_point_per_row() {
        let table = Table::from_rows(vec![
            row(&[
                ("time", json!("2024-01-01T00:00:00Z")),
                ("sensor", json!("a")),
                ("value", json!(1.5)),
            ]),
            row(&[
                ("time", json!("2024-01-01T00:00:01Z")),
                ("sensor", json!("b")),
                ("value", json!(2.5)),
            ]),
        ]);
        let roles = ColumnRoles {
            tag_cols: Some(strings(&["sensor"])),
            ..ColumnRoles::default()
        };
        let desc = roles.resolve("sensors", "temperature", &table.columns(), None, &[]);
        assert_eq!(desc.field_columns, Some(strings(&["value"])));

        let client = RecordingClient::new();
        let written = write_table(&client, &connection(), &desc, &table).await.unwrap();
        assert_eq!(written, 2);

        let calls = client.write_calls();
        assert_eq!(calls.len(), 1);
        let (bucket, points) = &calls[0];
        assert_eq!(bucket, "sensors");
        assert_eq!(points.len(), 2);
        for (point, sensor) in points.iter().zip(["a", "b"]) {
            assert_eq!(point.measurement, "temperature");
            assert_eq!(point.tags["sensor"], sensor);
            assert_eq!(point.fields.keys().collect::<Vec<_>>(), vec!["value"]);
            assert!(point.timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn test_write_without_fields_skips_backend() {
        let table = Table::from_rows(vec![row(&[("time", json!(1)), ("sensor", json!("a"))])]);
        let desc = ColumnRoles::default().resolve(
            "b",
            "m",
            &table.columns(),
            None,
            &strings(&["sensor"]),
        );

        let client = RecordingClient::new();
        let written = write_table(&client, &connection(), &desc, &table).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_write_failed() {
        let table = Table::from_rows(vec![row(&[("value", json!(1))])]);
        let desc = ColumnRoles::default().resolve("b", "m", &table.columns(), None, &[]);

        let client = RecordingClient::failing();
        let err = write_table(&client, &connection(), &desc, &table)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::WriteFailed(_)));
    }
}
