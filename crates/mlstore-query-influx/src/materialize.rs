//! Flattening Flux tables into the fixed `time, field, value, measurement, tags` shape.

use crate::client::FluxTable;
use chrono::{DateTime, SecondsFormat, Utc};
use mlstore_query::{DataRow, DatasetSchema, FieldDef, FieldType, Table};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Record columns that have their own output column
pub const RESERVED_COLUMNS: [&str; 4] = ["_time", "_field", "_value", "_measurement"];

/// Output column names, in order
pub const RESULT_COLUMNS: [&str; 5] = ["time", "field", "value", "measurement", "tags"];

/// One point returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub time: Option<DateTime<Utc>>,
    pub field: Option<String>,
    pub value: Value,
    pub measurement: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// Rows of a query result, in backend order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Generic table with exactly the five result columns, even when empty
    pub fn to_table(&self) -> Table {
        let rows = self.rows.iter().map(row_to_datarow).collect();
        Table::new(result_schema(), rows)
    }
}

/// Schema of every materialized result
pub fn result_schema() -> DatasetSchema {
    DatasetSchema::new(vec![
        FieldDef::new("time", FieldType::Timestamp).with_description("Point timestamp"),
        FieldDef::new("field", FieldType::String).with_description("Field name"),
        FieldDef::new("value", FieldType::Scalar).with_description("Field value"),
        FieldDef::new("measurement", FieldType::String).with_description("Measurement name"),
        FieldDef::new("tags", FieldType::Json)
            .required()
            .with_description("Remaining record columns"),
    ])
}

fn tag_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One output row per record, in input order
pub fn materialize<I>(tables: I) -> ResultTable
where
    I: IntoIterator<Item = FluxTable>,
{
    let rows = tables
        .into_iter()
        .flat_map(|table| table.records)
        .map(|record| {
            let tags = record
                .values
                .iter()
                .filter(|(name, _)| !RESERVED_COLUMNS.contains(&name.as_str()))
                .map(|(name, value)| (name.clone(), tag_string(value)))
                .collect();

            ResultRow {
                time: record.time(),
                field: record.field().map(str::to_string),
                value: record.value().clone(),
                measurement: record.measurement().map(str::to_string),
                tags,
            }
        })
        .collect();

    ResultTable { rows }
}

fn row_to_datarow(row: &ResultRow) -> DataRow {
    let tags: serde_json::Map<String, Value> = row
        .tags
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let mut out = DataRow::new();
    out.insert(
        "time".to_string(),
        row.time
            .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Value::Null),
    );
    out.insert(
        "field".to_string(),
        row.field.clone().map(Value::String).unwrap_or(Value::Null),
    );
    out.insert("value".to_string(), row.value.clone());
    out.insert(
        "measurement".to_string(),
        row.measurement.clone().map(Value::String).unwrap_or(Value::Null),
    );
    out.insert("tags".to_string(), Value::Object(tags));
    out
}
