//! Reader for the annotated CSV returned by `/api/v2/query`.
//!
//! ```text
//! #datatype,string,long,dateTime:RFC3339,double,string,string,string
//! #group,false,false,false,false,true,true,true
//! #default,_result,,,,,,
//! ,result,table,_time,_value,_field,_measurement,sensor
//! ,,0,2024-01-01T00:00:00Z,21.5,temp,temperature,bridge01
//! ```
//!
//! Each `#datatype` annotation starts a new block with its own header row.
//! Inside a block, a change of the `table` column starts a new table.

use crate::client::{FluxRecord, FluxTable};
use mlstore_query::{DataError, DataRow, Result};
use serde_json::Value;

#[derive(Default)]
struct Block {
    datatypes: Vec<String>,
    defaults: Vec<String>,
    header: Option<Vec<String>>,
    is_error: bool,
}

/// Parse a full response body into tables
pub fn parse_annotated_csv(body: &str) -> Result<Vec<FluxTable>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut tables: Vec<FluxTable> = Vec::new();
    let mut block = Block::default();
    let mut current_table: Option<Value> = None;

    for record in reader.records() {
        let record = record
            .map_err(|e| DataError::query_failed(format!("Invalid annotated CSV: {}", e)))?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        let first = record.get(0).unwrap_or_default();
        if first.starts_with('#') {
            match first {
                "#datatype" => {
                    block = Block {
                        datatypes: record.iter().map(str::to_string).collect(),
                        ..Block::default()
                    };
                    current_table = None;
                }
                "#default" => block.defaults = record.iter().map(str::to_string).collect(),
                _ => {}
            }
            continue;
        }

        let Some(header) = &block.header else {
            let header: Vec<String> = record.iter().map(str::to_string).collect();
            block.is_error = header.get(1).map(String::as_str) == Some("error");
            block.header = Some(header);
            current_table = None;
            continue;
        };

        if block.is_error {
            let message = record.get(1).unwrap_or("unknown error");
            let reference = record.get(2).filter(|r| !r.is_empty());
            return Err(DataError::query_failed(match reference {
                Some(reference) => format!("{} (reference {})", message, reference),
                None => message.to_string(),
            }));
        }

        let mut values = DataRow::new();
        // column 0 carries the annotation marker and is empty on data rows
        for (idx, name) in header.iter().enumerate().skip(1) {
            let raw = record.get(idx).unwrap_or_default();
            let raw = if raw.is_empty() {
                block.defaults.get(idx).map(String::as_str).unwrap_or_default()
            } else {
                raw
            };
            let datatype = block.datatypes.get(idx).map(String::as_str).unwrap_or("string");
            values.insert(name.clone(), convert(raw, datatype)?);
        }

        let table_id = values.get("table").cloned().unwrap_or(Value::Null);
        if current_table.as_ref() != Some(&table_id) || tables.is_empty() {
            tables.push(FluxTable::default());
            current_table = Some(table_id);
        }

        if let Some(table) = tables.last_mut() {
            table.records.push(FluxRecord::new(values));
        }
    }

    Ok(tables)
}

fn convert(raw: &str, datatype: &str) -> Result<Value> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    let invalid = |e: &dyn std::fmt::Display| {
        DataError::query_failed(format!("Invalid {} value {:?}: {}", datatype, raw, e))
    };

    let value = match datatype {
        "long" => Value::from(raw.parse::<i64>().map_err(|e| invalid(&e))?),
        "unsignedLong" => Value::from(raw.parse::<u64>().map_err(|e| invalid(&e))?),
        "double" => match raw {
            "+Inf" | "-Inf" | "NaN" => Value::Null,
            _ => Value::from(raw.parse::<f64>().map_err(|e| invalid(&e))?),
        },
        "boolean" => Value::Bool(raw == "true"),
        // strings, durations, base64 and RFC 3339 timestamps stay textual
        _ => Value::String(raw.to_string()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TWO_TABLES: &str = "#datatype,string,long,dateTime:RFC3339,double,string,string,string\r\n\
#group,false,false,false,false,true,true,true\r\n\
#default,_result,,,,,,\r\n\
,result,table,_time,_value,_field,_measurement,sensor\r\n\
,,0,2024-01-01T00:00:00Z,21.5,temp,temperature,bridge01\r\n\
,,0,2024-01-01T00:00:01Z,22,temp,temperature,bridge01\r\n\
,,1,2024-01-01T00:00:00Z,19.25,temp,temperature,bridge02\r\n\
\r\n";

    #[test]
    fn test_parses_tables_and_types() {
        let tables = parse_annotated_csv(TWO_TABLES).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].records.len(), 2);
        assert_eq!(tables[1].records.len(), 1);

        let first = &tables[0].records[0];
        assert_eq!(first.values["result"], json!("_result"));
        assert_eq!(first.values["table"], json!(0));
        assert_eq!(first.values["_value"], json!(21.5));
        assert_eq!(first.values["sensor"], json!("bridge01"));
        assert_eq!(first.field(), Some("temp"));
        assert_eq!(first.measurement(), Some("temperature"));
        assert!(first.time().is_some());

        assert_eq!(tables[0].records[1].values["_value"], json!(22.0));
    }

    #[test]
    fn test_new_datatype_block_starts_new_table() {
        let body = "#datatype,string,long,string\n\
#default,_result,,\n\
,result,table,_value\n\
,,0,a\n\
\n\
#datatype,string,long,boolean\n\
#default,_result,,\n\
,result,table,_value\n\
,,0,true\n";

        let tables = parse_annotated_csv(body).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].records[0].values["_value"], json!("a"));
        assert_eq!(tables[1].records[0].values["_value"], json!(true));
    }

    #[test]
    fn test_empty_body_yields_no_tables() {
        assert!(parse_annotated_csv("").unwrap().is_empty());
        assert!(parse_annotated_csv("\r\n").unwrap().is_empty());
    }

    #[test]
    fn test_error_table() {
        let body = "#datatype,string,string\n\
#group,true,true\n\
#default,,\n\
,error,reference\n\
,failed to parse query,897\n";

        let err = parse_annotated_csv(body).unwrap_err();
        match err {
            DataError::BackendQueryFailed(msg) => {
                assert!(msg.contains("failed to parse query"));
                assert!(msg.contains("897"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let body = "#datatype,string,long,long\n,result,table,_value\n,,0,abc\n";
        assert!(matches!(
            parse_annotated_csv(body),
            Err(DataError::BackendQueryFailed(_))
        ));
    }

    #[test]
    fn test_missing_values_become_null() {
        let body = "#datatype,string,long,double\n,result,table,_value\n,,0,\n";
        let tables = parse_annotated_csv(body).unwrap();
        assert_eq!(tables[0].records[0].values["_value"], Value::Null);
    }
}
