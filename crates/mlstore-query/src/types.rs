use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Capabilities supported by a datastore or target
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Capability {
    /// Reading tables through `get`
    Read,
    /// Writing tables through `put` or a target
    Write,
    /// Per-event writes from a stream-processing graph
    Streaming,
    /// Time-series data
    TimeSeries,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
            Capability::Streaming => write!(f, "streaming"),
            Capability::TimeSeries => write!(f, "time-series"),
        }
    }
}

/// Column data types carried by tables
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Boolean true/false
    Boolean,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point
    Float64,
    /// UTF-8 string
    String,
    /// RFC 3339 timestamp
    Timestamp,
    /// Nested JSON object
    Json,
    /// Mixed scalar values (bool, number or string per row)
    Scalar,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Int64 => write!(f, "int64"),
            FieldType::Float64 => write!(f, "float64"),
            FieldType::String => write!(f, "string"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Json => write!(f, "json"),
            FieldType::Scalar => write!(f, "scalar"),
        }
    }
}

impl FieldType {
    /// Best guess for a column type from one JSON value
    pub fn infer(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(_) => FieldType::Boolean,
            serde_json::Value::Number(n) if n.is_f64() => FieldType::Float64,
            serde_json::Value::Number(_) => FieldType::Int64,
            serde_json::Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => {
                FieldType::Timestamp
            }
            serde_json::Value::String(_) => FieldType::String,
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => FieldType::Json,
            serde_json::Value::Null => FieldType::Scalar,
        }
    }
}

/// Definition of a single column in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Whether the column may hold nulls
    pub nullable: bool,
    /// Optional description
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered column definitions of a table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSchema {
    pub fields: Vec<FieldDef>,
}

impl DatasetSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// A row of data as column-value pairs
pub type DataRow = BTreeMap<String, serde_json::Value>;

/// In-memory tabular data exchanged with datastores and targets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions, in column order
    pub schema: DatasetSchema,
    /// Rows of data
    pub rows: Vec<DataRow>,
}

impl Table {
    pub fn new(schema: DatasetSchema, rows: Vec<DataRow>) -> Self {
        Self { schema, rows }
    }

    /// An empty table that still carries its column set
    pub fn empty(schema: DatasetSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Build a table from loose rows. Columns are the union of row keys in
    /// first-seen order; each column's type comes from its first non-null value.
    pub fn from_rows(rows: Vec<DataRow>) -> Self {
        let mut fields: Vec<FieldDef> = Vec::new();

        for row in &rows {
            for (name, value) in row {
                match fields.iter_mut().find(|f| &f.name == name) {
                    Some(field) => {
                        if field.field_type == FieldType::Scalar && !value.is_null() {
                            field.field_type = FieldType::infer(value);
                        }
                    }
                    None => fields.push(FieldDef::new(name.clone(), FieldType::infer(value))),
                }
            }
        }

        Self {
            schema: DatasetSchema::new(fields),
            rows,
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema.column_names()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Input handed to a target's write path
#[derive(Debug, Clone, Copy)]
pub enum Frame<'a> {
    /// Rows held in memory by this process
    Local(&'a Table),
    /// A handle to data owned by a distributed engine (e.g. "spark")
    Distributed { engine: &'a str },
}

/// Metadata attached to every data item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Scheme of the store that produced the item
    pub source: String,
    /// When the body was fetched
    pub fetched_at: DateTime<Utc>,
    /// Store-specific attributes (never secrets)
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ItemMeta {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched_at: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }
}

/// A dataset fetched from a store, together with where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    /// Store key (the URI without its scheme)
    pub key: String,
    /// URI the item was requested with, secrets masked
    pub artifact_url: String,
    /// Materialized table
    pub body: Table,
    /// Always-present metadata
    pub meta: ItemMeta,
}

impl DataItem {
    pub fn new(key: impl Into<String>, artifact_url: impl Into<String>, body: Table, meta: ItemMeta) -> Self {
        Self {
            key: key.into(),
            artifact_url: artifact_url.into(),
            body,
            meta,
        }
    }
}

/// Declarative description of a target, as handed over by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target kind (e.g. "influx")
    pub kind: String,
    /// Display name
    pub name: String,
    /// Backend path (e.g. "bucket/measurement")
    pub path: Option<String>,
    /// Backend-specific attributes
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl TargetSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            name: kind.clone(),
            kind,
            path: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Options for reading a target back as a table
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Requested columns
    pub columns: Option<Vec<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Payload of a stream event
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// A single row-like record
    Row(DataRow),
    /// A batch of rows
    Table(Table),
    /// Anything else the engine forwards
    Other(serde_json::Value),
}

/// One event flowing through a stream-processing graph
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Option<String>,
    pub body: EventBody,
}

impl Event {
    pub fn row(row: DataRow) -> Self {
        Self {
            id: None,
            body: EventBody::Row(row),
        }
    }

    pub fn table(table: Table) -> Self {
        Self {
            id: None,
            body: EventBody::Table(table),
        }
    }

    pub fn other(value: serde_json::Value) -> Self {
        Self {
            id: None,
            body: EventBody::Other(value),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
