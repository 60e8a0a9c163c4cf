//! Core datasource and result types.
//!
//! These give a normalized representation of configured endpoints and of
//! query results, independent of which vendor backend produced them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a configured datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasourceId(pub Uuid);

impl DatasourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DatasourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DatasourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a report template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub Uuid);

impl TemplateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a generation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Enumerated datasource vendors.
///
/// `Oracle` has a connection-string form but no pool backend in this crate;
/// acquiring a pool for it (or for `HttpApi`) is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    MySql,
    Postgres,
    Oracle,
    SqlServer,
    Sqlite,
    HttpApi,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::MySql => "mysql",
            Vendor::Postgres => "postgres",
            Vendor::Oracle => "oracle",
            Vendor::SqlServer => "sqlserver",
            Vendor::Sqlite => "sqlite",
            Vendor::HttpApi => "http_api",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Vendor::MySql => 3306,
            Vendor::Postgres => 5432,
            Vendor::Oracle => 1521,
            Vendor::SqlServer => 1433,
            Vendor::Sqlite => 0,
            Vendor::HttpApi => 80,
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured external data endpoint.
///
/// Owned by the external configuration store; the pool registry only ever
/// derives a cache entry from it, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    pub id: DatasourceId,
    pub name: String,
    pub vendor: Vendor,
    pub host: String,
    pub port: u16,
    /// Database name, or the file path for SQLite.
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Free-form connection parameters appended to the URL query string.
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub last_test_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub test_ok: Option<bool>,
}

impl DatasourceConfig {
    /// Minimal SQLite config pointing at a database file.
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: DatasourceId::new(),
            name: name.into(),
            vendor: Vendor::Sqlite,
            host: String::new(),
            port: 0,
            database: path.into(),
            username: String::new(),
            password: String::new(),
            params: HashMap::new(),
            last_test_time: None,
            test_ok: None,
        }
    }
}

/// Universal value representation for query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable rendering used by the document writers.
    /// Integral floats print without a trailing `.0`.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

/// Column metadata from a result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// One result row; values are positional, aligned with `QueryOutput::columns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// A fully materialized, order-preserving query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
}

impl QueryOutput {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Positional index of a column by name, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value of `column` in `row`, `Null` when the column does not exist.
    pub fn value(&self, row: &Row, column: &str) -> Value {
        self.column_index(column)
            .and_then(|i| row.values.get(i).cloned())
            .unwrap_or(Value::Null)
    }
}
