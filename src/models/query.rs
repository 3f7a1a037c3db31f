//! Query-related data models.
//!
//! This module defines the typed values that travel between pipeline stages:
//! value bindings, the rendered query, the engine's raw result set and the
//! normalized records handed back to callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 300;

/// Default page size requested from the warehouse.
pub const DEFAULT_MAX_RESULTS: u32 = 1000;

// =============================================================================
// Engine Types
// =============================================================================

/// Column and parameter types known to the warehouse engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EngineType {
    Int64,
    Float64,
    Numeric,
    BigNumeric,
    Bool,
    String,
    Bytes,
    Timestamp,
    Datetime,
    Date,
    Time,
    Record,
    Json,
    Geography,
    Interval,
    /// Anything this server has no conversion for (e.g. RANGE)
    Unknown(String),
}

impl EngineType {
    /// Parse an engine type name, accepting legacy aliases.
    pub fn parse(type_name: &str) -> Self {
        match type_name.to_ascii_uppercase().as_str() {
            "INT64" | "INTEGER" => Self::Int64,
            "FLOAT64" | "FLOAT" => Self::Float64,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            "BIGNUMERIC" | "BIGDECIMAL" => Self::BigNumeric,
            "BOOL" | "BOOLEAN" => Self::Bool,
            "STRING" => Self::String,
            "BYTES" => Self::Bytes,
            "TIMESTAMP" => Self::Timestamp,
            "DATETIME" => Self::Datetime,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "RECORD" | "STRUCT" => Self::Record,
            "JSON" => Self::Json,
            "GEOGRAPHY" => Self::Geography,
            "INTERVAL" => Self::Interval,
            _ => Self::Unknown(type_name.to_string()),
        }
    }

    /// Canonical engine name, as sent in query parameter types.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Int64 => "INT64",
            Self::Float64 => "FLOAT64",
            Self::Numeric => "NUMERIC",
            Self::BigNumeric => "BIGNUMERIC",
            Self::Bool => "BOOL",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
            Self::Timestamp => "TIMESTAMP",
            Self::Datetime => "DATETIME",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Record => "RECORD",
            Self::Json => "JSON",
            Self::Geography => "GEOGRAPHY",
            Self::Interval => "INTERVAL",
            Self::Unknown(name) => name,
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Value Bindings
// =============================================================================

/// A typed value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Typed NULL; the parameter type still travels with the binding
    Null,
    Bool(bool),
    Int64(i64),
    String(String),
}

/// A named, typed value binding. Never spliced into query text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub param_type: EngineType,
    pub value: ParamValue,
}

impl QueryParam {
    pub fn new(name: impl Into<String>, param_type: EngineType, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            param_type,
            value,
        }
    }

    /// Convenience constructor for STRING parameters.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, EngineType::String, ParamValue::String(value.into()))
    }

    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self.value, ParamValue::Null)
    }
}

/// A rendered query ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery {
    /// Name of the template the query was rendered from
    pub template: String,
    /// Query text with identifiers substituted and `@name` value markers intact
    pub sql: String,
    /// Value bindings in template-declaration order
    pub params: Vec<QueryParam>,
}

impl BoundQuery {
    /// Look up a binding by parameter name.
    pub fn param(&self, name: &str) -> Option<&QueryParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

// =============================================================================
// Raw Result Set
// =============================================================================

/// Column descriptor as reported by the engine. Nested for RECORD columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Engine type name, e.g. "STRING", "TIMESTAMP", "RECORD"
    #[serde(rename = "type")]
    pub type_name: String,
    /// "NULLABLE" (default), "REQUIRED" or "REPEATED"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ColumnSchema>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            mode: None,
            fields: Vec::new(),
        }
    }

    /// Mark this column as REPEATED.
    pub fn repeated(mut self) -> Self {
        self.mode = Some("REPEATED".to_string());
        self
    }

    /// Attach nested fields (for RECORD columns).
    pub fn with_fields(mut self, fields: Vec<ColumnSchema>) -> Self {
        self.fields = fields;
        self
    }

    pub fn engine_type(&self) -> EngineType {
        EngineType::parse(&self.type_name)
    }

    pub fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("REPEATED"))
    }
}

/// One engine cell in wire form: scalars arrive string-encoded, records as
/// `{"f": [...]}`, repeated values as `[{"v": ...}, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(default)]
    pub v: JsonValue,
}

/// One engine row, cells aligned to the column list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "f", default)]
    pub cells: Vec<RawCell>,
}

impl RawRow {
    /// Build a row from wire-form cell values.
    pub fn from_values(values: impl IntoIterator<Item = JsonValue>) -> Self {
        Self {
            cells: values.into_iter().map(|v| RawCell { v }).collect(),
        }
    }
}

/// Column-described row set returned by the query executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<RawRow>,
    /// Bytes scanned by the engine, when reported
    pub total_bytes_processed: Option<u64>,
    /// True when the engine holds further pages that were not fetched
    pub more_pages: bool,
    pub job_id: Option<String>,
}

impl RawResultSet {
    pub fn new(columns: Vec<ColumnSchema>, rows: Vec<RawRow>) -> Self {
        Self {
            columns,
            rows,
            ..Default::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// Normalized Records
// =============================================================================

/// One normalized output row: column name to JSON-compatible value, in
/// engine column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ResultRecord(serde_json::Map<String, JsonValue>);

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: JsonValue) {
        self.0.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&JsonValue> {
        self.0.get(column)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, JsonValue)> for ResultRecord {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_type_aliases() {
        assert_eq!(EngineType::parse("INTEGER"), EngineType::Int64);
        assert_eq!(EngineType::parse("float"), EngineType::Float64);
        assert_eq!(EngineType::parse("STRUCT"), EngineType::Record);
        assert_eq!(EngineType::parse("BOOLEAN"), EngineType::Bool);
    }

    #[test]
    fn test_engine_type_unknown_keeps_name() {
        let ty = EngineType::parse("RANGE");
        assert_eq!(ty, EngineType::Unknown("RANGE".to_string()));
        assert_eq!(ty.to_string(), "RANGE");
    }

    #[test]
    fn test_query_param_null() {
        let param = QueryParam::new("days", EngineType::Int64, ParamValue::Null);
        assert!(param.is_null());
        assert!(!QueryParam::string("dataset_id", "sales").is_null());
    }

    #[test]
    fn test_bound_query_param_lookup() {
        let query = BoundQuery {
            template: "t".to_string(),
            sql: "SELECT @a".to_string(),
            params: vec![QueryParam::string("a", "x")],
        };
        assert!(query.param("a").is_some());
        assert!(query.param("b").is_none());
    }

    #[test]
    fn test_column_schema_from_wire() {
        let column: ColumnSchema = serde_json::from_value(json!({
            "name": "tags",
            "type": "STRING",
            "mode": "REPEATED"
        }))
        .unwrap();
        assert!(column.is_repeated());
        assert_eq!(column.engine_type(), EngineType::String);
    }

    #[test]
    fn test_raw_row_from_wire() {
        let row: RawRow = serde_json::from_value(json!({"f": [{"v": "1"}, {"v": null}]})).unwrap();
        assert_eq!(row.cells.len(), 2);
        assert!(row.cells[1].v.is_null());
    }

    #[test]
    fn test_result_record_preserves_column_order() {
        let mut record = ResultRecord::new();
        record.insert("zeta", json!(1));
        record.insert("alpha", json!(2));
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["zeta", "alpha"]);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"zeta":1,"alpha":2}"#
        );
    }
}
