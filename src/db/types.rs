//! Engine value normalization.
//!
//! The warehouse returns every scalar string-encoded, records as
//! `{"f": [{"v": ...}]}` and repeated columns as `[{"v": ...}]`. This module
//! turns those cells into plain JSON values according to the column's
//! engine type.
//!
//! # Architecture
//!
//! Normalization is two-phase:
//! 1. `check_columns` walks the full column tree and rejects any type with
//!    no conversion, even when the result has no rows
//! 2. `normalize_value` converts each cell, recursing through records and
//!    repeated columns with a dotted column path for error reporting
//!
//! | Engine type                         | JSON                               |
//! |-------------------------------------|------------------------------------|
//! | INT64                               | number                             |
//! | FLOAT64                             | number, or "NaN"/"Infinity" string |
//! | BOOL                                | boolean                            |
//! | TIMESTAMP                           | RFC 3339 string, UTC, microseconds |
//! | DATETIME                            | ISO 8601 string, no offset         |
//! | JSON                                | parsed value                       |
//! | RECORD                              | object in field order              |
//! | REPEATED                            | array                              |
//! | STRING, BYTES, NUMERIC, DATE, ...   | string as returned                 |

use crate::error::{ToolError, ToolResult};
use crate::models::{ColumnSchema, EngineType, RawResultSet, ResultRecord};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;

/// Normalize a raw result set into ordered records.
pub fn normalize(result: &RawResultSet) -> ToolResult<Vec<ResultRecord>> {
    check_columns(&result.columns, None)?;

    result
        .rows
        .iter()
        .map(|row| {
            let cells: Vec<&JsonValue> = row.cells.iter().map(|cell| &cell.v).collect();
            normalize_fields(&result.columns, &cells, None).map(ResultRecord::from_iter)
        })
        .collect()
}

/// Reject columns whose type has no conversion.
pub fn check_columns(columns: &[ColumnSchema], parent: Option<&str>) -> ToolResult<()> {
    for column in columns {
        let path = column_path(parent, &column.name);
        match column.engine_type() {
            EngineType::Unknown(name) => return Err(ToolError::unsupported_type(path, name)),
            EngineType::Record => check_columns(&column.fields, Some(&path))?,
            _ => {}
        }
    }
    Ok(())
}

fn column_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}.{}", parent, name),
        None => name.to_string(),
    }
}

fn normalize_fields(
    columns: &[ColumnSchema],
    cells: &[&JsonValue],
    parent: Option<&str>,
) -> ToolResult<Vec<(String, JsonValue)>> {
    if cells.len() != columns.len() {
        return Err(ToolError::malformed_value(
            parent.unwrap_or("<row>"),
            "RECORD",
            format!("expected {} cells, got {}", columns.len(), cells.len()),
        ));
    }

    columns
        .iter()
        .zip(cells)
        .map(|(column, cell)| {
            let path = column_path(parent, &column.name);
            let value = normalize_value(column, &path, cell)?;
            Ok((column.name.clone(), value))
        })
        .collect()
}

/// Convert one cell, honoring REPEATED mode.
pub fn normalize_value(column: &ColumnSchema, path: &str, cell: &JsonValue) -> ToolResult<JsonValue> {
    if cell.is_null() {
        return Ok(JsonValue::Null);
    }
    if !column.is_repeated() {
        return normalize_single(column, path, cell);
    }

    let JsonValue::Array(items) = cell else {
        return Err(malformed(column, path, "repeated column is not an array"));
    };
    items
        .iter()
        .map(|item| {
            // Elements are wrapped as {"v": ...}
            let inner = match item {
                JsonValue::Object(obj) if obj.contains_key("v") => &obj["v"],
                other => other,
            };
            if inner.is_null() {
                Ok(JsonValue::Null)
            } else {
                normalize_single(column, path, inner)
            }
        })
        .collect::<ToolResult<Vec<_>>>()
        .map(JsonValue::Array)
}

fn normalize_single(column: &ColumnSchema, path: &str, cell: &JsonValue) -> ToolResult<JsonValue> {
    match column.engine_type() {
        EngineType::Record => {
            let cells = record_cells(column, path, cell)?;
            let fields = normalize_fields(&column.fields, &cells, Some(path))?;
            Ok(JsonValue::Object(fields.into_iter().collect()))
        }
        EngineType::Int64 => {
            let text = cell_text(column, path, cell)?;
            text.parse::<i64>()
                .map(JsonValue::from)
                .map_err(|e| malformed(column, path, format!("'{}': {}", text, e)))
        }
        EngineType::Float64 => decode_float(column, path, &cell_text(column, path, cell)?),
        EngineType::Bool => match cell {
            JsonValue::Bool(b) => Ok(JsonValue::Bool(*b)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("true") => Ok(JsonValue::Bool(true)),
            JsonValue::String(s) if s.eq_ignore_ascii_case("false") => Ok(JsonValue::Bool(false)),
            other => Err(malformed(column, path, format!("not a boolean: {}", other))),
        },
        EngineType::Timestamp => decode_timestamp(column, path, &cell_text(column, path, cell)?),
        EngineType::Datetime => decode_datetime(column, path, &cell_text(column, path, cell)?),
        EngineType::Json => {
            let text = cell_text(column, path, cell)?;
            serde_json::from_str(&text).map_err(|e| malformed(column, path, e.to_string()))
        }
        EngineType::String
        | EngineType::Bytes
        | EngineType::Numeric
        | EngineType::BigNumeric
        | EngineType::Date
        | EngineType::Time
        | EngineType::Geography
        | EngineType::Interval => Ok(JsonValue::String(cell_text(column, path, cell)?)),
        EngineType::Unknown(name) => Err(ToolError::unsupported_type(path, name)),
    }
}

fn record_cells<'a>(
    column: &ColumnSchema,
    path: &str,
    cell: &'a JsonValue,
) -> ToolResult<Vec<&'a JsonValue>> {
    let fields = cell
        .get("f")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| malformed(column, path, "record cell has no 'f' array"))?;
    Ok(fields
        .iter()
        .map(|field| field.get("v").unwrap_or(&JsonValue::Null))
        .collect())
}

/// Scalar cell text. Numbers and booleans are accepted as-is.
fn cell_text(column: &ColumnSchema, path: &str, cell: &JsonValue) -> ToolResult<String> {
    match cell {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        other => Err(malformed(
            column,
            path,
            format!("expected a scalar, got {}", other),
        )),
    }
}

fn decode_float(column: &ColumnSchema, path: &str, text: &str) -> ToolResult<JsonValue> {
    // Non-finite values have no JSON number form
    if matches!(text, "NaN" | "Infinity" | "-Infinity") {
        return Ok(JsonValue::String(text.to_string()));
    }
    let value: f64 = text
        .parse()
        .map_err(|e| malformed(column, path, format!("'{}': {}", text, e)))?;
    match serde_json::Number::from_f64(value) {
        Some(n) => Ok(JsonValue::Number(n)),
        None => Ok(JsonValue::String(text.to_string())),
    }
}

/// TIMESTAMP arrives as integer microseconds, float seconds, or RFC 3339.
fn decode_timestamp(column: &ColumnSchema, path: &str, text: &str) -> ToolResult<JsonValue> {
    let parsed: Option<DateTime<Utc>> = if let Ok(micros) = text.parse::<i64>() {
        DateTime::from_timestamp_micros(micros)
    } else if let Ok(secs) = text.parse::<f64>() {
        if secs.is_finite() {
            DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
        } else {
            None
        }
    } else {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    };

    parsed
        .map(|dt| JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Micros, true)))
        .ok_or_else(|| malformed(column, path, format!("unparseable timestamp '{}'", text)))
}

fn decode_datetime(column: &ColumnSchema, path: &str, text: &str) -> ToolResult<JsonValue> {
    let normalized = text.replacen(' ', "T", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()))
        .map_err(|e| malformed(column, path, format!("'{}': {}", text, e)))
}

fn malformed(column: &ColumnSchema, path: &str, message: impl Into<String>) -> ToolError {
    ToolError::malformed_value(path, column.engine_type().as_str(), message)
}
