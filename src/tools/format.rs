//! Output formatting utilities for MCP tools.
//!
//! Records are always returned as structured JSON. These helpers produce an
//! additional pre-rendered view when the caller asks for one: an ASCII
//! table, a markdown table, or the labelled text layout each tool declares.

use crate::models::{ResultRecord, TextLayout};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Delimiter between entries in the text layout.
const ENTRY_DELIMITER: &str = "=====";

/// Placeholder when a listing has no entries.
const NO_INFORMATION: &str = "NO INFORMATION";

/// Output format for tool results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
    /// Labelled entries separated by "=====", readable by people and models
    Text,
}

/// Render records in `format`. `None` for JSON, which needs no rendering.
pub fn render(
    format: OutputFormat,
    layout: &TextLayout,
    records: &[ResultRecord],
    execution_time_ms: u64,
) -> Option<String> {
    match format {
        OutputFormat::Json => None,
        OutputFormat::Table => Some(format_as_table(
            &column_names(records),
            records,
            execution_time_ms,
        )),
        OutputFormat::Markdown => Some(format_as_markdown(&column_names(records), records)),
        OutputFormat::Text => Some(format_as_text(layout, records)),
    }
}

/// Column names in first-seen order across all records.
pub fn column_names(records: &[ResultRecord]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        for column in record.columns() {
            if !names.iter().any(|n| n == column) {
                names.push(column.to_string());
            }
        }
    }
    names
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_table(
    columns: &[String],
    records: &[ResultRecord],
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let cell = |record: &ResultRecord, column: &str| {
        record.get(column).cloned().unwrap_or(JsonValue::Null)
    };

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for record in records {
        for (i, column) in columns.iter().enumerate() {
            widths[i] = widths[i].max(format_value(&cell(record, column)).width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    output.push_str(
        &(columns
            .iter()
            .zip(&widths)
            .map(|(name, w)| format!("| {} ", pad_center(name, *w)))
            .collect::<String>()
            + "|\n"),
    );
    output.push_str(&separator);

    for record in records {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(column, w)| {
                let value = cell(record, column);
                let text = format_value(&value);
                if matches!(value, JsonValue::Number(_)) {
                    format!("| {} ", pad_left(&text, *w))
                } else {
                    format!("| {} ", pad_right(&text, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output.push_str(&separator);

    let row_count = records.len();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        row_text,
        execution_time_ms as f64 / 1000.0
    ));
    output
}

pub fn format_as_markdown(columns: &[String], records: &[ResultRecord]) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = columns
        .iter()
        .map(|c| format!("| {} ", c))
        .collect::<String>()
        + "|\n";
    output.push_str(&(columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for record in records {
        let line: String = columns
            .iter()
            .map(|column| {
                let value = record.get(column).cloned().unwrap_or(JsonValue::Null);
                // Pipes and newlines would break the table
                let text = format_value(&value).replace('|', "\\|").replace('\n', " ");
                format!("| {} ", text)
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} rows*", records.len()));
    output
}

/// Render records with a tool's text layout:
///
/// ```text
/// DATASETS
/// =====
/// Name: sales
/// -----
/// Description: Orders and refunds
/// =====
/// ```
pub fn format_as_text(layout: &TextLayout, records: &[ResultRecord]) -> String {
    let entries: Vec<String> = records
        .iter()
        .map(|record| {
            let mut lines: Vec<String> = layout
                .fields
                .iter()
                .map(|field| format!("{}: {}", field.label, text_value(record, &field.column)))
                .collect();
            lines.push("-----".to_string());
            lines.push(format!(
                "{}: {}",
                layout.body.label,
                text_value(record, &layout.body.column)
            ));
            lines.join("\n")
        })
        .collect();

    let info = if entries.is_empty() {
        NO_INFORMATION.to_string()
    } else {
        entries.join(&format!("\n{}\n", ENTRY_DELIMITER))
    };
    format!(
        "{}\n{}\n{}\n{}",
        layout.header, ENTRY_DELIMITER, info, ENTRY_DELIMITER
    )
}

fn text_value(record: &ResultRecord, column: &str) -> String {
    match record.get(column) {
        Some(value) => format_value(value),
        None => "NULL".to_string(),
    }
}

// std's width-based padding counts chars, not display columns
fn pad_right(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width.saturating_sub(text.width())))
}

fn pad_left(text: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(text.width())), text)
}

fn pad_center(text: &str, width: usize) -> String {
    let total = width.saturating_sub(text.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(total - left))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LayoutField;
    use serde_json::json;

    fn record(pairs: &[(&str, JsonValue)]) -> ResultRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn layout() -> TextLayout {
        TextLayout {
            header: "DATASETS".to_string(),
            fields: vec![LayoutField::new("Name", "dataset")],
            body: LayoutField::new("Description", "description"),
        }
    }

    #[test]
    fn test_text_layout() {
        let records = vec![
            record(&[("dataset", json!("sales")), ("description", json!("Orders"))]),
            record(&[("dataset", json!("hr")), ("description", JsonValue::Null)]),
        ];
        assert_eq!(
            format_as_text(&layout(), &records),
            "DATASETS\n=====\nName: sales\n-----\nDescription: Orders\n=====\n\
             Name: hr\n-----\nDescription: NULL\n====="
        );
    }

    #[test]
    fn test_text_layout_empty() {
        assert_eq!(
            format_as_text(&layout(), &[]),
            "DATASETS\n=====\nNO INFORMATION\n====="
        );
    }

    #[test]
    fn test_table_alignment_with_wide_chars() {
        let records = vec![
            record(&[("name", json!("日本")), ("n", json!(5))]),
            record(&[("name", json!("abc")), ("n", json!(12))]),
        ];
        let table = format_as_table(&column_names(&records), &records, 1500);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "+------+----+");
        assert_eq!(lines[1], "| name | n  |");
        assert_eq!(lines[3], "| 日本 |  5 |");
        assert_eq!(lines[4], "| abc  | 12 |");
        assert!(table.ends_with("2 rows in set (1.50 sec)\n"));
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let records = vec![record(&[("q", json!("SELECT a|b\nFROM t"))])];
        let md = format_as_markdown(&column_names(&records), &records);
        assert!(md.contains("| SELECT a\\|b FROM t |"));
        assert!(md.ends_with("*1 rows*"));
    }

    #[test]
    fn test_render_json_is_none() {
        assert!(render(OutputFormat::Json, &layout(), &[], 0).is_none());
        assert_eq!(
            render(OutputFormat::Table, &layout(), &[], 0).as_deref(),
            Some("Empty set")
        );
    }

    #[test]
    fn test_output_format_deserialize() {
        let format: OutputFormat = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(format, OutputFormat::Text);
    }
}
