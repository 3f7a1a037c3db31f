//! Discovery tools.
//!
//! This module implements the typed MCP surface for the discovery tools:
//! `list_datasets`, `list_dataset_ids`, `get_dataset`, `list_relations`,
//! `list_columns` and `list_recent_queries`. The input structs describe
//! each tool's schema; the arguments themselves reach the dispatcher as the
//! raw object the client sent, so validation happens in exactly one place
//! no matter how a tool is reached.

use crate::error::{ToolError, ToolResult, ValidationError};
use crate::models::{RawArguments, ResultRecord};
use crate::tools::catalog::REGIONS;
use crate::tools::dispatcher::ToolDispatcher;
use crate::tools::format::{self, OutputFormat};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

/// Name of the presentation option every tool accepts.
const FORMAT_FIELD: &str = "format";

/// Typed tool input that maps onto a catalog tool.
pub trait ToolInput: Serialize {
    /// Catalog name of the tool this input drives.
    const TOOL: &'static str;

    fn format(&self) -> OutputFormat;

    /// The input as a raw argument object. Presentation options are not
    /// tool arguments and are left out.
    fn arguments(&self) -> ToolResult<RawArguments> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::internal(format!(
                "{} input serialized to {}, expected an object",
                Self::TOOL,
                other
            ))),
            Err(e) => Err(ToolError::internal(format!(
                "{} input could not be serialized: {}",
                Self::TOOL,
                e
            ))),
        }
    }
}

/// Arguments for tool `I` exactly as the client sent them.
///
/// Deserializing accepts any object, so a missing, unknown or mistyped
/// argument is reported by the validator with its field name instead of
/// as a decode failure. The advertised schema is `I`'s.
pub struct ToolArguments<I> {
    raw: RawArguments,
    input: PhantomData<fn() -> I>,
}

impl<I> ToolArguments<I> {
    pub fn new(raw: RawArguments) -> Self {
        Self {
            raw,
            input: PhantomData,
        }
    }

    /// Split the output format off the tool arguments.
    pub fn into_parts(mut self) -> ToolResult<(RawArguments, OutputFormat)> {
        let format = match self.raw.remove(FORMAT_FIELD) {
            None | Some(serde_json::Value::Null) => OutputFormat::default(),
            Some(value) => serde_json::from_value(value).map_err(|_| {
                ValidationError::invalid(
                    FORMAT_FIELD,
                    "must be one of: json, table, markdown, text",
                )
            })?,
        };
        Ok((self.raw, format))
    }
}

impl<I: ToolInput> ToolArguments<I> {
    /// Arguments built from a typed input, format included.
    pub fn from_input(input: &I) -> ToolResult<Self> {
        let mut raw = input.arguments()?;
        let format = serde_json::to_value(input.format())
            .map_err(|e| ToolError::internal(format!("format not serializable: {}", e)))?;
        raw.insert(FORMAT_FIELD.to_string(), format);
        Ok(Self::new(raw))
    }
}

impl<'de, I> Deserialize<'de> for ToolArguments<I> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawArguments::deserialize(deserializer).map(Self::new)
    }
}

impl<I: JsonSchema> JsonSchema for ToolArguments<I> {
    fn inline_schema() -> bool {
        I::inline_schema()
    }

    fn schema_name() -> Cow<'static, str> {
        I::schema_name()
    }

    fn schema_id() -> Cow<'static, str> {
        I::schema_id()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        I::json_schema(generator)
    }
}

impl<I> std::fmt::Debug for ToolArguments<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ToolArguments").field(&self.raw).finish()
    }
}

fn region_schema(_generator: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "string",
        "enum": REGIONS,
        "description": "BigQuery region. Default: the server's region",
    })
}

/// Input for the list_datasets tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListDatasetsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "region_schema")]
    pub region: Option<String>,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for ListDatasetsInput {
    const TOOL: &'static str = "list_datasets";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Input for the list_dataset_ids tool.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListDatasetIdsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "region_schema")]
    pub region: Option<String>,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for ListDatasetIdsInput {
    const TOOL: &'static str = "list_dataset_ids";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Input for the get_dataset tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetDatasetInput {
    /// Dataset name from list_dataset_ids or list_datasets
    pub dataset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "region_schema")]
    pub region: Option<String>,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for GetDatasetInput {
    const TOOL: &'static str = "get_dataset";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Input for the list_relations tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListRelationsInput {
    /// Dataset name from list_datasets
    pub dataset_id: String,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for ListRelationsInput {
    const TOOL: &'static str = "list_relations";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Input for the list_columns tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListColumnsInput {
    /// Dataset name from list_datasets
    pub dataset_id: String,
    /// Table or view name from list_relations
    pub relation_id: String,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for ListColumnsInput {
    const TOOL: &'static str = "list_columns";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Input for the list_recent_queries tool.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListRecentQueriesInput {
    /// Dataset name from list_datasets
    pub dataset_id: String,
    /// Table or view name from list_relations
    pub relation_id: String,
    /// Region holding the job history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "region_schema")]
    pub region: Option<String>,
    /// Output format: "json" (default), "table", "markdown" or "text"
    #[serde(default, skip_serializing)]
    pub format: OutputFormat,
}

impl ToolInput for ListRecentQueriesInput {
    const TOOL: &'static str = "list_recent_queries";

    fn format(&self) -> OutputFormat {
        self.format
    }
}

/// Output shared by all discovery tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ToolOutput {
    /// Tool that produced the records
    pub tool: String,
    /// Result rows as column-to-value maps, in engine column order
    pub records: Vec<ResultRecord>,
    /// Pre-formatted output when format is table, markdown or text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// Number of records returned
    pub row_count: usize,
    /// True if rows were dropped by the row cap or not fetched
    pub truncated: bool,
    /// True if the records are a random sample; repeated calls may differ
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub sampled: bool,
    /// Bytes scanned by the warehouse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_processed_formatted: Option<String>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Format bytes as human-readable size string.
///
/// Uses the `humansize` WINDOWS preset (1024-based units).
///
/// ```
/// use bigquery_mcp_server::tools::discovery::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Handler that runs typed inputs through the dispatcher.
#[derive(Clone)]
pub struct DiscoveryToolHandler {
    dispatcher: Arc<ToolDispatcher>,
}

impl DiscoveryToolHandler {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Run a tool's arguments through the dispatcher and shape the output.
    pub async fn run<I: ToolInput>(&self, arguments: ToolArguments<I>) -> ToolResult<ToolOutput> {
        let (args, output_format) = arguments.into_parts()?;
        info!(tool = I::TOOL, args = ?args.keys().collect::<Vec<_>>(), "Discovery tool called");

        let invocation = self.dispatcher.invoke_detailed(I::TOOL, &args).await?;
        let tool = self.dispatcher.catalog().lookup(I::TOOL)?;
        let formatted = format::render(
            output_format,
            &tool.layout,
            &invocation.records,
            invocation.execution_time_ms,
        );

        Ok(ToolOutput {
            tool: invocation.tool,
            row_count: invocation.records.len(),
            records: invocation.records,
            formatted,
            truncated: invocation.truncated,
            sampled: invocation.sampled,
            bytes_processed: invocation.bytes_processed,
            bytes_processed_formatted: invocation.bytes_processed.map(format_size),
            execution_time_ms: invocation.execution_time_ms,
        })
    }
}
