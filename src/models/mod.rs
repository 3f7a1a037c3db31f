//! Data models for the BigQuery MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod arguments;
pub mod query;
pub mod tool;

// Re-export commonly used types
pub use arguments::{
    ArgValue, IDENTIFIER_MAX_LEN, RawArguments, SafeIdentifier, ValidatedArguments,
};
pub use query::{
    BoundQuery, ColumnSchema, DEFAULT_MAX_RESULTS, DEFAULT_QUERY_TIMEOUT_SECS, EngineType,
    MAX_QUERY_TIMEOUT_SECS, ParamValue, QueryParam, RawCell, RawResultSet, RawRow, ResultRecord,
};
pub use tool::{
    LayoutField, ParamKind, ParameterSpec, PostProcess, SemanticType, TextLayout, ToolDefinition,
};
