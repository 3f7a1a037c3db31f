//! Error types for the BigQuery MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each stage of a tool invocation owns its own variants, and the variants carry
//! enough context for an AI assistant to tell "your arguments were invalid" from
//! "the warehouse rejected the query" from "the server has an internal gap".

use thiserror::Error;

/// Argument validation failures, always naming the offending field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required argument '{field}'")]
    Missing { field: String },

    #[error("unknown argument '{field}'")]
    Unknown { field: String },

    #[error("invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },

    /// An identifier argument contained characters outside the safe class.
    #[error("unsafe identifier for '{field}': {reason}")]
    UnsafeIdentifier { field: String, reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    pub fn unknown(field: impl Into<String>) -> Self {
        Self::Unknown {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn unsafe_identifier(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafeIdentifier {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the argument that failed validation.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::Unknown { field }
            | Self::Invalid { field, .. }
            | Self::UnsafeIdentifier { field, .. } => field,
        }
    }

    pub fn is_unsafe_identifier(&self) -> bool {
        matches!(self, Self::UnsafeIdentifier { .. })
    }
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    #[error("Template render error in '{template}': {message}")]
    TemplateRender { template: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Warehouse authentication failed: {message}")]
    RemoteAuth { message: String },

    #[error("Warehouse rejected the query: {message}")]
    RemoteQuery {
        message: String,
        /// Engine error reason, e.g. "invalidQuery" or "notFound"
        reason: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    RemoteTimeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Unsupported engine type '{engine_type}' in column '{column}'")]
    UnsupportedType { column: String, engine_type: String },

    #[error("Malformed {engine_type} value in column '{column}': {message}")]
    MalformedValue {
        column: String,
        engine_type: String,
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ToolError {
    /// Create an unknown tool error.
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Create a template not found error.
    pub fn template_not_found(name: impl Into<String>) -> Self {
        Self::TemplateNotFound { name: name.into() }
    }

    /// Create a template render error.
    pub fn template_render(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateRender {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a remote authentication error.
    pub fn remote_auth(message: impl Into<String>) -> Self {
        Self::RemoteAuth {
            message: message.into(),
        }
    }

    /// Create a remote query error with an optional engine reason.
    pub fn remote_query(message: impl Into<String>, reason: Option<String>) -> Self {
        Self::RemoteQuery {
            message: message.into(),
            reason,
        }
    }

    /// Create a remote timeout error.
    pub fn remote_timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::RemoteTimeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(column: impl Into<String>, engine_type: impl Into<String>) -> Self {
        Self::UnsupportedType {
            column: column.into(),
            engine_type: engine_type.into(),
        }
    }

    /// Create a malformed value error.
    pub fn malformed_value(
        column: impl Into<String>,
        engine_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedValue {
            column: column.into(),
            engine_type: engine_type.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::Validation(ValidationError::UnsafeIdentifier { .. }) => "unsafe_identifier",
            Self::Validation(_) => "validation_error",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::TemplateRender { .. } => "template_render_error",
            Self::Configuration { .. } => "configuration_error",
            Self::RemoteAuth { .. } => "remote_auth_error",
            Self::RemoteQuery { .. } => "remote_query_error",
            Self::RemoteTimeout { .. } => "remote_timeout",
            Self::UnsupportedType { .. } => "unsupported_type",
            Self::MalformedValue { .. } => "malformed_value",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// True when the caller can fix the failure by changing the request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTool { .. } | Self::Validation(_) | Self::RemoteQuery { .. }
        )
    }

    /// True when the failure points at a configuration or coverage gap in this server.
    pub fn is_internal_gap(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound { .. }
                | Self::TemplateRender { .. }
                | Self::Configuration { .. }
                | Self::UnsupportedType { .. }
                | Self::MalformedValue { .. }
        )
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnknownTool { .. } => Some("Call tools/list to see the available tools"),
            Self::Validation(ValidationError::UnsafeIdentifier { .. }) => Some(
                "Identifiers may only contain ASCII letters, digits, '_' and '-'",
            ),
            Self::Validation(_) => Some("Check the tool's input schema and retry"),
            Self::RemoteAuth { .. } => {
                Some("Check the configured access token and its BigQuery permissions")
            }
            Self::RemoteQuery { .. } => {
                Some("Verify that the referenced region, dataset and relation exist")
            }
            Self::RemoteTimeout { .. } => Some(
                "Retry later or increase --query-timeout; the warehouse may be under load",
            ),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteTimeout { .. })
    }
}

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Build the structured `data` object attached to MCP errors.
fn error_data(err: &ToolError) -> serde_json::Value {
    let mut data = serde_json::Map::new();
    data.insert("kind".to_string(), err.kind().into());
    if let ToolError::Validation(validation) = err {
        data.insert("field".to_string(), validation.field().into());
    }
    if let Some(suggestion) = err.suggestion() {
        data.insert("suggestion".to_string(), suggestion.into());
    }
    data.insert("retryable".to_string(), err.is_retryable().into());
    serde_json::Value::Object(data)
}

/// Convert ToolError to MCP ErrorData for semantic error categorization.
/// The `data` object always carries the error `kind`.
impl From<ToolError> for rmcp::ErrorData {
    fn from(err: ToolError) -> Self {
        let data = Some(error_data(&err));
        match &err {
            // UnknownTool -> resource_not_found
            ToolError::UnknownTool { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), data)
            }

            // Validation, RemoteQuery -> invalid_params
            ToolError::Validation(_) => rmcp::ErrorData::invalid_params(err.to_string(), data),
            ToolError::RemoteQuery { reason, .. } => {
                let msg = match reason {
                    Some(reason) => format!("{} (reason: {})", err, reason),
                    None => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            // Everything else is the server's problem -> internal_error
            ToolError::TemplateNotFound { .. }
            | ToolError::TemplateRender { .. }
            | ToolError::Configuration { .. }
            | ToolError::RemoteAuth { .. }
            | ToolError::RemoteTimeout { .. }
            | ToolError::UnsupportedType { .. }
            | ToolError::MalformedValue { .. }
            | ToolError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ToolError::unknown_tool("drop_everything");
        assert!(err.to_string().contains("Unknown tool"));
        assert!(err.to_string().contains("drop_everything"));
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::invalid("region", "must be one of: europe-west2, us-east1");
        assert_eq!(err.field(), "region");
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_unsafe_identifier_kind() {
        let err: ToolError = ValidationError::unsafe_identifier("region", "bad char").into();
        assert_eq!(err.kind(), "unsafe_identifier");
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_plain_validation_kind() {
        let err: ToolError = ValidationError::missing("dataset_id").into();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_internal_gap_classification() {
        assert!(ToolError::unsupported_type("c", "RANGE").is_internal_gap());
        assert!(ToolError::template_render("t", "missing").is_internal_gap());
        assert!(!ToolError::remote_auth("denied").is_internal_gap());
        assert!(!ToolError::unknown_tool("x").is_internal_gap());
    }

    #[test]
    fn test_error_retryable() {
        assert!(ToolError::remote_timeout("query", 30).is_retryable());
        assert!(!ToolError::remote_auth("denied").is_retryable());
    }

    // Tests for From<ToolError> for rmcp::ErrorData

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let err: ToolError = ValidationError::unknown("limit").into();
        let mcp_err: rmcp::ErrorData = err.into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["kind"], "validation_error");
        assert_eq!(data["field"], "limit");
    }

    #[test]
    fn test_unknown_tool_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = ToolError::unknown_tool("nope").into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
        assert_eq!(mcp_err.data.unwrap()["kind"], "unknown_tool");
    }

    #[test]
    fn test_remote_query_includes_reason() {
        let err = ToolError::remote_query("Not found: Dataset x", Some("notFound".to_string()));
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        assert!(mcp_err.message.contains("notFound"));
    }

    #[test]
    fn test_remote_auth_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = ToolError::remote_auth("401").into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["kind"], "remote_auth_error");
        assert!(data["suggestion"].is_string());
    }

    #[test]
    fn test_unsupported_type_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = ToolError::unsupported_type("span", "RANGE").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["kind"], "unsupported_type");
    }

    #[test]
    fn test_timeout_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = ToolError::remote_timeout("warehouse query", 30).into();
        assert_eq!(mcp_err.code.0, -32603);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["kind"], "remote_timeout");
        assert_eq!(data["retryable"], true);
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        let err: ToolError = ValidationError::missing("dataset_id").into();
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.data.unwrap()["retryable"], false);
    }
}
