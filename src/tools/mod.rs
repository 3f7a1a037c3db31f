//! MCP tool implementations.
//!
//! This module contains the tool pipeline and the discovery tool handlers:
//! - `catalog`: The fixed set of tool definitions, checked against templates
//! - `validator`: Argument validation and identifier safety
//! - `dispatcher`: Validate, bind, execute and normalize one invocation
//! - `discovery`: Typed inputs and outputs for the MCP surface
//! - `format`: Table, markdown and text renderings

pub mod catalog;
pub mod discovery;
pub mod dispatcher;
pub mod format;
pub mod validator;

pub use catalog::{DEFAULT_REGION, RECENT_QUERY_LIMIT, REGIONS, ToolCatalog};
pub use discovery::{
    DiscoveryToolHandler, GetDatasetInput, ListColumnsInput, ListDatasetIdsInput,
    ListDatasetsInput, ListRecentQueriesInput, ListRelationsInput, ToolArguments, ToolInput,
    ToolOutput,
};
pub use dispatcher::{Invocation, Stage, ToolDispatcher};
pub use format::OutputFormat;
