//! BigQuery MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to explore a BigQuery warehouse through a fixed set of templated,
//! read-only discovery queries.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ToolError, ToolResult};
pub use mcp::WarehouseService;
