//! Warehouse access layer.
//!
//! This module provides everything between a validated argument set and a
//! list of normalized records:
//! - Template storage and placeholder scanning
//! - Two-phase binding of identifiers and values
//! - Query execution against BigQuery
//! - Engine value normalization

pub mod binder;
pub mod executor;
pub mod template;
pub mod types;

pub use binder::bind;
pub use executor::{BigQueryConfig, BigQueryExecutor, QueryExecutor};
pub use template::{Placeholder, Segment, Template, TemplateStore};
pub use types::normalize;
