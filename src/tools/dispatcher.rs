//! Tool dispatch.
//!
//! Runs one invocation through the fixed pipeline:
//!
//! ```text
//! Received -> Validated -> Bound -> Executed -> Normalized -> Returned
//! ```
//!
//! Any stage may fail, and nothing after a failed stage runs. In particular
//! no query reaches the executor unless validation and binding succeeded.
//! Failures that point at a gap in this server (missing template, render
//! error, unsupported engine type, malformed value) are logged at error
//! level before being returned.

use crate::db::{QueryExecutor, TemplateStore, bind, normalize};
use crate::error::{ToolError, ToolResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, RawArguments, ResultRecord};
use crate::tools::catalog::ToolCatalog;
use crate::tools::validator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Pipeline stage an invocation has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validated,
    Bound,
    Executed,
    Normalized,
    Returned,
}

/// Outcome of one successful invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: String,
    pub records: Vec<ResultRecord>,
    /// True when rows were dropped by the row cap or left unfetched
    pub truncated: bool,
    /// True when the tool samples rows at random
    pub sampled: bool,
    pub bytes_processed: Option<u64>,
    pub execution_time_ms: u64,
}

/// Entry point for tool invocations. Holds only read-only state, so one
/// dispatcher serves concurrent invocations.
pub struct ToolDispatcher {
    catalog: ToolCatalog,
    store: TemplateStore,
    executor: Arc<dyn QueryExecutor>,
    query_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(catalog: ToolCatalog, store: TemplateStore, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            catalog,
            store,
            executor,
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }

    /// Set the per-invocation query deadline.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Invoke a tool and return its records.
    pub async fn invoke(&self, name: &str, args: &RawArguments) -> ToolResult<Vec<ResultRecord>> {
        self.invoke_detailed(name, args)
            .await
            .map(|invocation| invocation.records)
    }

    /// Invoke a tool and return its records with execution details.
    pub async fn invoke_detailed(&self, name: &str, args: &RawArguments) -> ToolResult<Invocation> {
        let start = Instant::now();
        let mut stage = Stage::Received;

        let result = self.run(name, args, &mut stage, start).await;
        match &result {
            Ok(invocation) => info!(
                tool = name,
                rows = invocation.records.len(),
                truncated = invocation.truncated,
                execution_time_ms = invocation.execution_time_ms,
                "Tool invocation completed"
            ),
            Err(e) if e.is_internal_gap() => error!(
                tool = name,
                stage = ?stage,
                kind = e.kind(),
                error = %e,
                "Tool invocation hit a server configuration gap"
            ),
            Err(e) if e.is_caller_error() => info!(
                tool = name,
                stage = ?stage,
                kind = e.kind(),
                error = %e,
                "Tool invocation rejected"
            ),
            Err(e) => warn!(
                tool = name,
                stage = ?stage,
                kind = e.kind(),
                error = %e,
                "Tool invocation failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        name: &str,
        args: &RawArguments,
        stage: &mut Stage,
        start: Instant,
    ) -> ToolResult<Invocation> {
        let tool = self.catalog.lookup(name)?;

        let validated = validator::validate(&tool, args)?;
        advance(stage, Stage::Validated, name);

        let template = self.store.load(&tool.template)?;
        let query = bind(&template, &validated)?;
        advance(stage, Stage::Bound, name);

        let execution = self.executor.execute(&query, self.query_timeout);
        let raw = match timeout(self.query_timeout, execution).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ToolError::remote_timeout(
                    "warehouse query",
                    self.query_timeout.as_secs(),
                ));
            }
        };
        advance(stage, Stage::Executed, name);

        let mut records = normalize(&raw)?;
        advance(stage, Stage::Normalized, name);

        let mut truncated = raw.more_pages;
        if let Some(max_rows) = tool.post_process.max_rows {
            if records.len() > max_rows {
                records.truncate(max_rows);
                truncated = true;
            }
        }
        advance(stage, Stage::Returned, name);

        Ok(Invocation {
            tool: tool.name.clone(),
            records,
            truncated,
            sampled: tool.post_process.randomized,
            bytes_processed: raw.total_bytes_processed,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn advance(stage: &mut Stage, next: Stage, tool: &str) {
    debug!(tool, from = ?*stage, to = ?next, "Stage transition");
    *stage = next;
}
