//! Query execution against the warehouse.
//!
//! This module provides the [`QueryExecutor`] seam and its BigQuery
//! implementation, which submits a rendered query through the REST
//! `jobs.query` endpoint with:
//! - Named, typed query parameters (never spliced into the text)
//! - A hard per-call timeout
//! - Job labels and a unique request id
//!
//! Dropping the returned future abandons the HTTP request, which is how an
//! invocation is cancelled.

use crate::error::{ToolError, ToolResult};
use crate::models::{BoundQuery, ColumnSchema, ParamValue, QueryParam, RawResultSet, RawRow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// Executes a rendered query and returns the engine's raw result set.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &BoundQuery, timeout: Duration) -> ToolResult<RawResultSet>;
}

/// Connection settings for the BigQuery REST API.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// Project the query jobs are billed to
    pub project_id: String,
    /// OAuth2 bearer token
    pub access_token: Option<String>,
    pub api_base_url: Url,
    /// Labels attached to every query job
    pub labels: BTreeMap<String, String>,
    /// Page size requested from the engine
    pub max_results: u32,
}

/// [`QueryExecutor`] backed by `jobs.query`.
pub struct BigQueryExecutor {
    client: reqwest::Client,
    config: BigQueryConfig,
}

impl BigQueryExecutor {
    pub fn new(config: BigQueryConfig) -> ToolResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bigquery-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BigQueryConfig {
        &self.config
    }

    /// `{base}/projects/{project}/queries`, with the project id path-encoded.
    fn queries_url(&self) -> ToolResult<Url> {
        let mut url = self.config.api_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ToolError::configuration("API base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(["projects", self.config.project_id.as_str(), "queries"]);
        Ok(url)
    }

    async fn submit(&self, query: &BoundQuery, query_timeout: Duration) -> ToolResult<RawResultSet> {
        let token = self.config.access_token.as_deref().ok_or_else(|| {
            ToolError::remote_auth("no access token configured (set BIGQUERY_ACCESS_TOKEN)")
        })?;

        let body = QueryRequest::new(query, &self.config, query_timeout);
        let response = self
            .client
            .post(self.queries_url()?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, query_timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, query_timeout))?;

        if !status.is_success() {
            return Err(error_from_response(status, &text, query_timeout));
        }

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| ToolError::internal(format!("unreadable jobs.query response: {}", e)))?;
        parsed.into_result_set(query_timeout)
    }
}

#[async_trait]
impl QueryExecutor for BigQueryExecutor {
    async fn execute(&self, query: &BoundQuery, query_timeout: Duration) -> ToolResult<RawResultSet> {
        let start = Instant::now();

        debug!(
            template = %query.template,
            params = query.params.len(),
            timeout_secs = query_timeout.as_secs(),
            "Submitting query job"
        );

        let result = match timeout(query_timeout, self.submit(query, query_timeout)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    template = %query.template,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query job timed out"
                );
                return Err(ToolError::remote_timeout("warehouse query", query_timeout.as_secs()));
            }
        };

        debug!(
            template = %query.template,
            rows = result.row_count(),
            job_id = ?result.job_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query job completed"
        );
        Ok(result)
    }
}

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<WireParam<'a>>,
    timeout_ms: u64,
    max_results: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a BTreeMap<String, String>,
    request_id: String,
    format_options: FormatOptions,
}

impl<'a> QueryRequest<'a> {
    fn new(query: &'a BoundQuery, config: &'a BigQueryConfig, query_timeout: Duration) -> Self {
        Self {
            query: &query.sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: query.params.iter().map(WireParam::from).collect(),
            timeout_ms: query_timeout.as_millis() as u64,
            max_results: config.max_results,
            labels: &config.labels,
            request_id: uuid::Uuid::new_v4().to_string(),
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireParam<'a> {
    name: &'a str,
    parameter_type: WireParamType<'a>,
    parameter_value: WireParamValue,
}

#[derive(Debug, Serialize)]
struct WireParamType<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
}

/// An absent `value` is the engine's typed NULL.
#[derive(Debug, Serialize)]
struct WireParamValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl<'a> From<&'a QueryParam> for WireParam<'a> {
    fn from(param: &'a QueryParam) -> Self {
        let value = match &param.value {
            ParamValue::Null => None,
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Int64(i) => Some(i.to_string()),
            ParamValue::String(s) => Some(s.clone()),
        };
        Self {
            name: &param.name,
            parameter_type: WireParamType {
                type_name: param.param_type.as_str(),
            },
            parameter_value: WireParamValue { value },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<RawRow>,
    /// int64 encoded as a string
    total_bytes_processed: Option<String>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<ColumnSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: Option<String>,
}

impl QueryResponse {
    fn into_result_set(self, query_timeout: Duration) -> ToolResult<RawResultSet> {
        if !self.job_complete {
            return Err(ToolError::remote_timeout(
                "warehouse query",
                query_timeout.as_secs(),
            ));
        }
        let columns = self
            .schema
            .map(|schema| schema.fields)
            .ok_or_else(|| ToolError::internal("completed query job returned no schema"))?;

        Ok(RawResultSet {
            columns,
            rows: self.rows,
            total_bytes_processed: self
                .total_bytes_processed
                .and_then(|bytes| bytes.parse().ok()),
            more_pages: self.page_token.is_some(),
            job_id: self.job_reference.and_then(|job| job.job_id),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    reason: Option<String>,
}

/// Map a non-success HTTP response to the error taxonomy.
fn error_from_response(status: StatusCode, body: &str, query_timeout: Duration) -> ToolError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let reason = envelope
        .error
        .errors
        .into_iter()
        .find_map(|item| item.reason);
    let message = if envelope.error.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        envelope.error.message
    };

    let quota = matches!(
        reason.as_deref(),
        Some("rateLimitExceeded" | "quotaExceeded")
    );
    match status {
        StatusCode::UNAUTHORIZED => ToolError::remote_auth(message),
        StatusCode::FORBIDDEN if !quota => ToolError::remote_auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            ToolError::remote_timeout("warehouse query", query_timeout.as_secs())
        }
        _ => ToolError::remote_query(message, reason),
    }
}

fn transport_error(err: reqwest::Error, query_timeout: Duration) -> ToolError {
    if err.is_timeout() {
        ToolError::remote_timeout("warehouse query", query_timeout.as_secs())
    } else {
        ToolError::remote_query(format!("request failed: {}", err), None)
    }
}
