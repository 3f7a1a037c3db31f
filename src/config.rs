//! Configuration handling for the BigQuery MCP Server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::BigQueryConfig;
use crate::models::{DEFAULT_MAX_RESULTS, DEFAULT_QUERY_TIMEOUT_SECS, MAX_QUERY_TIMEOUT_SECS};
use crate::tools::{DEFAULT_REGION, REGIONS};
use clap::{Parser, ValueEnum};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Labels attached to every query job unless overridden. The recent-queries
/// template filters out jobs carrying `caller=ai-agent`.
pub const DEFAULT_JOB_LABELS: &[(&str, &str)] =
    &[("project", "bigquery-mcp"), ("caller", "ai-agent")];

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// HTTP with Server-Sent Events (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// A job label parsed from a `key=value` CLI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLabel {
    pub key: String,
    pub value: String,
}

fn label_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]{0,62}$").expect("valid label key regex"))
}

fn label_value_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_-]{0,63}$").expect("valid label value regex"))
}

impl JobLabel {
    /// Parse a label from CLI argument.
    ///
    /// # Format
    ///
    /// ```text
    /// team=analytics
    /// env=prod
    /// ```
    ///
    /// Keys start with a lowercase letter; keys and values hold at most 63
    /// lowercase letters, digits, `_` or `-`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("Invalid label '{}': expected key=value", s))?;
        let key = key.trim();
        let value = value.trim();

        if !label_key_pattern().is_match(key) {
            return Err(format!(
                "Invalid label key '{}': must start with a lowercase letter and contain \
                 at most 63 lowercase letters, digits, '_' or '-'",
                key
            ));
        }
        if !label_value_pattern().is_match(value) {
            return Err(format!(
                "Invalid label value '{}' for key '{}': at most 63 lowercase letters, \
                 digits, '_' or '-'",
                value, key
            ));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Configuration for the BigQuery MCP Server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bigquery-mcp-server",
    about = "MCP server exposing read-only BigQuery discovery tools to AI assistants",
    version,
    author
)]
pub struct Config {
    /// Google Cloud project that query jobs run in and are billed to
    #[arg(short, long, value_name = "PROJECT_ID", env = "BIGQUERY_PROJECT")]
    pub project: Option<String>,

    /// Default region for region-scoped tools
    #[arg(long, default_value = DEFAULT_REGION, env = "BIGQUERY_REGION")]
    pub region: String,

    /// OAuth2 access token, e.g. from `gcloud auth print-access-token`
    #[arg(long, env = "BIGQUERY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// BigQuery REST API base URL
    #[arg(long, default_value = DEFAULT_API_BASE_URL, env = "BIGQUERY_API_BASE_URL")]
    pub api_base_url: String,

    /// Query timeout in seconds (max 300)
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Page size requested from the warehouse
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS, env = "MCP_MAX_RESULTS")]
    pub max_results: u32,

    /// Extra job labels. Format: "key=value".
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "label",
        value_name = "KEY=VALUE",
        env = "BIGQUERY_JOB_LABELS",
        value_delimiter = ','
    )]
    pub labels: Vec<String>,

    /// Directory of `<template>.sql` files overriding the built-in templates
    #[arg(long, value_name = "DIR", env = "MCP_TEMPLATE_DIR")]
    pub template_dir: Option<PathBuf>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            project: None,
            region: DEFAULT_REGION.to_string(),
            access_token: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_results: DEFAULT_MAX_RESULTS,
            labels: Vec::new(),
            template_dir: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Job labels: defaults first, then CLI labels (later keys win).
    pub fn parse_labels(&self) -> Result<BTreeMap<String, String>, String> {
        let mut labels: BTreeMap<String, String> = DEFAULT_JOB_LABELS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for raw in &self.labels {
            let label = JobLabel::parse(raw)?;
            labels.insert(label.key, label.value);
        }
        Ok(labels)
    }

    /// Check settings that clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        match self.project.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(
                    "A project must be configured (--project or BIGQUERY_PROJECT)".to_string(),
                );
            }
            Some(project) => {
                if !project
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
                {
                    return Err(format!("Invalid project id '{}'", project));
                }
            }
        }
        if !REGIONS.contains(&self.region.as_str()) {
            return Err(format!(
                "Unsupported region '{}'. Must be one of: {}",
                self.region,
                REGIONS.join(", ")
            ));
        }
        if self.query_timeout == 0 || self.query_timeout > MAX_QUERY_TIMEOUT_SECS {
            return Err(format!(
                "query_timeout must be between 1 and {} seconds",
                MAX_QUERY_TIMEOUT_SECS
            ));
        }
        if self.max_results == 0 {
            return Err("max_results must be greater than 0".to_string());
        }
        Url::parse(&self.api_base_url).map_err(|e| format!("Invalid API base URL: {e}"))?;
        self.parse_labels()?;
        Ok(())
    }

    /// Executor settings derived from this configuration.
    pub fn bigquery_config(&self) -> Result<BigQueryConfig, String> {
        self.validate()?;
        Ok(BigQueryConfig {
            project_id: self.project.as_deref().unwrap_or_default().trim().to_string(),
            access_token: self
                .access_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
            api_base_url: Url::parse(&self.api_base_url)
                .map_err(|e| format!("Invalid API base URL: {e}"))?,
            labels: self.parse_labels()?,
            max_results: self.max_results,
        })
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Config {
        Config {
            project: Some("acme-analytics".to_string()),
            ..Config::default_config()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.region, "europe-west2");
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.query_timeout, 30);
        assert!(!config.enable_logs);
    }

    #[test]
    fn test_http_bind_addr() {
        let mut config = Config::default_config();
        config.http_host = "0.0.0.0".to_string();
        config.http_port = 3000;
        assert_eq!(config.http_bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_timeout_duration() {
        let config = Config::default_config();
        assert_eq!(config.query_timeout_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_project_required() {
        let err = Config::default_config().validate().unwrap_err();
        assert!(err.contains("project"));
        let config = Config {
            project: Some("   ".to_string()),
            ..Config::default_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_project_characters() {
        let config = Config {
            project: Some("example.com:acme-1".to_string()),
            ..Config::default_config()
        };
        assert!(config.validate().is_ok());
        let config = Config {
            project: Some("acme/../x".to_string()),
            ..Config::default_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_query_timeout_bounds() {
        let mut config = configured();
        config.query_timeout = 0;
        assert!(config.validate().is_err());
        config.query_timeout = 301;
        assert!(config.validate().is_err());
        config.query_timeout = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_region_allow_list() {
        let mut config = configured();
        config.region = "us-east1".to_string();
        assert!(config.validate().is_ok());
        config.region = "asia-east1".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("europe-west2, us-east1"));
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = configured();
        config.api_base_url = "not a url".to_string();
        assert!(config.validate().unwrap_err().contains("API base URL"));
    }

    #[test]
    fn test_default_labels() {
        let labels = configured().parse_labels().unwrap();
        assert_eq!(labels.get("caller").map(String::as_str), Some("ai-agent"));
        assert_eq!(labels.get("project").map(String::as_str), Some("bigquery-mcp"));
    }

    #[test]
    fn test_custom_labels_override_defaults() {
        let mut config = configured();
        config.labels = vec!["team=analytics".to_string(), "project=warehouse-bot".to_string()];
        let labels = config.parse_labels().unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["project"], "warehouse-bot");
        assert_eq!(labels["team"], "analytics");
    }

    #[test]
    fn test_label_parse_errors() {
        assert!(JobLabel::parse("no-equals").is_err());
        assert!(JobLabel::parse("Team=x").is_err());
        assert!(JobLabel::parse("1team=x").is_err());
        assert!(JobLabel::parse("team=Upper").is_err());
        assert!(JobLabel::parse(&format!("k={}", "a".repeat(64))).is_err());
        assert_eq!(
            JobLabel::parse(" env = prod ").unwrap(),
            JobLabel {
                key: "env".to_string(),
                value: "prod".to_string()
            }
        );
        assert_eq!(JobLabel::parse("empty=").unwrap().value, "");
    }

    #[test]
    fn test_bigquery_config() {
        let mut config = configured();
        config.access_token = Some("  ya29.token  ".to_string());
        config.max_results = 250;
        let bq = config.bigquery_config().unwrap();
        assert_eq!(bq.project_id, "acme-analytics");
        assert_eq!(bq.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(bq.max_results, 250);
        assert_eq!(bq.api_base_url.as_str(), "https://bigquery.googleapis.com/bigquery/v2");
    }

    #[test]
    fn test_blank_access_token_is_none() {
        let mut config = configured();
        config.access_token = Some(String::new());
        assert!(config.bigquery_config().unwrap().access_token.is_none());
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "bigquery-mcp-server",
            "--project",
            "acme",
            "--label",
            "team=data,env=dev",
            "--transport",
            "http",
            "--template-dir",
            "/etc/templates",
        ])
        .unwrap();
        assert_eq!(config.project.as_deref(), Some("acme"));
        assert_eq!(config.labels, vec!["team=data", "env=dev"]);
        assert_eq!(config.transport, TransportMode::Http);
        assert_eq!(config.template_dir, Some(PathBuf::from("/etc/templates")));
    }
}
