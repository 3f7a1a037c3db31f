//! BigQuery MCP Server - Main entry point.
//!
//! This server provides MCP (Model Context Protocol) tools for AI assistants
//! to discover datasets, tables, columns and example queries in BigQuery.

use bigquery_mcp_server::config::{Config, TransportMode};
use bigquery_mcp_server::db::{BigQueryExecutor, TemplateStore};
use bigquery_mcp_server::tools::{ToolCatalog, ToolDispatcher};
use bigquery_mcp_server::transport::{HttpTransport, StdioTransport, Transport};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the stdio transport.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let bigquery = match config.bigquery_config() {
        Ok(bigquery) => bigquery,
        Err(message) => {
            eprintln!("Error: {}", message);
            eprintln!();
            eprintln!("Usage: bigquery-mcp-server --project <project_id> [--region <region>]");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  BIGQUERY_ACCESS_TOKEN=$(gcloud auth print-access-token) \\");
            eprintln!("    bigquery-mcp-server --project acme-analytics");
            eprintln!("  bigquery-mcp-server --project acme-analytics --region us-east1");
            eprintln!("  bigquery-mcp-server --project acme-analytics --label team=data");
            eprintln!("  bigquery-mcp-server --project acme-analytics --transport http --http-port 3000");
            std::process::exit(1);
        }
    };

    info!(
        transport = %config.transport,
        project = %bigquery.project_id,
        region = %config.region,
        "Starting BigQuery MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    if bigquery.access_token.is_none() {
        warn!("No access token configured; tool calls will fail until BIGQUERY_ACCESS_TOKEN is set");
    }

    // Templates, then the catalog checked against them
    let mut store = TemplateStore::builtin()?;
    if let Some(dir) = &config.template_dir {
        let loaded = store.load_dir(dir)?;
        info!(dir = %dir.display(), loaded, "Loaded template overrides");
    }
    let catalog = ToolCatalog::builtin(&store, &config.region)?;
    info!(tools = ?catalog.names(), "Tool catalog ready");

    let executor = Arc::new(BigQueryExecutor::new(bigquery)?);
    let dispatcher = Arc::new(
        ToolDispatcher::new(catalog, store, executor)
            .with_query_timeout(config.query_timeout_duration()),
    );

    // Run the appropriate transport
    let result = match config.transport {
        TransportMode::Stdio => {
            info!("Using stdio transport");
            StdioTransport::new(dispatcher).run().await
        }
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            let transport = HttpTransport::new(
                dispatcher,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            );
            transport.run().await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
