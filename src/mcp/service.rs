//! MCP service implementation using rmcp.
//!
//! This module defines the WarehouseService struct with the discovery tools
//! exposed via the MCP protocol using the rmcp framework's macros. Every
//! tool runs through the shared dispatcher, and arguments reach it as sent,
//! so a bad argument always comes back as a `validation_error` naming its
//! field.

use crate::tools::discovery::{
    DiscoveryToolHandler, GetDatasetInput, ListColumnsInput, ListDatasetIdsInput,
    ListDatasetsInput, ListRecentQueriesInput, ListRelationsInput, ToolArguments, ToolInput,
    ToolOutput,
};
use crate::tools::dispatcher::ToolDispatcher;
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct WarehouseService {
    /// Runs typed tool inputs through the shared dispatcher
    handler: DiscoveryToolHandler,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl WarehouseService {
    /// Create a new WarehouseService over a shared dispatcher.
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            handler: DiscoveryToolHandler::new(dispatcher),
            tool_router: Self::tool_router(),
        }
    }

    async fn run<I: ToolInput>(
        &self,
        arguments: ToolArguments<I>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.handler
            .run(arguments)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_router]
impl WarehouseService {
    #[tool(
        description = "List the datasets in a BigQuery region that have a description.\nRegion defaults to the server's region; valid regions are listed in the input schema.\nStart here, then use list_relations on a dataset."
    )]
    async fn list_datasets(
        &self,
        Parameters(arguments): Parameters<ToolArguments<ListDatasetsInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }

    #[tool(
        description = "List the names of every dataset in a BigQuery region, described or not.\nUse it when list_datasets misses a dataset you expect to exist."
    )]
    async fn list_dataset_ids(
        &self,
        Parameters(arguments): Parameters<ToolArguments<ListDatasetIdsInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }

    #[tool(
        description = "Show one dataset's location, creation and modification time, labels and description.\nReturns no records when the dataset does not exist in that region."
    )]
    async fn get_dataset(
        &self,
        Parameters(arguments): Parameters<ToolArguments<GetDatasetInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }

    #[tool(
        description = "List the tables and views in a dataset that have a description.\nReturns name, type, creation and modification time, and description."
    )]
    async fn list_relations(
        &self,
        Parameters(arguments): Parameters<ToolArguments<ListRelationsInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }

    #[tool(
        description = "List the described columns of a table or view.\nNested RECORD fields are listed by field path, e.g. `address.city`."
    )]
    async fn list_columns(
        &self,
        Parameters(arguments): Parameters<ToolArguments<ListColumnsInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }

    #[tool(
        description = "Show up to 10 SELECT queries people ran against a table in the last 7 days.\nRows are randomly sampled, so repeated calls may return different queries.\nUse them as examples of how the table is joined and filtered."
    )]
    async fn list_recent_queries(
        &self,
        Parameters(arguments): Parameters<ToolArguments<ListRecentQueriesInput>>,
    ) -> Result<Json<ToolOutput>, McpError> {
        self.run(arguments).await
    }
}

#[tool_handler]
impl ServerHandler for WarehouseService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "bigquery-mcp-server".to_owned(),
                title: Some("BigQuery MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only discovery tools for a BigQuery warehouse.\n\
                \n\
                ## Workflow\n\
                1. `list_datasets` to find datasets in a region\n\
                   (`list_dataset_ids` lists undescribed ones too; `get_dataset` shows one)\n\
                2. `list_relations` with a `dataset_id` to find tables and views\n\
                3. `list_columns` with `dataset_id` and `relation_id` for column details\n\
                4. `list_recent_queries` for real queries people ran against a table\n\
                \n\
                ## Output\n\
                Records are always returned as JSON. Pass `format` = `table`, `markdown`\n\
                or `text` for an additional pre-rendered view.\n\
                \n\
                ## Errors\n\
                - `unsafe_identifier`: a dataset or region name held characters outside\n\
                  letters, digits, `_` and `-`\n\
                - `validation_error`: a missing, unknown or malformed argument; check\n\
                  the `field` in the error data\n\
                - `remote_query_error`: the warehouse rejected the query, usually because\n\
                  the dataset or table does not exist in that region"
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{QueryExecutor, TemplateStore};
    use crate::error::ToolResult;
    use crate::models::{BoundQuery, ColumnSchema, RawResultSet, RawRow};
    use crate::tools::catalog::{DEFAULT_REGION, REGIONS, ToolCatalog};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct StaticExecutor;

    #[async_trait]
    impl QueryExecutor for StaticExecutor {
        async fn execute(&self, _query: &BoundQuery, _timeout: Duration) -> ToolResult<RawResultSet> {
            let mut result = RawResultSet::new(
                vec![
                    ColumnSchema::new("dataset", "STRING"),
                    ColumnSchema::new("description", "STRING"),
                ],
                vec![RawRow::from_values([json!("sales"), json!("Orders and refunds")])],
            );
            result.total_bytes_processed = Some(10_485_760);
            Ok(result)
        }
    }

    fn create_test_service() -> WarehouseService {
        let store = TemplateStore::builtin().unwrap();
        let catalog = ToolCatalog::builtin(&store, DEFAULT_REGION).unwrap();
        let dispatcher = ToolDispatcher::new(catalog, store, Arc::new(StaticExecutor));
        WarehouseService::new(Arc::new(dispatcher))
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "bigquery-mcp-server");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_router_matches_catalog() {
        let service = create_test_service();
        let mut routed: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        routed.sort();
        let catalog = service.handler.dispatcher().catalog().names();
        assert_eq!(routed, catalog);
    }

    fn arguments<I>(value: serde_json::Value) -> Parameters<ToolArguments<I>> {
        Parameters(serde_json::from_value(value).unwrap())
    }

    fn error_of(result: Result<Json<ToolOutput>, McpError>) -> McpError {
        match result {
            Ok(Json(output)) => panic!("expected an error, got {} records", output.row_count),
            Err(err) => err,
        }
    }

    #[test]
    fn test_advertised_schemas_are_closed() {
        let service = create_test_service();
        for tool in service.tool_router.list_all() {
            let schema = serde_json::Value::Object((*tool.input_schema).clone());
            assert_eq!(schema["additionalProperties"], json!(false), "{}", tool.name);
            if let Some(region) = schema["properties"].get("region") {
                assert_eq!(region["enum"], json!(REGIONS), "{}", tool.name);
            }
        }
    }

    #[tokio::test]
    async fn test_list_datasets_text_format() {
        let service = create_test_service();
        let Json(output) = service
            .list_datasets(arguments(json!({"format": "text"})))
            .await
            .unwrap();

        assert_eq!(output.row_count, 1);
        assert_eq!(output.records[0].get("dataset"), Some(&json!("sales")));
        assert!(output.formatted.unwrap().starts_with("DATASETS\n=====\nName: sales"));
        assert_eq!(output.bytes_processed, Some(10_485_760));
    }

    #[tokio::test]
    async fn test_invalid_region_maps_to_invalid_params() {
        let service = create_test_service();
        let err = error_of(
            service
                .list_datasets(arguments(json!({"region": "mars-north1"})))
                .await,
        );
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.data.unwrap()["field"], "region");
    }

    #[tokio::test]
    async fn test_missing_dataset_id_names_field() {
        let service = create_test_service();
        let err = error_of(service.list_relations(arguments(json!({}))).await);
        assert_eq!(err.code.0, -32602);
        let data = err.data.unwrap();
        assert_eq!(data["kind"], "validation_error");
        assert_eq!(data["field"], "dataset_id");
    }

    #[tokio::test]
    async fn test_extra_argument_names_field() {
        let service = create_test_service();
        let err = error_of(
            service
                .list_datasets(arguments(json!({"region": "europe-west2", "limit": 5})))
                .await,
        );
        let data = err.data.unwrap();
        assert_eq!(data["kind"], "validation_error");
        assert_eq!(data["field"], "limit");
    }

    #[tokio::test]
    async fn test_mistyped_argument_names_field() {
        let service = create_test_service();
        let err = error_of(
            service
                .list_columns(arguments(json!({"dataset_id": "sales", "relation_id": 42})))
                .await,
        );
        let data = err.data.unwrap();
        assert_eq!(data["kind"], "validation_error");
        assert_eq!(data["field"], "relation_id");
    }

    #[tokio::test]
    async fn test_unknown_format_names_field() {
        let service = create_test_service();
        let err = error_of(
            service
                .get_dataset(arguments(json!({"dataset_id": "sales", "format": "csv"})))
                .await,
        );
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.data.unwrap()["field"], "format");
    }
}
