//! Template loading and catalog consistency tests.
//!
//! Covers overriding built-in templates from a directory, and the startup
//! check that every template placeholder lines up with a tool parameter.

use bigquery_mcp_server::ToolError;
use bigquery_mcp_server::db::TemplateStore;
use bigquery_mcp_server::models::ParamKind;
use bigquery_mcp_server::tools::{DEFAULT_REGION, ToolCatalog};
use std::fs;
use tempfile::TempDir;

fn write_template(dir: &TempDir, name: &str, text: &str) {
    fs::write(dir.path().join(format!("{}.sql", name)), text).unwrap();
}

#[test]
fn test_builtin_templates_match_catalog() {
    let store = TemplateStore::builtin().unwrap();
    let catalog = ToolCatalog::builtin(&store, DEFAULT_REGION).unwrap();

    assert_eq!(
        catalog.names(),
        vec![
            "get_dataset",
            "list_columns",
            "list_dataset_ids",
            "list_datasets",
            "list_recent_queries",
            "list_relations"
        ]
    );

    for tool in catalog.iter() {
        let template = store.load(&tool.template).unwrap();
        for placeholder in template.placeholders() {
            let spec = tool.parameter(&placeholder.name).unwrap();
            assert_eq!(spec.kind, placeholder.kind, "{}", tool.name);
        }
        for spec in &tool.parameters {
            assert!(
                template
                    .placeholders()
                    .iter()
                    .any(|p| p.name == spec.name && p.kind == spec.kind),
                "{} declares unused parameter {}",
                tool.name,
                spec.name
            );
        }
    }
}

#[test]
fn test_builtin_placeholder_kinds() {
    let store = TemplateStore::builtin().unwrap();

    let recent = store.load("recent_queries").unwrap();
    let identifiers: Vec<&str> = recent
        .placeholders_of(ParamKind::Identifier)
        .map(|p| p.name.as_str())
        .collect();
    let values: Vec<&str> = recent
        .placeholders_of(ParamKind::Value)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(identifiers, vec!["region"]);
    assert_eq!(values, vec!["dataset_id", "relation_id"]);

    let columns = store.load("columns").unwrap();
    assert_eq!(
        columns
            .placeholders_of(ParamKind::Identifier)
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>(),
        vec!["dataset_id"]
    );
}

#[test]
fn test_override_directory_replaces_builtin() {
    let dir = TempDir::new().unwrap();
    write_template(
        &dir,
        "datasets",
        "SELECT schema_name AS dataset, 'n/a' AS description\n\
         FROM `region-{region}`.INFORMATION_SCHEMA.SCHEMATA\n\
         ORDER BY dataset",
    );
    write_template(&dir, "notes", "SELECT 1");
    fs::write(dir.path().join("README.txt"), "not a template").unwrap();

    let mut store = TemplateStore::builtin().unwrap();
    let builtin_count = store.len();
    let loaded = store.load_dir(dir.path()).unwrap();

    assert_eq!(loaded, 2);
    assert_eq!(store.len(), builtin_count + 1);
    assert!(
        store
            .load("datasets")
            .unwrap()
            .text()
            .contains("INFORMATION_SCHEMA.SCHEMATA\n")
    );

    // The override still agrees with list_datasets, so the catalog builds
    ToolCatalog::builtin(&store, DEFAULT_REGION).unwrap();
}

#[test]
fn test_override_with_stray_placeholder_fails_startup() {
    let dir = TempDir::new().unwrap();
    write_template(
        &dir,
        "relations",
        "SELECT table_name FROM `{dataset_id}`.INFORMATION_SCHEMA.TABLES \
         WHERE table_type = @relation_type",
    );

    let mut store = TemplateStore::builtin().unwrap();
    store.load_dir(dir.path()).unwrap();

    let err = ToolCatalog::builtin(&store, DEFAULT_REGION).unwrap_err();
    assert!(matches!(err, ToolError::Configuration { .. }));
    let message = err.to_string();
    assert!(message.contains("list_relations"), "{}", message);
    assert!(message.contains("relation_type"), "{}", message);
}

#[test]
fn test_override_with_kind_swap_fails_startup() {
    let dir = TempDir::new().unwrap();
    // dataset_id spliced as text where list_recent_queries binds it
    write_template(
        &dir,
        "recent_queries",
        "SELECT job_id FROM `region-{region}`.INFORMATION_SCHEMA.JOBS_BY_PROJECT AS j, \
         UNNEST(j.referenced_tables) AS ref \
         WHERE ref.dataset_id = {dataset_id} AND ref.table_id = @relation_id",
    );

    let mut store = TemplateStore::builtin().unwrap();
    store.load_dir(dir.path()).unwrap();

    let err = ToolCatalog::builtin(&store, DEFAULT_REGION).unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains("'dataset_id' is used as identifier placeholder"),
        "{}",
        message
    );
}

#[test]
fn test_override_with_malformed_template_fails_load() {
    let dir = TempDir::new().unwrap();
    write_template(&dir, "columns", "SELECT * FROM `{dataset_id.COLUMNS");

    let mut store = TemplateStore::builtin().unwrap();
    let err = store.load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ToolError::Configuration { .. }));
    assert!(err.to_string().contains("columns"));
}

#[test]
fn test_missing_override_directory() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");

    let mut store = TemplateStore::builtin().unwrap();
    let err = store.load_dir(&missing).unwrap_err();
    assert!(matches!(err, ToolError::Configuration { .. }));
}
