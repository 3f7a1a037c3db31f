//! Tool catalog.
//!
//! The catalog is the fixed set of discovery tools served to agents. Each
//! definition is checked against its template when the catalog is built:
//! every placeholder must have a parameter of the same kind and every
//! parameter must appear in the template. A mismatch stops startup.

use crate::db::TemplateStore;
use crate::error::{ToolError, ToolResult};
use crate::models::{
    LayoutField, ParamKind, ParameterSpec, PostProcess, SemanticType, TextLayout, ToolDefinition,
};
use crate::tools::validator;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Regions the region-scoped tools accept.
pub const REGIONS: &[&str] = &["europe-west2", "us-east1"];

/// Region used when the caller does not pass one.
pub const DEFAULT_REGION: &str = "europe-west2";

/// Cap on sampled query-history entries.
pub const RECENT_QUERY_LIMIT: usize = 10;

/// Longest dataset or relation name BigQuery allows.
const NAME_MAX_LEN: usize = 1024;

fn dataset_id_pattern() -> Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid dataset regex"))
        .clone()
}

fn relation_id_pattern() -> Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^[\p{L}\p{M}\p{N}\p{Pc}\p{Pd}\p{Zs}]+$")
                .expect("valid relation regex")
        })
        .clone()
}

fn region_param(default_region: &str) -> ParameterSpec {
    ParameterSpec::identifier("region")
        .one_of(REGIONS)
        .with_default(default_region)
        .describe(format!(
            "BigQuery region. One of: {}. Default: {}",
            REGIONS.join(", "),
            default_region
        ))
}

fn dataset_param(kind: ParamKind) -> ParameterSpec {
    let spec = match kind {
        ParamKind::Identifier => ParameterSpec::identifier("dataset_id"),
        ParamKind::Value => ParameterSpec::value("dataset_id", SemanticType::String),
    };
    spec.matching(dataset_id_pattern())
        .max_len(NAME_MAX_LEN)
        .describe("Dataset name, as returned by list_datasets")
}

fn relation_param() -> ParameterSpec {
    ParameterSpec::value("relation_id", SemanticType::String)
        .matching(relation_id_pattern())
        .max_len(NAME_MAX_LEN)
        .describe("Table or view name, as returned by list_relations")
}

/// The discovery tools, with region-scoped tools defaulting to `default_region`.
pub fn builtin_definitions(default_region: &str) -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_datasets".to_string(),
            description: "List the datasets in a BigQuery region that have a description"
                .to_string(),
            parameters: vec![region_param(default_region)],
            template: "datasets".to_string(),
            post_process: PostProcess::default(),
            layout: TextLayout {
                header: "DATASETS".to_string(),
                fields: vec![LayoutField::new("Name", "dataset")],
                body: LayoutField::new("Description", "description"),
            },
        },
        ToolDefinition {
            name: "list_dataset_ids".to_string(),
            description: "List every dataset in a BigQuery region, described or not".to_string(),
            parameters: vec![region_param(default_region)],
            template: "dataset_ids".to_string(),
            post_process: PostProcess::default(),
            layout: TextLayout {
                header: "DATASET IDS".to_string(),
                fields: vec![LayoutField::new("Name", "dataset_id")],
                body: LayoutField::new("Location", "location"),
            },
        },
        ToolDefinition {
            name: "get_dataset".to_string(),
            description: "Show one dataset's location, timestamps, labels and description"
                .to_string(),
            parameters: vec![region_param(default_region), dataset_param(ParamKind::Value)],
            template: "dataset_details".to_string(),
            post_process: PostProcess::default(),
            layout: TextLayout {
                header: "DATASET".to_string(),
                fields: vec![
                    LayoutField::new("Name", "dataset"),
                    LayoutField::new("Location", "location"),
                    LayoutField::new("Created", "created_at"),
                    LayoutField::new("Last modified", "last_modified"),
                    LayoutField::new("Labels", "labels"),
                ],
                body: LayoutField::new("Description", "description"),
            },
        },
        ToolDefinition {
            name: "list_relations".to_string(),
            description: "List the described tables and views in a dataset".to_string(),
            parameters: vec![dataset_param(ParamKind::Identifier)],
            template: "relations".to_string(),
            post_process: PostProcess::default(),
            layout: TextLayout {
                header: "RELATIONS".to_string(),
                fields: vec![
                    LayoutField::new("Name", "relation"),
                    LayoutField::new("Type", "relation_type"),
                    LayoutField::new("Created", "created_at"),
                    LayoutField::new("Last modified", "last_modified"),
                ],
                body: LayoutField::new("Description", "description"),
            },
        },
        ToolDefinition {
            name: "list_columns".to_string(),
            description: "List the described columns of a table or view, including nested fields"
                .to_string(),
            parameters: vec![dataset_param(ParamKind::Identifier), relation_param()],
            template: "columns".to_string(),
            post_process: PostProcess::default(),
            layout: TextLayout {
                header: "COLUMNS".to_string(),
                fields: vec![
                    LayoutField::new("Name", "column"),
                    LayoutField::new("Field path", "field_path"),
                    LayoutField::new("Data type", "data_type"),
                ],
                body: LayoutField::new("Description", "description"),
            },
        },
        ToolDefinition {
            name: "list_recent_queries".to_string(),
            description: format!(
                "Return up to {} randomly sampled SELECT queries written by people in the last \
                 7 days that referenced the given table. Useful as worked examples of how the \
                 table is queried",
                RECENT_QUERY_LIMIT
            ),
            parameters: vec![
                region_param(default_region),
                dataset_param(ParamKind::Value),
                relation_param(),
            ],
            template: "recent_queries".to_string(),
            post_process: PostProcess::sampled(RECENT_QUERY_LIMIT),
            layout: TextLayout {
                header: "RECENT QUERIES".to_string(),
                fields: vec![
                    LayoutField::new("Job ID", "job_id"),
                    LayoutField::new("Created at", "creation_time"),
                ],
                body: LayoutField::new("Query", "query"),
            },
        },
    ]
}

/// Immutable set of tool definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<ToolDefinition>>,
}

impl ToolCatalog {
    /// Build a catalog, checking each definition against its template.
    pub fn new(definitions: Vec<ToolDefinition>, store: &TemplateStore) -> ToolResult<Self> {
        if store.is_empty() {
            return Err(ToolError::configuration("no query templates are loaded"));
        }
        let mut tools = BTreeMap::new();
        for definition in definitions {
            check_definition(&definition, store)?;
            let name = definition.name.clone();
            if tools.insert(name.clone(), Arc::new(definition)).is_some() {
                return Err(ToolError::configuration(format!(
                    "tool '{}' is defined twice",
                    name
                )));
            }
            debug!(tool = %name, "Registered tool");
        }
        Ok(Self { tools })
    }

    /// The discovery tools over `store`.
    pub fn builtin(store: &TemplateStore, default_region: &str) -> ToolResult<Self> {
        Self::new(builtin_definitions(default_region), store)
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> ToolResult<Arc<ToolDefinition>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::unknown_tool(name))
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().map(Arc::as_ref)
    }

}

fn check_definition(definition: &ToolDefinition, store: &TemplateStore) -> ToolResult<()> {
    let fail = |message: String| {
        ToolError::configuration(format!("tool '{}': {}", definition.name, message))
    };

    let template = store.load(&definition.template).map_err(|e| match e {
        ToolError::TemplateNotFound { name } => fail(format!("template '{}' not found", name)),
        other => other,
    })?;

    let mut seen = HashSet::new();
    for spec in &definition.parameters {
        if !seen.insert(spec.name.as_str()) {
            return Err(fail(format!("parameter '{}' is declared twice", spec.name)));
        }
        if spec.kind == ParamKind::Identifier {
            if !spec.semantic_type.is_textual() {
                return Err(fail(format!(
                    "identifier parameter '{}' must be textual, not {}",
                    spec.name,
                    spec.semantic_type.name()
                )));
            }
            if !spec.required && spec.default.is_none() {
                return Err(fail(format!(
                    "optional identifier parameter '{}' needs a default",
                    spec.name
                )));
            }
        }
        validator::validate_default(spec)
            .map_err(|e| fail(format!("default rejected: {}", e)))?;
    }

    for placeholder in template.placeholders() {
        match definition.parameter(&placeholder.name) {
            Some(spec) if spec.kind == placeholder.kind => {}
            Some(spec) => {
                return Err(fail(format!(
                    "'{}' is used as {} placeholder but declared as {} parameter",
                    placeholder.name, placeholder.kind, spec.kind
                )));
            }
            None => {
                return Err(fail(format!(
                    "{} placeholder '{}' has no parameter",
                    placeholder.kind, placeholder.name
                )));
            }
        }
    }

    for spec in &definition.parameters {
        let used = template
            .placeholders()
            .iter()
            .any(|p| p.name == spec.name && p.kind == spec.kind);
        if !used {
            return Err(fail(format!(
                "parameter '{}' is not used by template '{}'",
                spec.name,
                template.name()
            )));
        }
    }
    Ok(())
}
