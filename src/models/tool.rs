//! Tool definition data models.
//!
//! A tool is a named operation backed by exactly one SQL template. Its
//! parameter list is the only thing callers can influence, so every
//! parameter declares how it reaches the query: as an identifier spliced
//! into the text, or as a typed value bound out of band.

use crate::models::query::EngineType;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// How a parameter reaches the rendered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Substituted into the query text after the identifier check
    Identifier,
    /// Bound as a typed query parameter, never substituted
    Value,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::Value => write!(f, "value"),
        }
    }
}

/// Closed set of semantic argument types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticType {
    String,
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Boolean,
}

impl SemanticType {
    /// Build an enum type from string slices.
    pub fn one_of(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// Engine type used when the argument is bound as a value.
    pub fn engine_type(&self) -> EngineType {
        match self {
            Self::String | Self::Enum(_) => EngineType::String,
            Self::Integer { .. } => EngineType::Int64,
            Self::Boolean => EngineType::Bool,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Enum(_) => "enum",
            Self::Integer { .. } => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// True when the type is textual and can therefore name an identifier.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Enum(_))
    }
}

/// Declaration of one accepted argument.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub semantic_type: SemanticType,
    pub required: bool,
    /// Extra constraint applied after the type check
    pub pattern: Option<Regex>,
    /// Longest accepted string, in characters
    pub max_len: Option<usize>,
    /// Raw default, validated exactly like a caller-supplied value
    pub default: Option<JsonValue>,
    pub description: String,
}

impl ParameterSpec {
    /// A required identifier parameter (textual substitution).
    pub fn identifier(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Identifier,
            semantic_type: SemanticType::String,
            required: true,
            pattern: None,
            max_len: None,
            default: None,
            description: String::new(),
        }
    }

    /// A required value parameter (typed binding).
    pub fn value(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value,
            semantic_type,
            required: true,
            pattern: None,
            max_len: None,
            default: None,
            description: String::new(),
        }
    }

    /// Restrict the argument to a fixed set of values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.semantic_type = SemanticType::one_of(values);
        self
    }

    pub fn matching(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    /// Make the argument optional, falling back to `default` when absent.
    pub fn with_default(mut self, default: impl Into<JsonValue>) -> Self {
        self.required = false;
        self.default = Some(default.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Post-processing applied after normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcess {
    /// Cap on returned records
    pub max_rows: Option<usize>,
    /// The template orders rows randomly server-side; repeated calls may differ
    pub randomized: bool,
}

impl PostProcess {
    pub fn capped(max_rows: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            randomized: false,
        }
    }

    pub fn sampled(max_rows: usize) -> Self {
        Self {
            max_rows: Some(max_rows),
            randomized: true,
        }
    }
}

/// One labelled field in the human-readable rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutField {
    pub label: String,
    pub column: String,
}

impl LayoutField {
    pub fn new(label: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            column: column.into(),
        }
    }
}

/// Human-readable layout: a header line for the whole listing, then per
/// record the summary fields, a rule, and the long-form body field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    pub header: String,
    pub fields: Vec<LayoutField>,
    pub body: LayoutField,
}

/// A named, schema-described operation backed by one template.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    /// Name of the template in the template store
    pub template: String,
    pub post_process: PostProcess,
    pub layout: TextLayout,
}

impl ToolDefinition {
    /// Look up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Parameters of one kind, in declaration order.
    pub fn parameters_of(&self, kind: ParamKind) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(move |p| p.kind == kind)
    }
}
