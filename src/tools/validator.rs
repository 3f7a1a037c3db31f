//! Argument validation.
//!
//! Checks a raw argument object against a tool's parameter specs and
//! produces [`ValidatedArguments`]. Validation runs before any template is
//! touched, and the first failure ends it.
//!
//! Order of checks for each argument:
//! 1. Presence (missing required, unknown names)
//! 2. JSON type against the semantic type
//! 3. Identifier character class (identifier parameters only)
//! 4. Length, enum membership and integer bounds
//! 5. Pattern
//!
//! Defaults go through the same checks as caller values. An explicit JSON
//! `null` counts as absent.

use crate::error::ValidationError;
use crate::models::{
    ParamKind, ParamValue, ParameterSpec, QueryParam, RawArguments, SafeIdentifier,
    SemanticType, ToolDefinition, ValidatedArguments,
};
use serde_json::Value as JsonValue;

/// Validate `raw` against `tool`'s parameters.
pub fn validate(
    tool: &ToolDefinition,
    raw: &RawArguments,
) -> Result<ValidatedArguments, ValidationError> {
    if let Some(unknown) = raw.keys().find(|name| tool.parameter(name).is_none()) {
        return Err(ValidationError::unknown(unknown.as_str()));
    }

    let mut validated = ValidatedArguments::new();
    for spec in &tool.parameters {
        let supplied = raw.get(&spec.name).filter(|value| !value.is_null());
        let value = match (supplied, &spec.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default,
            (None, None) if spec.required => return Err(ValidationError::missing(&spec.name)),
            (None, None) => {
                // Optional value without default binds a typed NULL. Optional
                // identifiers without a default are rejected when the catalog
                // is built, so nothing is substituted here.
                if spec.kind == ParamKind::Value {
                    validated.insert_value(QueryParam::new(
                        &spec.name,
                        spec.semantic_type.engine_type(),
                        ParamValue::Null,
                    ));
                }
                continue;
            }
        };
        validate_one(spec, value, &mut validated)?;
    }
    Ok(validated)
}

/// Check a spec's default the way a caller-supplied value would be checked.
pub fn validate_default(spec: &ParameterSpec) -> Result<(), ValidationError> {
    match &spec.default {
        Some(default) => validate_one(spec, default, &mut ValidatedArguments::new()),
        None => Ok(()),
    }
}

fn validate_one(
    spec: &ParameterSpec,
    value: &JsonValue,
    validated: &mut ValidatedArguments,
) -> Result<(), ValidationError> {
    let field = spec.name.as_str();
    match &spec.semantic_type {
        SemanticType::String | SemanticType::Enum(_) => {
            let text = value
                .as_str()
                .ok_or_else(|| type_mismatch(field, "a string", value))?;

            // Identifier safety comes first so hostile text is reported as such
            let identifier = match spec.kind {
                ParamKind::Identifier => Some(SafeIdentifier::parse(field, text)?),
                ParamKind::Value => None,
            };
            check_length(spec, text)?;
            check_enum(spec, text)?;
            check_pattern(spec, text)?;

            match identifier {
                Some(identifier) => validated.insert_identifier(field, identifier),
                None => validated.insert_value(QueryParam::string(field, text)),
            }
        }
        SemanticType::Integer { min, max } => {
            let number = value
                .as_i64()
                .ok_or_else(|| type_mismatch(field, "an integer", value))?;
            if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                return Err(ValidationError::invalid(
                    field,
                    format!("{} is out of range {}", number, describe_range(*min, *max)),
                ));
            }
            validated.insert_value(QueryParam::new(
                field,
                spec.semantic_type.engine_type(),
                ParamValue::Int64(number),
            ));
        }
        SemanticType::Boolean => {
            let flag = value
                .as_bool()
                .ok_or_else(|| type_mismatch(field, "a boolean", value))?;
            validated.insert_value(QueryParam::new(
                field,
                spec.semantic_type.engine_type(),
                ParamValue::Bool(flag),
            ));
        }
    }
    Ok(())
}

fn check_length(spec: &ParameterSpec, text: &str) -> Result<(), ValidationError> {
    match spec.max_len {
        Some(max_len) if text.chars().count() > max_len => Err(ValidationError::invalid(
            &spec.name,
            format!("longer than {} characters", max_len),
        )),
        _ => Ok(()),
    }
}

fn check_enum(spec: &ParameterSpec, text: &str) -> Result<(), ValidationError> {
    match &spec.semantic_type {
        SemanticType::Enum(allowed) if !allowed.iter().any(|v| v == text) => {
            Err(ValidationError::invalid(
                &spec.name,
                format!("'{}' is not valid. Must be one of: {}", text, allowed.join(", ")),
            ))
        }
        _ => Ok(()),
    }
}

fn check_pattern(spec: &ParameterSpec, text: &str) -> Result<(), ValidationError> {
    match &spec.pattern {
        Some(pattern) if !pattern.is_match(text) => Err(ValidationError::invalid(
            &spec.name,
            format!("'{}' does not match pattern {}", text, pattern.as_str()),
        )),
        _ => Ok(()),
    }
}

fn type_mismatch(field: &str, expected: &str, got: &JsonValue) -> ValidationError {
    let actual = match got {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    };
    ValidationError::invalid(field, format!("expected {}, got {}", expected, actual))
}

fn describe_range(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{}, {}]", min, max),
        (Some(min), None) => format!(">= {}", min),
        (None, Some(max)) => format!("<= {}", max),
        (None, None) => "(unbounded)".to_string(),
    }
}
