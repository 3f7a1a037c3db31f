//! Tool argument models.
//!
//! Raw arguments arrive as an untyped JSON object. Validation turns them into
//! [`ValidatedArguments`], where identifier arguments are [`SafeIdentifier`]s
//! and value arguments are typed [`QueryParam`] bindings. The binder only
//! accepts the validated form, so unchecked text cannot reach query text.

use crate::error::ValidationError;
use crate::models::query::QueryParam;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Untyped caller arguments: argument name to JSON value.
pub type RawArguments = serde_json::Map<String, serde_json::Value>;

/// Longest identifier accepted for substitution.
pub const IDENTIFIER_MAX_LEN: usize = 1024;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid identifier regex"))
}

/// Text that passed the identifier character-class check and may be
/// substituted into query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeIdentifier(String);

impl SafeIdentifier {
    /// Check `raw` against the identifier rules. `field` names the argument
    /// in the error.
    pub fn parse(field: &str, raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::unsafe_identifier(field, "identifier is empty"));
        }
        if raw.len() > IDENTIFIER_MAX_LEN {
            return Err(ValidationError::unsafe_identifier(
                field,
                format!("identifier exceeds {} bytes", IDENTIFIER_MAX_LEN),
            ));
        }
        if !identifier_pattern().is_match(raw) {
            let offending = raw
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
                .unwrap_or('?');
            return Err(ValidationError::unsafe_identifier(
                field,
                format!(
                    "character {:?} is not allowed; only ASCII letters, digits, '_' and '-' are",
                    offending
                ),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SafeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One validated argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Identifier(SafeIdentifier),
    Value(QueryParam),
}

/// Validated arguments for one invocation, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArguments {
    args: BTreeMap<String, ArgValue>,
}

impl ValidatedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_identifier(&mut self, name: impl Into<String>, identifier: SafeIdentifier) {
        self.args
            .insert(name.into(), ArgValue::Identifier(identifier));
    }

    /// Insert a value binding, keyed by the binding's own name.
    pub fn insert_value(&mut self, param: QueryParam) {
        self.args.insert(param.name.clone(), ArgValue::Value(param));
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    /// The identifier argument named `name`, if it is one.
    pub fn identifier(&self, name: &str) -> Option<&SafeIdentifier> {
        match self.args.get(name) {
            Some(ArgValue::Identifier(identifier)) => Some(identifier),
            _ => None,
        }
    }

    /// The value binding named `name`, if it is one.
    pub fn value(&self, name: &str) -> Option<&QueryParam> {
        match self.args.get(name) {
            Some(ArgValue::Value(param)) => Some(param),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_identifier_class() {
        for ok in ["sales", "europe-west2", "A_b-9", "_"] {
            assert_eq!(SafeIdentifier::parse("f", ok).unwrap().as_str(), ok);
        }
    }

    #[test]
    fn test_rejects_injection_attempts() {
        for bad in [
            "sales; DROP TABLE x",
            "a`b",
            "x'--",
            "region.name",
            "tab\there",
            "dätä",
            "a b",
            "a\nb",
        ] {
            let err = SafeIdentifier::parse("dataset_id", bad).unwrap_err();
            assert!(err.is_unsafe_identifier(), "{:?} should be unsafe", bad);
            assert_eq!(err.field(), "dataset_id");
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(SafeIdentifier::parse("f", "").is_err());
        let long = "a".repeat(IDENTIFIER_MAX_LEN + 1);
        assert!(SafeIdentifier::parse("f", &long).is_err());
        let max = "a".repeat(IDENTIFIER_MAX_LEN);
        assert!(SafeIdentifier::parse("f", &max).is_ok());
    }

    #[test]
    fn test_error_names_offending_character() {
        let err = SafeIdentifier::parse("region", "eu;x").unwrap_err();
        assert!(err.to_string().contains("';'"));
    }

    #[test]
    fn test_typed_lookups() {
        let mut args = ValidatedArguments::new();
        args.insert_identifier("region", SafeIdentifier::parse("region", "us-east1").unwrap());
        args.insert_value(QueryParam::string("dataset_id", "sales"));

        assert!(args.identifier("region").is_some());
        assert!(args.value("region").is_none());
        assert!(args.value("dataset_id").is_some());
        assert!(args.identifier("dataset_id").is_none());
        assert_eq!(args.len(), 2);
    }
}
