//! SQL template store.
//!
//! Templates are trusted, author-controlled SQL. Each one is scanned once at
//! load time into literal text and identifier slots, and its placeholders
//! are recorded so the tool catalog can check them against parameter specs
//! before anything is served.
//!
//! # Placeholder syntax
//!
//! - `{name}`: identifier placeholder, substituted as text. Recognized in
//!   plain SQL and inside backtick-quoted names (`` `region-{region}` ``).
//! - `@name`: value placeholder, left in the text for the engine to bind.
//!
//! Nothing inside string literals or comments is a placeholder, and `@@name`
//! system variables are left alone.

use crate::error::{ToolError, ToolResult};
use crate::models::ParamKind;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Templates compiled into the binary.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("columns", include_str!("../sql/columns.sql")),
    ("dataset_details", include_str!("../sql/dataset_details.sql")),
    ("dataset_ids", include_str!("../sql/dataset_ids.sql")),
    ("datasets", include_str!("../sql/datasets.sql")),
    ("recent_queries", include_str!("../sql/recent_queries.sql")),
    ("relations", include_str!("../sql/relations.sql")),
];

/// A placeholder declared by a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub kind: ParamKind,
}

/// A piece of template text: either literal SQL or an identifier slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Identifier(String),
}

/// An immutable, pre-scanned SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    text: String,
    segments: Vec<Segment>,
    /// Distinct placeholders in order of first appearance
    placeholders: Vec<Placeholder>,
}

impl Template {
    /// Scan template text into segments and placeholders.
    pub fn parse(name: impl Into<String>, text: impl Into<String>) -> ToolResult<Self> {
        let name = name.into();
        let text = text.into();
        let (segments, placeholders) = Scanner::new(&name, &text).scan()?;
        Ok(Self {
            name,
            text,
            segments,
            placeholders,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Placeholders of one kind, in order of first appearance.
    pub fn placeholders_of(&self, kind: ParamKind) -> impl Iterator<Item = &Placeholder> {
        self.placeholders.iter().filter(move |p| p.kind == kind)
    }
}

// =============================================================================
// Scanner
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    /// Inside a '...' or "..." literal
    Quoted(u8),
    Backtick,
    LineComment,
    BlockComment,
}

struct Scanner<'a> {
    template: &'a str,
    text: &'a str,
    bytes: &'a [u8],
    segments: Vec<Segment>,
    placeholders: Vec<Placeholder>,
    literal_start: usize,
}

impl<'a> Scanner<'a> {
    fn new(template: &'a str, text: &'a str) -> Self {
        Self {
            template,
            text,
            bytes: text.as_bytes(),
            segments: Vec::new(),
            placeholders: Vec::new(),
            literal_start: 0,
        }
    }

    fn scan(mut self) -> ToolResult<(Vec<Segment>, Vec<Placeholder>)> {
        let mut state = State::Code;
        let mut i = 0;

        while i < self.bytes.len() {
            let b = self.bytes[i];
            let next = self.bytes.get(i + 1).copied();
            match state {
                State::Code => match b {
                    b'\'' | b'"' => {
                        state = State::Quoted(b);
                        i += 1;
                    }
                    b'`' => {
                        state = State::Backtick;
                        i += 1;
                    }
                    b'#' => {
                        state = State::LineComment;
                        i += 1;
                    }
                    b'-' if next == Some(b'-') => {
                        state = State::LineComment;
                        i += 2;
                    }
                    b'/' if next == Some(b'*') => {
                        state = State::BlockComment;
                        i += 2;
                    }
                    b'{' => i = self.identifier_slot(i)?,
                    b'@' if next == Some(b'@') => {
                        // @@system_variable
                        i = ident_end(self.bytes, i + 2);
                    }
                    b'@' if next.is_some_and(is_ident_start) => {
                        let end = ident_end(self.bytes, i + 1);
                        self.record(&self.text[i + 1..end], ParamKind::Value)?;
                        i = end;
                    }
                    _ => i += 1,
                },
                State::Quoted(quote) => {
                    if b == b'\\' {
                        i += 2;
                    } else {
                        if b == quote {
                            state = State::Code;
                        }
                        i += 1;
                    }
                }
                State::Backtick => match b {
                    b'`' => {
                        state = State::Code;
                        i += 1;
                    }
                    b'{' => i = self.identifier_slot(i)?,
                    _ => i += 1,
                },
                State::LineComment => {
                    if b == b'\n' {
                        state = State::Code;
                    }
                    i += 1;
                }
                State::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        state = State::Code;
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
            }
        }

        match state {
            State::Quoted(_) => return Err(self.error("unterminated string literal")),
            State::Backtick => return Err(self.error("unterminated quoted identifier")),
            State::BlockComment => return Err(self.error("unterminated block comment")),
            State::Code | State::LineComment => {}
        }

        if self.literal_start < self.text.len() {
            self.segments
                .push(Segment::Text(self.text[self.literal_start..].to_string()));
        }
        Ok((self.segments, self.placeholders))
    }

    /// Consume `{name}` starting at `start`; returns the index after `}`.
    fn identifier_slot(&mut self, start: usize) -> ToolResult<usize> {
        let end = ident_end(self.bytes, start + 1);
        if end == start + 1 || self.bytes.get(end) != Some(&b'}') {
            return Err(self.error(format!(
                "malformed identifier placeholder at byte {}",
                start
            )));
        }
        let name = &self.text[start + 1..end];
        self.record(name, ParamKind::Identifier)?;

        if self.literal_start < start {
            self.segments.push(Segment::Text(
                self.text[self.literal_start..start].to_string(),
            ));
        }
        self.segments.push(Segment::Identifier(name.to_string()));
        self.literal_start = end + 1;
        Ok(end + 1)
    }

    fn record(&mut self, name: &str, kind: ParamKind) -> ToolResult<()> {
        match self.placeholders.iter().find(|p| p.name == name) {
            Some(existing) if existing.kind != kind => Err(self.error(format!(
                "placeholder '{}' is used both as {} and as {}",
                name, existing.kind, kind
            ))),
            Some(_) => Ok(()),
            None => {
                self.placeholders.push(Placeholder {
                    name: name.to_string(),
                    kind,
                });
                Ok(())
            }
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> ToolError {
        ToolError::configuration(format!("template '{}': {}", self.template, message))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn ident_end(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

// =============================================================================
// Template Store
// =============================================================================

/// Process-wide, read-only set of named templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, Arc<Template>>,
}

impl TemplateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding the templates compiled into the binary.
    pub fn builtin() -> ToolResult<Self> {
        Self::from_sources(BUILTIN_TEMPLATES.iter().copied())
    }

    /// Build a store from (name, text) pairs.
    pub fn from_sources<I, N, T>(sources: I) -> ToolResult<Self>
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut store = Self::new();
        for (name, text) in sources {
            store.insert(Template::parse(name, text)?);
        }
        Ok(store)
    }

    /// Add or replace a template. Returns the replaced template, if any.
    pub fn insert(&mut self, template: Template) -> Option<Arc<Template>> {
        debug!(
            template = template.name(),
            placeholders = template.placeholders().len(),
            "Registered template"
        );
        self.templates
            .insert(template.name().to_string(), Arc::new(template))
    }

    /// Load `<name>.sql` files from a directory, replacing templates of the
    /// same name. Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: &Path) -> ToolResult<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ToolError::configuration(format!(
                "cannot read template directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| ToolError::configuration(format!("template directory entry: {}", e)))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!(path = %path.display(), "Skipping template with non UTF-8 name");
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|e| {
                ToolError::configuration(format!("cannot read {}: {}", path.display(), e))
            })?;
            if self.insert(Template::parse(name, text)?).is_some() {
                info!(template = name, "Overriding built-in template");
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Fetch a template by name.
    pub fn load(&self, name: &str) -> ToolResult<Arc<Template>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::template_not_found(name))
    }

    /// Template names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn names_of(template: &Template, kind: ParamKind) -> Vec<&str> {
        template
            .placeholders_of(kind)
            .map(|p| p.name.as_str())
            .collect()
    }

    #[test]
    fn test_parse_both_kinds() {
        let template = Template::parse(
            "t",
            "SELECT * FROM `region-{region}`.INFORMATION_SCHEMA.JOBS WHERE a = @dataset_id",
        )
        .unwrap();
        assert_eq!(names_of(&template, ParamKind::Identifier), vec!["region"]);
        assert_eq!(names_of(&template, ParamKind::Value), vec!["dataset_id"]);
    }

    #[test]
    fn test_segments_split_on_identifiers() {
        let template = Template::parse("t", "SELECT 1 FROM `{ds}`.t").unwrap();
        assert_eq!(
            template.segments(),
            &[
                Segment::Text("SELECT 1 FROM `".to_string()),
                Segment::Identifier("ds".to_string()),
                Segment::Text("`.t".to_string()),
            ]
        );
    }

    #[test]
    fn test_literals_and_comments_are_not_placeholders() {
        let template = Template::parse(
            "t",
            "-- uses @nothing and {nothing}\n\
             SELECT 'a@b.com', \"{x}\" /* @y {z} */ # @w\n\
             FROM t WHERE b = @real",
        )
        .unwrap();
        assert_eq!(names_of(&template, ParamKind::Value), vec!["real"]);
        assert_eq!(names_of(&template, ParamKind::Identifier).len(), 0);
    }

    #[test]
    fn test_system_variables_are_skipped() {
        let template = Template::parse("t", "SELECT @@project_id, @p").unwrap();
        assert_eq!(names_of(&template, ParamKind::Value), vec!["p"]);
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let template = Template::parse("t", r"SELECT 'it\'s @not' , @yes").unwrap();
        assert_eq!(names_of(&template, ParamKind::Value), vec!["yes"]);
    }

    #[test]
    fn test_repeated_placeholders_are_deduplicated() {
        let template = Template::parse("t", "SELECT @a, @b, @a FROM `{r}`.x JOIN `{r}`.y").unwrap();
        assert_eq!(names_of(&template, ParamKind::Value), vec!["a", "b"]);
        assert_eq!(names_of(&template, ParamKind::Identifier), vec!["r"]);
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let err = Template::parse("t", "SELECT @x FROM `{x}`.t").unwrap_err();
        assert!(matches!(err, ToolError::Configuration { .. }));
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_malformed_brace_rejected() {
        let err = Template::parse("t", "SELECT * FROM {region").unwrap_err();
        assert!(err.to_string().contains("malformed identifier placeholder"));
        assert!(Template::parse("t", "SELECT {}").is_err());
    }

    #[test]
    fn test_unterminated_literal_rejected() {
        let err = Template::parse("t", "SELECT 'open").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_builtin_store_loads() {
        let store = TemplateStore::builtin().unwrap();
        assert_eq!(
            store.names(),
            vec![
                "columns",
                "dataset_details",
                "dataset_ids",
                "datasets",
                "recent_queries",
                "relations"
            ]
        );
        let datasets = store.load("datasets").unwrap();
        assert_eq!(names_of(&datasets, ParamKind::Identifier), vec!["region"]);
        assert_eq!(names_of(&datasets, ParamKind::Value).len(), 0);
    }

    #[test]
    fn test_dataset_details_template_placeholders() {
        let store = TemplateStore::builtin().unwrap();
        let template = store.load("dataset_details").unwrap();
        // region appears three times but is recorded once
        assert_eq!(names_of(&template, ParamKind::Identifier), vec!["region"]);
        assert_eq!(names_of(&template, ParamKind::Value), vec!["dataset_id"]);
    }

    #[test]
    fn test_descriptions_are_unescaped() {
        let store = TemplateStore::builtin().unwrap();
        for name in ["datasets", "relations", "dataset_details"] {
            let text = store.load(name).unwrap().text().to_string();
            assert!(text.contains("JSON_VALUE("), "{}", name);
            assert!(!text.contains("\n  TRIM("), "{}", name);
        }
    }

    #[test]
    fn test_recent_queries_template_placeholders() {
        let store = TemplateStore::builtin().unwrap();
        let template = store.load("recent_queries").unwrap();
        assert_eq!(names_of(&template, ParamKind::Identifier), vec!["region"]);
        assert_eq!(
            names_of(&template, ParamKind::Value),
            vec!["dataset_id", "relation_id"]
        );
    }

    #[test]
    fn test_load_missing_template() {
        let store = TemplateStore::builtin().unwrap();
        let err = store.load("does_not_exist").unwrap_err();
        assert!(matches!(err, ToolError::TemplateNotFound { ref name } if name == "does_not_exist"));
    }

    #[test]
    fn test_load_is_cached() {
        let store = TemplateStore::builtin().unwrap();
        let first = store.load("datasets").unwrap();
        let second = store.load("datasets").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_load_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("datasets.sql")).unwrap();
        writeln!(file, "SELECT schema_name AS dataset FROM `region-{{region}}`.X").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut store = TemplateStore::builtin().unwrap();
        let loaded = store.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(store.len(), 6);
        assert!(store.load("datasets").unwrap().text().contains(".X"));
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let mut store = TemplateStore::new();
        let err = store
            .load_dir(Path::new("/definitely/not/a/template/dir"))
            .unwrap_err();
        assert!(matches!(err, ToolError::Configuration { .. }));
    }
}
