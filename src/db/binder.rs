//! Two-phase query binding.
//!
//! Phase one substitutes identifier slots with their [`SafeIdentifier`]
//! text. Phase two collects the typed value bindings for every `@name`
//! marker, which stay in the query text for the engine to resolve.
//!
//! A placeholder with no matching argument of the right kind is a
//! configuration gap, reported as a render error rather than a caller error.

use crate::db::template::{Segment, Template};
use crate::error::{ToolError, ToolResult};
use crate::models::{BoundQuery, ParamKind, ValidatedArguments};

/// Render `template` with validated arguments.
pub fn bind(template: &Template, args: &ValidatedArguments) -> ToolResult<BoundQuery> {
    let sql = substitute_identifiers(template, args)?;

    let params = template
        .placeholders_of(ParamKind::Value)
        .map(|placeholder| {
            args.value(&placeholder.name).cloned().ok_or_else(|| {
                ToolError::template_render(
                    template.name(),
                    format!("no value binding for @{}", placeholder.name),
                )
            })
        })
        .collect::<ToolResult<Vec<_>>>()?;

    Ok(BoundQuery {
        template: template.name().to_string(),
        sql,
        params,
    })
}

fn substitute_identifiers(template: &Template, args: &ValidatedArguments) -> ToolResult<String> {
    let mut sql = String::with_capacity(template.text().len());
    for segment in template.segments() {
        match segment {
            Segment::Text(text) => sql.push_str(text),
            Segment::Identifier(name) => {
                let identifier = args.identifier(name).ok_or_else(|| {
                    ToolError::template_render(
                        template.name(),
                        format!("no identifier argument for {{{}}}", name),
                    )
                })?;
                sql.push_str(identifier.as_str());
            }
        }
    }
    Ok(sql)
}
