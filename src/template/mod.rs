//! Text templates for release configuration.
//!
//! The syntax is the subset of Go's `text/template` that release
//! configuration uses: field chains such as `.Env.TOKEN`, string helpers,
//! pipelines and `if`/`else`. Error messages match Go's byte for byte because
//! downstream tooling matches on them:
//!
//! ```
//! use shipwright::template::{Fields, Value, render};
//!
//! let mut fields = Fields::new();
//! fields.insert("ProjectName".to_owned(), Value::from("demo"));
//! assert_eq!(render("{{ .ProjectName }}.txt", &fields).unwrap(), "demo.txt");
//!
//! let err = render("{{ .Version }}", &fields).unwrap_err();
//! assert_eq!(
//!     err.to_string(),
//!     r#"template: tmpl:1:3: executing "tmpl" at <.Version>: map has no entry for key "Version""#
//! );
//! ```

mod exec;
mod funcs;
mod lexer;
mod parse;
mod value;

pub use value::{Fields, Value};

use parse::Node;
use thiserror::Error;

/// Name reported in every template error.
const TEMPLATE_NAME: &str = "tmpl";

/// Longest node description quoted in an execution error.
const MAX_NODE_WIDTH: usize = 20;

/// A template failed to parse or to execute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template source is malformed.
    #[error("template: {name}:{line}: {message}")]
    Parse {
        /// Template name.
        name: String,
        /// 1-based line of the failure.
        line: usize,
        /// Parser message.
        message: String,
    },
    /// Evaluation failed, for example on a missing map key.
    #[error("template: {name}:{line}:{column}: executing \"{name}\" at <{node}>: {message}")]
    Execute {
        /// Template name.
        name: String,
        /// 1-based line of the failing node.
        line: usize,
        /// 0-based byte offset of the failing node within its line.
        column: usize,
        /// The failing node, abbreviated.
        node: String,
        /// Evaluation message.
        message: String,
    },
}

/// A parsed template, ready to execute against any number of field maps.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parses `source`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] when the source is malformed or calls
    /// an unknown function.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let nodes = parse::parse(source).map_err(|failure| TemplateError::Parse {
            name: TEMPLATE_NAME.to_owned(),
            line: failure.line,
            message: failure.message,
        })?;
        Ok(Self {
            source: source.to_owned(),
            nodes,
        })
    }

    /// Renders the template against `fields`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Execute`] when a field is missing or a
    /// function rejects its arguments.
    pub fn execute(&self, fields: &Fields) -> Result<String, TemplateError> {
        let mut out = String::new();
        exec::execute(&self.nodes, fields, &mut out).map_err(|failure| {
            let (line, column) = location(&self.source, failure.pos);
            TemplateError::Execute {
                name: TEMPLATE_NAME.to_owned(),
                line,
                column,
                node: abbreviate(&failure.node),
                message: failure.message,
            }
        })?;
        Ok(out)
    }
}

/// Parses and renders `source` in one step.
///
/// # Errors
///
/// Returns the parse or execution error of the template.
pub fn render(source: &str, fields: &Fields) -> Result<String, TemplateError> {
    Template::parse(source)?.execute(fields)
}

/// Line (1-based) and byte column (0-based) of `pos` in `source`.
fn location(source: &str, pos: usize) -> (usize, usize) {
    let before = source.get(..pos).unwrap_or(source);
    let line = 1 + before.matches('\n').count();
    let column = before.rfind('\n').map_or(pos, |newline| pos - (newline + 1));
    (line, column)
}

fn abbreviate(node: &str) -> String {
    if node.chars().count() <= MAX_NODE_WIDTH {
        return node.to_owned();
    }
    let head: String = node.chars().take(MAX_NODE_WIDTH).collect();
    format!("{head}...")
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
