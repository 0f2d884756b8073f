// cardbind - data-binding template expander for Adaptive Cards JSON
// Copyright (c) 2025 cardbind contributors
// Licensed under the MIT License

//! # cardbind
//!
//! A data-binding template expander for Adaptive Cards JSON: a template is
//! a JSON-shaped document carrying `${...}` placeholders and `$data` /
//! `$when` binding directives, and expansion rewrites it into concrete JSON
//! against a caller-supplied data payload.
//!
//! Expansion is best-effort preserving: anything that cannot be evaluated
//! (bad placeholder syntax, unresolved names, unparsable subtrees) appears
//! in the output as the original template text instead of failing the call.
//! The only fatal error is a data payload that is not valid JSON.
//!
//! ## Architecture
//!
//! - `template` - Template parser (JSON-shaped text to CST)
//! - `expander` - Template visitor (walks the CST, emits output text)
//! - `context` - Data-context stack (`$data` scopes, `$root`, `$index`)
//! - `ast` - Binding expression AST definitions
//! - `parser` - Binding expression parser (placeholder bodies to AST)
//! - `evaluator` - Binding expression evaluator
//! - `functions` - Built-in function prelude
//!
//! ## Example
//!
//! ```
//! let template = r#"{"type":"TextBlock","text":"Hello ${name}"}"#;
//! let data = r#"{"name":"Matt"}"#;
//! let output = cardbind::expand(template, data).unwrap();
//! assert_eq!(output, r#"{"type":"TextBlock","text":"Hello Matt"}"#);
//! ```
//!
//! Compile once, expand many:
//!
//! ```
//! use cardbind::Template;
//!
//! let template = Template::compile(r#"{"n":"${count}"}"#);
//! assert_eq!(template.expand(r#"{"count":3}"#).unwrap(), r#"{"n":3}"#);
//! assert_eq!(template.expand(r#"{"count":8}"#).unwrap(), r#"{"n":8}"#);
//! ```

pub mod ast;
pub mod context;
pub mod evaluator;
pub mod expander;
pub mod functions;
pub mod parser;
pub mod template;

use thiserror::Error;

use crate::context::DataContext;
use crate::evaluator::default_null_substitution;
use crate::expander::TemplateVisitor;
use crate::template::{compile_template, TemplateNode};

pub use crate::evaluator::{MapMemory, MemoryView, NullSubstitution};

/// Expansion errors
#[derive(Error, Debug)]
pub enum ExpandError {
    /// The data payload is not valid JSON
    #[error("malformed data payload: {0}")]
    MalformedData(#[from] serde_json::Error),
}

/// A compiled template that can be expanded against many data payloads.
///
/// Compilation never fails: subtrees that cannot be parsed are kept as raw
/// text and re-emitted verbatim on expansion.
pub struct Template {
    root: TemplateNode,
}

impl Template {
    /// Parse template text into its expandable form.
    pub fn compile(text: &str) -> Self {
        Template {
            root: compile_template(text),
        }
    }

    /// Expand against a JSON data payload with the default null-substitution
    /// (unresolved placeholders survive as their own text).
    ///
    /// An empty `data_text` expands with no data context at all: every
    /// placeholder passes through unchanged.
    pub fn expand(&self, data_text: &str) -> Result<String, ExpandError> {
        self.expand_with(data_text, &default_null_substitution)
    }

    /// Expand with a caller-supplied policy for unresolved paths.
    pub fn expand_with(
        &self,
        data_text: &str,
        null_substitution: &NullSubstitution,
    ) -> Result<String, ExpandError> {
        let root = if data_text.trim().is_empty() {
            None
        } else {
            Some(DataContext::new_root(data_text)?)
        };

        let mut visitor = TemplateVisitor::new(root, null_substitution);
        let entry_depth = visitor.depth();
        let expansion = visitor.expand(&self.root);
        debug_assert_eq!(visitor.depth(), entry_depth, "unbalanced context stack");

        Ok(if expansion.dropped {
            String::new()
        } else {
            expansion.text
        })
    }
}

/// Expand a template against a data payload in one step.
///
/// For repeated expansions of the same template, use [`Template::compile`].
pub fn expand(template_text: &str, data_text: &str) -> Result<String, ExpandError> {
    Template::compile(template_text).expand(data_text)
}

/// One-step expansion with a caller-supplied null-substitution policy.
pub fn expand_with(
    template_text: &str,
    data_text: &str,
    null_substitution: &NullSubstitution,
) -> Result<String, ExpandError> {
    Template::compile(template_text).expand_with(data_text, null_substitution)
}
