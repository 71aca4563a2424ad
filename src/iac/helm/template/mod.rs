//! In-process Go template renderer for Helm charts.
//!
//! Supports the constructs charts use in practice: pipelines, variables,
//! `if`/`with`/`range`/`define`/`template`/`block`, `include` and `tpl`, plus
//! the function subset in [`funcs`]. Rendering is lint tolerant: a missing
//! value renders as an empty string instead of failing.

pub mod exec;
pub mod funcs;
pub mod lexer;
pub mod parse;

pub use exec::Engine;
pub use parse::{Node, parse};

/// Template parse or execution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub message: String,
    pub line: usize,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TemplateError {}
