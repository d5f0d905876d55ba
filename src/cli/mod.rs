//! CLI support for report-expr
//!
//! Provides programmatic access to the `rexpr` commands so other tools can
//! embed them.

mod check;
mod convert;
mod grammar;

pub use check::{CheckOptions, CheckResult, execute_check};
pub use convert::{json_to_value, value_to_json};
pub use grammar::{describe_grammar, format_tokens, parse_tree_of};

use std::io;

use thiserror::Error;

/// Errors that can occur during CLI operations
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Parse error: {0}")]
    Parse(#[from] crate::ParseError),

    #[error("Grammar error: {0}")]
    Grammar(#[from] crate::GrammarError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] crate::EvalError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
