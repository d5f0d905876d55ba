//! Evaluate expressions against JSON input

use super::{CliError, json_to_value, value_to_json};
use crate::{Engine, EvalContext, Value};

/// Options for the eval and check commands
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Expressions to evaluate, in order, sharing one scope
    pub expressions: Vec<String>,
    /// JSON input string
    pub input: Option<String>,
    /// Only validate syntax, don't execute
    pub syntax_only: bool,
}

/// Result of a check operation
#[derive(Debug)]
pub enum CheckResult {
    /// Every expression compiled
    SyntaxValid,
    /// Value of the last expression
    Success(serde_json::Value),
}

/// Compiles every expression, then (unless `syntax_only`) evaluates them in
/// order against the input, or against null without one. Assignments in
/// earlier expressions are visible to later ones.
pub fn execute_check(engine: &Engine, options: &CheckOptions) -> Result<CheckResult, CliError> {
    for expression in &options.expressions {
        engine.try_compile(expression)?;
    }
    if options.syntax_only {
        return Ok(CheckResult::SyntaxValid);
    }

    let root = match &options.input {
        Some(json) => json_to_value(serde_json::from_str(json)?),
        None => Value::Null,
    };

    let mut ctx = EvalContext::new(root);
    let mut result = Value::Null;
    for expression in &options.expressions {
        result = engine.evaluate_in(&mut ctx, expression);
    }
    Ok(CheckResult::Success(value_to_json(&result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(expressions: &[&str], input: Option<&str>) -> CheckOptions {
        CheckOptions {
            expressions: expressions.iter().map(|e| e.to_string()).collect(),
            input: input.map(str::to_string),
            syntax_only: false,
        }
    }

    #[test]
    fn test_evaluates_against_json() {
        let engine = Engine::new();
        let opts = options(&["items.total(price)"], Some(r#"{"items": [{"price": 2}, {"price": 3}]}"#));
        let CheckResult::Success(output) = execute_check(&engine, &opts).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(output, serde_json::json!(5));
    }

    #[test]
    fn test_scope_is_shared_between_expressions() {
        let engine = Engine::new();
        let opts = options(&["x = 4", "x * 2"], None);
        let CheckResult::Success(output) = execute_check(&engine, &opts).unwrap() else {
            panic!("expected a value");
        };
        assert_eq!(output, serde_json::json!(8));
    }

    #[test]
    fn test_syntax_errors_are_reported() {
        let engine = Engine::new();
        let mut opts = options(&["1 +"], None);
        opts.syntax_only = true;
        assert!(matches!(execute_check(&engine, &opts), Err(CliError::Parse(_))));
    }
}
