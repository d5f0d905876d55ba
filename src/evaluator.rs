use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::ast::{AssignOp, BinOp, Expr, UnaryOp};
use crate::functions::{FunctionRegistry, Resolution};
use crate::value::{MethodArgs, Value, compare};

/// Errors raised while evaluating.
///
/// Reading an expression never fails: these errors are logged and the value
/// becomes null. They surface only from [`Evaluator::set_value`] and from
/// functions, which report them to the evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    #[error("type error: {0}")]
    TypeError(String),

    #[error("no function '{name}' taking {arity} argument(s)")]
    UnknownFunction { name: String, arity: usize },

    /// A function ran and failed
    #[error("{name}: {message}")]
    Function { name: String, message: String },

    /// The expression is not a key or a chain ending in a key
    #[error("cannot set a value through '{0}'")]
    UnsupportedTarget(String),

    /// The value being written into is not an object
    #[error("'{path}' is {found}, not an object")]
    NotAnObject { path: String, found: String },

    #[error("{type_name}.{key} is read-only")]
    ReadOnly { type_name: String, key: String },

    /// The value is not one of an enumerated attribute's choices
    #[error("'{value}' is not a valid {key}, expected one of: {choices}")]
    InvalidChoice {
        key: String,
        value: String,
        choices: String,
    },
}

impl EvalError {
    pub fn function(name: &str, message: impl Into<String>) -> Self {
        EvalError::Function {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// State of one evaluation chain: the root object and the variables assigned
/// so far.
///
/// A context belongs to one caller. Evaluations sharing a context see each
/// other's assignments; evaluations with separate contexts never do.
#[derive(Debug, Clone)]
pub struct EvalContext {
    root: Value,
    scope: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new(root: Value) -> Self {
        EvalContext {
            root,
            scope: HashMap::new(),
        }
    }

    /// The object expressions are evaluated against.
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// An assigned variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.scope.insert(name.into(), value);
    }

    pub fn clear_scope(&mut self) {
        self.scope.clear();
    }
}

/// Walks expressions against objects.
///
/// Evaluation is lenient: unknown keys, failing functions and mismatched
/// operand types evaluate to [`Value::Null`] instead of raising errors.
pub struct Evaluator<'e> {
    pub(crate) functions: &'e FunctionRegistry,
    pub(crate) join_delimiter: &'e str,
}

impl<'e> Evaluator<'e> {
    pub fn new(functions: &'e FunctionRegistry, join_delimiter: &'e str) -> Self {
        Evaluator {
            functions,
            join_delimiter,
        }
    }

    /// Evaluates `expr` against `current`.
    ///
    /// Keys, calls and chains evaluated against a list go through list
    /// aggregation.
    pub fn evaluate(&self, ctx: &mut EvalContext, current: &Value, expr: &Expr) -> Value {
        match (current, expr) {
            (Value::List(list), Expr::Key(_) | Expr::FunctionCall { .. } | Expr::Chain(_)) => {
                self.aggregate(ctx, list, expr.steps())
            }
            _ => self.eval_row(ctx, current, expr),
        }
    }

    /// Evaluates a chain of steps against `current`.
    pub fn evaluate_steps(&self, ctx: &mut EvalContext, current: &Value, steps: &[Expr]) -> Value {
        match (current, steps) {
            (_, []) => current.clone(),
            (_, [single]) => self.evaluate(ctx, current, single),
            (Value::List(list), _) => self.aggregate(ctx, list, steps),
            _ => self.eval_chain(ctx, current, steps),
        }
    }

    /// Evaluates `expr` treating `current` as a single row, even if it is a list.
    pub(crate) fn eval_row(&self, ctx: &mut EvalContext, current: &Value, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(value) => value.clone(),

            Expr::Key(name) => self.lookup_key(ctx, current, name, true),

            Expr::Chain(steps) => self.eval_chain(ctx, current, steps),

            Expr::FunctionCall { name, args } => self.eval_call(ctx, current, current, name, args),

            Expr::ArrayIndex { target, index } => {
                let target = self.evaluate(ctx, current, target);
                let index = self.evaluate(ctx, current, index);
                match (target, index.as_i64()) {
                    (Value::List(list), Some(i)) if i >= 0 => {
                        list.items.get(i as usize).cloned().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                }
            }

            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate(ctx, current, condition).is_truthy() {
                    self.evaluate(ctx, current, then)
                } else if let Some(otherwise) = otherwise {
                    self.evaluate(ctx, current, otherwise)
                } else {
                    Value::Null
                }
            }

            Expr::Assignment { op, target, value } => {
                let value = self.evaluate(ctx, current, value);
                let Some(name) = target.steps().last().and_then(Expr::key_name) else {
                    debug!(expr = %target, "assignment target is not a key");
                    return Value::Null;
                };
                let value = match op {
                    AssignOp::Assign => value,
                    AssignOp::AddAssign => match ctx.variable(name) {
                        Some(old) if !old.is_null() => apply_binop(BinOp::Add, old, &value),
                        _ => value,
                    },
                };
                ctx.assign(name, value);
                Value::String(String::new())
            }

            Expr::UnaryOp { op, operand } => {
                let value = self.evaluate(ctx, current, operand);
                match op {
                    UnaryOp::Negate => match value.as_number() {
                        Some(n) => Value::Number(-n),
                        None => Value::Null,
                    },
                    UnaryOp::Not => Value::Boolean(!value.is_truthy()),
                }
            }

            Expr::BinaryOp { op, left, right } => match op {
                BinOp::And => {
                    let result = self.evaluate(ctx, current, left).is_truthy()
                        && self.evaluate(ctx, current, right).is_truthy();
                    Value::Boolean(result)
                }
                BinOp::Or => {
                    let result = self.evaluate(ctx, current, left).is_truthy()
                        || self.evaluate(ctx, current, right).is_truthy();
                    Value::Boolean(result)
                }
                _ => {
                    let left = self.evaluate(ctx, current, left);
                    let right = self.evaluate(ctx, current, right);
                    apply_binop(*op, &left, &right)
                }
            },
        }
    }

    /// Threads a value through `steps`. Once a step yields a list, the remaining
    /// steps are aggregated over it.
    fn eval_chain(&self, ctx: &mut EvalContext, current: &Value, steps: &[Expr]) -> Value {
        let mut value = current.clone();
        for (i, step) in steps.iter().enumerate() {
            if i > 0
                && let Value::List(list) = &value
            {
                return self.aggregate(ctx, list, &steps[i..]);
            }
            value = match step {
                Expr::Key(name) => self.lookup_key(ctx, &value, name, i == 0),
                Expr::FunctionCall { name, args } => self.eval_call(ctx, current, &value, name, args),
                other => self.eval_row(ctx, &value, other),
            };
        }
        value
    }

    /// Resolves a key: custom resolver, attribute, `self`, then (for the head of
    /// a chain only) assigned variables.
    pub(crate) fn lookup_key(&self, ctx: &EvalContext, target: &Value, name: &str, head: bool) -> Value {
        if let Value::Object(record) = target {
            if let Some(value) = record.resolve_key(name) {
                return value;
            }
            if let Some(value) = record.get(name) {
                return value;
            }
        }
        if name == "self" {
            return target.clone();
        }
        if head && let Some(value) = ctx.variable(name) {
            return value.clone();
        }
        Value::Null
    }

    /// Calls `name` on `target`. Arguments are evaluated against `origin`, the
    /// object the enclosing chain started from.
    pub(crate) fn eval_call(
        &self,
        ctx: &mut EvalContext,
        origin: &Value,
        target: &Value,
        name: &str,
        args: &[Expr],
    ) -> Value {
        match self.call(ctx, origin, target, name, args) {
            Ok(value) => value,
            Err(err) => {
                debug!(function = name, receiver = target.type_name(), error = %err, "function call failed");
                Value::Null
            }
        }
    }

    fn call(
        &self,
        ctx: &mut EvalContext,
        origin: &Value,
        target: &Value,
        name: &str,
        args: &[Expr],
    ) -> Result<Value, EvalError> {
        let resolution = self
            .functions
            .resolve(target, name, args.len())
            .ok_or_else(|| EvalError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            })?;

        if let (Resolution::RawMethod, Value::Object(record), [arg]) = (&resolution, target, args) {
            return record.invoke(name, MethodArgs::Raw(arg));
        }

        let values: Vec<Value> = args.iter().map(|arg| self.evaluate(ctx, origin, arg)).collect();
        match (resolution, target) {
            (Resolution::Method, Value::Object(record)) => record.invoke(name, MethodArgs::Values(&values)),
            (Resolution::Function(f) | Resolution::Varargs(f), _) => f(target, &values),
            _ => Err(EvalError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            }),
        }
    }

    /// Writes `value` through `expr`, a key or a chain ending in a key, starting
    /// from `target`.
    ///
    /// If the attribute is enumerated, `value` is matched by name against its
    /// choices.
    pub fn set_value(
        &self,
        ctx: &mut EvalContext,
        target: &Value,
        expr: &Expr,
        value: Value,
    ) -> Result<(), EvalError> {
        let (object, key) = match expr {
            Expr::Key(key) => (target.clone(), key.as_str()),
            Expr::Chain(steps) => match steps.split_last() {
                Some((Expr::Key(key), prefix)) => (self.evaluate_steps(ctx, target, prefix), key.as_str()),
                _ => return Err(EvalError::UnsupportedTarget(expr.to_string())),
            },
            _ => return Err(EvalError::UnsupportedTarget(expr.to_string())),
        };

        let Value::Object(record) = object else {
            return Err(EvalError::NotAnObject {
                path: expr.to_string(),
                found: object.type_name().to_string(),
            });
        };

        let value = match record.enum_choices(key) {
            Some(choices) => {
                let text = value.to_string();
                match choices.iter().find(|c| c.eq_ignore_ascii_case(&text)) {
                    Some(choice) => Value::String(choice.clone()),
                    None => {
                        return Err(EvalError::InvalidChoice {
                            key: key.to_string(),
                            value: text,
                            choices: choices.join(", "),
                        });
                    }
                }
            }
            None => value,
        };
        record.set(key, value)
    }
}

/// Applies a non-logical binary operator.
///
/// `+` adds two numbers and otherwise concatenates text, with null as the empty
/// string. Other arithmetic needs two numbers and is null otherwise.
pub fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Value {
    if op.is_comparison() {
        let ordering = compare(left, right);
        let result = match op {
            BinOp::Equal => ordering.is_eq(),
            BinOp::NotEqual => ordering.is_ne(),
            BinOp::LessThan => ordering.is_lt(),
            BinOp::GreaterThan => ordering.is_gt(),
            BinOp::LessEqual => ordering.is_le(),
            _ => ordering.is_ge(),
        };
        return Value::Boolean(result);
    }

    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return match op {
            BinOp::Add => Value::String(format!("{left}{right}")),
            BinOp::And => Value::Boolean(left.is_truthy() && right.is_truthy()),
            BinOp::Or => Value::Boolean(left.is_truthy() || right.is_truthy()),
            _ => {
                debug!(op = %op, left = left.type_name(), right = right.type_name(), "non-numeric operands");
                Value::Null
            }
        };
    };

    let (a, b) = (*a, *b);
    match op {
        BinOp::Add => Value::Number(a + b),
        BinOp::Subtract => Value::Number(a - b),
        BinOp::Multiply => Value::Number(a * b),
        BinOp::Divide => Value::Number(a / b),
        BinOp::Modulo => Value::Number(a % b),
        BinOp::And => Value::Boolean(!a.is_zero() && !b.is_zero()),
        _ => Value::Boolean(!a.is_zero() || !b.is_zero()),
    }
}
