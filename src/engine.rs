//! The entry points report code uses: compile once, evaluate many times.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::ast::Expr;
use crate::compiler::{EXPRESSION_GRAMMAR, compile, expression_grammar};
use crate::config::EngineConfig;
use crate::evaluator::{EvalContext, EvalError, Evaluator};
use crate::functions::{FunctionProvider, FunctionRegistry};
use crate::grammar::{Grammar, GrammarError};
use crate::lexer::CommentMode;
use crate::parser::ParseError;
use crate::value::Value;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An expression engine: grammar, compiled-expression cache and function
/// registry.
///
/// Engines are `Send + Sync`; one engine can serve many report threads, each
/// evaluating with its own [`EvalContext`].
///
/// # Examples
///
/// ```
/// use report_expr::{Engine, MapRecord, Value};
///
/// let engine = Engine::new();
/// let order = MapRecord::new("Order")
///     .with("price", 12.5)
///     .with("quantity", 4)
///     .into_value();
///
/// assert_eq!(engine.evaluate(&order, "price * quantity"), Value::from(50));
/// assert_eq!(engine.evaluate_string(&order, "quantity > 3 ? \"bulk\" : \"single\""), "bulk");
/// ```
pub struct Engine {
    grammar: Arc<Grammar>,
    cache: Mutex<HashMap<String, Arc<Expr>>>,
    functions: FunctionRegistry,
    last_error: Mutex<Option<String>>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cached", &lock(&self.cache).len())
            .field("config", &self.config)
            .finish()
    }
}

impl Engine {
    /// An engine with the built-in grammar and default settings.
    pub fn new() -> Self {
        Engine::from_grammar(Arc::clone(expression_grammar()), EngineConfig::default())
    }

    /// An engine with custom settings. A custom grammar is compiled here, so
    /// errors in it surface immediately.
    pub fn with_config(config: EngineConfig) -> Result<Self, GrammarError> {
        let grammar = match (&config.grammar, config.comment_mode()) {
            (Some(text), mode) => Arc::new(crate::grammar::parse_grammar(text)?.with_comments(mode)),
            (None, CommentMode::Off) => Arc::clone(expression_grammar()),
            (None, mode) => Arc::new(crate::grammar::parse_grammar(EXPRESSION_GRAMMAR)?.with_comments(mode)),
        };
        Ok(Engine::from_grammar(grammar, config))
    }

    fn from_grammar(grammar: Arc<Grammar>, config: EngineConfig) -> Self {
        Engine {
            grammar,
            cache: Mutex::new(HashMap::new()),
            functions: FunctionRegistry::new(),
            last_error: Mutex::new(None),
            config,
        }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Compiles grammar definition text with the meta-grammar.
    pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarError> {
        crate::grammar::parse_grammar(text)
    }

    /// Compiles `source` without caching or recording errors.
    pub fn try_compile(&self, source: &str) -> Result<Expr, ParseError> {
        compile(&self.grammar, source)
    }

    /// Compiles `source`, or returns the cached result of an earlier call.
    ///
    /// Blank source compiles to `null`. Source that fails to compile also
    /// compiles to `null`; the error message is kept for
    /// [`last_parse_error`](Engine::last_parse_error).
    pub fn compile(&self, source: &str) -> Arc<Expr> {
        if let Some(expr) = lock(&self.cache).get(source) {
            return Arc::clone(expr);
        }

        let expr = if source.trim().is_empty() {
            Expr::null()
        } else {
            match compile(&self.grammar, source) {
                Ok(expr) => expr,
                Err(err) => {
                    warn!(expression = source, error = %err, "expression does not compile");
                    *lock(&self.last_error) = Some(format!("{source}: {err}"));
                    Expr::null()
                }
            }
        };

        // Two threads may compile the same source; the first insert wins.
        Arc::clone(
            lock(&self.cache)
                .entry(source.to_string())
                .or_insert_with(|| Arc::new(expr)),
        )
    }

    /// Number of cached expressions.
    pub fn cached(&self) -> usize {
        lock(&self.cache).len()
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.functions, &self.config.join_delimiter)
    }

    /// Evaluates `source` against `root` in a fresh context.
    pub fn evaluate(&self, root: &Value, source: &str) -> Value {
        let mut ctx = EvalContext::new(root.clone());
        self.evaluate_in(&mut ctx, source)
    }

    /// Evaluates `source` against the context's root, sharing its variables
    /// with earlier evaluations in the same context.
    pub fn evaluate_in(&self, ctx: &mut EvalContext, source: &str) -> Value {
        let root = ctx.root().clone();
        self.evaluate_at(ctx, &root, source)
    }

    /// Evaluates `source` against `current` within `ctx`.
    pub fn evaluate_at(&self, ctx: &mut EvalContext, current: &Value, source: &str) -> Value {
        let expr = self.compile(source);
        self.evaluate_expr(ctx, current, &expr)
    }

    pub fn evaluate_expr(&self, ctx: &mut EvalContext, current: &Value, expr: &Expr) -> Value {
        self.evaluator().evaluate(ctx, current, expr)
    }

    /// Evaluates to text; null becomes the empty string.
    pub fn evaluate_string(&self, root: &Value, source: &str) -> String {
        self.evaluate(root, source).to_string()
    }

    /// Evaluates to an integer, truncating; `0` when not numeric.
    pub fn evaluate_int(&self, root: &Value, source: &str) -> i64 {
        self.evaluate(root, source).as_i64().unwrap_or(0)
    }

    /// Evaluates to a double; `0.0` when not numeric.
    pub fn evaluate_double(&self, root: &Value, source: &str) -> f64 {
        self.evaluate(root, source).as_f64().unwrap_or(0.0)
    }

    /// Evaluates to a float; `0.0` when not numeric.
    pub fn evaluate_float(&self, root: &Value, source: &str) -> f32 {
        self.evaluate_double(root, source) as f32
    }

    /// Evaluates to a boolean by truthiness.
    pub fn evaluate_bool(&self, root: &Value, source: &str) -> bool {
        self.evaluate(root, source).is_truthy()
    }

    /// Evaluates to list items: a list's elements, nothing for null, otherwise
    /// the single value.
    pub fn evaluate_list(&self, root: &Value, source: &str) -> Vec<Value> {
        match self.evaluate(root, source) {
            Value::List(list) => list.items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    /// Writes `value` into `target` through `source`, which must be a key or a
    /// chain ending in a key.
    pub fn set_value(&self, target: &Value, source: &str, value: Value) -> Result<(), EvalError> {
        let expr = self.compile(source);
        let mut ctx = EvalContext::new(target.clone());
        self.evaluator().set_value(&mut ctx, target, &expr, value)
    }

    /// Like [`set_value`](Engine::set_value), logging a failure instead of
    /// returning it. Returns whether the value was written.
    pub fn set_value_safe(&self, target: &Value, source: &str, value: Value) -> bool {
        match self.set_value(target, source, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(expression = source, error = %err, "cannot set value");
                false
            }
        }
    }

    /// Like [`set_value`](Engine::set_value), ignoring failures.
    pub fn set_value_silent(&self, target: &Value, source: &str, value: Value) -> bool {
        self.set_value(target, source, value).is_ok()
    }

    /// Adds a function provider, searched after earlier ones and before the
    /// built-ins.
    pub fn register_functions(&self, provider: FunctionProvider) {
        self.functions.register(provider);
    }

    /// Message of the most recent compile failure.
    pub fn last_parse_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Message of the most recent compile failure, clearing it.
    pub fn take_last_parse_error(&self) -> Option<String> {
        let taken = lock(&self.last_error).take();
        if taken.is_some() {
            debug!("parse error taken");
        }
        taken
    }
}
