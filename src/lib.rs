//! # report-expr
//!
//! A grammar-driven expression language for report templates: compute values
//! from business objects, filter and aggregate lists of them, and write values
//! back into them.
//!
//! ```
//! use report_expr::{Engine, MapRecord, Value};
//!
//! let engine = Engine::new();
//! let lines = Value::list(vec![
//!     MapRecord::new("Line").with("region", "north").with("amount", 10).into_value(),
//!     MapRecord::new("Line").with("region", "south").with("amount", 5).into_value(),
//!     MapRecord::new("Line").with("region", "north").with("amount", 7).into_value(),
//! ]);
//!
//! assert_eq!(engine.evaluate(&lines, "total(amount)"), Value::from(22));
//! assert_eq!(engine.evaluate(&lines, "group(region).count()"), Value::from(2));
//! assert_eq!(engine.evaluate_string(&lines, "join(region, \"/\")"), "north/south/north");
//! ```
//!
//! The pieces, bottom-up:
//!
//! - [`lexer`] splits text into [`Token`]s by longest match,
//! - [`grammar`] describes languages as rule arenas, built in code or from text,
//! - [`parser`] runs a grammar over text into any [`parser::TreeBuilder`],
//! - [`compiler`] turns parse trees of the expression grammar into [`Expr`]s,
//! - [`evaluator`] and [`aggregate`] evaluate them over [`Value`]s,
//! - [`functions`] resolves calls to instance methods and provider functions,
//! - [`Engine`] ties these together with a compiled-expression cache.

pub mod aggregate;
pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod functions;
pub mod grammar;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod value;

pub use aggregate::Aggregate;
pub use ast::{AssignOp, BinOp, Expr, Token, UnaryOp};
pub use config::EngineConfig;
pub use engine::Engine;
pub use evaluator::{EvalContext, EvalError, Evaluator};
pub use functions::{FunctionProvider, FunctionRegistry};
pub use grammar::{Grammar, GrammarBuilder, GrammarError, parse_grammar};
pub use lexer::{CommentMode, LexError, Lexer};
pub use number::Number;
pub use parser::{ParseError, Parser};
pub use value::{List, MapRecord, MethodArgs, MethodShape, Record, Value};
