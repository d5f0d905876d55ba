//! # Report Expression Language - Abstract Syntax Tree
//!
//! Report templates reference, compute and aggregate values with short
//! expressions evaluated against a hierarchical data model:
//!
//! ```text
//! order.customer.name
//! price * quantity
//! total(amount) / count()
//! discount > 0 ? "yes" : "no"
//! ```
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (literals, keys, chains, calls, operations)
//! - **[operators]** - Binary, unary and assignment operators
//!
//! ## Chains
//!
//! A dotted path is a [`Expr::Chain`]: every step is evaluated against the value
//! the previous step produced. When a step yields a list, the rest of the chain
//! is evaluated over the list's rows instead; that is how `orders.lines.amount`
//! reaches through master/detail relations and how `orders.total(amount)` sums
//! over them.
//!
//! ## Literals
//!
//! Integers and decimals are kept as exact decimals. Strings may use double or
//! single quotes with backslash escapes.
pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::Expr;
pub use operators::{AssignOp, BinOp, UnaryOp};
pub use tokens::{PatternId, SPECIAL_PATTERN, Token};
