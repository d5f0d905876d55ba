//! # Grammar Rule Model
//!
//! A grammar is an arena of [`Rule`]s. Leaves are token patterns (fixed text or a
//! regular expression); inner nodes are the usual combinators:
//!
//! - **And** - sequence of two rules
//! - **Or** - ordered choice between two rules
//! - **ZeroOrOne / ZeroOrMore / OneOrMore** - greedy repetition
//! - **LookAhead** - non-consuming check of a bounded number of tokens
//!
//! Named rules are bound through [`RuleKind::Named`], which is what lets a rule be
//! referenced before its body is defined and lets recursive rules point at
//! themselves.
//!
//! Grammars are written either with a [`GrammarBuilder`] or as text in the
//! rule-definition syntax below, which the [meta-grammar](meta) compiles:
//!
//! ```text
//! // comments are allowed
//! Sum     { Product ("+" Product)* }
//! Product { Number ("*" Number)* }
//! Call    { LookAhead(2) Name "(" Sum? ")" }
//! ```
//!
//! Once built, a [`Grammar`] is immutable and can be shared freely between threads.

pub mod builder;
pub mod meta;
pub mod rules;

pub use builder::{GrammarBuilder, GrammarError, LEXICAL_PATTERNS};
pub use meta::{meta_grammar, parse_grammar};
pub use rules::{Grammar, Rule, RuleId, RuleKind};
