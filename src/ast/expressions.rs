use std::fmt;

use crate::ast::{AssignOp, BinOp, UnaryOp};
use crate::value::Value;

/// Abstract Syntax Tree node of a compiled expression.
///
/// Nodes are immutable once built and are shared behind an `Arc` by the
/// expression cache, so evaluating one never changes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value: number, string, boolean or null
    ///
    /// # Example
    /// ```text
    /// 42    "text"    'text'    true    null
    /// ```
    Literal(Value),

    /// Attribute name looked up on the current object
    ///
    /// # Example
    /// ```text
    /// price
    /// ```
    Key(String),

    /// Element of a list
    ///
    /// # Example
    /// ```text
    /// items[0]
    /// ```
    ArrayIndex {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    /// Function call, resolved at run time by name and argument count
    ///
    /// # Example
    /// ```text
    /// round(price, 2)
    /// name.upper()
    /// ```
    FunctionCall { name: String, args: Vec<Expr> },

    /// Dotted path; each step is evaluated against the previous step's value
    ///
    /// # Example
    /// ```text
    /// order.customer.name
    /// ```
    Chain(Vec<Expr>),

    /// `cond ? then : otherwise`; a missing `otherwise` yields null
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },

    /// `target = value` or `target += value`
    ///
    /// The target is a [`Key`](Expr::Key) or a [`Chain`](Expr::Chain) ending in one.
    Assignment {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    UnaryOp { op: UnaryOp, operand: Box<Expr> },

    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// The `null` literal, which also stands in for expressions that failed to compile.
    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Literal(Value::Null))
    }

    /// The steps of a chain, or the expression itself as a single step.
    pub fn steps(&self) -> &[Expr] {
        match self {
            Expr::Chain(steps) => steps,
            other => std::slice::from_ref(other),
        }
    }

    /// Name of a plain key.
    pub fn key_name(&self) -> Option<&str> {
        match self {
            Expr::Key(name) => Some(name),
            _ => None,
        }
    }

    /// True for shapes that can receive a value: a key, or a chain ending in a key.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Key(_) => true,
            Expr::Chain(steps) => matches!(steps.last(), Some(Expr::Key(_))),
            _ => false,
        }
    }

    /// Visits this node and all its descendants, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Literal(_) | Expr::Key(_) => {}
            Expr::ArrayIndex { target, index } => {
                target.walk(visit);
                index.walk(visit);
            }
            Expr::FunctionCall { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expr::Chain(steps) => steps.iter().for_each(|s| s.walk(visit)),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(visit);
                then.walk(visit);
                if let Some(otherwise) = otherwise {
                    otherwise.walk(visit);
                }
            }
            Expr::Assignment { target, value, .. } => {
                target.walk(visit);
                value.walk(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(visit),
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
        }
    }
}

/// Renders the expression back to source form. Binary operations are fully
/// parenthesized.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "{s:?}"),
            Expr::Literal(Value::Null) => f.write_str("null"),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Key(name) => f.write_str(name),
            Expr::ArrayIndex { target, index } => write!(f, "{target}[{index}]"),
            Expr::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Chain(steps) => {
                for (i, step) in steps.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    match step {
                        Expr::Key(_) | Expr::FunctionCall { .. } | Expr::ArrayIndex { .. } => {
                            write!(f, "{step}")?
                        }
                        other => write!(f, "({other})")?,
                    }
                }
                Ok(())
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "{condition} ? {then}")?;
                if let Some(otherwise) = otherwise {
                    write!(f, " : {otherwise}")?;
                }
                Ok(())
            }
            Expr::Assignment { op, target, value } => write!(f, "{target} {op} {value}"),
            Expr::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            Expr::BinaryOp { op, left, right } => write!(f, "({left} {op} {right})"),
        }
    }
}
