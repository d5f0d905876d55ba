//! Expression compiler: source text to [`Expr`].
//!
//! The expression language is defined by a grammar text resource compiled once by
//! the meta-grammar. [`ExprBuilder`] turns the parse of that grammar into AST nodes
//! by rule name, so a replacement grammar must keep the rule names used here
//! (`Literal`, `Key`, `FunctionCall`, `Chain`, `Unary`, the binary levels, ...).

use std::sync::{Arc, OnceLock};

use crate::ast::{AssignOp, BinOp, Expr, Token, UnaryOp};
use crate::grammar::{Grammar, parse_grammar};
use crate::number::Number;
use crate::parser::{ParseError, Parser, TreeBuilder};
use crate::value::Value;

/// Grammar definition of the expression language.
pub const EXPRESSION_GRAMMAR: &str = include_str!("grammar/expression.grammar");

static GRAMMAR: OnceLock<Arc<Grammar>> = OnceLock::new();

/// The built-in expression grammar, compiled on first use.
///
/// # Panics
///
/// If the bundled grammar resource does not compile.
pub fn expression_grammar() -> &'static Arc<Grammar> {
    GRAMMAR.get_or_init(|| match parse_grammar(EXPRESSION_GRAMMAR) {
        Ok(grammar) => Arc::new(grammar),
        Err(err) => panic!("built-in expression grammar is invalid: {err}"),
    })
}

/// Compiles `source` with `grammar`.
pub fn compile(grammar: &Grammar, source: &str) -> Result<Expr, ParseError> {
    match Parser::new(grammar, source).parse(&mut ExprBuilder)? {
        Node::Expr(expr) => Ok(expr),
        _ => Err(ParseError::Rejected {
            rule: grammar.rule_names().next().unwrap_or("Expression").to_string(),
            message: "input is not an expression".to_string(),
            line: 1,
            column: 1,
        }),
    }
}

/// Intermediate results while building the AST.
#[derive(Debug)]
pub enum Node {
    Token(Token),
    Expr(Expr),
    /// Arguments of a call
    Args(Vec<Expr>),
    /// `[index]` step of a chain
    Index(Expr),
    /// `? then : otherwise`
    ConditionalTail { then: Expr, otherwise: Option<Expr> },
    /// `= value`
    AssignTail(AssignOp, Expr),
}

/// Builds [`Expr`] trees from expression grammar parses.
#[derive(Debug, Default)]
pub struct ExprBuilder;

impl ExprBuilder {
    fn literal(token: Token) -> Result<Expr, String> {
        let value = match token.name.as_str() {
            "Integer" | "Decimal" | "Number" => Value::Number(
                token
                    .text
                    .parse::<Number>()
                    .map_err(|e| e.to_string())?,
            ),
            "String" | "QuotedString" => Value::String(token.unquoted()),
            _ => match token.text.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                "null" => Value::Null,
                other => return Err(format!("unknown literal '{other}'")),
            },
        };
        Ok(Expr::Literal(value))
    }

    fn chain(children: Vec<Node>) -> Result<Expr, String> {
        let mut steps: Vec<Expr> = Vec::new();
        for child in children {
            match child {
                Node::Expr(Expr::Chain(inner)) if steps.is_empty() => steps.extend(inner),
                Node::Expr(step) => steps.push(step),
                Node::Index(index) => {
                    let target = collapse(std::mem::take(&mut steps));
                    steps.push(Expr::ArrayIndex {
                        target: Box::new(target),
                        index: Box::new(index),
                    });
                }
                other => return Err(format!("unexpected {other:?} in chain")),
            }
        }
        if steps.is_empty() {
            return Err("empty chain".to_string());
        }
        Ok(collapse(steps))
    }

    fn unary(children: Vec<Node>) -> Result<Expr, String> {
        let mut children = children.into_iter();
        match (children.next(), children.next()) {
            (Some(Node::Expr(expr)), None) => Ok(expr),
            (Some(Node::Token(op)), Some(Node::Expr(operand))) => {
                let op = match op.text.as_str() {
                    "-" => UnaryOp::Negate,
                    "!" => UnaryOp::Not,
                    other => return Err(format!("unknown unary operator '{other}'")),
                };
                Ok(match (op, operand) {
                    (UnaryOp::Negate, Expr::Literal(Value::Number(n))) => Expr::Literal(Value::Number(-n)),
                    (op, operand) => Expr::UnaryOp {
                        op,
                        operand: Box::new(operand),
                    },
                })
            }
            _ => Err("malformed unary expression".to_string()),
        }
    }

    /// Left-associative fold of `operand (op operand)*`.
    fn binary(children: Vec<Node>) -> Result<Expr, String> {
        let mut children = children.into_iter();
        let Some(Node::Expr(mut left)) = children.next() else {
            return Err("missing left operand".to_string());
        };
        while let Some(op) = children.next() {
            let (Node::Token(op), Some(Node::Expr(right))) = (op, children.next()) else {
                return Err("malformed binary expression".to_string());
            };
            let op = BinOp::from_symbol(&op.text)
                .ok_or_else(|| format!("unknown operator '{}'", op.text))?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn conditional_tail(children: Vec<Node>) -> Result<Node, String> {
        let mut exprs = children.into_iter().filter_map(|node| match node {
            Node::Expr(expr) => Some(expr),
            _ => None,
        });
        let then = exprs.next().ok_or("missing conditional branch")?;
        Ok(Node::ConditionalTail {
            then,
            otherwise: exprs.next(),
        })
    }

    fn assign_tail(children: Vec<Node>) -> Result<Node, String> {
        let mut children = children.into_iter();
        let (Some(Node::Token(op)), Some(Node::Expr(value))) = (children.next(), children.next()) else {
            return Err("malformed assignment".to_string());
        };
        let op = match op.text.as_str() {
            "=" => AssignOp::Assign,
            "+=" => AssignOp::AddAssign,
            other => return Err(format!("unknown assignment operator '{other}'")),
        };
        Ok(Node::AssignTail(op, value))
    }

    /// `head tail?` where the tail completes a conditional or an assignment.
    fn with_tail(children: Vec<Node>) -> Result<Expr, String> {
        let mut children = children.into_iter();
        let Some(Node::Expr(head)) = children.next() else {
            return Err("missing expression".to_string());
        };
        match children.next() {
            None => Ok(head),
            Some(Node::ConditionalTail { then, otherwise }) => Ok(Expr::Conditional {
                condition: Box::new(head),
                then: Box::new(then),
                otherwise: otherwise.map(Box::new),
            }),
            Some(Node::AssignTail(op, value)) => {
                if !head.is_assignable() {
                    return Err(format!("cannot assign to '{head}'"));
                }
                Ok(Expr::Assignment {
                    op,
                    target: Box::new(head),
                    value: Box::new(value),
                })
            }
            Some(other) => Err(format!("unexpected {other:?}")),
        }
    }
}

fn collapse(mut steps: Vec<Expr>) -> Expr {
    if steps.len() == 1 {
        steps.remove(0)
    } else {
        Expr::Chain(steps)
    }
}

fn exprs(children: Vec<Node>) -> Vec<Expr> {
    children
        .into_iter()
        .filter_map(|node| match node {
            Node::Expr(expr) => Some(expr),
            _ => None,
        })
        .collect()
}

impl TreeBuilder for ExprBuilder {
    type Node = Node;

    fn token(&mut self, token: Token) -> Node {
        Node::Token(token)
    }

    fn rule(&mut self, name: &str, children: Vec<Node>) -> Result<Node, String> {
        let expr = match name {
            "Literal" => match children.into_iter().next() {
                Some(Node::Token(token)) => Self::literal(token)?,
                _ => return Err("empty literal".to_string()),
            },

            "Key" => match children.into_iter().next() {
                Some(Node::Token(token)) => Expr::Key(token.text),
                _ => return Err("empty key".to_string()),
            },

            "Arguments" => return Ok(Node::Args(exprs(children))),

            "FunctionCall" => {
                let mut name = None;
                let mut args = Vec::new();
                for child in children {
                    match child {
                        Node::Token(token) if name.is_none() => name = Some(token.text),
                        Node::Args(list) => args = list,
                        _ => {}
                    }
                }
                Expr::FunctionCall {
                    name: name.ok_or("function call without a name")?,
                    args,
                }
            }

            "Group" => exprs(children).into_iter().next().ok_or("empty group")?,

            "Index" => {
                let index = exprs(children).into_iter().next().ok_or("empty index")?;
                return Ok(Node::Index(index));
            }

            "ChainStep" => {
                return children
                    .into_iter()
                    .find(|node| !matches!(node, Node::Token(_)))
                    .ok_or_else(|| "empty chain step".to_string());
            }

            "Chain" => Self::chain(children)?,

            "Unary" => Self::unary(children)?,

            "LogicalOr" | "LogicalAnd" | "Equality" | "Relational" | "Additive" | "Multiplicative" => {
                Self::binary(children)?
            }

            "ConditionalTail" => return Self::conditional_tail(children),

            "AssignTail" => return Self::assign_tail(children),

            "Conditional" | "Expression" => Self::with_tail(children)?,

            // Operator and wrapper rules pass their single child through.
            _ => {
                let mut children = children;
                if children.len() != 1 {
                    return Err(format!("{name} produced {} nodes", children.len()));
                }
                return Ok(children.remove(0));
            }
        };
        Ok(Node::Expr(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        compile(expression_grammar(), src).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse("2+3*4").to_string(), "(2 + (3 * 4))");
        assert_eq!(parse("a || b && c").to_string(), "(a || (b && c))");
        assert_eq!(parse("1 - 2 - 3").to_string(), "((1 - 2) - 3)");
    }

    #[test]
    fn test_chain_and_index() {
        assert_eq!(
            parse("a.b[0].c"),
            Expr::Chain(vec![
                Expr::ArrayIndex {
                    target: Box::new(Expr::Chain(vec![Expr::Key("a".into()), Expr::Key("b".into())])),
                    index: Box::new(Expr::Literal(Value::from(0))),
                },
                Expr::Key("c".into()),
            ])
        );
    }

    #[test]
    fn test_call_versus_key() {
        assert!(matches!(parse("total(amount)"), Expr::FunctionCall { name, args } if name == "total" && args.len() == 1));
        assert!(matches!(parse("total"), Expr::Key(name) if name == "total"));
        assert!(matches!(parse("count()"), Expr::FunctionCall { args, .. } if args.is_empty()));
    }

    #[test]
    fn test_negative_literal_is_folded() {
        assert_eq!(parse("-5"), Expr::Literal(Value::from(-5)));
        assert!(matches!(parse("-x"), Expr::UnaryOp { op: UnaryOp::Negate, .. }));
    }

    #[test]
    fn test_assignment_targets() {
        assert!(matches!(parse("x = 5"), Expr::Assignment { op: AssignOp::Assign, .. }));
        assert!(matches!(parse("a.b += 1"), Expr::Assignment { op: AssignOp::AddAssign, .. }));
        assert!(matches!(
            compile(expression_grammar(), "a + b = 1"),
            Err(ParseError::Rejected { .. })
        ));
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(parse(r#""say \"hi\"""#), Expr::Literal(Value::from("say \"hi\"")));
        assert_eq!(parse("'single'"), Expr::Literal(Value::from("single")));
    }
}
