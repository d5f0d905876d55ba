//! The grammar of grammars.
//!
//! Grammar definition text is itself parsed by the generic [`Parser`] against a
//! grammar built once by hand:
//!
//! ```text
//! Grammar       { RuleDef* }
//! RuleDef       { Name "{" Expression "}" }
//! Expression    { AndExpr ("|" AndExpr)* }
//! AndExpr       { CountExpr+ }
//! CountExpr     { PrimaryExpr ("*" | "+" | "?")? }
//! PrimaryExpr   { String | QuotedString | LookAheadExpr | Name | Group }
//! LookAheadExpr { "LookAhead" "(" (Number | Expression) ")" }
//! Group         { "(" Expression ")" }
//! ```
//!
//! `//` and `/* */` comments are skipped.

use std::sync::OnceLock;

use crate::ast::Token;
use crate::grammar::builder::{GrammarBuilder, GrammarError, is_lexical};
use crate::grammar::rules::{Grammar, RuleId};
use crate::lexer::CommentMode;
use crate::parser::{Parser, TreeBuilder};

static META_GRAMMAR: OnceLock<Grammar> = OnceLock::new();

/// The grammar of grammar definitions, built on first use.
pub fn meta_grammar() -> &'static Grammar {
    META_GRAMMAR.get_or_init(|| {
        build_meta_grammar().unwrap_or_else(|err| panic!("built-in meta-grammar is invalid: {err}"))
    })
}

fn build_meta_grammar() -> Result<Grammar, GrammarError> {
    let mut g = GrammarBuilder::new();
    g.comments(CommentMode::Skip);

    let rule_def = g.reference("RuleDef");
    let expression = g.reference("Expression");
    let and_expr = g.reference("AndExpr");
    let count_expr = g.reference("CountExpr");
    let primary = g.reference("PrimaryExpr");
    let look_ahead_expr = g.reference("LookAheadExpr");
    let group = g.reference("Group");

    let name = g.lexical("Name")?;
    let string = g.lexical("String")?;
    let quoted = g.lexical("QuotedString")?;
    let number = g.lexical("Number")?;
    let open_brace = g.literal("{");
    let close_brace = g.literal("}");
    let open_paren = g.literal("(");
    let close_paren = g.literal(")");
    let bar = g.literal("|");
    let star = g.literal("*");
    let plus = g.literal("+");
    let question = g.literal("?");
    let look_ahead = g.literal("LookAhead");

    let body = g.zero_or_more(rule_def);
    g.define("Grammar", body)?;

    let body = seq(&mut g, &[name, open_brace, expression, close_brace]);
    g.define("RuleDef", body)?;

    let alternative = g.and(bar, and_expr);
    let alternatives = g.zero_or_more(alternative);
    let body = g.and(and_expr, alternatives);
    g.define("Expression", body)?;

    let body = g.one_or_more(count_expr);
    g.define("AndExpr", body)?;

    let counts = one_of(&mut g, &[star, plus, question]);
    let count = g.zero_or_one(counts);
    let body = g.and(primary, count);
    g.define("CountExpr", body)?;

    let body = one_of(&mut g, &[string, quoted, look_ahead_expr, name, group]);
    g.define("PrimaryExpr", body)?;

    let argument = g.or(number, expression);
    let body = seq(&mut g, &[look_ahead, open_paren, argument, close_paren]);
    g.define("LookAheadExpr", body)?;

    let body = seq(&mut g, &[open_paren, expression, close_paren]);
    g.define("Group", body)?;

    g.build()
}

fn seq(g: &mut GrammarBuilder, items: &[RuleId]) -> RuleId {
    g.sequence(items).unwrap_or_else(|| unreachable!("sequence of literal parts"))
}

fn one_of(g: &mut GrammarBuilder, items: &[RuleId]) -> RuleId {
    g.choice(items).unwrap_or_else(|| unreachable!("choice of literal parts"))
}

/// Compiles grammar definition text into a [`Grammar`].
///
/// The first rule in the text becomes the start rule.
///
/// # Examples
///
/// ```
/// use report_expr::grammar::parse_grammar;
///
/// let grammar = parse_grammar(r#"
///     // a comma separated list of names
///     Names { Name ("," Name)* }
/// "#).unwrap();
/// assert_eq!(grammar.rule_names().collect::<Vec<_>>(), vec!["Names"]);
/// ```
pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarError> {
    let mut builder = MetaBuilder::default();
    let result = Parser::new(meta_grammar(), text).parse(&mut builder);
    if let Some(err) = builder.error.take() {
        return Err(err);
    }
    result?;
    builder.grammar.build()
}

enum MetaNode {
    Token(Token),
    Rule(RuleId),
    Done,
}

/// Turns meta-grammar parse events into grammar builder calls.
#[derive(Default)]
struct MetaBuilder {
    grammar: GrammarBuilder,
    /// First building error; the parse is aborted when it is set
    error: Option<GrammarError>,
}

impl MetaBuilder {
    fn fail(&mut self, err: GrammarError) -> String {
        let message = err.to_string();
        self.error.get_or_insert(err);
        message
    }

    fn primary(&mut self, token: Token) -> Result<RuleId, String> {
        match token.name.as_str() {
            "String" | "QuotedString" => Ok(self.grammar.literal(&token.unquoted())),
            _ if is_lexical(&token.text) => self.grammar.lexical(&token.text).map_err(|e| self.fail(e)),
            _ => Ok(self.grammar.reference(&token.text)),
        }
    }
}

fn rules(children: Vec<MetaNode>) -> Vec<RuleId> {
    children
        .into_iter()
        .filter_map(|node| match node {
            MetaNode::Rule(id) => Some(id),
            _ => None,
        })
        .collect()
}

impl TreeBuilder for MetaBuilder {
    type Node = MetaNode;

    fn token(&mut self, token: Token) -> MetaNode {
        MetaNode::Token(token)
    }

    fn rule(&mut self, name: &str, children: Vec<MetaNode>) -> Result<MetaNode, String> {
        let mut children = children.into_iter();
        let node = match name {
            "Grammar" => MetaNode::Done,

            "RuleDef" => {
                let Some(MetaNode::Token(name)) = children.next() else {
                    return Err("rule definition without a name".to_string());
                };
                let Some(&body) = rules(children.collect()).first() else {
                    return Err(format!("rule '{}' has no body", name.text));
                };
                self.grammar.define(&name.text, body).map_err(|e| self.fail(e))?;
                MetaNode::Done
            }

            "Expression" => {
                let alternatives = rules(children.collect());
                match self.grammar.choice(&alternatives) {
                    Some(id) => MetaNode::Rule(id),
                    None => return Err("empty alternative".to_string()),
                }
            }

            "AndExpr" => {
                let items = rules(children.collect());
                match self.grammar.sequence(&items) {
                    Some(id) => MetaNode::Rule(id),
                    None => return Err("empty sequence".to_string()),
                }
            }

            "CountExpr" => {
                let Some(MetaNode::Rule(child)) = children.next() else {
                    return Err("missing repeated expression".to_string());
                };
                let id = match children.next() {
                    Some(MetaNode::Token(op)) => match op.text.as_str() {
                        "*" => self.grammar.zero_or_more(child),
                        "+" => self.grammar.one_or_more(child),
                        _ => self.grammar.zero_or_one(child),
                    },
                    _ => child,
                };
                MetaNode::Rule(id)
            }

            "PrimaryExpr" => match children.next() {
                Some(MetaNode::Token(token)) => MetaNode::Rule(self.primary(token)?),
                Some(node @ MetaNode::Rule(_)) => node,
                _ => return Err("empty primary expression".to_string()),
            },

            "LookAheadExpr" => {
                // "LookAhead" "(" argument ")"
                let argument = children.nth(2);
                let id = match argument {
                    Some(MetaNode::Token(count)) => {
                        let count = count
                            .text
                            .parse()
                            .map_err(|_| format!("invalid lookahead count '{}'", count.text))?;
                        self.grammar.look_ahead(None, count)
                    }
                    Some(MetaNode::Rule(child)) => self.grammar.look_ahead(Some(child), usize::MAX),
                    _ => return Err("missing lookahead argument".to_string()),
                };
                MetaNode::Rule(id)
            }

            "Group" => match rules(children.collect()).first() {
                Some(&id) => MetaNode::Rule(id),
                None => return Err("empty group".to_string()),
            },

            other => return Err(format!("unexpected meta rule '{other}'")),
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuleKind;

    #[test]
    fn test_meta_grammar_renders_itself() {
        let text = meta_grammar().to_string();
        assert!(text.starts_with("Grammar { RuleDef* }\n"));
        assert!(text.contains("CountExpr { PrimaryExpr (\"*\" | \"+\" | \"?\")? }"));
    }

    #[test]
    fn test_round_trip_through_display() {
        let source = r#"
            Sum { Product (("+" | "-") Product)* }
            Product { Integer ("*" Integer)* }
        "#;
        let first = parse_grammar(source).unwrap();
        let second = parse_grammar(&first.to_string()).unwrap();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_lookahead_forms() {
        let grammar = parse_grammar(
            r#"Call { LookAhead(2) Name "(" ")" }
               Peek { LookAhead(Name "=") Name "=" Integer }"#,
        )
        .unwrap();
        let call = grammar.find("Call").unwrap();
        let RuleKind::Named(body) = grammar.kind(call) else {
            panic!("Call is not a named rule");
        };
        let RuleKind::And(first, _) = grammar.kind(body) else {
            panic!("Call body is not a sequence");
        };
        assert_eq!(grammar.kind(first), RuleKind::LookAhead { child: None, count: 2 });
    }

    #[test]
    fn test_undefined_reference_is_reported() {
        let err = parse_grammar("Top { Missing }").unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedRule(name) if name == "Missing"));
    }

    #[test]
    fn test_redefining_lexical_is_reported() {
        let err = parse_grammar("Name { \"x\" }").unwrap_err();
        assert!(matches!(err, GrammarError::ReservedName(_)));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = parse_grammar("Top { \"a\" ").unwrap_err();
        assert!(matches!(err, GrammarError::Parse(_)));
    }
}
