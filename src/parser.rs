//! Generic parser engine.
//!
//! [`Parser`] interprets a [`Grammar`] against the token stream of its lexer. It is
//! a recursive-descent interpreter with two controlled forms of backtracking:
//!
//! - `Or` tries its left alternative and falls back to the right one when the left
//!   fails *without consuming input*;
//! - `LookAhead` peeks at a bounded number of tokens without consuming them.
//!
//! A sequence whose left side consumed input but whose right side does not match
//! is a syntax error and aborts the parse.
//!
//! Results are built by a caller-supplied [`TreeBuilder`]. Every named rule
//! invocation collects its children in its own stack frame and hands them to the
//! builder when the rule completes, so recursive rules need no special care.
//!
//! Named rules may nest at most [`DEFAULT_MAX_DEPTH`] deep (see
//! [`Parser::with_max_depth`]). Deeper input fails with [`ParseError::TooDeep`]
//! instead of exhausting the thread's stack.

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::ast::{PatternId, Token};
use crate::grammar::{Grammar, RuleId, RuleKind};
use crate::lexer::{LexError, Lexer};

/// Errors raised while parsing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The lexer could not scan the input
    #[error(transparent)]
    Lex(#[from] LexError),

    /// A required part of a rule did not match after the rule consumed input
    #[error("syntax error in {rule} at line {line}, column {column}: expected {expected}, found {found}")]
    Syntax {
        rule: String,
        expected: String,
        found: String,
        offset: usize,
        line: usize,
        column: usize,
    },

    /// The start rule matched but input remains
    #[error("unexpected {found} at line {line}, column {column}, expected end of input")]
    TrailingInput {
        found: String,
        offset: usize,
        line: usize,
        column: usize,
    },

    /// Named rules nested deeper than the parser allows
    #[error("input nested too deeply in {rule} at line {line}, column {column} (limit {limit})")]
    TooDeep {
        rule: String,
        limit: usize,
        offset: usize,
        line: usize,
        column: usize,
    },

    /// The tree builder refused a rule's children
    #[error("invalid {rule} at line {line}, column {column}: {message}")]
    Rejected {
        rule: String,
        message: String,
        line: usize,
        column: usize,
    },
}

impl ParseError {
    /// Name of the rule the error was raised in, if any.
    pub fn rule(&self) -> Option<&str> {
        match self {
            ParseError::Syntax { rule, .. }
            | ParseError::TooDeep { rule, .. }
            | ParseError::Rejected { rule, .. } => Some(rule),
            _ => None,
        }
    }
}

/// Default bound on nested named rules. One parenthesized level of the
/// expression grammar uses twelve.
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// Result of matching one rule: `None` when it does not match here.
type Parsed<N> = Result<Option<Vec<N>>, Box<ParseError>>;

/// Builds caller-defined results while a grammar is parsed.
pub trait TreeBuilder {
    type Node;

    /// Called for every token a pattern rule consumes.
    fn token(&mut self, token: Token) -> Self::Node;

    /// Called when a named rule completes, with the nodes its body produced in
    /// order. An `Err` message aborts the parse with [`ParseError::Rejected`].
    fn rule(&mut self, name: &str, children: Vec<Self::Node>) -> Result<Self::Node, String>;
}

/// Concrete syntax tree: the default parse result.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    Token(Token),
    Rule {
        name: String,
        children: Vec<ParseTree>,
    },
}

impl ParseTree {
    /// Rule name, or the token's pattern name.
    pub fn name(&self) -> &str {
        match self {
            ParseTree::Token(token) => &token.name,
            ParseTree::Rule { name, .. } => name,
        }
    }

    pub fn children(&self) -> &[ParseTree] {
        match self {
            ParseTree::Token(_) => &[],
            ParseTree::Rule { children, .. } => children,
        }
    }

    /// The matched tokens' text, separated by single spaces.
    pub fn text(&self) -> String {
        match self {
            ParseTree::Token(token) => token.text.clone(),
            ParseTree::Rule { children, .. } => children
                .iter()
                .map(ParseTree::text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            ParseTree::Token(token) => writeln!(f, "{:indent$}{:?}", "", token.text, indent = depth * 2),
            ParseTree::Rule { name, children } => {
                writeln!(f, "{:indent$}{}", "", name, indent = depth * 2)?;
                for child in children {
                    child.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// [`TreeBuilder`] producing a [`ParseTree`].
#[derive(Debug, Default)]
pub struct TreeCollector;

impl TreeBuilder for TreeCollector {
    type Node = ParseTree;

    fn token(&mut self, token: Token) -> ParseTree {
        ParseTree::Token(token)
    }

    fn rule(&mut self, name: &str, children: Vec<ParseTree>) -> Result<ParseTree, String> {
        Ok(ParseTree::Rule {
            name: name.to_string(),
            children,
        })
    }
}

/// Parses `input` from the grammar's start rule into a [`ParseTree`].
pub fn parse_tree(grammar: &Grammar, input: &str) -> Result<ParseTree, ParseError> {
    Parser::new(grammar, input).parse(&mut TreeCollector)
}

/// One parse of one input against one grammar.
///
/// Holds the per-parse mutable state: the lexer, the lookahead buffer and the
/// stack of rules being parsed. Create one per input; the grammar itself is
/// shared.
pub struct Parser<'a> {
    grammar: &'a Grammar,
    lexer: Lexer<'a>,
    /// Tokens scanned but not yet consumed
    buffer: VecDeque<Token>,
    exhausted: bool,
    /// Tokens consumed so far
    consumed: usize,
    /// Largest number of tokens buffered at once
    high_water: usize,
    rule_stack: Vec<RuleId>,
    /// Named rules currently open, including those entered by lookahead
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(grammar: &'a Grammar, input: &'a str) -> Self {
        Parser {
            grammar,
            lexer: grammar.lexer(input),
            buffer: VecDeque::new(),
            exhausted: false,
            consumed: 0,
            high_water: 0,
            rule_stack: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bounds how deeply named rules may nest.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parses the whole input from the grammar's start rule.
    pub fn parse<B: TreeBuilder>(&mut self, builder: &mut B) -> Result<B::Node, ParseError> {
        let start = self.grammar.start();
        self.parse_rule(start, builder)
    }

    /// Parses the whole input from `rule`.
    pub fn parse_rule<B: TreeBuilder>(
        &mut self,
        rule: RuleId,
        builder: &mut B,
    ) -> Result<B::Node, ParseError> {
        let Some(mut nodes) = self.try_parse(rule, builder).map_err(|err| *err)? else {
            return Err(self.syntax_error(rule));
        };

        if let Some(token) = self.peek(0)? {
            return Err(ParseError::TrailingInput {
                found: describe_token(token),
                offset: token.start,
                line: token.line,
                column: token.column,
            });
        }

        // Unnamed start rules can yield several nodes; wrap them under the rule's text.
        if nodes.len() == 1 {
            return Ok(nodes.remove(0));
        }
        let name = self.rule_name(rule);
        builder
            .rule(&name, nodes)
            .map_err(|message| ParseError::Rejected {
                rule: name,
                message,
                line: 1,
                column: 1,
            })
    }

    /// Most tokens held in the lookahead buffer during this parse.
    pub fn lookahead_high_water(&self) -> usize {
        self.high_water
    }

    fn rule_name(&self, id: RuleId) -> String {
        self.grammar
            .rule(id)
            .name
            .clone()
            .unwrap_or_else(|| self.grammar.describe(id))
    }

    /// Token `index` positions ahead, scanning as needed.
    fn peek(&mut self, index: usize) -> Result<Option<&Token>, ParseError> {
        while self.buffer.len() <= index && !self.exhausted {
            match self.lexer.next_token()? {
                Some(token) => self.buffer.push_back(token),
                None => self.exhausted = true,
            }
        }
        self.high_water = self.high_water.max(self.buffer.len());
        Ok(self.buffer.get(index))
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.buffer.pop_front()?;
        self.consumed += 1;
        Some(token)
    }

    /// Offset, line and column of the next token, or of the end of input.
    fn location(&mut self) -> Result<(usize, usize, usize), ParseError> {
        Ok(match self.peek(0)? {
            Some(token) => (token.start, token.line, token.column),
            None => self.lexer.location(),
        })
    }

    fn syntax_error(&mut self, expected: RuleId) -> ParseError {
        let rule = self
            .rule_stack
            .last()
            .map(|&id| self.rule_name(id))
            .unwrap_or_else(|| self.rule_name(expected));
        let expected = self.grammar.describe(expected);
        let found = match self.peek(0) {
            Ok(token) => token.map_or_else(|| "end of input".to_string(), describe_token),
            Err(err) => return err,
        };
        match self.location() {
            Ok((offset, line, column)) => ParseError::Syntax {
                rule,
                expected,
                found,
                offset,
                line,
                column,
            },
            Err(err) => err,
        }
    }

    #[cold]
    fn too_deep(&mut self, id: RuleId) -> ParseError {
        let rule = self.rule_name(id);
        match self.location() {
            Ok((offset, line, column)) => ParseError::TooDeep {
                rule,
                limit: self.max_depth,
                offset,
                line,
                column,
            },
            Err(err) => err,
        }
    }

    /// Parses `id` at the current position.
    ///
    /// `Ok(None)` means "no match" and guarantees no token was consumed.
    /// Dispatch only: this frame sits on the stack once per open rule node.
    fn try_parse<B: TreeBuilder>(&mut self, id: RuleId, builder: &mut B) -> Parsed<B::Node> {
        match self.grammar.kind(id) {
            RuleKind::Pattern(pattern) => self.parse_pattern(pattern, builder),
            RuleKind::And(left, right) => self.parse_and(left, right, builder),
            RuleKind::Or(left, right) => self.parse_or(left, right, builder),
            RuleKind::ZeroOrOne(child) => self.parse_optional(child, builder),
            RuleKind::ZeroOrMore(child) => self.parse_repeated(child, false, builder),
            RuleKind::OneOrMore(child) => self.parse_repeated(child, true, builder),
            RuleKind::LookAhead { child: None, .. } => Ok(Some(Vec::new())),
            RuleKind::LookAhead {
                child: Some(child),
                count,
            } => self.parse_guarded(child, count, builder),
            RuleKind::Named(body) => self.parse_named(id, body, builder),
        }
    }

    fn parse_pattern<B: TreeBuilder>(&mut self, pattern: PatternId, builder: &mut B) -> Parsed<B::Node> {
        if !matches!(self.peek(0)?, Some(token) if token.pattern == pattern) {
            return Ok(None);
        }
        Ok(self.advance().map(|token| vec![builder.token(token)]))
    }

    fn parse_and<B: TreeBuilder>(&mut self, left: RuleId, right: RuleId, builder: &mut B) -> Parsed<B::Node> {
        if let RuleKind::LookAhead { child: None, count } = self.grammar.kind(left) {
            return self.parse_guarded(right, count, builder);
        }

        let start = self.consumed;
        let Some(mut nodes) = self.try_parse(left, builder)? else {
            return Ok(None);
        };
        match self.try_parse(right, builder)? {
            Some(more) => {
                nodes.extend(more);
                Ok(Some(nodes))
            }
            None if self.consumed == start => Ok(None),
            None => Err(Box::new(self.syntax_error(right))),
        }
    }

    fn parse_or<B: TreeBuilder>(&mut self, left: RuleId, right: RuleId, builder: &mut B) -> Parsed<B::Node> {
        match self.try_parse(left, builder)? {
            Some(nodes) => Ok(Some(nodes)),
            None => self.try_parse(right, builder),
        }
    }

    fn parse_optional<B: TreeBuilder>(&mut self, child: RuleId, builder: &mut B) -> Parsed<B::Node> {
        Ok(Some(self.try_parse(child, builder)?.unwrap_or_default()))
    }

    fn parse_repeated<B: TreeBuilder>(
        &mut self,
        child: RuleId,
        at_least_one: bool,
        builder: &mut B,
    ) -> Parsed<B::Node> {
        let mut nodes = Vec::new();
        if at_least_one {
            match self.try_parse(child, builder)? {
                Some(first) => nodes = first,
                None => return Ok(None),
            }
        }
        self.repeat(child, builder, &mut nodes)?;
        Ok(Some(nodes))
    }

    /// Parses `id` only if the next `count` tokens fit it.
    fn parse_guarded<B: TreeBuilder>(&mut self, id: RuleId, count: usize, builder: &mut B) -> Parsed<B::Node> {
        let fits = self.look_ahead(id, count, 0).map_err(Box::new)?;
        if fits.is_none() {
            return Ok(None);
        }
        self.try_parse(id, builder)
    }

    fn parse_named<B: TreeBuilder>(&mut self, id: RuleId, body: RuleId, builder: &mut B) -> Parsed<B::Node> {
        if self.depth >= self.max_depth {
            return Err(Box::new(self.too_deep(id)));
        }
        let (_, line, column) = self.location()?;
        self.depth += 1;
        self.rule_stack.push(id);
        let result = self.try_parse(body, builder);
        self.rule_stack.pop();
        self.depth -= 1;

        let Some(children) = result? else {
            return Ok(None);
        };
        let name = self.rule_name(id);
        match builder.rule(&name, children) {
            Ok(node) => Ok(Some(vec![node])),
            Err(message) => Err(Box::new(ParseError::Rejected {
                rule: name,
                message,
                line,
                column,
            })),
        }
    }

    fn repeat<B: TreeBuilder>(
        &mut self,
        child: RuleId,
        builder: &mut B,
        nodes: &mut Vec<B::Node>,
    ) -> Result<(), Box<ParseError>> {
        loop {
            let before = self.consumed;
            match self.try_parse(child, builder)? {
                Some(more) => {
                    nodes.extend(more);
                    if self.consumed == before {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            }
        }
    }

    /// Checks whether the tokens from `index` on fit `id`, spending at most
    /// `budget` tokens. Consumes nothing.
    ///
    /// Returns the unspent budget and the index after the checked tokens, or
    /// `None` if the tokens do not fit. Running out of budget counts as a fit.
    fn look_ahead(
        &mut self,
        id: RuleId,
        budget: usize,
        index: usize,
    ) -> Result<Option<(usize, usize)>, ParseError> {
        if budget == 0 {
            return Ok(Some((0, index)));
        }

        match self.grammar.kind(id) {
            RuleKind::Pattern(pattern) => Ok(match self.peek(index)? {
                Some(token) if token.pattern == pattern => Some((budget - 1, index + 1)),
                _ => None,
            }),

            RuleKind::And(left, right) => {
                let Some((budget, index)) = self.look_ahead(left, budget, index)? else {
                    return Ok(None);
                };
                self.look_ahead(right, budget, index)
            }

            RuleKind::Or(left, right) => match self.look_ahead(left, budget, index)? {
                Some(fit) => Ok(Some(fit)),
                None => self.look_ahead(right, budget, index),
            },

            RuleKind::ZeroOrOne(child) => {
                Ok(Some(self.look_ahead(child, budget, index)?.unwrap_or((budget, index))))
            }

            RuleKind::ZeroOrMore(child) => self.look_ahead_repeat(child, (budget, index)).map(Some),

            RuleKind::OneOrMore(child) => match self.look_ahead(child, budget, index)? {
                Some(first) => self.look_ahead_repeat(child, first).map(Some),
                None => Ok(None),
            },

            RuleKind::LookAhead { child: None, .. } => Ok(Some((budget, index))),

            RuleKind::LookAhead {
                child: Some(child), ..
            } => self.look_ahead(child, budget, index),

            RuleKind::Named(child) => {
                if self.depth >= self.max_depth {
                    return Err(self.too_deep(id));
                }
                self.depth += 1;
                let fit = self.look_ahead(child, budget, index);
                self.depth -= 1;
                fit
            }
        }
    }

    fn look_ahead_repeat(
        &mut self,
        child: RuleId,
        mut state: (usize, usize),
    ) -> Result<(usize, usize), ParseError> {
        while state.0 > 0 {
            match self.look_ahead(child, state.0, state.1)? {
                Some(next) if next.1 > state.1 => state = next,
                _ => break,
            }
        }
        Ok(state)
    }
}

fn describe_token(token: &Token) -> String {
    if token.name == token.text {
        format!("'{}'", token.text)
    } else {
        format!("{} '{}'", token.name, token.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    /// `List { "[" Item ("," Item)* "]" }` with `Item { Integer | List }`
    fn list_grammar() -> Grammar {
        let mut g = GrammarBuilder::new();
        let open = g.literal("[");
        let close = g.literal("]");
        let comma = g.literal(",");
        let item = g.reference("Item");
        let tail = g.and(comma, item);
        let tail = g.zero_or_more(tail);
        let body = g.sequence(&[open, item, tail, close]).unwrap();
        let list = g.define("List", body).unwrap();
        let integer = g.lexical("Integer").unwrap();
        let item_body = g.or(integer, list);
        g.define("Item", item_body).unwrap();
        g.build().unwrap()
    }

    #[test]
    fn test_recursive_rules() {
        let grammar = list_grammar();
        let tree = parse_tree(&grammar, "[1, [2, 3], 4]").unwrap();
        assert_eq!(tree.name(), "List");
        let items: Vec<&str> = tree
            .children()
            .iter()
            .filter(|c| c.name() == "Item")
            .map(|c| c.children()[0].name())
            .collect();
        assert_eq!(items, vec!["Integer", "List", "Integer"]);
    }

    #[test]
    fn test_required_continuation_is_an_error() {
        let grammar = list_grammar();
        let err = parse_tree(&grammar, "[1, ]").unwrap_err();
        match err {
            ParseError::Syntax { found, column, .. } => {
                assert_eq!(found, "']'");
                assert_eq!(column, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_trailing_input() {
        let grammar = list_grammar();
        assert!(matches!(
            parse_tree(&grammar, "[1] 2"),
            Err(ParseError::TrailingInput { .. })
        ));
    }

    #[test]
    fn test_lookahead_selects_alternative() {
        // Call { LookAhead(2) Name "(" ")" }  Top { Call | Name }
        let mut g = GrammarBuilder::new();
        let call = g.reference("Call");
        let name = g.lexical("Name").unwrap();
        let top = g.or(call, name);
        g.define("Top", top).unwrap();
        let look = g.look_ahead(None, 2);
        let open = g.literal("(");
        let close = g.literal(")");
        let body = g.sequence(&[look, name, open, close]).unwrap();
        g.define("Call", body).unwrap();
        let grammar = g.build().unwrap();

        let mut parser = Parser::new(&grammar, "foo");
        let tree = parser.parse(&mut TreeCollector).unwrap();
        assert_eq!(tree.children()[0].name(), "Name");
        assert_eq!(parser.lookahead_high_water(), 1);

        let tree = parse_tree(&grammar, "foo()").unwrap();
        assert_eq!(tree.children()[0].name(), "Call");
    }
}
