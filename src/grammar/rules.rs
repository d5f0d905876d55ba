use std::collections::HashMap;
use std::fmt;

use crate::ast::PatternId;
use crate::lexer::{CommentMode, Lexer, Lexicon};

/// Index of a rule inside its [`Grammar`].
pub type RuleId = usize;

/// The shape of a grammar rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Leaf: matches exactly one token of the given pattern
    Pattern(PatternId),

    /// Sequence: left then right
    And(RuleId, RuleId),

    /// Ordered choice: left, or else right
    Or(RuleId, RuleId),

    /// Optional child
    ZeroOrOne(RuleId),

    /// Any number of repetitions of the child
    ZeroOrMore(RuleId),

    /// At least one repetition of the child
    OneOrMore(RuleId),

    /// Bounded lookahead.
    ///
    /// Without a child, checks that the next `count` tokens fit the rule that
    /// follows it in the enclosing sequence. With a child, checks the child the
    /// same way and then parses it.
    LookAhead { child: Option<RuleId>, count: usize },

    /// A named rule bound to its body
    Named(RuleId),
}

/// One node of the rule arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Rule name for named rules and pattern leaves
    pub name: Option<String>,
    pub kind: RuleKind,
}

/// An immutable, fully resolved grammar together with its token patterns.
#[derive(Debug)]
pub struct Grammar {
    pub(crate) rules: Vec<Rule>,
    pub(crate) names: HashMap<String, RuleId>,
    /// Named rules in definition order
    pub(crate) order: Vec<RuleId>,
    pub(crate) nullable: Vec<bool>,
    pub(crate) lexicon: Lexicon,
    pub(crate) start: RuleId,
    pub(crate) comments: CommentMode,
}

impl Grammar {
    /// The rule a parse starts from: the first rule defined.
    pub fn start(&self) -> RuleId {
        self.start
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn kind(&self, id: RuleId) -> RuleKind {
        self.rules[id].kind
    }

    /// Looks up a named rule.
    pub fn find(&self, name: &str) -> Option<RuleId> {
        self.names.get(name).copied()
    }

    /// Names of the defined rules, in definition order.
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter_map(|&id| self.rules[id].name.as_deref())
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn comments(&self) -> CommentMode {
        self.comments
    }

    /// Same grammar with a different comment mode for its lexer.
    pub fn with_comments(mut self, comments: CommentMode) -> Self {
        self.comments = comments;
        self
    }

    /// A lexer over `input` using this grammar's patterns.
    pub fn lexer<'a>(&'a self, input: &'a str) -> Lexer<'a> {
        Lexer::new(&self.lexicon, input).with_comments(self.comments)
    }

    /// True if the rule can succeed without consuming a token.
    pub fn is_optional(&self, id: RuleId) -> bool {
        self.nullable[id]
    }

    /// Renders a rule body in grammar-definition syntax.
    pub fn describe(&self, id: RuleId) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.render(&mut out, id, Precedence::Choice);
        out
    }

    fn render(&self, out: &mut impl fmt::Write, id: RuleId, outer: Precedence) -> fmt::Result {
        let rule = &self.rules[id];
        match rule.kind {
            RuleKind::Pattern(pattern) => match self.lexicon.pattern(pattern) {
                Some(def) if def.literal => write!(out, "\"{}\"", escape(&def.source)),
                Some(def) => write!(out, "{}", def.name),
                None => write!(out, "<pattern {}>", pattern),
            },
            RuleKind::Named(_) => write!(out, "{}", rule.name.as_deref().unwrap_or("?")),
            RuleKind::And(left, right) => self.wrap(out, outer, Precedence::Sequence, |g, out| {
                g.render(out, left, Precedence::Sequence)?;
                out.write_char(' ')?;
                g.render(out, right, Precedence::Sequence)
            }),
            RuleKind::Or(left, right) => self.wrap(out, outer, Precedence::Choice, |g, out| {
                g.render(out, left, Precedence::Choice)?;
                out.write_str(" | ")?;
                g.render(out, right, Precedence::Choice)
            }),
            RuleKind::ZeroOrOne(child) => self.render_counted(out, child, '?'),
            RuleKind::ZeroOrMore(child) => self.render_counted(out, child, '*'),
            RuleKind::OneOrMore(child) => self.render_counted(out, child, '+'),
            RuleKind::LookAhead { child: None, count } => write!(out, "LookAhead({})", count),
            RuleKind::LookAhead {
                child: Some(child), ..
            } => {
                out.write_str("LookAhead(")?;
                self.render(out, child, Precedence::Choice)?;
                out.write_char(')')
            }
        }
    }

    fn render_counted(&self, out: &mut impl fmt::Write, child: RuleId, op: char) -> fmt::Result {
        self.render(out, child, Precedence::Counted)?;
        out.write_char(op)
    }

    fn wrap<W: fmt::Write>(
        &self,
        out: &mut W,
        outer: Precedence,
        inner: Precedence,
        body: impl FnOnce(&Self, &mut W) -> fmt::Result,
    ) -> fmt::Result {
        if inner < outer {
            out.write_char('(')?;
            body(self, out)?;
            out.write_char(')')
        } else {
            body(self, out)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Choice,
    Sequence,
    Counted,
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders every defined rule as `Name { body }`, one per line.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &id in &self.order {
            let RuleKind::Named(body) = self.rules[id].kind else {
                continue;
            };
            write!(f, "{} {{ ", self.rules[id].name.as_deref().unwrap_or("?"))?;
            self.render(f, body, Precedence::Choice)?;
            writeln!(f, " }}")?;
        }
        Ok(())
    }
}
