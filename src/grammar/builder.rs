use std::collections::HashMap;

use thiserror::Error;
use tracing::trace;

use crate::grammar::rules::{Grammar, Rule, RuleId, RuleKind};
use crate::lexer::{CommentMode, Lexicon, PatternDef};
use crate::parser::ParseError;

/// Lexical names usable in grammar text as token patterns.
///
/// These names are reserved: a grammar cannot define a rule with one of them.
pub const LEXICAL_PATTERNS: &[(&str, &str)] = &[
    ("Number", "[1-9][0-9]*"),
    ("Integer", "[0-9]+"),
    ("Decimal", r"[0-9]*\.[0-9]+"),
    ("String", r#""([^"\\]|\\.)*""#),
    ("QuotedString", r"'([^'\\]|\\.)*'"),
    ("Name", r"[$a-zA-Z][$\w]*"),
];

/// Errors raised while assembling a grammar.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("rule '{0}' is referenced but never defined")]
    UndefinedRule(String),

    #[error("rule '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("'{0}' is a built-in lexical name and cannot be redefined")]
    ReservedName(String),

    #[error("unknown lexical pattern '{0}'")]
    UnknownLexical(String),

    #[error("grammar defines no rules")]
    Empty,

    #[error("repetition of '{0}' can match without consuming input")]
    NullableRepetition(String),

    #[error("invalid token pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

pub fn is_lexical(name: &str) -> bool {
    LEXICAL_PATTERNS.iter().any(|(n, _)| *n == name)
}

#[derive(Debug)]
struct Slot {
    name: Option<String>,
    kind: Option<RuleKind>,
}

/// Assembles a [`Grammar`] rule by rule.
///
/// Every combinator returns the id of a fresh rule. Named rules can be
/// [referenced](GrammarBuilder::reference) before they are
/// [defined](GrammarBuilder::define); [`build`](GrammarBuilder::build) fails if one
/// never is.
///
/// # Examples
///
/// ```
/// use report_expr::grammar::GrammarBuilder;
///
/// let mut g = GrammarBuilder::new();
/// let number = g.lexical("Integer").unwrap();
/// let plus = g.literal("+");
/// let tail = g.and(plus, number);
/// let tail = g.zero_or_more(tail);
/// let body = g.and(number, tail);
/// g.define("Sum", body).unwrap();
/// let grammar = g.build().unwrap();
/// assert_eq!(grammar.to_string(), "Sum { Integer (\"+\" Integer)* }\n");
/// ```
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    slots: Vec<Slot>,
    names: HashMap<String, RuleId>,
    order: Vec<RuleId>,
    patterns: Vec<PatternDef>,
    pattern_rules: HashMap<PatternDef, RuleId>,
    comments: CommentMode,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comments(&mut self, mode: CommentMode) -> &mut Self {
        self.comments = mode;
        self
    }

    fn push(&mut self, kind: RuleKind) -> RuleId {
        self.slots.push(Slot {
            name: None,
            kind: Some(kind),
        });
        self.slots.len() - 1
    }

    fn pattern_rule(&mut self, def: PatternDef) -> RuleId {
        if let Some(&id) = self.pattern_rules.get(&def) {
            return id;
        }
        let pattern = self.patterns.len();
        self.patterns.push(def.clone());
        self.slots.push(Slot {
            name: Some(def.name.clone()),
            kind: Some(RuleKind::Pattern(pattern)),
        });
        let id = self.slots.len() - 1;
        self.pattern_rules.insert(def, id);
        id
    }

    /// Leaf matching `text` verbatim. The same text always yields the same rule.
    pub fn literal(&mut self, text: &str) -> RuleId {
        self.pattern_rule(PatternDef::literal(text))
    }

    /// Leaf matching one of the [built-in lexical patterns](LEXICAL_PATTERNS).
    pub fn lexical(&mut self, name: &str) -> Result<RuleId, GrammarError> {
        let (_, source) = LEXICAL_PATTERNS
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| GrammarError::UnknownLexical(name.to_string()))?;
        Ok(self.pattern_rule(PatternDef::regex(name, source)))
    }

    /// Leaf matching a custom regular expression.
    pub fn pattern(&mut self, name: &str, regex: &str) -> RuleId {
        self.pattern_rule(PatternDef::regex(name, regex))
    }

    pub fn and(&mut self, left: RuleId, right: RuleId) -> RuleId {
        self.push(RuleKind::And(left, right))
    }

    pub fn or(&mut self, left: RuleId, right: RuleId) -> RuleId {
        self.push(RuleKind::Or(left, right))
    }

    pub fn zero_or_one(&mut self, child: RuleId) -> RuleId {
        self.push(RuleKind::ZeroOrOne(child))
    }

    pub fn zero_or_more(&mut self, child: RuleId) -> RuleId {
        self.push(RuleKind::ZeroOrMore(child))
    }

    pub fn one_or_more(&mut self, child: RuleId) -> RuleId {
        self.push(RuleKind::OneOrMore(child))
    }

    pub fn look_ahead(&mut self, child: Option<RuleId>, count: usize) -> RuleId {
        self.push(RuleKind::LookAhead { child, count })
    }

    /// Right-nested sequence of `items`; `None` when empty.
    pub fn sequence(&mut self, items: &[RuleId]) -> Option<RuleId> {
        let (&last, rest) = items.split_last()?;
        Some(rest.iter().rev().fold(last, |acc, &item| self.and(item, acc)))
    }

    /// Right-nested choice between `items`; `None` when empty.
    pub fn choice(&mut self, items: &[RuleId]) -> Option<RuleId> {
        let (&last, rest) = items.split_last()?;
        Some(rest.iter().rev().fold(last, |acc, &item| self.or(item, acc)))
    }

    /// The rule bound to `name`, reserving it if it is not defined yet.
    pub fn reference(&mut self, name: &str) -> RuleId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        self.slots.push(Slot {
            name: Some(name.to_string()),
            kind: None,
        });
        let id = self.slots.len() - 1;
        self.names.insert(name.to_string(), id);
        id
    }

    /// Binds `name` to `body`.
    pub fn define(&mut self, name: &str, body: RuleId) -> Result<RuleId, GrammarError> {
        if is_lexical(name) {
            return Err(GrammarError::ReservedName(name.to_string()));
        }
        let id = self.reference(name);
        let slot = &mut self.slots[id];
        if slot.kind.is_some() {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
        slot.kind = Some(RuleKind::Named(body));
        self.order.push(id);
        trace!(rule = name, "defined grammar rule");
        Ok(id)
    }

    /// Builds the grammar; the first defined rule is the start rule.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let start = *self.order.first().ok_or(GrammarError::Empty)?;
        self.build_from(start)
    }

    /// Builds the grammar starting from the named rule.
    pub fn build_starting_at(self, name: &str) -> Result<Grammar, GrammarError> {
        let start = *self
            .names
            .get(name)
            .ok_or_else(|| GrammarError::UndefinedRule(name.to_string()))?;
        self.build_from(start)
    }

    fn build_from(self, start: RuleId) -> Result<Grammar, GrammarError> {
        let mut rules = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let Some(kind) = slot.kind else {
                return Err(GrammarError::UndefinedRule(slot.name.unwrap_or_default()));
            };
            rules.push(Rule {
                name: slot.name,
                kind,
            });
        }

        let nullable = nullable_rules(&rules);
        let lexicon = Lexicon::new(self.patterns)?;
        let grammar = Grammar {
            rules,
            names: self.names,
            order: self.order,
            nullable,
            lexicon,
            start,
            comments: self.comments,
        };

        for (id, rule) in grammar.rules.iter().enumerate() {
            if let RuleKind::ZeroOrMore(child) | RuleKind::OneOrMore(child) = rule.kind
                && grammar.nullable[child]
            {
                return Err(GrammarError::NullableRepetition(grammar.describe(id)));
            }
        }

        Ok(grammar)
    }
}

/// Fixed point of "can match without consuming a token".
fn nullable_rules(rules: &[Rule]) -> Vec<bool> {
    let mut nullable = vec![false; rules.len()];
    let mut changed = true;
    while changed {
        changed = false;
        for (id, rule) in rules.iter().enumerate() {
            if nullable[id] {
                continue;
            }
            let now = match rule.kind {
                RuleKind::Pattern(_) => false,
                RuleKind::And(a, b) => nullable[a] && nullable[b],
                RuleKind::Or(a, b) => nullable[a] || nullable[b],
                RuleKind::ZeroOrOne(_) | RuleKind::ZeroOrMore(_) => true,
                RuleKind::OneOrMore(child) | RuleKind::Named(child) => nullable[child],
                RuleKind::LookAhead { child: None, .. } => true,
                RuleKind::LookAhead {
                    child: Some(child), ..
                } => nullable[child],
            };
            if now {
                nullable[id] = true;
                changed = true;
            }
        }
    }
    nullable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reference() {
        let mut g = GrammarBuilder::new();
        let later = g.reference("Later");
        let open = g.literal("(");
        let body = g.and(open, later);
        g.define("First", body).unwrap();
        let name = g.lexical("Name").unwrap();
        g.define("Later", name).unwrap();

        let grammar = g.build().unwrap();
        assert_eq!(grammar.find("Later"), Some(later));
        assert_eq!(grammar.rule_names().collect::<Vec<_>>(), vec!["First", "Later"]);
    }

    #[test]
    fn test_undefined_reference() {
        let mut g = GrammarBuilder::new();
        let missing = g.reference("Missing");
        g.define("Top", missing).unwrap();
        assert!(matches!(g.build(), Err(GrammarError::UndefinedRule(name)) if name == "Missing"));
    }

    #[test]
    fn test_literals_are_shared() {
        let mut g = GrammarBuilder::new();
        assert_eq!(g.literal("+"), g.literal("+"));
        assert_ne!(g.literal("+"), g.literal("-"));
    }

    #[test]
    fn test_reserved_and_duplicate_names() {
        let mut g = GrammarBuilder::new();
        let plus = g.literal("+");
        assert!(matches!(g.define("Name", plus), Err(GrammarError::ReservedName(_))));
        g.define("Plus", plus).unwrap();
        assert!(matches!(g.define("Plus", plus), Err(GrammarError::DuplicateRule(_))));
    }

    #[test]
    fn test_nullable_repetition_rejected() {
        let mut g = GrammarBuilder::new();
        let plus = g.literal("+");
        let optional = g.zero_or_one(plus);
        let many = g.zero_or_more(optional);
        g.define("Loop", many).unwrap();
        assert!(matches!(g.build(), Err(GrammarError::NullableRepetition(_))));
    }
}
