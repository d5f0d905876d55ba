use regex::Regex;
use thiserror::Error;

use crate::ast::{PatternId, SPECIAL_PATTERN, Token};

/// Errors raised while scanning. Tokenizing is fail-fast: there is no recovery.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    /// No leaf pattern matches at the current position
    #[error("unexpected character {found:?} at line {line}, column {column}")]
    UnexpectedCharacter {
        found: char,
        offset: usize,
        line: usize,
        column: usize,
    },

    /// A `/*` comment is never closed
    #[error("unterminated comment starting at line {line}, column {column}")]
    UnterminatedComment {
        offset: usize,
        line: usize,
        column: usize,
    },
}

/// Definition of a leaf pattern: either fixed text or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternDef {
    /// Token name reported for matches
    pub name: String,
    /// Literal text or regex source
    pub source: String,
    /// True when `source` is matched verbatim
    pub literal: bool,
}

impl PatternDef {
    pub fn literal(text: &str) -> Self {
        PatternDef {
            name: text.to_string(),
            source: text.to_string(),
            literal: true,
        }
    }

    pub fn regex(name: &str, source: &str) -> Self {
        PatternDef {
            name: name.to_string(),
            source: source.to_string(),
            literal: false,
        }
    }
}

#[derive(Debug)]
enum Matcher {
    Literal(String),
    Regex(Regex),
}

#[derive(Debug)]
struct CompiledPattern {
    def: PatternDef,
    matcher: Matcher,
    /// Number of leading characters every match starts with
    literal_prefix: usize,
}

impl CompiledPattern {
    fn match_len(&self, rest: &str) -> Option<usize> {
        match &self.matcher {
            Matcher::Literal(text) => rest.starts_with(text.as_str()).then_some(text.len()),
            Matcher::Regex(re) => re.find(rest).map(|m| m.end()),
        }
    }
}

const ASCII_BUCKETS: usize = 128;

/// The compiled leaf patterns of one grammar.
///
/// Built once per grammar and shared by every [`Lexer`] scanning against it.
/// Patterns are indexed by their fixed first character so a scan only tries the
/// ASCII bucket of the current character plus the catch-all bucket.
#[derive(Debug)]
pub struct Lexicon {
    patterns: Vec<CompiledPattern>,
    by_first_char: Vec<Vec<PatternId>>,
    catch_all: Vec<PatternId>,
}

impl Lexicon {
    pub fn new(defs: Vec<PatternDef>) -> Result<Self, regex::Error> {
        let mut patterns = Vec::with_capacity(defs.len());
        let mut by_first_char = vec![Vec::new(); ASCII_BUCKETS];
        let mut catch_all = Vec::new();

        for (id, def) in defs.into_iter().enumerate() {
            let (matcher, prefix) = if def.literal {
                (Matcher::Literal(def.source.clone()), def.source.clone())
            } else {
                let re = Regex::new(&format!("^(?:{})", def.source))?;
                (Matcher::Regex(re), regex_literal_prefix(&def.source))
            };

            match prefix.chars().next() {
                Some(c) if c.is_ascii() => by_first_char[c as usize].push(id),
                _ => catch_all.push(id),
            }

            patterns.push(CompiledPattern {
                def,
                matcher,
                literal_prefix: prefix.chars().count(),
            });
        }

        Ok(Lexicon {
            patterns,
            by_first_char,
            catch_all,
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern(&self, id: PatternId) -> Option<&PatternDef> {
        self.patterns.get(id).map(|p| &p.def)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PatternDef> {
        self.patterns.iter().map(|p| &p.def)
    }

    /// Longest match at the start of `rest`: `(pattern, byte length)`.
    ///
    /// Ties on length go to the longer literal prefix, then to the pattern
    /// registered first.
    fn longest_match(&self, rest: &str) -> Option<(PatternId, usize)> {
        let bucket: &[PatternId] = match rest.chars().next() {
            Some(c) if c.is_ascii() => &self.by_first_char[c as usize],
            _ => &[],
        };

        let mut best: Option<(PatternId, usize, usize)> = None;
        for &id in bucket.iter().chain(self.catch_all.iter()) {
            let pattern = &self.patterns[id];
            let Some(len) = pattern.match_len(rest) else {
                continue;
            };
            if len == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_id, best_len, best_prefix)) => {
                    (len, pattern.literal_prefix) > (best_len, best_prefix)
                        || ((len, pattern.literal_prefix) == (best_len, best_prefix)
                            && id < best_id)
                }
            };
            if better {
                best = Some((id, len, pattern.literal_prefix));
            }
        }
        best.map(|(id, len, _)| (id, len))
    }
}

/// Fixed text every match of `source` begins with.
///
/// Conservative: alternation anywhere, or any construct it does not understand,
/// ends the prefix.
fn regex_literal_prefix(source: &str) -> String {
    if has_top_level_alternation(source) {
        return String::new();
    }

    let chars: Vec<char> = source.chars().collect();
    let mut prefix = String::new();
    let mut i = 0;
    while i < chars.len() {
        let (c, width) = match chars[i] {
            '\\' => match chars.get(i + 1) {
                Some(&e) if !e.is_alphanumeric() => (e, 2),
                _ => break,
            },
            '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' => break,
            c => (c, 1),
        };
        match chars.get(i + width) {
            Some('*') | Some('?') | Some('{') => break,
            Some('+') => {
                prefix.push(c);
                break;
            }
            _ => prefix.push(c),
        }
        i += width;
    }
    prefix
}

fn has_top_level_alternation(source: &str) -> bool {
    let mut escaped = false;
    let mut in_class = false;
    for c in source.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '|' if !in_class => return true,
            _ => {}
        }
    }
    false
}

/// How the lexer treats `//` and `/* */` comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentMode {
    /// Comment syntax is not recognized; `/` is an ordinary character
    #[default]
    Off,
    /// Comments are skipped like whitespace
    Skip,
    /// Comments are kept as special tokens attached to the following token
    Attach,
}

/// Turns source text into tokens on demand, one at a time.
pub struct Lexer<'a> {
    lexicon: &'a Lexicon,
    input: &'a str,
    position: usize,
    line: usize,
    column: usize,
    comments: CommentMode,
}

impl<'a> Lexer<'a> {
    pub fn new(lexicon: &'a Lexicon, input: &'a str) -> Self {
        Lexer {
            lexicon,
            input,
            position: 0,
            line: 1,
            column: 1,
            comments: CommentMode::Off,
        }
    }

    pub fn with_comments(mut self, mode: CommentMode) -> Self {
        self.comments = mode;
        self
    }

    /// Restarts scanning on new input.
    pub fn set_input(&mut self, input: &'a str) {
        self.input = input;
        self.position = 0;
        self.line = 1;
        self.column = 1;
    }

    pub fn lexicon(&self) -> &'a Lexicon {
        self.lexicon
    }

    /// Byte offset, line and column the next scan starts from. Once input is
    /// exhausted this is the end of the input.
    pub fn location(&self) -> (usize, usize, usize) {
        (self.position, self.line, self.column)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance_by(&mut self, bytes: usize) {
        let consumed = &self.input[self.position..self.position + bytes];
        for ch in consumed.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += bytes;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance_by(ch.len_utf8());
            } else {
                break;
            }
        }
    }

    fn special_token(&self, start: usize, line: usize, column: usize) -> Token {
        Token {
            name: "comment".to_string(),
            pattern: SPECIAL_PATTERN,
            text: self.input[start..self.position].to_string(),
            start,
            end: self.position,
            line,
            column,
            special: None,
        }
    }

    /// Skips whitespace and comments; returns the attached comment chain.
    fn skip_trivia(&mut self) -> Result<Option<Box<Token>>, LexError> {
        let mut special: Option<Box<Token>> = None;
        loop {
            self.skip_whitespace();
            if self.comments == CommentMode::Off {
                return Ok(special);
            }

            let rest = self.rest();
            let (start, line, column) = (self.position, self.line, self.column);
            if rest.starts_with("//") {
                let len = rest.find('\n').unwrap_or(rest.len());
                self.advance_by(len);
            } else if rest.starts_with("/*") {
                let Some(close) = rest[2..].find("*/") else {
                    return Err(LexError::UnterminatedComment {
                        offset: start,
                        line,
                        column,
                    });
                };
                self.advance_by(close + 4);
            } else {
                return Ok(special);
            }

            if self.comments == CommentMode::Attach {
                let mut token = self.special_token(start, line, column);
                token.special = special.take();
                special = Some(Box::new(token));
            }
        }
    }

    /// Produces the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        let special = self.skip_trivia()?;
        let Some(found) = self.current_char() else {
            return Ok(None);
        };

        let Some((pattern, len)) = self.lexicon.longest_match(self.rest()) else {
            return Err(LexError::UnexpectedCharacter {
                found,
                offset: self.position,
                line: self.line,
                column: self.column,
            });
        };

        let start = self.position;
        let (line, column) = (self.line, self.column);
        self.advance_by(len);

        let def = &self.lexicon.patterns[pattern].def;
        Ok(Some(Token {
            name: def.name.clone(),
            pattern,
            text: self.input[start..self.position].to_string(),
            start,
            end: self.position,
            line,
            column,
            special,
        }))
    }

    /// Scans the remaining input eagerly.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexicon(defs: Vec<PatternDef>) -> Lexicon {
        Lexicon::new(defs).unwrap()
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(regex_literal_prefix("[a-z]+"), "");
        assert_eq!(regex_literal_prefix("abc[0-9]"), "abc");
        assert_eq!(regex_literal_prefix("ab*"), "a");
        assert_eq!(regex_literal_prefix("ab+"), "ab");
        assert_eq!(regex_literal_prefix("\\.5"), ".5");
        assert_eq!(regex_literal_prefix("a|b"), "");
        assert_eq!(regex_literal_prefix("\"[^\"]*\""), "\"");
    }

    #[test]
    fn test_longest_match_wins() {
        let lex = lexicon(vec![
            PatternDef::regex("Name", "[a-zA-Z]+"),
            PatternDef::regex("Identifier", "[a-zA-Z][a-zA-Z0-9]*"),
        ]);
        let mut lexer = Lexer::new(&lex, "abc123");
        let token = lexer.next_token().unwrap().unwrap();
        assert_eq!(token.name, "Identifier");
        assert_eq!(token.text, "abc123");
        assert_eq!(lexer.next_token().unwrap(), None);
    }

    #[test]
    fn test_literal_beats_pattern_on_tie() {
        let lex = lexicon(vec![
            PatternDef::regex("Name", "[a-z]+"),
            PatternDef::literal("true"),
        ]);
        let mut lexer = Lexer::new(&lex, "true trueish");
        assert_eq!(lexer.next_token().unwrap().unwrap().name, "true");
        assert_eq!(lexer.next_token().unwrap().unwrap().name, "Name");
    }

    #[test]
    fn test_attached_comments() {
        let lex = lexicon(vec![PatternDef::regex("Name", "[a-z]+")]);
        let mut lexer =
            Lexer::new(&lex, "// one\n/* two */ abc").with_comments(CommentMode::Attach);
        let token = lexer.next_token().unwrap().unwrap();
        let comments: Vec<&str> = token.specials().map(|t| t.text.as_str()).collect();
        assert_eq!(comments, vec!["/* two */", "// one"]);
        assert_eq!(token.line, 2);
        assert_eq!(token.column, 11);
    }

    #[test]
    fn test_no_match_is_fatal() {
        let lex = lexicon(vec![PatternDef::regex("Name", "[a-z]+")]);
        let mut lexer = Lexer::new(&lex, "abc #");
        lexer.next_token().unwrap();
        assert!(matches!(
            lexer.next_token(),
            Err(LexError::UnexpectedCharacter { found: '#', .. })
        ));
    }
}
