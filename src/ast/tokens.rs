/// Index of a leaf pattern inside a [`Lexicon`](crate::lexer::Lexicon).
pub type PatternId = usize;

/// Pattern id carried by comment tokens, which never match a grammar rule.
pub const SPECIAL_PATTERN: PatternId = PatternId::MAX;

/// A lexical token produced by the [`Lexer`](crate::lexer::Lexer).
///
/// Tokens are classified context-free: the lexer picks the longest matching leaf
/// pattern of the whole grammar, so a token's `pattern` is the same wherever the
/// parser meets it.
///
/// # Examples
/// ```text
/// price * 2
/// ```
/// produces `Name("price")`, `"*"`, `Integer("2")`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Name of the pattern that matched (`"Name"`, `"Integer"`, or the literal text)
    pub name: String,

    /// Pattern id, or [`SPECIAL_PATTERN`] for comments
    pub pattern: PatternId,

    /// Matched source text
    pub text: String,

    /// Byte offset of the first character
    pub start: usize,

    /// Byte offset one past the last character
    pub end: usize,

    /// 1-based line of the first character
    pub line: usize,

    /// 1-based column of the first character
    pub column: usize,

    /// Comment directly preceding this token.
    ///
    /// Comments form a chain: each comment's own `special` points at the comment
    /// before it. Only populated when comments are attached.
    pub special: Option<Box<Token>>,
}

impl Token {
    /// True for comment tokens.
    pub fn is_special(&self) -> bool {
        self.pattern == SPECIAL_PATTERN
    }

    /// Iterates the attached comments, nearest first.
    pub fn specials(&self) -> impl Iterator<Item = &Token> {
        std::iter::successors(self.special.as_deref(), |t| t.special.as_deref())
    }

    /// Contents of a quoted string token with its quotes removed and escapes
    /// resolved. Other tokens are returned as-is.
    pub fn unquoted(&self) -> String {
        let text = self.text.as_str();
        let quoted = text.len() >= 2
            && ((text.starts_with('"') && text.ends_with('"'))
                || (text.starts_with('\'') && text.ends_with('\'')));
        if !quoted {
            return text.to_string();
        }

        let mut out = String::with_capacity(text.len() - 2);
        let mut chars = text[1..text.len() - 1].chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }
}
