//! Engine configuration.

use crate::lexer::CommentMode;

/// Settings for an [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Grammar definition text replacing the built-in expression grammar.
    ///
    /// It must use the rule names of the built-in grammar.
    pub grammar: Option<String>,

    /// Delimiter `join` uses when none is given
    pub join_delimiter: String,

    /// Keep `//` and `/* */` comments in expressions as tokens attached to the
    /// token that follows them
    pub attach_comments: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            grammar: None,
            join_delimiter: ", ".to_string(),
            attach_comments: false,
        }
    }
}

impl EngineConfig {
    pub fn with_grammar(mut self, grammar: impl Into<String>) -> Self {
        self.grammar = Some(grammar.into());
        self
    }

    pub fn with_join_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.join_delimiter = delimiter.into();
        self
    }

    pub fn with_attached_comments(mut self, attach: bool) -> Self {
        self.attach_comments = attach;
        self
    }

    pub(crate) fn comment_mode(&self) -> CommentMode {
        if self.attach_comments {
            CommentMode::Attach
        } else {
            CommentMode::Off
        }
    }
}
