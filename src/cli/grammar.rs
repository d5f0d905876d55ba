//! Inspect grammars: tokens, parse trees and normalized rule listings

use super::CliError;
use crate::grammar::{Grammar, parse_grammar};
use crate::parser::{ParseTree, parse_tree};

/// One line per token: position, pattern name and text. Attached comments are
/// listed under the token they precede.
pub fn format_tokens(grammar: &Grammar, input: &str) -> Result<String, CliError> {
    let tokens = grammar
        .lexer(input)
        .tokenize()
        .map_err(crate::ParseError::from)?;

    let mut out = String::new();
    for token in &tokens {
        for special in token.specials() {
            out.push_str(&format!("  {:>4}:{:<3} {:<14} {:?}\n", special.line, special.column, special.name, special.text));
        }
        out.push_str(&format!("{:>4}:{:<3} {:<16} {:?}\n", token.line, token.column, token.name, token.text));
    }
    Ok(out)
}

/// Concrete syntax tree of `input`.
pub fn parse_tree_of(grammar: &Grammar, input: &str) -> Result<ParseTree, CliError> {
    Ok(parse_tree(grammar, input)?)
}

/// Compiles grammar text and renders it back in normalized form.
pub fn describe_grammar(text: &str) -> Result<String, CliError> {
    Ok(parse_grammar(text)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::expression_grammar;

    #[test]
    fn test_format_tokens_lists_every_token() {
        let listing = format_tokens(expression_grammar(), "a + 12").unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("\"+\""), "{listing}");
        assert!(lines[2].contains("Integer"), "{listing}");
    }

    #[test]
    fn test_describe_grammar_normalizes() {
        let text = describe_grammar("Sum { Integer ( \"+\" Integer )* }").unwrap();
        assert_eq!(text, "Sum { Integer (\"+\" Integer)* }\n");
    }

    #[test]
    fn test_parse_tree_of_expression() {
        let tree = parse_tree_of(expression_grammar(), "1").unwrap();
        assert_eq!(tree.name(), "Expression");
    }
}
