// tests/lexer_tests.rs

use report_expr::lexer::{CommentMode, LexError, Lexer, Lexicon, PatternDef};

fn lexicon() -> Lexicon {
    Lexicon::new(vec![
        PatternDef::literal("+"),
        PatternDef::literal("+="),
        PatternDef::literal("."),
        PatternDef::literal("true"),
        PatternDef::regex("Integer", "[0-9]+"),
        PatternDef::regex("Decimal", r"[0-9]*\.[0-9]+"),
        PatternDef::regex("Name", r"[$a-zA-Z][$\w]*"),
        PatternDef::regex("String", r#""([^"\\]|\\.)*""#),
    ])
    .unwrap()
}

fn names(input: &str) -> Vec<String> {
    let lexicon = lexicon();
    Lexer::new(&lexicon, input)
        .tokenize()
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect()
}

// ============================================================================
// Longest Match
// ============================================================================

#[test]
fn test_longest_literal_wins() {
    assert_eq!(names("+="), vec!["+="]);
    assert_eq!(names("+ +"), vec!["+", "+"]);
}

#[test]
fn test_longest_pattern_wins() {
    assert_eq!(names("12"), vec!["Integer"]);
    assert_eq!(names("12.5"), vec!["Decimal"]);
    assert_eq!(names(".5"), vec!["Decimal"]);
}

#[test]
fn test_longer_regex_match_wins_over_earlier_pattern() {
    let lexicon = Lexicon::new(vec![
        PatternDef::regex("Name", "[a-zA-Z]+"),
        PatternDef::regex("Identifier", "[a-zA-Z][a-zA-Z0-9]*"),
    ])
    .unwrap();
    let tokens = Lexer::new(&lexicon, "abc123").tokenize().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].name, "Identifier");
    assert_eq!(tokens[0].text, "abc123");
}

#[test]
fn test_tie_prefers_longer_literal_prefix() {
    let lexicon = Lexicon::new(vec![
        PatternDef::regex("Word", "[0-9a-z]+"),
        PatternDef::regex("Hex", "0x[0-9a-f]+"),
    ])
    .unwrap();
    let tokens = Lexer::new(&lexicon, "0x1f").tokenize().unwrap();
    assert_eq!(tokens[0].name, "Hex");
}

#[test]
fn test_name_longer_than_keyword() {
    assert_eq!(names("true"), vec!["true"]);
    assert_eq!(names("trueish"), vec!["Name"]);
}

#[test]
fn test_dotted_names() {
    assert_eq!(names("order.lines"), vec!["Name", ".", "Name"]);
}

#[test]
fn test_string_with_escapes() {
    let lexicon = lexicon();
    let tokens = Lexer::new(&lexicon, r#""say \"hi\"""#).tokenize().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].unquoted(), "say \"hi\"");
}

// ============================================================================
// Positions
// ============================================================================

#[test]
fn test_positions_track_lines_and_columns() {
    let lexicon = lexicon();
    let tokens = Lexer::new(&lexicon, "a +\n  b").tokenize().unwrap();
    let positions: Vec<(usize, usize)> = tokens.iter().map(|t| (t.line, t.column)).collect();
    assert_eq!(positions, vec![(1, 1), (1, 3), (2, 3)]);
    assert_eq!(tokens[2].start, 6);
    assert_eq!(tokens[2].end, 7);
}

#[test]
fn test_unexpected_character() {
    let lexicon = lexicon();
    let err = Lexer::new(&lexicon, "a # b").tokenize().unwrap_err();
    assert_eq!(
        err,
        LexError::UnexpectedCharacter {
            found: '#',
            offset: 2,
            line: 1,
            column: 3,
        }
    );
}

#[test]
fn test_set_input_restarts() {
    let lexicon = lexicon();
    let mut lexer = Lexer::new(&lexicon, "a");
    assert_eq!(lexer.tokenize().unwrap().len(), 1);
    lexer.set_input("b + c");
    assert_eq!(lexer.tokenize().unwrap().len(), 3);
}

// ============================================================================
// Comments
// ============================================================================

#[test]
fn test_comments_off_by_default() {
    let lexicon = lexicon();
    assert!(Lexer::new(&lexicon, "a // b").tokenize().is_err());
}

#[test]
fn test_comments_skipped() {
    let lexicon = lexicon();
    let tokens = Lexer::new(&lexicon, "a /* one */ + // two\n b")
        .with_comments(CommentMode::Skip)
        .tokenize()
        .unwrap();
    let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "+", "b"]);
    assert!(tokens.iter().all(|t| t.special.is_none()));
}

#[test]
fn test_comments_attached_to_next_token() {
    let lexicon = lexicon();
    let tokens = Lexer::new(&lexicon, "a /* one */ /* two */ + b")
        .with_comments(CommentMode::Attach)
        .tokenize()
        .unwrap();
    assert_eq!(tokens.len(), 3);
    let plus = &tokens[1];
    let comments: Vec<&str> = plus.specials().map(|t| t.text.as_str()).collect();
    assert_eq!(comments.len(), 2);
    assert!(comments.contains(&"/* one */"));
    assert!(comments.contains(&"/* two */"));
    assert!(plus.specials().all(|t| t.is_special()));
}

#[test]
fn test_unterminated_comment() {
    let lexicon = lexicon();
    let err = Lexer::new(&lexicon, "a /* b")
        .with_comments(CommentMode::Skip)
        .tokenize()
        .unwrap_err();
    assert!(matches!(err, LexError::UnterminatedComment { column: 3, .. }));
}
