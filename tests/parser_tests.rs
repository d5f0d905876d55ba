// tests/parser_tests.rs

use report_expr::ast::Token;
use report_expr::grammar::{GrammarBuilder, GrammarError, meta_grammar, parse_grammar};
use report_expr::parser::{DEFAULT_MAX_DEPTH, ParseError, ParseTree, Parser, TreeBuilder, parse_tree};

const ARITHMETIC: &str = r#"
    // integer arithmetic
    Sum     { Product ("+" Product)* }
    Product { Atom ("*" Atom)* }
    Atom    { Integer | "(" Sum ")" }
"#;

#[derive(Debug)]
enum Node {
    Num(i64),
    Punct,
}

/// Computes arithmetic results directly from parse events.
struct Calculator {
    reject: Option<i64>,
}

impl TreeBuilder for Calculator {
    type Node = Node;

    fn token(&mut self, token: Token) -> Node {
        match token.text.parse() {
            Ok(n) => Node::Num(n),
            Err(_) => Node::Punct,
        }
    }

    fn rule(&mut self, name: &str, children: Vec<Node>) -> Result<Node, String> {
        let mut numbers = children.into_iter().filter_map(|n| match n {
            Node::Num(n) => Some(n),
            Node::Punct => None,
        });
        let value = match name {
            "Sum" => numbers.sum(),
            "Product" => numbers.product(),
            _ => numbers.next().ok_or("empty atom")?,
        };
        if self.reject == Some(value) {
            return Err(format!("{value} is not allowed"));
        }
        Ok(Node::Num(value))
    }
}

fn calculate(input: &str) -> Result<i64, ParseError> {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    match Parser::new(&grammar, input).parse(&mut Calculator { reject: None })? {
        Node::Num(n) => Ok(n),
        Node::Punct => panic!("start rule produced punctuation"),
    }
}

// ============================================================================
// Grammar Text
// ============================================================================

#[test]
fn test_first_rule_is_start() {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    assert_eq!(grammar.rule_names().collect::<Vec<_>>(), vec!["Sum", "Product", "Atom"]);
    assert_eq!(grammar.rule(grammar.start()).name.as_deref(), Some("Sum"));
}

#[test]
fn test_grammar_renders_normalized() {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    assert_eq!(
        grammar.to_string(),
        "Sum { Product (\"+\" Product)* }\n\
         Product { Atom (\"*\" Atom)* }\n\
         Atom { Integer | \"(\" Sum \")\" }\n"
    );
}

#[test]
fn test_meta_grammar_describes_itself() {
    let text = meta_grammar().to_string();
    let reparsed = parse_grammar(&text).unwrap();
    assert_eq!(reparsed.to_string(), text);
}

#[test]
fn test_forward_references() {
    let grammar = parse_grammar("A { B \"!\" } B { Name }").unwrap();
    let tree = parse_tree(&grammar, "hello !").unwrap();
    assert_eq!(tree.children()[0].name(), "B");
}

#[test]
fn test_undefined_rule() {
    let err = parse_grammar("A { Missing }").unwrap_err();
    assert!(matches!(err, GrammarError::UndefinedRule(name) if name == "Missing"));
}

#[test]
fn test_duplicate_rule() {
    let err = parse_grammar("A { Name } A { Integer }").unwrap_err();
    assert!(matches!(err, GrammarError::DuplicateRule(name) if name == "A"));
}

#[test]
fn test_empty_grammar() {
    assert!(matches!(parse_grammar("// nothing here"), Err(GrammarError::Empty)));
}

#[test]
fn test_nullable_repetition_rejected() {
    assert!(matches!(
        parse_grammar("A { (Name?)* }"),
        Err(GrammarError::NullableRepetition(_))
    ));
}

#[test]
fn test_malformed_grammar_text() {
    assert!(matches!(parse_grammar("A { Name "), Err(GrammarError::Parse(_))));
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_builder_computes_results() {
    assert_eq!(calculate("2 + 3 * 4").unwrap(), 14);
    assert_eq!(calculate("(2 + 3) * 4").unwrap(), 20);
    assert_eq!(calculate("((7))").unwrap(), 7);
}

#[test]
fn test_trailing_input() {
    let err = calculate("1 2").unwrap_err();
    assert!(matches!(err, ParseError::TrailingInput { column: 3, .. }), "{err:?}");
}

#[test]
fn test_missing_operand() {
    let err = calculate("1 +").unwrap_err();
    let ParseError::Syntax {
        found,
        offset,
        line,
        column,
        ..
    } = err
    else {
        panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(found, "end of input");
    assert_eq!((offset, line, column), (3, 1, 4));
}

#[test]
fn test_unclosed_group_names_rule() {
    let err = calculate("(1 + 2").unwrap_err();
    assert_eq!(err.rule(), Some("Atom"));
    assert!(matches!(err, ParseError::Syntax { line: 1, column: 7, .. }), "{err:?}");
}

#[test]
fn test_end_of_input_on_later_line() {
    let err = calculate("(1 +\n  2").unwrap_err();
    assert!(matches!(err, ParseError::Syntax { line: 2, column: 4, .. }), "{err:?}");
}

#[test]
fn test_builder_rejection_aborts() {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    let err = Parser::new(&grammar, "6 + 7")
        .parse(&mut Calculator { reject: Some(13) })
        .unwrap_err();
    assert!(matches!(err, ParseError::Rejected { ref rule, .. } if rule == "Sum"), "{err:?}");
}

#[test]
fn test_lex_errors_surface() {
    assert!(matches!(calculate("1 # 2"), Err(ParseError::Lex(_))));
}

#[test]
fn test_recursive_grammar_nests() {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    let tree = parse_tree(&grammar, "((1))").unwrap();
    let mut depth = 0;
    let mut node = &tree;
    while let Some(child) = node.children().iter().find(|c| matches!(c, ParseTree::Rule { .. })) {
        depth += 1;
        node = child;
    }
    // Sum > Product > Atom > Sum > Product > Atom > Sum > Product > Atom
    assert_eq!(depth, 8);
}

#[test]
fn test_nesting_limit() {
    let grammar = parse_grammar(ARITHMETIC).unwrap();
    assert!(Parser::new(&grammar, "((1))").with_max_depth(9).parse(&mut Calculator { reject: None }).is_ok());

    let err = Parser::new(&grammar, "((1))")
        .with_max_depth(6)
        .parse(&mut Calculator { reject: None })
        .unwrap_err();
    assert!(matches!(err, ParseError::TooDeep { limit: 6, column: 3, .. }), "{err:?}");
    assert_eq!(err.rule(), Some("Sum"));
}

#[test]
fn test_deep_input_fails_instead_of_overflowing() {
    let depth = 5000;
    let input = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
    let err = calculate(&input).unwrap_err();
    assert!(matches!(err, ParseError::TooDeep { limit: DEFAULT_MAX_DEPTH, line: 1, .. }), "{err:?}");

    let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
    assert_eq!(calculate(&shallow).unwrap(), 1);
}

// ============================================================================
// Lookahead
// ============================================================================

const CALLS: &str = r#"
    Step { Call | Key }
    Call { LookAhead(2) Name "(" ")" }
    Key  { Name }
"#;

#[test]
fn test_lookahead_chooses_alternative() {
    let grammar = parse_grammar(CALLS).unwrap();
    assert_eq!(parse_tree(&grammar, "now()").unwrap().children()[0].name(), "Call");
    assert_eq!(parse_tree(&grammar, "now").unwrap().children()[0].name(), "Key");
}

#[test]
fn test_lookahead_buffer_is_bounded() {
    let grammar = parse_grammar(CALLS).unwrap();
    let mut parser = Parser::new(&grammar, "now()");
    parser.parse(&mut report_expr::parser::TreeCollector).unwrap();
    assert!(parser.lookahead_high_water() <= 2);
}

#[test]
fn test_lookahead_with_rule_argument() {
    let grammar = parse_grammar(
        r#"
        Item   { Pair | Name }
        Pair   { LookAhead(Name ":") Integer }
        "#,
    )
    .unwrap();
    assert_eq!(parse_tree(&grammar, "a : 1").unwrap().children()[0].name(), "Pair");
    assert_eq!(parse_tree(&grammar, "a").unwrap().children()[0].name(), "Name");
}

// ============================================================================
// Grammar Builder
// ============================================================================

#[test]
fn test_builder_api_matches_text() {
    let mut g = GrammarBuilder::new();
    let name = g.lexical("Name").unwrap();
    let comma = g.literal(",");
    let tail = g.and(comma, name);
    let tail = g.zero_or_more(tail);
    let body = g.sequence(&[name, tail]).unwrap();
    g.define("Names", body).unwrap();
    let built = g.build().unwrap();

    let parsed = parse_grammar("Names { Name (\",\" Name)* }").unwrap();
    assert_eq!(built.to_string(), parsed.to_string());
}

#[test]
fn test_builder_reserved_names() {
    let mut g = GrammarBuilder::new();
    let body = g.literal("x");
    assert!(matches!(g.define("Integer", body), Err(GrammarError::ReservedName(_))));
}
