use report_expr::{Engine, EngineConfig, List, MapRecord, Value};

fn numbers(groups: &[&[i64]]) -> Value {
    Value::list(
        groups
            .iter()
            .map(|group| Value::list(group.iter().map(|&n| Value::from(n)).collect()))
            .collect(),
    )
}

fn line(region: &str, product: &str, amount: i64) -> Value {
    MapRecord::new("Line")
        .with("region", region)
        .with("product", product)
        .with("amount", amount)
        .into_value()
}

fn lines() -> Value {
    Value::list(vec![
        line("north", "bolts", 10),
        line("south", "nuts", 5),
        line("north", "nuts", 7),
    ])
}

fn eval(root: &Value, source: &str) -> Value {
    Engine::new().evaluate(root, source)
}

// ============================================================================
// Branch Lists
// ============================================================================

#[test]
fn test_total_over_groups() {
    let groups = numbers(&[&[1, 2], &[3, 4]]);
    assert_eq!(eval(&groups, "total(self)"), Value::from(10));
    assert_eq!(eval(&groups, "total"), Value::from(10));
}

#[test]
fn test_average_uses_grand_leaf_count() {
    let groups = numbers(&[&[1, 2], &[3, 4, 5]]);
    assert_eq!(eval(&groups, "average(self)"), Value::from(3));
    assert_eq!(eval(&numbers(&[&[1, 2], &[3, 4]]), "average(self)"), Value::from(2.5));
}

#[test]
fn test_count_and_count_deep() {
    let groups = numbers(&[&[1, 2], &[3, 4, 5]]);
    assert_eq!(eval(&groups, "count()"), Value::from(2));
    assert_eq!(eval(&groups, "countDeep()"), Value::from(5));
    assert_eq!(eval(&groups, "count(self > 2)"), Value::from(3));
}

#[test]
fn test_min_max_over_groups() {
    let groups = numbers(&[&[4, 2], &[9, 1]]);
    assert_eq!(eval(&groups, "min(self)"), Value::from(1));
    assert_eq!(eval(&groups, "max(self)"), Value::from(9));
}

#[test]
fn test_plain_expression_recurses_into_first_group() {
    let engine = Engine::new();
    let grouped = engine.evaluate(&lines(), "group(region)");
    assert_eq!(engine.evaluate(&grouped, "product"), Value::from("bolts"));
}

#[test]
fn test_grouping_key_is_not_recursed() {
    let engine = Engine::new();
    let grouped = engine.evaluate(&lines(), "group(region)");
    let Value::List(list) = &grouped else {
        panic!("group returned {grouped:?}");
    };
    assert_eq!(list.grouping_key(), Some("region"));
    assert_eq!(engine.evaluate(&grouped, "region"), Value::from("north"));
}

// ============================================================================
// Aggregates over Rows
// ============================================================================

#[test]
fn test_total_and_strict_total() {
    let mut rows = lines();
    assert_eq!(eval(&rows, "total(amount)"), Value::from(22));
    assert_eq!(eval(&rows, "totalStrict(amount)"), Value::from(22));

    if let Value::List(list) = &mut rows {
        list.items.push(MapRecord::new("Line").with("region", "east").into_value());
    }
    assert_eq!(eval(&rows, "total(amount)"), Value::from(22));
    assert_eq!(eval(&rows, "totalStrict(amount)"), Value::Null);
    assert_eq!(eval(&rows, "averageStrict(amount)"), Value::Null);
}

#[test]
fn test_count_unique() {
    assert_eq!(eval(&lines(), "countUnique(region)"), Value::from(2));
    assert_eq!(eval(&lines(), "countUnique(product)"), Value::from(2));
}

#[test]
fn test_mixed_text_and_numbers_ignore_row_order() {
    let orders: [[Value; 4]; 3] = [
        [Value::from("10"), Value::from(9), Value::from("9"), Value::from(10)],
        [Value::from("9"), Value::from(10), Value::from("10"), Value::from(9)],
        [Value::from(10), Value::from("10"), Value::from(9), Value::from("9")],
    ];
    for rows in orders {
        let rows = Value::list(Vec::from(rows));
        assert_eq!(eval(&rows, "countUnique(self)"), Value::from(2), "{rows:?}");
        assert_eq!(eval(&rows, "group(self).count()"), Value::from(2), "{rows:?}");
        assert_eq!(eval(&rows, "max(self)").to_string(), "10");
        assert_eq!(eval(&rows, "min(self)").to_string(), "9");
    }
}

#[test]
fn test_get_and_filter() {
    let rows = lines();
    assert_eq!(eval(&rows, r#"get(region == "south").amount"#), Value::from(5));
    assert_eq!(eval(&rows, r#"get(region == "west")"#), Value::Null);
    assert_eq!(eval(&rows, "filter(amount > 6).count()"), Value::from(2));
    assert_eq!(eval(&rows, "filter(amount > 6).total(amount)"), Value::from(17));
}

#[test]
fn test_list_of_and_join() {
    let rows = lines();
    assert_eq!(
        eval(&rows, "listOf(amount)"),
        Value::list(vec![Value::from(10), Value::from(5), Value::from(7)])
    );
    assert_eq!(eval(&rows, "join(product)"), Value::from("bolts, nuts, nuts"));
    assert_eq!(eval(&rows, r#"join(product, " / ")"#), Value::from("bolts / nuts / nuts"));

    let engine = Engine::with_config(EngineConfig::default().with_join_delimiter(";")).unwrap();
    assert_eq!(engine.evaluate(&rows, "join(region)"), Value::from("north;south;north"));
}

#[test]
fn test_group_keeps_first_seen_order() {
    let engine = Engine::new();
    let grouped = engine.evaluate(&lines(), "group(region)");
    let Value::List(list) = grouped else {
        panic!("expected a list");
    };
    assert!(!list.is_leaf());
    assert_eq!(list.len(), 2);
    let sizes: Vec<usize> = list.items.iter().filter_map(Value::as_list).map(List::len).collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[test]
fn test_aggregates_after_group() {
    let rows = lines();
    assert_eq!(eval(&rows, "group(region).count()"), Value::from(2));
    assert_eq!(eval(&rows, "group(region).total(amount)"), Value::from(22));
    assert_eq!(eval(&rows, "group(region, product).countDeep()"), Value::from(3));
    assert_eq!(eval(&rows, "group(region, product).count()"), Value::from(2));
}

#[test]
fn test_empty_list() {
    let empty = Value::list(Vec::new());
    assert_eq!(eval(&empty, "total(amount)"), Value::from(0));
    assert_eq!(eval(&empty, "count()"), Value::from(0));
    assert_eq!(eval(&empty, "average(amount)"), Value::Null);
    assert_eq!(eval(&empty, "min(amount)"), Value::Null);
    assert_eq!(eval(&empty, "amount"), Value::Null);
}

// ============================================================================
// Lists Inside Objects
// ============================================================================

#[test]
fn test_aggregate_through_chain() {
    let order = MapRecord::new("Order").with("lines", lines()).into_value();
    assert_eq!(eval(&order, "lines.total(amount)"), Value::from(22));
    assert_eq!(eval(&order, "lines.count()"), Value::from(3));
    assert_eq!(eval(&order, "lines.amount"), Value::from(10));
    assert_eq!(eval(&order, "lines.total(amount) / lines.count()"), eval(&order, "lines.average(amount)"));
}

#[test]
fn test_constructed_lists() {
    assert_eq!(eval(&Value::Null, "list(1, 2, 3).total()"), Value::from(6));
    assert_eq!(eval(&Value::Null, "list(3, 1, 2).max()"), Value::from(3));
}
