//! List-aware evaluation.
//!
//! Whenever evaluation reaches a list, the rest of the expression is evaluated
//! over the list as a whole. Three cases, tried in order:
//!
//! 1. The head step names an aggregate function (`total`, `count`, `group`, ...):
//!    the function runs over the list's leaf rows, evaluating its argument
//!    expression once per row.
//! 2. The list is a branch (its elements are sub-group lists), the expression
//!    references no aggregate and is not the key the list was grouped by: the
//!    expression is evaluated against the first sub-group.
//! 3. Otherwise the expression is evaluated with the list itself as the current
//!    value and, if that yields null, against the list's first element.
//!
//! Aggregates work on the deep leaf rows, so a grouped list totals and
//! averages the same as the flat list it was grouped from: the average of
//! `[[1, 2], [3, 4, 5]]` is 15 / 5 = 3. The one exception is a bare `count`,
//! which counts the list's own elements; `countDeep` counts the leaf rows.

use crate::ast::Expr;
use crate::evaluator::{EvalContext, Evaluator};
use crate::number::Number;
use crate::value::{List, Value, compare};

/// Built-in aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Total,
    TotalStrict,
    Count,
    CountDeep,
    CountUnique,
    Average,
    AverageStrict,
    Min,
    Max,
    Get,
    Filter,
    Group,
    Join,
    ListOf,
}

impl Aggregate {
    pub const ALL: [Aggregate; 14] = [
        Aggregate::Total,
        Aggregate::TotalStrict,
        Aggregate::Count,
        Aggregate::CountDeep,
        Aggregate::CountUnique,
        Aggregate::Average,
        Aggregate::AverageStrict,
        Aggregate::Min,
        Aggregate::Max,
        Aggregate::Get,
        Aggregate::Filter,
        Aggregate::Group,
        Aggregate::Join,
        Aggregate::ListOf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Total => "total",
            Aggregate::TotalStrict => "totalStrict",
            Aggregate::Count => "count",
            Aggregate::CountDeep => "countDeep",
            Aggregate::CountUnique => "countUnique",
            Aggregate::Average => "average",
            Aggregate::AverageStrict => "averageStrict",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Get => "get",
            Aggregate::Filter => "filter",
            Aggregate::Group => "group",
            Aggregate::Join => "join",
            Aggregate::ListOf => "listOf",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }
}

/// True if any step, at any depth, names an aggregate.
fn references_aggregate(steps: &[Expr]) -> bool {
    let mut found = false;
    for step in steps {
        step.walk(&mut |node| {
            if let Expr::Key(name) | Expr::FunctionCall { name, .. } = node
                && Aggregate::from_name(name).is_some()
            {
                found = true;
            }
        });
    }
    found
}

fn steps_text(steps: &[Expr]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Per-row expression of an aggregate: absent means the row itself.
type RowExpr<'a> = Option<&'a [Expr]>;

impl Evaluator<'_> {
    /// Evaluates `steps` over `list`.
    pub(crate) fn aggregate(&self, ctx: &mut EvalContext, list: &List, steps: &[Expr]) -> Value {
        let Some((head, rest)) = steps.split_first() else {
            return Value::List(list.clone());
        };

        if let Expr::Key(name) = head
            && let Some(aggregate) = Aggregate::from_name(name)
        {
            let expr = (!rest.is_empty()).then_some(rest);
            return self.apply_aggregate(ctx, list, aggregate, expr, &[]);
        }
        if let Expr::FunctionCall { name, args } = head
            && let Some(aggregate) = Aggregate::from_name(name)
        {
            let expr = args.first().map(std::slice::from_ref);
            let result = self.apply_aggregate(ctx, list, aggregate, expr, args);
            return self.evaluate_steps(ctx, &result, rest);
        }

        if !list.is_leaf()
            && !references_aggregate(steps)
            && list.grouping_key() != Some(steps_text(steps).as_str())
            && let Some(Value::List(first)) = list.first()
        {
            return self.aggregate(ctx, first, steps);
        }

        let current = Value::List(list.clone());
        let result = self.eval_over(ctx, &current, steps);
        match (result, list.first()) {
            (Value::Null, Some(first)) => self.evaluate_steps(ctx, first, steps),
            (result, _) => result,
        }
    }

    /// Evaluates steps with a list as the current value, without aggregating.
    fn eval_over(&self, ctx: &mut EvalContext, current: &Value, steps: &[Expr]) -> Value {
        match steps {
            [single] => self.eval_row(ctx, current, single),
            _ => {
                let head = self.eval_row(ctx, current, &steps[0]);
                self.evaluate_steps(ctx, &head, &steps[1..])
            }
        }
    }

    fn row_value(&self, ctx: &mut EvalContext, row: &Value, expr: RowExpr<'_>) -> Value {
        match expr {
            Some(steps) => self.evaluate_steps(ctx, row, steps),
            None => row.clone(),
        }
    }

    fn row_values(&self, ctx: &mut EvalContext, rows: &[&Value], expr: RowExpr<'_>) -> Vec<Value> {
        rows.iter().map(|row| self.row_value(ctx, row, expr)).collect()
    }

    fn apply_aggregate(
        &self,
        ctx: &mut EvalContext,
        list: &List,
        aggregate: Aggregate,
        expr: RowExpr<'_>,
        args: &[Expr],
    ) -> Value {
        let rows = list.leaf_rows();
        match aggregate {
            Aggregate::Total => Value::Number(self.total(ctx, &rows, expr)),
            Aggregate::TotalStrict => self
                .total_strict(ctx, &rows, expr)
                .map_or(Value::Null, Value::Number),
            Aggregate::Count | Aggregate::CountDeep => match expr {
                None if aggregate == Aggregate::Count => Value::from(list.len()),
                None => Value::from(rows.len()),
                Some(_) => {
                    let values = self.row_values(ctx, &rows, expr);
                    Value::from(values.iter().filter(|v| v.is_truthy()).count())
                }
            },
            Aggregate::CountUnique => {
                let mut values = self.row_values(ctx, &rows, expr);
                values.sort_by(compare);
                values.dedup_by(|a, b| compare(a, b).is_eq());
                Value::from(values.len())
            }
            Aggregate::Average => {
                if rows.is_empty() {
                    return Value::Null;
                }
                let total = self.total(ctx, &rows, expr);
                Value::Number(total / Number::from(rows.len()))
            }
            Aggregate::AverageStrict => {
                if rows.is_empty() {
                    return Value::Null;
                }
                match self.total_strict(ctx, &rows, expr) {
                    Some(total) => Value::Number(total / Number::from(rows.len())),
                    None => Value::Null,
                }
            }
            Aggregate::Min | Aggregate::Max => {
                let values = self.row_values(ctx, &rows, expr);
                let candidates = values.into_iter().filter(|v| !v.is_null());
                let extreme = if aggregate == Aggregate::Min {
                    candidates.min_by(compare)
                } else {
                    candidates.max_by(compare)
                };
                extreme.unwrap_or(Value::Null)
            }
            Aggregate::Get => {
                for row in rows {
                    if self.row_value(ctx, row, expr).is_truthy() {
                        return row.clone();
                    }
                }
                Value::Null
            }
            Aggregate::Filter => {
                let mut kept = Vec::new();
                for row in rows {
                    if self.row_value(ctx, row, expr).is_truthy() {
                        kept.push(row.clone());
                    }
                }
                Value::list(kept)
            }
            Aggregate::ListOf => Value::list(self.row_values(ctx, &rows, expr)),
            Aggregate::Join => {
                let delimiter = match args.get(1) {
                    Some(arg) => self.evaluate(ctx, &Value::List(list.clone()), arg).to_string(),
                    None => self.join_delimiter.to_string(),
                };
                self.row_values(ctx, &rows, expr)
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(&delimiter)
                    .into()
            }
            Aggregate::Group => {
                let keys: Vec<&Expr> = match (args.is_empty(), expr) {
                    (false, _) => args.iter().collect(),
                    (true, Some(steps)) => steps.iter().collect(),
                    (true, None) => return Value::List(list.clone()),
                };
                let rows: Vec<Value> = rows.into_iter().cloned().collect();
                Value::List(self.group(ctx, rows, &keys))
            }
        }
    }

    fn total(&self, ctx: &mut EvalContext, rows: &[&Value], expr: RowExpr<'_>) -> Number {
        self.row_values(ctx, rows, expr)
            .iter()
            .filter_map(Value::to_number)
            .fold(Number::ZERO, |sum, n| sum + n)
    }

    fn total_strict(&self, ctx: &mut EvalContext, rows: &[&Value], expr: RowExpr<'_>) -> Option<Number> {
        let mut sum = Number::ZERO;
        for row in rows {
            sum = sum + self.row_value(ctx, row, expr).to_number()?;
        }
        Some(sum)
    }

    /// Groups rows by the first key, in order of first appearance, then each
    /// group by the remaining keys.
    fn group(&self, ctx: &mut EvalContext, rows: Vec<Value>, keys: &[&Expr]) -> List {
        let Some((key, rest)) = keys.split_first() else {
            return List::new(rows);
        };

        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for row in rows {
            let value = self.evaluate(ctx, &row, key);
            match groups.iter_mut().find(|(k, _)| compare(k, &value).is_eq()) {
                Some((_, members)) => members.push(row),
                None => groups.push((value, vec![row])),
            }
        }

        let key_text = key.to_string();
        let items = groups
            .into_iter()
            .map(|(_, members)| {
                let mut sub = self.group(ctx, members, rest);
                if sub.grouping_key.is_none() {
                    sub.grouping_key = Some(key_text.clone());
                }
                Value::List(sub)
            })
            .collect();
        List::grouped(items, key_text)
    }
}
