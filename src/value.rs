use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::ast::Expr;
use crate::evaluator::EvalError;
use crate::number::Number;

/// A dynamically typed value produced by evaluation.
///
/// # Examples
///
/// ```
/// use report_expr::{List, MapRecord, Value};
///
/// let null = Value::Null;
/// let number = Value::from(42);
/// let text = Value::from("hello");
/// let rows = Value::List(List::new(vec![Value::from(1), Value::from(2)]));
/// let record = MapRecord::new("Customer").with("name", "Acme").into_value();
/// ```
#[derive(Clone)]
pub enum Value {
    Null,

    Boolean(bool),

    /// Exact decimal, or a float after an operation left the decimal range
    Number(Number),

    String(String),

    Date(NaiveDateTime),

    /// Rows, possibly grouped into sub-lists
    List(List),

    /// Reference to an object supplied by the caller
    Object(Arc<dyn Record>),
}

/// A list of rows.
///
/// A list whose first element is itself a list is a *branch*: each element is
/// one sub-group. Any other list is a *leaf* holding plain rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    pub items: Vec<Value>,

    /// The expression the rows were grouped by, for lists produced by grouping
    pub grouping_key: Option<String>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        List {
            items,
            grouping_key: None,
        }
    }

    pub fn grouped(items: Vec<Value>, key: impl Into<String>) -> Self {
        List {
            items,
            grouping_key: Some(key.into()),
        }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self.items.first(), Some(Value::List(_)))
    }

    pub fn grouping_key(&self) -> Option<&str> {
        self.grouping_key.as_deref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Value> {
        self.items.first()
    }

    /// Number of leaf rows across all nesting levels.
    pub fn count_deep(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                Value::List(sub) if !self.is_leaf() => sub.count_deep(),
                _ => 1,
            })
            .sum()
    }

    /// Leaf rows across all nesting levels, in order.
    pub fn leaf_rows(&self) -> Vec<&Value> {
        let mut rows = Vec::new();
        self.collect_rows(&mut rows);
        rows
    }

    fn collect_rows<'a>(&'a self, rows: &mut Vec<&'a Value>) {
        if self.is_leaf() {
            rows.extend(self.items.iter());
            return;
        }
        for item in &self.items {
            match item {
                Value::List(sub) => sub.collect_rows(rows),
                other => rows.push(other),
            }
        }
    }
}

impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        List::new(items)
    }
}

/// How an instance method expects its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodShape {
    /// One unevaluated expression
    Raw,
    /// This many evaluated values
    Values(usize),
}

/// Arguments handed to [`Record::invoke`].
#[derive(Debug, Clone, Copy)]
pub enum MethodArgs<'a> {
    Raw(&'a Expr),
    Values(&'a [Value]),
}

/// An object the evaluator can query: the contract between expressions and the
/// caller's data model.
///
/// Only [`type_name`](Record::type_name) and [`get`](Record::get) are required.
pub trait Record: fmt::Debug + Send + Sync {
    /// Name of the object's type. Function resolutions are cached per type name.
    fn type_name(&self) -> &str;

    /// Custom key resolver, consulted before [`get`](Record::get).
    fn resolve_key(&self, _key: &str) -> Option<Value> {
        None
    }

    /// Attribute lookup by name.
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, _value: Value) -> Result<(), EvalError> {
        Err(EvalError::ReadOnly {
            type_name: self.type_name().to_string(),
            key: key.to_string(),
        })
    }

    /// Allowed values of an enumerated attribute, if `key` is one.
    fn enum_choices(&self, _key: &str) -> Option<Vec<String>> {
        None
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// True if [`invoke`](Record::invoke) accepts `name` with arguments of `shape`.
    fn responds_to(&self, _name: &str, _shape: MethodShape) -> bool {
        false
    }

    fn invoke(&self, name: &str, _args: MethodArgs<'_>) -> Result<Value, EvalError> {
        Err(EvalError::UnknownFunction {
            name: name.to_string(),
            arity: 0,
        })
    }
}

/// A [`Record`] backed by an ordered map.
///
/// Lookups fall back to a case-insensitive match. Fields can be set through a
/// shared reference, so expressions can write into records that are also held
/// by the caller.
#[derive(Debug)]
pub struct MapRecord {
    type_name: String,
    fields: RwLock<BTreeMap<String, Value>>,
    choices: BTreeMap<String, Vec<String>>,
}

impl Default for MapRecord {
    fn default() -> Self {
        MapRecord::new("record")
    }
}

impl MapRecord {
    pub fn new(type_name: impl Into<String>) -> Self {
        MapRecord {
            type_name: type_name.into(),
            fields: RwLock::new(BTreeMap::new()),
            choices: BTreeMap::new(),
        }
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Declares `key` as an enumerated attribute.
    pub fn with_choices(mut self, key: impl Into<String>, choices: &[&str]) -> Self {
        self.choices
            .insert(key.into(), choices.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn into_value(self) -> Value {
        Value::Object(Arc::new(self))
    }

    fn matching_key(fields: &BTreeMap<String, Value>, key: &str) -> Option<String> {
        if fields.contains_key(key) {
            return Some(key.to_string());
        }
        fields.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()
    }
}

impl Record for MapRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get(&self, key: &str) -> Option<Value> {
        let fields = self.fields.read().unwrap_or_else(PoisonError::into_inner);
        let key = Self::matching_key(&fields, key)?;
        fields.get(&key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let mut fields = self.fields.write().unwrap_or_else(PoisonError::into_inner);
        let key = Self::matching_key(&fields, key).unwrap_or_else(|| key.to_string());
        fields.insert(key, value);
        Ok(())
    }

    fn enum_choices(&self, key: &str) -> Option<Vec<String>> {
        self.choices
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, choices)| choices.clone())
    }

    fn keys(&self) -> Vec<String> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(List::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lenient truthiness: non-null, non-zero, non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Date(_) => true,
            Value::List(list) => !list.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Numeric reading: numbers, numeric strings and booleans.
    pub fn to_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            Value::Boolean(b) => Some(Number::from(i64::from(*b))),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.to_number().map(Number::to_f64)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.to_number().and_then(Number::to_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<dyn Record>> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::List(_) => "list",
            Value::Object(record) => record.type_name(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Number(_) => 2,
            Value::Date(_) => 3,
            Value::String(_) => 4,
            Value::List(_) => 5,
            Value::Object(_) => 6,
        }
    }

    /// The number a value orders as: numbers, and strings that parse as one.
    fn numeric_key(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Kind rank, with numeric strings ranked as numbers.
    fn order_rank(&self, numeric: bool) -> u8 {
        if numeric { 2 } else { self.rank() }
    }
}

/// Total order used by every comparison operator, sorting and `min`/`max`.
///
/// Values of different kinds order by kind:
/// null < boolean < number < date < string < list < object.
/// A string that parses as a number takes part as that number, against numbers
/// and other numeric strings alike, so `"10" > "9"` and `"10" == 10`.
/// Null equals only null.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => x
            .items
            .iter()
            .zip(&y.items)
            .map(|(a, b)| compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => {
            let x = Arc::as_ptr(x) as *const () as usize;
            let y = Arc::as_ptr(y) as *const () as usize;
            x.cmp(&y)
        }
        _ => match (a.numeric_key(), b.numeric_key()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (x, y) => match (a, b) {
                (Value::String(s), Value::String(t)) if x.is_none() && y.is_none() => s.cmp(t),
                _ => a.order_rank(x.is_some()).cmp(&b.order_rank(y.is_some())),
            },
        },
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Date(d) => write!(f, "Date({d})"),
            Value::List(list) => f.debug_list().entries(&list.items).finish(),
            Value::Object(record) => write!(f, "Object({:?})", record),
        }
    }
}

/// Text as it appears in a rendered report; null renders as nothing.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Date(d) if d.time() == NaiveTime::MIN => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::List(list) => {
                f.write_str("[")?;
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Object(record) => f.write_str(record.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(Number::from_f64(f))
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Number(Number::Decimal(d))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d.and_time(NaiveTime::MIN))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl From<Arc<dyn Record>> for Value {
    fn from(record: Arc<dyn Record>) -> Self {
        Value::Object(record)
    }
}

impl From<MapRecord> for Value {
    fn from(record: MapRecord) -> Self {
        record.into_value()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(-1).is_truthy());
    }

    #[test]
    fn test_compare_mixed_kinds() {
        assert_eq!(compare(&Value::Null, &Value::from(0)), Ordering::Less);
        assert_eq!(compare(&Value::from("10"), &Value::from(9)), Ordering::Greater);
        assert_eq!(compare(&Value::from(2), &Value::from("2.0")), Ordering::Equal);
        assert_eq!(compare(&Value::from(5), &Value::from("abc")), Ordering::Less);
        assert_eq!(compare(&Value::from(true), &Value::from(false)), Ordering::Greater);
    }

    #[test]
    fn test_compare_numeric_strings_numerically() {
        assert_eq!(compare(&Value::from("9"), &Value::from("10")), Ordering::Less);
        assert_eq!(compare(&Value::from("1.50"), &Value::from("1.5")), Ordering::Equal);
        assert_eq!(compare(&Value::from("10"), &Value::from("abc")), Ordering::Less);
        assert_eq!(compare(&Value::from("abc"), &Value::from("abd")), Ordering::Less);

        // "10" > 9, 9 == "9", so "10" > "9" as well.
        let values = [Value::from("10"), Value::from(9), Value::from("9"), Value::from(10), Value::from("x")];
        for a in &values {
            for b in &values {
                for c in &values {
                    if compare(a, b).is_le() && compare(b, c).is_le() {
                        assert!(compare(a, c).is_le(), "{a:?} <= {b:?} <= {c:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_leaf_and_branch_lists() {
        let leaf = List::new(vec![Value::from(1), Value::from(2)]);
        let branch = List::new(vec![Value::List(leaf.clone()), Value::list(vec![Value::from(3)])]);
        assert!(leaf.is_leaf());
        assert!(!branch.is_leaf());
        assert_eq!(branch.count_deep(), 3);
        assert_eq!(branch.leaf_rows().len(), 3);
    }

    #[test]
    fn test_map_record_case_insensitive() {
        let record = MapRecord::new("Row").with("Amount", 5);
        assert_eq!(record.get("amount"), Some(Value::from(5)));
        record.set("AMOUNT", Value::from(6)).unwrap();
        assert_eq!(record.keys(), vec!["Amount".to_string()]);
        assert_eq!(record.get("Amount"), Some(Value::from(6)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(Value::from(date).to_string(), "2024-03-01");
    }
}
