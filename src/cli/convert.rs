//! JSON <-> Value conversion

use crate::number::Number;
use crate::{MapRecord, Value};

/// Converts JSON into a value. Objects become [`MapRecord`]s typed `"object"`;
/// numbers keep their exact decimal text where possible.
pub fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => n
                .to_string()
                .parse::<Number>()
                .map(Value::Number)
                .unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::list(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let record = MapRecord::new("object");
            for (k, v) in obj {
                record.insert(k, json_to_value(v));
            }
            record.into_value()
        }
    }
}

/// Converts a value into JSON. Dates become strings, objects are read through
/// their keys, and non-finite numbers become null.
pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => match n.to_i64() {
            Some(i) if n.is_integer() => serde_json::Value::Number(i.into()),
            _ => serde_json::Number::from_f64(n.to_f64())
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        },
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(_) => serde_json::Value::String(v.to_string()),
        Value::List(list) => serde_json::Value::Array(list.items.iter().map(value_to_json).collect()),
        Value::Object(record) => serde_json::Value::Object(
            record
                .keys()
                .into_iter()
                .map(|k| {
                    let v = record.get(&k).map_or(serde_json::Value::Null, |v| value_to_json(&v));
                    (k, v)
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objects_round_trip_through_records() {
        let input = json!({"name": "Acme", "lines": [{"amount": 1.5}, {"amount": 2}]});
        let value = json_to_value(input.clone());
        assert_eq!(value.type_name(), "object");
        assert_eq!(value_to_json(&value), input);
    }

    #[test]
    fn test_non_finite_numbers_become_null() {
        let value = Value::Number(Number::Float(f64::INFINITY));
        assert_eq!(value_to_json(&value), serde_json::Value::Null);
    }
}
