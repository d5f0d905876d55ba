//! Built-in functions.
//!
//! Most functions work on a *subject*: the chain target in `name.upper()`, or
//! the first argument in `upper(name)`. The target is the subject when it has
//! the kind the function works on and the arguments fit the target form;
//! otherwise the first argument is.

use std::fmt::Write as _;
use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::evaluator::EvalError;
use crate::functions::FunctionProvider;
use crate::number::Number;
use crate::value::{Value, compare};

type Builtin = fn(&Value, &[Value]) -> Result<Value, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Numeric,
    Any,
}

impl Kind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Kind::Text => matches!(value, Value::String(_)),
            Kind::Numeric => matches!(value, Value::Number(_)),
            Kind::Any => true,
        }
    }
}

/// Picks the subject of a call whose own arguments number at most `own_max`.
fn split<'a>(target: &'a Value, args: &'a [Value], own_max: usize, kind: Kind) -> (&'a Value, &'a [Value]) {
    if args.len() > own_max || (!args.is_empty() && !kind.matches(target)) {
        (&args[0], &args[1..])
    } else {
        (target, args)
    }
}

/// Registers `f` for every arity from the smallest target form to the largest
/// subject-first form.
fn subject_fn(
    provider: FunctionProvider,
    name: &'static str,
    own: RangeInclusive<usize>,
    kind: Kind,
    f: Builtin,
) -> FunctionProvider {
    let max = *own.end();
    (*own.start()..=max + 1).fold(provider, |provider, arity| {
        provider.function(name, arity, move |target, args| {
            let (subject, rest) = split(target, args, max, kind);
            f(subject, rest).map_err(|message| EvalError::function(name, message))
        })
    })
}

fn varargs_fn(provider: FunctionProvider, name: &'static str, f: Builtin) -> FunctionProvider {
    provider.varargs(name, move |target, args| {
        f(target, args).map_err(|message| EvalError::function(name, message))
    })
}

/// The built-in provider, searched after every registered one.
pub fn provider() -> FunctionProvider {
    let math: [(&'static str, RangeInclusive<usize>, Builtin); 5] = [
        ("abs", 0..=0, abs),
        ("ceil", 0..=0, ceil),
        ("floor", 0..=0, floor),
        ("round", 0..=1, round),
        ("pow", 1..=1, pow),
    ];
    let text: [(&'static str, RangeInclusive<usize>, Builtin); 11] = [
        ("substring", 1..=2, substring),
        ("indexOf", 1..=1, index_of),
        ("split", 1..=1, split_text),
        ("pad", 1..=2, pad),
        ("wrap", 1..=1, wrap),
        ("startsWith", 1..=1, starts_with),
        ("endsWith", 1..=1, ends_with),
        ("upper", 0..=0, |s, _| Ok(text_of(s).to_uppercase().into())),
        ("lower", 0..=0, |s, _| Ok(text_of(s).to_lowercase().into())),
        ("trim", 0..=0, |s, _| Ok(text_of(s).trim().to_string().into())),
        ("date", 0..=1, date),
    ];
    let any: [(&'static str, RangeInclusive<usize>, Builtin); 4] = [
        ("length", 0..=0, length),
        ("format", 1..=1, format),
        ("isNull", 0..=0, |s, _| Ok(Value::Boolean(s.is_null()))),
        ("roman", 0..=0, roman),
    ];

    let mut provider = FunctionProvider::new("builtin");
    for (name, own, f) in math {
        provider = subject_fn(provider, name, own, Kind::Numeric, f);
    }
    for (name, own, f) in text {
        provider = subject_fn(provider, name, own, Kind::Text, f);
    }
    for (name, own, f) in any {
        provider = subject_fn(provider, name, own, Kind::Any, f);
    }
    provider = varargs_fn(provider, "max", |target, args| Ok(extreme(target, args, true)));
    provider = varargs_fn(provider, "min", |target, args| Ok(extreme(target, args, false)));
    varargs_fn(provider, "list", |_, args| Ok(Value::list(args.to_vec())))
}

fn text_of(value: &Value) -> String {
    value.to_string()
}

fn number_of(value: &Value) -> Result<Number, String> {
    value
        .to_number()
        .ok_or_else(|| format!("expected a number, found {}", value.type_name()))
}

fn arg(args: &[Value], index: usize) -> Result<&Value, String> {
    args.get(index).ok_or_else(|| format!("missing argument {}", index + 1))
}

fn int_arg(args: &[Value], index: usize) -> Result<i64, String> {
    let value = arg(args, index)?;
    value
        .as_i64()
        .ok_or_else(|| format!("argument {} must be an integer, found {}", index + 1, value.type_name()))
}

fn map_number(
    subject: &Value,
    exact: fn(Decimal) -> Decimal,
    approx: fn(f64) -> f64,
) -> Result<Value, String> {
    Ok(Value::Number(match number_of(subject)? {
        Number::Decimal(d) => Number::Decimal(exact(d)),
        Number::Float(f) => Number::Float(approx(f)),
    }))
}

fn abs(subject: &Value, _: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(number_of(subject)?.abs()))
}

fn ceil(subject: &Value, _: &[Value]) -> Result<Value, String> {
    map_number(subject, |d| d.ceil(), f64::ceil)
}

fn floor(subject: &Value, _: &[Value]) -> Result<Value, String> {
    map_number(subject, |d| d.floor(), f64::floor)
}

/// Rounds half away from zero to `places` decimals (default 0).
fn round(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let places = if args.is_empty() { 0 } else { int_arg(args, 0)? };
    let places = u32::try_from(places).map_err(|_| "decimal places must not be negative".to_string())?;
    Ok(Value::Number(match number_of(subject)? {
        Number::Decimal(d) => {
            Number::Decimal(d.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero))
        }
        Number::Float(f) => {
            let scale = 10f64.powi(places.min(300) as i32);
            Number::Float((f * scale).round() / scale)
        }
    }))
}

fn pow(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let base = number_of(subject)?;
    let exponent = number_of(arg(args, 0)?)?;
    if let (Number::Decimal(b), Some(e)) = (base, exponent.is_integer().then(|| exponent.to_i64()).flatten())
        && let Some(result) = checked_powi(b, e)
    {
        return Ok(Value::Number(Number::Decimal(result)));
    }
    Ok(Value::Number(Number::Float(base.to_f64().powf(exponent.to_f64()))))
}

/// Exponentiation by squaring; `None` on overflow or a zero base with a
/// negative exponent.
fn checked_powi(base: Decimal, exponent: i64) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut factor = base;
    let mut remaining = exponent.unsigned_abs();
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.checked_mul(factor)?;
        }
        remaining >>= 1;
        if remaining > 0 {
            factor = factor.checked_mul(factor)?;
        }
    }
    if exponent < 0 {
        Decimal::ONE.checked_div(result)
    } else {
        Some(result)
    }
}

fn extreme(target: &Value, args: &[Value], max: bool) -> Value {
    let mut candidates: Vec<&Value> = args.iter().filter(|v| !v.is_null()).collect();
    if args.len() == 1 && matches!(target, Value::Number(_)) {
        candidates.push(target);
    }
    let pick = candidates.into_iter();
    let found = if max { pick.max_by(|a, b| compare(a, b)) } else { pick.min_by(|a, b| compare(a, b)) };
    found.cloned().unwrap_or(Value::Null)
}

/// Characters from `start` up to, not including, `end`; indexes are clamped.
fn substring(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let chars: Vec<char> = text_of(subject).chars().collect();
    let clamp = |i: i64| i.clamp(0, chars.len() as i64) as usize;
    let start = clamp(int_arg(args, 0)?);
    let end = if args.len() > 1 { clamp(int_arg(args, 1)?) } else { chars.len() };
    if start >= end {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(chars[start..end].iter().collect()))
}

/// Character index of the first occurrence, or -1.
fn index_of(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let text = text_of(subject);
    let needle = text_of(arg(args, 0)?);
    Ok(Value::from(match text.find(&needle) {
        Some(byte) => text[..byte].chars().count() as i64,
        None => -1,
    }))
}

fn split_text(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let text = text_of(subject);
    let separator = text_of(arg(args, 0)?);
    let parts = if separator.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(separator.as_str()).map(Value::from).collect()
    };
    Ok(Value::list(parts))
}

/// Widest result `pad` will build.
const MAX_PAD_WIDTH: usize = 10_000;

/// Left-pads to `width` characters with `fill` (default a space).
fn pad(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let text = text_of(subject);
    let width = usize::try_from(int_arg(args, 0)?).unwrap_or(0);
    if width > MAX_PAD_WIDTH {
        return Err(format!("width {width} exceeds {MAX_PAD_WIDTH}"));
    }
    let fill = match args.get(1) {
        Some(fill) => text_of(fill).chars().next().unwrap_or(' '),
        None => ' ',
    };
    let missing = width.saturating_sub(text.chars().count());
    let mut padded: String = std::iter::repeat_n(fill, missing).collect();
    padded.push_str(&text);
    Ok(Value::String(padded))
}

/// Breaks lines at spaces so none exceeds `width` characters where possible.
fn wrap(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let text = text_of(subject);
    let width = usize::try_from(int_arg(args, 0)?).unwrap_or(0);
    if width == 0 {
        return Ok(Value::String(text));
    }

    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    Ok(Value::String(lines.join("\n")))
}

fn starts_with(subject: &Value, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(text_of(subject).starts_with(&text_of(arg(args, 0)?))))
}

fn ends_with(subject: &Value, args: &[Value]) -> Result<Value, String> {
    Ok(Value::Boolean(text_of(subject).ends_with(&text_of(arg(args, 0)?))))
}

fn length(subject: &Value, _: &[Value]) -> Result<Value, String> {
    match subject {
        Value::List(list) => Ok(Value::from(list.len())),
        Value::Null => Ok(Value::from(0)),
        other => Ok(Value::from(other.to_string().chars().count())),
    }
}

/// Parses a date from text, with an optional chrono format pattern.
fn date(subject: &Value, args: &[Value]) -> Result<Value, String> {
    if let Value::Date(d) = subject {
        return Ok(Value::Date(*d));
    }
    let text = text_of(subject);
    let text = text.trim();

    if let Some(pattern) = args.first() {
        let pattern = text_of(pattern);
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, &pattern) {
            return Ok(Value::Date(dt));
        }
        return NaiveDate::parse_from_str(text, &pattern)
            .map(Value::from)
            .map_err(|e| format!("cannot parse {text:?} with {pattern:?}: {e}"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(Value::Date(dt.naive_local()));
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(Value::Date(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|d| Value::Date(d.and_time(NaiveTime::MIN)))
        .map_err(|e| format!("cannot parse date {text:?}: {e}"))
}

/// Formats numbers with a `#,##0.00`-style pattern and dates with a chrono
/// pattern.
fn format(subject: &Value, args: &[Value]) -> Result<Value, String> {
    let pattern = text_of(arg(args, 0)?);
    match subject {
        Value::Date(d) => {
            let mut out = String::new();
            write!(out, "{}", d.format(&pattern)).map_err(|_| format!("invalid date pattern {pattern:?}"))?;
            Ok(Value::String(out))
        }
        Value::Null => Ok(Value::String(String::new())),
        other => format_number(number_of(other)?, &pattern).map(Value::String),
    }
}

const NUMBER_PATTERN_CHARS: &[char] = &['#', '0', ',', '.'];

fn format_number(number: Number, pattern: &str) -> Result<String, String> {
    let (Some(first), Some(last)) = (
        pattern.find(NUMBER_PATTERN_CHARS),
        pattern.rfind(NUMBER_PATTERN_CHARS),
    ) else {
        return Err(format!("invalid number pattern {pattern:?}"));
    };
    let (prefix, body, suffix) = (&pattern[..first], &pattern[first..=last], &pattern[last + 1..]);
    let (int_pattern, frac_pattern) = body.split_once('.').unwrap_or((body, ""));

    let max_frac = frac_pattern.chars().filter(|c| matches!(c, '0' | '#')).count();
    let min_frac = frac_pattern.chars().take_while(|c| *c == '0').count();
    let min_int = int_pattern.chars().filter(|c| *c == '0').count();
    let grouping = int_pattern.contains(',');

    let Some(decimal) = number.to_decimal() else {
        return Ok(format!("{prefix}{number}{suffix}"));
    };
    let rounded = decimal.round_dp_with_strategy(max_frac as u32, RoundingStrategy::MidpointAwayFromZero);
    let digits = format!("{:.*}", max_frac, rounded.abs());
    let (int_digits, frac_digits) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

    let mut frac = frac_digits.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }

    let mut int = int_digits.trim_start_matches('0').to_string();
    while int.len() < min_int.max(1) {
        int.insert(0, '0');
    }
    if grouping {
        int = group_thousands(&int);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let mut out = format!("{sign}{prefix}{int}");
    if !frac.is_empty() {
        out.push('.');
        out.push_str(&frac);
    }
    out.push_str(suffix);
    Ok(out)
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn roman(subject: &Value, _: &[Value]) -> Result<Value, String> {
    const NUMERALS: [(i64, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut n = subject
        .as_i64()
        .filter(|n| (1..=3999).contains(n))
        .ok_or_else(|| format!("{subject} has no roman numeral"))?;
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    Ok(Value::String(out))
}
