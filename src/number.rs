//! Numbers: exact decimals with a floating-point fallback.
//!
//! Arithmetic stays in [`Decimal`] while it can. An operation whose decimal form
//! overflows, divides by zero or involves a non-finite operand is carried out in
//! `f64` instead, so `1 / 0` is positive infinity rather than an error.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub enum Number {
    Decimal(Decimal),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid number: {0:?}")]
pub struct ParseNumberError(pub String);

impl Number {
    pub const ZERO: Number = Number::Decimal(Decimal::ZERO);

    /// Decimal when the float is finite and representable, otherwise a float.
    pub fn from_f64(value: f64) -> Self {
        match Decimal::from_f64(value) {
            Some(d) if value.is_finite() => Number::Decimal(d),
            _ => Number::Float(value),
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            Number::Float(f) => f,
        }
    }

    /// Integer part, or `None` when it does not fit an `i64`.
    pub fn to_i64(self) -> Option<i64> {
        match self {
            Number::Decimal(d) => d.trunc().to_i64(),
            Number::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Some(f.trunc() as i64),
            Number::Float(_) => None,
        }
    }

    pub fn to_decimal(self) -> Option<Decimal> {
        match self {
            Number::Decimal(d) => Some(d),
            Number::Float(f) if f.is_finite() => Decimal::from_f64(f),
            Number::Float(_) => None,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Decimal(d) => d.is_zero(),
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn is_integer(self) -> bool {
        match self {
            Number::Decimal(d) => d.fract().is_zero(),
            Number::Float(f) => f.is_finite() && f.fract() == 0.0,
        }
    }

    pub fn abs(self) -> Self {
        match self {
            Number::Decimal(d) => Number::Decimal(d.abs()),
            Number::Float(f) => Number::Float(f.abs()),
        }
    }

    /// Applies `exact` to two decimals, falling back to `approx` on `f64`.
    fn combine(
        self,
        other: Number,
        exact: fn(Decimal, Decimal) -> Option<Decimal>,
        approx: fn(f64, f64) -> f64,
    ) -> Number {
        if let (Number::Decimal(a), Number::Decimal(b)) = (self, other)
            && let Some(result) = exact(a, b)
        {
            return Number::Decimal(result);
        }
        Number::Float(approx(self.to_f64(), other.to_f64()))
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, other: Number) -> Number {
        self.combine(other, Decimal::checked_add, |a, b| a + b)
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, other: Number) -> Number {
        self.combine(other, Decimal::checked_sub, |a, b| a - b)
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, other: Number) -> Number {
        self.combine(other, Decimal::checked_mul, |a, b| a * b)
    }
}

impl Div for Number {
    type Output = Number;

    fn div(self, other: Number) -> Number {
        self.combine(other, Decimal::checked_div, |a, b| a / b)
    }
}

impl Rem for Number {
    type Output = Number;

    fn rem(self, other: Number) -> Number {
        self.combine(other, Decimal::checked_rem, |a, b| a % b)
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Decimal(d) => Number::Decimal(-d),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Number) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Number) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Numeric order across both variants; NaN sorts above positive infinity.
impl Ord for Number {
    fn cmp(&self, other: &Number) -> Ordering {
        match (self, other) {
            (Number::Decimal(a), Number::Decimal(b)) => a.cmp(b),
            _ => {
                let (a, b) = (self.to_f64(), other.to_f64());
                a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
            }
        }
    }
}

impl From<Decimal> for Number {
    fn from(d: Decimal) -> Self {
        Number::Decimal(d)
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Decimal(Decimal::from(n))
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::Decimal(Decimal::from(n))
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        Number::Decimal(Decimal::from(n))
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::from_f64(f)
    }
}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(d) = Decimal::from_str(s) {
            return Ok(Number::Decimal(d));
        }
        if let Ok(d) = Decimal::from_scientific(s) {
            return Ok(Number::Decimal(d));
        }
        match s {
            "Infinity" | "inf" => Ok(Number::Float(f64::INFINITY)),
            "-Infinity" | "-inf" => Ok(Number::Float(f64::NEG_INFINITY)),
            "NaN" => Ok(Number::Float(f64::NAN)),
            _ => s
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|_| ParseNumberError(s.to_string())),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Decimal(d) => write!(f, "{}", d.normalize()),
            Number::Float(x) if x.is_nan() => f.write_str("NaN"),
            Number::Float(x) if x.is_infinite() && *x > 0.0 => f.write_str("Infinity"),
            Number::Float(x) if x.is_infinite() => f.write_str("-Infinity"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Number {
        s.parse().unwrap()
    }

    #[test]
    fn test_decimal_arithmetic_is_exact() {
        assert_eq!((num("0.1") + num("0.2")).to_string(), "0.3");
        assert!(matches!(num("0.1") + num("0.2"), Number::Decimal(_)));
        assert_eq!((num("10") / num("4")).to_string(), "2.5");
    }

    #[test]
    fn test_division_by_zero_falls_back_to_float() {
        let result = num("1") / num("0");
        assert!(matches!(result, Number::Float(f) if f == f64::INFINITY));
        let result = num("-1") / num("0");
        assert!(matches!(result, Number::Float(f) if f == f64::NEG_INFINITY));
    }

    #[test]
    fn test_float_operand_promotes() {
        let result = Number::Float(f64::INFINITY) + num("1");
        assert_eq!(result.to_string(), "Infinity");
    }

    #[test]
    fn test_ordering_across_variants() {
        assert!(num("2") < Number::Float(2.5));
        assert_eq!(num("2.0"), Number::Float(2.0));
        assert!(Number::Float(f64::NAN) > Number::Float(f64::INFINITY));
    }

    #[test]
    fn test_integer_part() {
        assert_eq!(num("3.9").to_i64(), Some(3));
        assert_eq!(num("-3.9").to_i64(), Some(-3));
        assert_eq!(Number::Float(f64::INFINITY).to_i64(), None);
    }
}
