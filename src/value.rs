//! # Values
//!
//! The dynamically typed values found in dataset cells, bin boundaries and predicate literals.
//!

use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, hash};

/// A cell value
///
/// Floats are compared on canonical bits for `Eq` and `Hash`:
/// `0.0` equals `-0.0` and every NaN equals every other.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn null() -> Value {
        Value::Null
    }

    pub fn boolean(b: bool) -> Value {
        Value::Boolean(b)
    }

    pub fn integer(i: i64) -> Value {
        Value::Integer(i)
    }

    pub fn float(f: f64) -> Value {
        Value::Float(f)
    }

    pub fn text<S: Into<String>>(s: S) -> Value {
        Value::Text(s.into())
    }

    /// The name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "double",
            Value::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value, integers are widened
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    /// Integers and floats compare numerically, other kinds only with themselves.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(l), Value::Boolean(r)) => Some(l.cmp(r)),
            (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
            (Value::Text(l), Value::Text(r)) => Some(l.cmp(r)),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.partial_cmp(&r),
                _ => None,
            },
        }
    }
}

/// `-0.0` as `0.0` and a single NaN
fn canonical_bits(x: f64) -> u64 {
    if x == 0. {
        0
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(l), Value::Boolean(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => canonical_bits(*l) == canonical_bits(*r),
            (Value::Text(l), Value::Text(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl hash::Hash for Value {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Boolean(b) => (1u8, b).hash(state),
            Value::Integer(i) => (2u8, i).hash(state),
            Value::Float(f) => (3u8, canonical_bits(*f)).hash(state),
            Value::Text(s) => (4u8, s).hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn test_compare() {
        assert_eq!(Value::from(3).compare(&Value::from(4.5)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::from(true).compare(&Value::from(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_uniqueness() {
        let values = vec![Value::from(1), Value::from(1.0), Value::from("1")];
        assert!(values.iter().all_unique());
        let values = vec![Value::from(true), Value::from(false), Value::from(true)];
        assert!(!values.iter().all_unique());
    }

    #[test]
    fn test_float_identity() {
        use std::collections::HashSet;
        assert_eq!(Value::from(0.), Value::from(-0.));
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(f64::NAN), Value::from(-f64::NAN));
        assert_ne!(Value::from(0.), Value::from(0));
        let values: HashSet<Value> = [0., -0., f64::NAN, -f64::NAN, 1.5]
            .into_iter()
            .map(Value::from)
            .collect();
        println!("values = {}", values.iter().join(", "));
        assert_eq!(values.len(), 3);
        assert!(values.contains(&Value::from(-0.)));
    }

    #[test]
    fn test_deserialize() {
        let values: Vec<Value> =
            serde_json::from_str(r#"[10, 45.0, true, "John", null]"#).unwrap();
        println!("values = {}", values.iter().join(", "));
        assert_eq!(
            values,
            vec![
                Value::integer(10),
                Value::float(45.),
                Value::boolean(true),
                Value::text("John"),
                Value::null()
            ]
        );
    }
}
