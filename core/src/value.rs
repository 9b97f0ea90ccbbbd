//! Cell values and per-value type inference.
//!
//! Source files carry no column types. Every non-empty cell is classified on
//! its own: boolean literals become [`Value::Bool`], integer and float
//! literals become numbers, and everything else stays text.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single typed field of a [`Record`](crate::Record).
///
/// Serialized untagged so that stored JSON reads back into the same variant:
/// `true` → `Bool`, `42` → `Int`, `4.5` → `Float`, `"3001b"` → `Text`.
///
/// # Examples
///
/// ```
/// use catalog_cache_core::Value;
///
/// assert_eq!(Value::infer("TRUE"), Some(Value::Bool(true)));
/// assert_eq!(Value::infer("1999"), Some(Value::Int(1999)));
/// assert_eq!(Value::infer("3001b"), Some(Value::Text("3001b".into())));
/// assert_eq!(Value::infer(""), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Infers the type of a raw cell. Returns `None` for empty cells, which
    /// are omitted from records entirely.
    pub fn infer(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("true") {
            return Some(Value::Bool(true));
        }
        if raw.eq_ignore_ascii_case("false") {
            return Some(Value::Bool(false));
        }
        if looks_numeric(raw) {
            if let Ok(n) = raw.parse::<i64>() {
                return Some(Value::Int(n));
            }
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return Some(Value::Float(f));
                }
            }
        }
        Some(Value::Text(raw.to_string()))
    }

    /// Renders the value as key text.
    ///
    /// Integral floats render without a fractional part so that `3001` and
    /// `3001.0` address the same row.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Value::Text(s) => Cow::Borrowed(s.as_str()),
            Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Int(n) => Cow::Owned(n.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Cow::Owned((*f as i64).to_string())
            }
            Value::Float(f) => Cow::Owned(f.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Filters out spellings such as `inf` and `NaN` that `f64::from_str`
/// accepts but that are catalog text.
fn looks_numeric(raw: &str) -> bool {
    let body = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}
