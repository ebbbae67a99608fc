//! Primary and index keys.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest float that still converts to an `i64` key exactly.
const MAX_SAFE_FLOAT_KEY: f64 = 9_007_199_254_740_991.0;

/// A key addressing a record in a collection or an entry in an index.
///
/// Keys are totally ordered: every integer key sorts before every text key,
/// integers compare numerically and text compares bytewise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Integer key.
    Integer(i64),
    /// Text key.
    Text(String),
}

impl Key {
    /// Derives a key from a record value.
    ///
    /// Text and integers are valid keys. Floats are accepted when they hold
    /// an integral value that survives the round trip to `i64`. Everything
    /// else (null, booleans, arrays, objects) is not a key.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Key::Integer(*n)),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_FLOAT_KEY => {
                Some(Key::Integer(*f as i64))
            }
            _ => None,
        }
    }

    /// Converts the key back into a record value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Integer(n) => Value::Integer(*n),
            Key::Text(s) => Value::Text(s.clone()),
        }
    }

    /// Returns the text of a text key.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            Key::Integer(_) => None,
        }
    }

    /// Returns the number of an integer key.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Key::Integer(n) => Some(*n),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Integer(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Integer(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Integer(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Integer(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Text(s.clone())
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        key.to_value()
    }
}
