//! Indexed property values.
//!
//! `Value` is the single key type stored in bucket maps. Variant tags are part
//! of the partition-routing hash and must remain fixed once data is persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;
use ulid::Ulid;
use xxhash_rust::xxh3::Xxh3;

///
/// ValueParseError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
#[error("cannot parse '{input}' as {kind}")]
pub struct ValueParseError {
    pub kind: ValueKind,
    pub input: String,
}

///
/// ValueKind
///
/// Declared key type of an indexed property.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ValueKind {
    Bool,
    Int,
    Uint,
    Text,
    Ulid,
}

impl ValueKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Uint => "Uint",
            Self::Text => "Text",
            Self::Ulid => "Ulid",
        }
    }

    /// Parse a declared literal (for example a null sentinel) into a value of this kind.
    pub fn parse(self, input: &str) -> Result<Value, ValueParseError> {
        let err = || ValueParseError {
            kind: self,
            input: input.to_string(),
        };

        match self {
            Self::Bool => input.parse::<bool>().map(Value::Bool).map_err(|_| err()),
            Self::Int => input.parse::<i64>().map(Value::Int).map_err(|_| err()),
            Self::Uint => input.parse::<u64>().map(Value::Uint).map_err(|_| err()),
            Self::Text => Ok(Value::Text(input.to_string())),
            Self::Ulid => Ulid::from_string(input).map(Value::Ulid).map_err(|_| err()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

///
/// ValueTag
///
/// Stable canonical variant tag used by the routing hash.
///

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ValueTag {
    Null = 1,
    Bool = 2,
    Int = 3,
    Uint = 4,
    Text = 5,
    Ulid = 6,
}

///
/// Value
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Text(String),
    Ulid(Ulid),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Declared kind of this value, `None` for `Null`.
    #[must_use]
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Int(_) => Some(ValueKind::Int),
            Self::Uint(_) => Some(ValueKind::Uint),
            Self::Text(_) => Some(ValueKind::Text),
            Self::Ulid(_) => Some(ValueKind::Ulid),
        }
    }

    const fn tag(&self) -> ValueTag {
        match self {
            Self::Null => ValueTag::Null,
            Self::Bool(_) => ValueTag::Bool,
            Self::Int(_) => ValueTag::Int,
            Self::Uint(_) => ValueTag::Uint,
            Self::Text(_) => ValueTag::Text,
            Self::Ulid(_) => ValueTag::Ulid,
        }
    }

    /// Deterministic 64-bit routing hash (tag byte followed by a big-endian payload).
    #[must_use]
    pub fn routing_hash(&self) -> u64 {
        let mut h = Xxh3::with_seed(0);
        h.update(&[self.tag() as u8]);

        match self {
            Self::Null => {}
            Self::Bool(v) => h.update(&[u8::from(*v)]),
            Self::Int(v) => h.update(&v.to_be_bytes()),
            Self::Uint(v) => h.update(&v.to_be_bytes()),
            Self::Text(v) => {
                h.update(&(v.len() as u64).to_be_bytes());
                h.update(v.as_bytes());
            }
            Self::Ulid(v) => h.update(&v.to_bytes()),
        }

        h.digest()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}u"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Ulid(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Ulid> for Value {
    fn from(v: Ulid) -> Self {
        Self::Ulid(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_respects_declared_kind() {
        assert_eq!(ValueKind::Text.parse("NONE"), Ok(Value::from("NONE")));
        assert_eq!(ValueKind::Int.parse("-1"), Ok(Value::Int(-1)));
        assert_eq!(ValueKind::Bool.parse("false"), Ok(Value::Bool(false)));

        let err = ValueKind::Uint.parse("-1").expect_err("negative uint must not parse");
        assert_eq!(err.kind, ValueKind::Uint);
        assert_eq!(err.input, "-1");
    }

    #[test]
    fn routing_hash_separates_variants_with_equal_payloads() {
        assert_ne!(Value::Int(7).routing_hash(), Value::Uint(7).routing_hash());
        assert_eq!(Value::from("NFL").routing_hash(), Value::from("NFL").routing_hash());
    }

    #[test]
    fn option_converts_none_to_null() {
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(3_i64)), Value::Int(3));
    }
}
