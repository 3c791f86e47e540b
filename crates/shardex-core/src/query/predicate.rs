use crate::value::Value;
use std::ops::{BitAnd, BitOr};

///
/// Predicate
///
/// Equality predicates over indexed properties. Conjunction intersects the
/// per-predicate lookups; disjunction unions them.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Predicate {
    Eq { property: String, value: Value },
    And(Vec<Self>),
    Or(Vec<Self>),
}

impl Predicate {
    #[must_use]
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            property: property.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub const fn and(preds: Vec<Self>) -> Self {
        Self::And(preds)
    }

    #[must_use]
    pub const fn or(preds: Vec<Self>) -> Self {
        Self::Or(preds)
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

///
/// Query
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Query {
    pub interface: String,
    pub predicate: Predicate,
}

impl Query {
    #[must_use]
    pub fn new(interface: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            interface: interface.into(),
            predicate,
        }
    }
}
