use crate::value::ValueKind;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// IndexKind
///
/// Physical layout of an index.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum IndexKind {
    /// Keys are hashed across several root partitions, each with its own chain.
    #[default]
    PartitionedHash,
    /// A single root partition holds every key.
    SingleBucket,
}

impl IndexKind {
    /// Parse the declarative index kind token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "hash" | "partitioned_hash" => Some(Self::PartitionedHash),
            "single" | "single_bucket" => Some(Self::SingleBucket),
            _ => None,
        }
    }
}

///
/// IndexScope
///
/// Which entities an index covers.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum IndexScope {
    /// Only currently-activated entities; maintained on activate/deactivate.
    Active,
    /// Every persisted entity, activated or not.
    #[default]
    Total,
}

///
/// UpdateMode
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum UpdateMode {
    /// Applied before the entity write returns.
    Eager,
    /// Applied asynchronously through the workflow queue.
    #[default]
    Lazy,
}

impl Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager => f.write_str("eager"),
            Self::Lazy => f.write_str("lazy"),
        }
    }
}

///
/// PropertySchema
///
/// Declaration of one indexed property on an entity interface.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PropertySchema {
    pub name: String,
    pub key_kind: ValueKind,
    pub nullable: bool,
    pub kind: IndexKind,
    pub scope: IndexScope,
    pub mode: UpdateMode,
    pub unique: bool,

    /// Maximum distinct keys per bucket; the configured default applies when unset.
    #[serde(default)]
    pub max_entries_per_bucket: Option<usize>,

    /// Literal standing for "not set" on a non-nullable property, parsed per `key_kind`.
    #[serde(default)]
    pub null_sentinel: Option<String>,
}

impl PropertySchema {
    /// Declare a nullable, lazy, non-unique, total, partitioned-hash property index.
    pub fn new(name: impl Into<String>, key_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            key_kind,
            nullable: true,
            kind: IndexKind::default(),
            scope: IndexScope::default(),
            mode: UpdateMode::default(),
            unique: false,
            max_entries_per_bucket: None,
            null_sentinel: None,
        }
    }

    #[must_use]
    pub const fn eager(mut self) -> Self {
        self.mode = UpdateMode::Eager;
        self
    }

    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.mode = UpdateMode::Lazy;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub const fn non_nullable(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn active(mut self) -> Self {
        self.scope = IndexScope::Active;
        self
    }

    #[must_use]
    pub const fn single_bucket(mut self) -> Self {
        self.kind = IndexKind::SingleBucket;
        self
    }

    #[must_use]
    pub const fn max_entries_per_bucket(mut self, max: usize) -> Self {
        self.max_entries_per_bucket = Some(max);
        self
    }

    #[must_use]
    pub fn null_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.null_sentinel = Some(sentinel.into());
        self
    }
}

impl Display for PropertySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            write!(f, "UNIQUE {} {}({})", self.mode, self.name, self.key_kind)
        } else {
            write!(f, "{} {}({})", self.mode, self.name, self.key_kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_kind_tokens_resolve() {
        assert_eq!(IndexKind::from_token("hash"), Some(IndexKind::PartitionedHash));
        assert_eq!(IndexKind::from_token("single_bucket"), Some(IndexKind::SingleBucket));
        assert_eq!(IndexKind::from_token("btree"), None);
    }

    #[test]
    fn display_marks_unique_properties() {
        let schema = PropertySchema::new("name", ValueKind::Text).unique().eager();
        assert_eq!(schema.to_string(), "UNIQUE eager name(Text)");
    }
}
