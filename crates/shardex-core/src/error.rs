use crate::{model::SchemaError, value::Value};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; the facade crate maps it onto its public error.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a schema/registry configuration error.
    pub fn configuration(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Configuration, origin, message)
    }

    /// Construct a bucket-origin unavailable error (disposed or unreachable partition).
    pub(crate) fn bucket_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unavailable, ErrorOrigin::Bucket, message)
    }

    /// Construct a writer-origin invariant violation.
    pub(crate) fn writer_invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Writer, message)
    }

    /// Construct an index lookup miss.
    pub fn index_not_found(index: impl Into<String>, key: &Value) -> Self {
        let index = index.into();

        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Index,
            format!("no entry for key {key} in index '{index}'"),
        )
    }

    /// Construct a unique-lookup cardinality error.
    pub(crate) fn index_not_unique(index: &str, key: &Value, count: usize) -> Self {
        Self::new(
            ErrorClass::NotUnique,
            ErrorOrigin::Index,
            format!("unique lookup on index '{index}' found {count} entities for key {key}"),
        )
    }

    /// Construct a unique-constraint violation carrying the conflicting key.
    pub fn unique_violation(index: impl Into<String>, key: Value) -> Self {
        let index = index.into();

        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Index,
            message: format!("unique constraint violation: index '{index}' already holds key {key}"),
            detail: Some(ErrorDetail::UniqueViolation { index, key }),
        }
    }

    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self.detail, Some(ErrorDetail::UniqueViolation { .. }))
    }

    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self.class, ErrorClass::Unavailable)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<SchemaError> for InternalError {
    fn from(err: SchemaError) -> Self {
        Self {
            class: ErrorClass::Configuration,
            origin: ErrorOrigin::Schema,
            message: err.to_string(),
            detail: Some(ErrorDetail::Schema(err)),
        }
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("unique violation on '{index}' for key {key}")]
    UniqueViolation { index: String, key: Value },

    #[error("{0}")]
    Schema(SchemaError),
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Configuration,
    Conflict,
    NotFound,
    NotUnique,
    Unavailable,
    Corruption,
    Unsupported,
    InvariantViolation,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::NotUnique => "not_unique",
            Self::Unavailable => "unavailable",
            Self::Corruption => "corruption",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Schema,
    Registry,
    Index,
    Bucket,
    Writer,
    Workflow,
    Query,
    Store,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Schema => "schema",
            Self::Registry => "registry",
            Self::Index => "index",
            Self::Bucket => "bucket",
            Self::Writer => "writer",
            Self::Workflow => "workflow",
            Self::Query => "query",
            Self::Store => "store",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_carries_index_and_key() {
        let err = InternalError::unique_violation("Player.name", Value::from("X"));

        assert_eq!(err.class, ErrorClass::Conflict);
        assert!(err.is_unique_violation());
        assert!(err.message.contains("Player.name"));
        match err.detail {
            Some(ErrorDetail::UniqueViolation { index, key }) => {
                assert_eq!(index, "Player.name");
                assert_eq!(key, Value::from("X"));
            }
            other => panic!("expected unique violation detail, got {other:?}"),
        }
    }

    #[test]
    fn display_with_class_prefixes_origin_and_class() {
        let err = InternalError::bucket_unavailable("bucket disposed");
        assert_eq!(err.display_with_class(), "bucket:unavailable: bucket disposed");
    }
}
