use derive_more::Display;
use serde::{Deserialize, Serialize};
use shardex_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self.kind, ErrorKind::UniqueViolation)
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = if err.is_unique_violation() {
            ErrorKind::UniqueViolation
        } else {
            err.class.into()
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Schema or config rejected at startup, or a query names an unindexed property.
    Configuration,

    /// A unique key is already held by another entity.
    UniqueViolation,

    /// Lookup found nothing.
    NotFound,

    /// A unique lookup matched more than one entity.
    NotUnique,

    /// Retryable: a partition or the store could not be reached.
    Unavailable,

    /// Value does not fit the declared key kind.
    Unsupported,

    /// The caller cannot remediate this.
    Internal,
}

impl From<ErrorClass> for ErrorKind {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Configuration => Self::Configuration,
            ErrorClass::Conflict => Self::UniqueViolation,
            ErrorClass::NotFound => Self::NotFound,
            ErrorClass::NotUnique => Self::NotUnique,
            ErrorClass::Unavailable => Self::Unavailable,
            ErrorClass::Unsupported => Self::Unsupported,
            ErrorClass::Corruption | ErrorClass::InvariantViolation | ErrorClass::Internal => {
                Self::Internal
            }
        }
    }
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Config,
    Index,
    Query,
    Schema,
    Store,
    Workflow,
    Writer,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Index | CoreErrorOrigin::Bucket => Self::Index,
            CoreErrorOrigin::Query => Self::Query,
            CoreErrorOrigin::Schema | CoreErrorOrigin::Registry => Self::Schema,
            CoreErrorOrigin::Store => Self::Store,
            CoreErrorOrigin::Workflow => Self::Workflow,
            CoreErrorOrigin::Writer => Self::Writer,
        }
    }
}
