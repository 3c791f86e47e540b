use crate::value::ValueParseError;
use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Configuration errors raised while building the index registry.
/// None of these are recoverable at request time.
///

#[derive(Debug, ThisError)]
pub enum SchemaError {
    #[error("entity interface name is empty")]
    EmptyInterface,

    #[error("entity '{interface}' declares a property with an empty name")]
    EmptyProperty { interface: String },

    #[error("name '{name}' contains '{character}', which storage keys use as a separator")]
    ReservedCharacter { name: String, character: char },

    #[error("entity '{0}' registered more than once")]
    DuplicateInterface(String),

    #[error("entity '{interface}' declares property '{property}' more than once")]
    DuplicateProperty { interface: String, property: String },

    #[error("index '{interface}.{property}' is active-scoped and cannot be unique")]
    ActiveUnique { interface: String, property: String },

    #[error("index '{interface}.{property}' is total-scoped and cannot be eager")]
    TotalEager { interface: String, property: String },

    #[error("fault-tolerant entity '{interface}' mixes eager and lazy indexes")]
    MixedUpdateModes { interface: String },

    #[error(
        "index '{interface}.{property}' is unique on a non-nullable property and needs a null sentinel"
    )]
    MissingNullSentinel { interface: String, property: String },

    #[error("index '{interface}.{property}' has an invalid null sentinel: {source}")]
    InvalidNullSentinel {
        interface: String,
        property: String,
        source: ValueParseError,
    },

    #[error("index '{interface}.{property}' declares a zero bucket capacity")]
    ZeroCapacity { interface: String, property: String },

    #[error("{} schema errors: {}", .0.len(), join_errors(.0))]
    Many(Vec<Self>),
}

impl SchemaError {
    /// Collapse a list of errors; `None` when the list is empty.
    pub(crate) fn from_list(mut errors: Vec<Self>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Many(errors)),
        }
    }

    /// Flatten nested error lists into leaf errors.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        match self {
            Self::Many(errors) => errors.iter().flat_map(Self::leaves).collect(),
            other => vec![other],
        }
    }
}

fn join_errors(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
