//! Persistence collaborator boundary.
//!
//! Entity records, bucket states, and workflow queues are persisted through
//! `StateStore` as opaque bytes under string keys. The store may fail on any
//! call; callers decide whether to retry.

mod codec;
mod memory;

pub use codec::{decode, encode};
pub use memory::MemoryStateStore;

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// StateStoreError
///

#[derive(Debug, ThisError)]
pub enum StateStoreError {
    #[error("state store unavailable for '{key}': {reason}")]
    Unavailable { key: String, reason: String },

    #[error("state under '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("state under '{key}' could not be encoded: {reason}")]
    Encode { key: String, reason: String },
}

impl StateStoreError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Unavailable { .. } => ErrorClass::Unavailable,
            Self::Corrupt { .. } => ErrorClass::Corruption,
            Self::Encode { .. } => ErrorClass::Internal,
        }
    }
}

impl From<StateStoreError> for InternalError {
    fn from(err: StateStoreError) -> Self {
        Self::new(err.class(), ErrorOrigin::Store, err.to_string())
    }
}

///
/// StateStore
///
/// Durable read/write of named state records.
///

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn read_state(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError>;

    async fn write_state(&self, key: &str, bytes: Vec<u8>) -> Result<(), StateStoreError>;

    async fn clear_state(&self, key: &str) -> Result<(), StateStoreError>;
}

/// Shared handle to the persistence collaborator.
pub type SharedStore = Arc<dyn StateStore>;

/// Read and decode a typed record.
pub async fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
) -> Result<Option<T>, InternalError> {
    match store.read_state(key).await? {
        Some(bytes) => Ok(Some(decode(key, &bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed record.
pub async fn save<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
) -> Result<(), InternalError> {
    let bytes = encode(key, value)?;
    store.write_state(key, bytes).await?;

    Ok(())
}

/// Key layout shared by every persisted record.
pub mod keys {
    use crate::{index::BucketId, model::EntityRef};

    #[must_use]
    pub fn bucket(id: &BucketId) -> String {
        format!("bucket/{id}")
    }

    #[must_use]
    pub fn entity(entity: &EntityRef) -> String {
        format!("entity/{}/{}", entity.interface, entity.key)
    }

    #[must_use]
    pub fn workflow_queue(interface: &str) -> String {
        format!("workflow-queue/{interface}")
    }
}
