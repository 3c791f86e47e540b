use crate::store::StateStoreError;
use serde::{Serialize, de::DeserializeOwned};

/// Encode a record with CBOR.
pub fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StateStoreError> {
    serde_cbor::to_vec(value).map_err(|err| StateStoreError::Encode {
        key: key.to_string(),
        reason: err.to_string(),
    })
}

/// Decode a CBOR record; undecodable bytes are reported as corruption.
pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StateStoreError> {
    serde_cbor::from_slice(bytes).map_err(|err| StateStoreError::Corrupt {
        key: key.to_string(),
        reason: err.to_string(),
    })
}
