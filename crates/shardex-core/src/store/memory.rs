use crate::store::{StateStore, StateStoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

///
/// MemoryStateStore
///
/// Process-local store. Writes under an injected failing prefix fail with
/// `Unavailable` until `heal` is called; reads always succeed.
///

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<Vec<String>>,
    writes: AtomicU64,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write or clear whose key starts with `prefix`.
    pub fn fail_writes_matching(&self, prefix: impl Into<String>) {
        self.failing.lock().push(prefix.into());
    }

    /// Remove all injected failures.
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }

    /// Keys currently stored under `prefix`, in order.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.records
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of successful writes since construction.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_writable(&self, key: &str) -> Result<(), StateStoreError> {
        let failing = self.failing.lock();
        if failing.iter().any(|prefix| key.starts_with(prefix.as_str())) {
            return Err(StateStoreError::Unavailable {
                key: key.to_string(),
                reason: "injected write failure".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn read_state(&self, key: &str) -> Result<Option<Vec<u8>>, StateStoreError> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn write_state(&self, key: &str, bytes: Vec<u8>) -> Result<(), StateStoreError> {
        self.check_writable(key)?;
        self.records.lock().insert(key.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    async fn clear_state(&self, key: &str) -> Result<(), StateStoreError> {
        self.check_writable(key)?;
        self.records.lock().remove(key);

        Ok(())
    }
}
