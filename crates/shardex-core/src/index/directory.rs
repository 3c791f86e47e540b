use crate::{
    config::IndexConfig,
    index::{
        BucketId,
        actor::{self, BucketHandle, BucketSettings},
    },
    store::SharedStore,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::task::AbortHandle;

///
/// BucketDirectory
///
/// Resolves bucket identifiers to live partitions, spawning a partition the
/// first time it is addressed. A spawned partition loads its persisted
/// state before serving commands, so resolution is the only lookup service
/// a chain walk needs.
///

pub struct BucketDirectory {
    store: SharedStore,
    mailbox_capacity: usize,
    live: Mutex<HashMap<BucketId, LivePartition>>,
}

#[derive(Debug)]
struct LivePartition {
    handle: BucketHandle,
    task: AbortHandle,
}

impl BucketDirectory {
    #[must_use]
    pub fn new(store: SharedStore, config: &IndexConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            mailbox_capacity: config.mailbox_capacity.max(1),
            live: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub(crate) fn resolve(&self, id: &BucketId, settings: BucketSettings) -> BucketHandle {
        let mut live = self.live.lock();

        if let Some(partition) = live.get(id)
            && !partition.handle.is_closed()
        {
            return partition.handle.clone();
        }

        let (handle, task) =
            actor::spawn(id.clone(), settings, self.store.clone(), self.mailbox_capacity);
        live.insert(
            id.clone(),
            LivePartition {
                handle: handle.clone(),
                task,
            },
        );

        handle
    }

    /// Stop every live partition, dropping all in-memory bucket state.
    ///
    /// Partitions are respawned from persisted state on next use, which is
    /// how a host restart looks to the index.
    pub fn evict_all(&self) {
        let drained: Vec<_> = self.live.lock().drain().collect();
        for (id, partition) in drained {
            partition.task.abort();
            tracing::trace!(bucket = %id, "bucket partition evicted");
        }
    }

    /// Number of partitions currently live.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.lock().values().filter(|p| !p.handle.is_closed()).count()
    }
}

impl Drop for BucketDirectory {
    fn drop(&mut self) {
        for partition in self.live.get_mut().values() {
            partition.task.abort();
        }
    }
}
