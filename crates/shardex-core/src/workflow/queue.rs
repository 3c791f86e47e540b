use crate::{
    error::InternalError,
    model::EntityRef,
    store::{self, SharedStore, keys},
    workflow::{WorkflowId, WorkflowQueueEntry},
};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

///
/// WorkflowQueue
///
/// Durable FIFO of pending workflows for one entity interface.
///
/// The full queue is rewritten on every change. Writes are serialized so a
/// later snapshot is never overwritten by an earlier one. A failed write
/// keeps the in-memory change; the entity record still holds every
/// fault-tolerant entry, so nothing is lost on restart.
///

pub struct WorkflowQueue {
    interface: String,
    store: SharedStore,
    entries: Mutex<VecDeque<WorkflowQueueEntry>>,
    persist_lock: AsyncMutex<()>,
    delivery: AsyncMutex<()>,
}

impl WorkflowQueue {
    /// Open the queue for `interface`, loading whatever was persisted.
    pub async fn open(
        interface: impl Into<String>,
        store: SharedStore,
    ) -> Result<Arc<Self>, InternalError> {
        let interface = interface.into();
        let entries: Vec<WorkflowQueueEntry> =
            store::load(store.as_ref(), &keys::workflow_queue(&interface))
                .await?
                .unwrap_or_default();

        if !entries.is_empty() {
            tracing::debug!(%interface, pending = entries.len(), "workflow queue recovered");
        }

        Ok(Arc::new(Self {
            interface,
            store,
            entries: Mutex::new(entries.into()),
            persist_lock: AsyncMutex::new(()),
            delivery: AsyncMutex::new(()),
        }))
    }

    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Append an entry unless one with the same id is already queued.
    ///
    /// An entry resubmitted behind a later workflow of the same target is
    /// placed ahead of it, so each target sees its workflows in issue order.
    /// Returns `Ok(false)` for a duplicate.
    pub async fn enqueue(&self, entry: WorkflowQueueEntry) -> Result<bool, InternalError> {
        {
            let mut entries = self.entries.lock();
            if entries.iter().any(|e| e.workflow_id == entry.workflow_id) {
                return Ok(false);
            }
            tracing::trace!(
                interface = %self.interface,
                workflow = %entry.workflow_id,
                target = %entry.target,
                "workflow enqueued"
            );
            let later = entries
                .iter()
                .position(|e| e.target == entry.target && e.workflow_id > entry.workflow_id);
            match later {
                Some(position) => entries.insert(position, entry),
                None => entries.push_back(entry),
            }
        }

        self.persist().await?;

        Ok(true)
    }

    /// Remove delivered entries.
    pub async fn remove(&self, ids: &BTreeSet<WorkflowId>) -> Result<(), InternalError> {
        if ids.is_empty() {
            return Ok(());
        }

        self.entries
            .lock()
            .retain(|entry| !ids.contains(&entry.workflow_id));

        self.persist().await
    }

    /// Up to `max` entries from the front of the queue.
    #[must_use]
    pub fn peek(&self, max: usize) -> Vec<WorkflowQueueEntry> {
        self.entries.lock().iter().take(max).cloned().collect()
    }

    /// Every queued entry targeting `target`, in queue order.
    #[must_use]
    pub fn pending_for(&self, target: &EntityRef) -> Vec<WorkflowQueueEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| &entry.target == target)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn contains(&self, id: WorkflowId) -> bool {
        self.entries.lock().iter().any(|e| e.workflow_id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Exclusive right to deliver entries from this queue.
    pub(crate) async fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().await
    }

    async fn persist(&self) -> Result<(), InternalError> {
        let _serial = self.persist_lock.lock().await;
        let snapshot: Vec<_> = self.entries.lock().iter().cloned().collect();

        let key = keys::workflow_queue(&self.interface);
        if snapshot.is_empty() {
            self.store.clear_state(&key).await?;
        } else {
            store::save(self.store.as_ref(), &key, &snapshot).await?;
        }

        Ok(())
    }
}
