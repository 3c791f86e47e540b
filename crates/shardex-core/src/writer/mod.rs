//! Per-entity index maintenance.
//!
//! An entity embeds an `IndexWriter` next to its plain property state. The
//! writer diffs each new state against the last persisted one, applies
//! eager updates directly to the index, reserves lazy unique keys, persists
//! the entity record, and hands lazy updates to the workflow queue.

mod diff;
mod host;

#[cfg(test)]
mod tests;

pub use host::{EntityTable, IndexedEntity};

use crate::{
    error::InternalError,
    index::{BucketDirectory, HashIndex},
    model::{EntityRef, IndexScope, UpdateMode},
    obs::sink::{self, MetricsEvent},
    registry::EntityIndexes,
    store::{self, SharedStore, keys},
    update::{IndexUpdate, NamedUpdate},
    value::Value,
    workflow::{WorkflowId, WorkflowQueue, WorkflowQueueEntry},
};
use diff::{PlannedUpdate, diff};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
    sync::Arc,
};

/// Property values of one entity, keyed by property name.
pub type PropertyMap = BTreeMap<String, Value>;

///
/// EntityPhase
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EntityPhase {
    #[default]
    Inactive,
    Activating,
    Active,
    Deactivating,
}

impl Display for EntityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
        };
        f.write_str(label)
    }
}

///
/// EntityRecord
///
/// Persisted entity state plus every workflow not yet acknowledged, in
/// the order the entity issued them.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityRecord {
    pub state: PropertyMap,
    #[serde(default)]
    pub pending: Vec<WorkflowQueueEntry>,
}

impl EntityRecord {
    #[must_use]
    pub fn active_workflow_ids(&self) -> BTreeSet<WorkflowId> {
        self.pending.iter().map(|entry| entry.workflow_id).collect()
    }
}

///
/// IndexWriter
///

pub struct IndexWriter {
    entity: EntityRef,
    indexes: EntityIndexes,
    directory: Arc<BucketDirectory>,
    store: SharedStore,
    queue: Option<Arc<WorkflowQueue>>,
    record: EntityRecord,
    phase: EntityPhase,
}

impl IndexWriter {
    #[must_use]
    pub fn new(
        entity: EntityRef,
        indexes: EntityIndexes,
        directory: Arc<BucketDirectory>,
        store: SharedStore,
        queue: Option<Arc<WorkflowQueue>>,
    ) -> Self {
        Self {
            entity,
            indexes,
            directory,
            store,
            queue,
            record: EntityRecord::default(),
            phase: EntityPhase::Inactive,
        }
    }

    #[must_use]
    pub const fn entity(&self) -> &EntityRef {
        &self.entity
    }

    #[must_use]
    pub const fn phase(&self) -> EntityPhase {
        self.phase
    }

    #[must_use]
    pub const fn state(&self) -> &PropertyMap {
        &self.record.state
    }

    #[must_use]
    pub fn active_workflow_ids(&self) -> BTreeSet<WorkflowId> {
        self.record.active_workflow_ids()
    }

    fn record_key(&self) -> String {
        keys::entity(&self.entity)
    }

    fn require_phase(&self, expected: EntityPhase, action: &str) -> Result<(), InternalError> {
        if self.phase != expected {
            return Err(InternalError::writer_invariant(format!(
                "cannot {action} entity '{}' while {}",
                self.entity, self.phase
            )));
        }

        Ok(())
    }

    ///
    /// LIFECYCLE
    ///

    /// Load the persisted record, resubmit unacknowledged workflows, and
    /// index active-scope properties.
    ///
    /// Completes only after every pending workflow is back in the queue.
    pub async fn activate(&mut self) -> Result<(), InternalError> {
        self.require_phase(EntityPhase::Inactive, "activate")?;
        self.phase = EntityPhase::Activating;

        match self.activate_inner().await {
            Ok(()) => {
                self.phase = EntityPhase::Active;
                tracing::trace!(entity = %self.entity, "entity activated");
                Ok(())
            }
            Err(err) => {
                self.phase = EntityPhase::Inactive;
                tracing::warn!(entity = %self.entity, error = %err, "entity activation failed");
                Err(err)
            }
        }
    }

    async fn activate_inner(&mut self) -> Result<(), InternalError> {
        self.record = store::load(self.store.as_ref(), &self.record_key())
            .await?
            .unwrap_or_default();

        if !self.record.pending.is_empty() {
            let queue = self.lazy_queue()?;
            for entry in &self.record.pending {
                if queue.enqueue(entry.clone()).await? {
                    tracing::debug!(
                        entity = %self.entity,
                        workflow = %entry.workflow_id,
                        "pending workflow resubmitted"
                    );
                }
            }
        }

        let planned = diff(&self.indexes, &PropertyMap::new(), &self.record.state, |d| {
            d.scope == IndexScope::Active
        })?;
        let state = self.record.state.clone();

        self.commit(state, planned).await
    }

    /// Drop active-scope entries and make sure the record is durable.
    /// Does not wait for lazy delivery.
    pub async fn deactivate(&mut self) -> Result<(), InternalError> {
        self.require_phase(EntityPhase::Active, "deactivate")?;
        self.phase = EntityPhase::Deactivating;

        match self.deactivate_inner().await {
            Ok(()) => {
                self.phase = EntityPhase::Inactive;
                tracing::trace!(entity = %self.entity, "entity deactivated");
                Ok(())
            }
            Err(err) => {
                self.phase = EntityPhase::Active;
                Err(err)
            }
        }
    }

    async fn deactivate_inner(&mut self) -> Result<(), InternalError> {
        let planned = diff(&self.indexes, &self.record.state, &PropertyMap::new(), |d| {
            d.scope == IndexScope::Active
        })?;
        if planned.is_empty() {
            return self.persist(&self.record).await;
        }

        let state = self.record.state.clone();
        self.commit(state, planned).await
    }

    ///
    /// WRITES
    ///

    /// Persist a new property state and maintain every affected index.
    ///
    /// Fails with a unique violation, and changes nothing, if a unique key
    /// is already held by another entity.
    pub async fn write(&mut self, state: PropertyMap) -> Result<(), InternalError> {
        self.require_phase(EntityPhase::Active, "write")?;

        let planned = diff(&self.indexes, &self.record.state, &state, |_| true)?;
        self.commit(state, planned).await
    }

    /// Emit deletes for every indexed property and persist an empty state.
    /// The record itself is kept until `finish_remove`.
    pub async fn begin_remove(&mut self) -> Result<(), InternalError> {
        self.write(PropertyMap::new()).await
    }

    /// Clear the persisted record once no workflow is outstanding.
    pub async fn finish_remove(&mut self) -> Result<(), InternalError> {
        if !self.record.pending.is_empty() {
            return Err(InternalError::writer_invariant(format!(
                "entity '{}' still has {} unacknowledged workflows",
                self.entity,
                self.record.pending.len()
            )));
        }

        self.store.clear_state(&self.record_key()).await?;
        self.record = EntityRecord::default();
        self.phase = EntityPhase::Inactive;

        Ok(())
    }

    /// Forget an applied workflow. Unknown ids are a no-op.
    pub async fn acknowledge(&mut self, id: WorkflowId) -> Result<bool, InternalError> {
        let Some(position) = self.record.pending.iter().position(|e| e.workflow_id == id) else {
            return Ok(false);
        };
        let entry = self.record.pending.remove(position);

        if let Err(err) = self.persist(&self.record).await {
            self.record.pending.insert(position, entry);
            return Err(err);
        }

        Ok(true)
    }

    async fn persist(&self, record: &EntityRecord) -> Result<(), InternalError> {
        store::save(self.store.as_ref(), &self.record_key(), record).await
    }

    fn lazy_queue(&self) -> Result<&Arc<WorkflowQueue>, InternalError> {
        self.queue.as_ref().ok_or_else(|| {
            InternalError::writer_invariant(format!(
                "entity interface '{}' has no workflow queue",
                self.entity.interface
            ))
        })
    }

    fn index(&self, planned: &PlannedUpdate) -> HashIndex {
        HashIndex::new(Arc::clone(&planned.descriptor), Arc::clone(&self.directory))
    }

    // Apply eager updates, reserve lazy unique keys, persist, then enqueue.
    // Any failure before persistence undoes what this call applied.
    async fn commit(
        &mut self,
        state: PropertyMap,
        planned: Vec<PlannedUpdate>,
    ) -> Result<(), InternalError> {
        let (eager, lazy): (Vec<_>, Vec<_>) =
            planned.into_iter().partition(|p| p.descriptor.is_eager());
        if !lazy.is_empty() {
            self.lazy_queue()?;
        }

        let mut applied: Vec<(HashIndex, IndexUpdate)> = Vec::new();
        let mut reserved: Vec<(HashIndex, IndexUpdate)> = Vec::new();

        for planned in &eager {
            let index = self.index(planned);
            let update = planned.update.with_mode(UpdateMode::Eager);

            match index.apply_update(&self.entity, &update).await {
                Ok(true) => applied.push((index, update)),
                Ok(false) => {
                    self.rollback(&applied, &reserved).await;
                    return Err(self.violation(planned));
                }
                Err(err) => {
                    self.rollback(&applied, &reserved).await;
                    return Err(err);
                }
            }
        }

        for planned in lazy.iter().filter(|p| p.descriptor.unique) {
            let index = self.index(planned);
            let reservation = planned.update.tentative();

            match index.apply_update(&self.entity, &reservation).await {
                Ok(true) => reserved.push((index, reservation)),
                Ok(false) => {
                    self.rollback(&applied, &reserved).await;
                    return Err(self.violation(planned));
                }
                Err(err) => {
                    self.rollback(&applied, &reserved).await;
                    return Err(err);
                }
            }
        }

        let entry = (!lazy.is_empty()).then(|| {
            let updates = lazy
                .iter()
                .map(|p| {
                    NamedUpdate::new(p.descriptor.property(), p.update.with_mode(UpdateMode::Lazy))
                })
                .collect();
            WorkflowQueueEntry::new(self.entity.clone(), updates)
        });

        let mut record = EntityRecord {
            state,
            pending: self.record.pending.clone(),
        };
        if self.indexes.fault_tolerant
            && let Some(entry) = &entry
        {
            record.pending.push(entry.clone());
        }

        if let Err(err) = self.persist(&record).await {
            tracing::warn!(entity = %self.entity, error = %err, "entity write aborted");
            self.rollback(&applied, &reserved).await;
            return Err(err);
        }
        self.record = record;

        if let Some(entry) = entry {
            let id = entry.workflow_id;
            let count = u64::try_from(entry.updates.len()).unwrap_or(u64::MAX);
            let queue = self.lazy_queue()?;

            match queue.enqueue(entry).await {
                Ok(_) => sink::record(MetricsEvent::WorkflowEnqueued {
                    interface: &self.entity.interface,
                    updates: count,
                }),
                // Still queued in memory; the record resubmits it on activation.
                Err(err) => tracing::warn!(
                    entity = %self.entity,
                    workflow = %id,
                    error = %err,
                    "workflow queue write failed"
                ),
            }
        }

        Ok(())
    }

    async fn rollback(
        &self,
        applied: &[(HashIndex, IndexUpdate)],
        reserved: &[(HashIndex, IndexUpdate)],
    ) {
        let undo = applied.iter().rev().chain(reserved.iter().rev());

        for (index, update) in undo {
            if let Err(err) = index.apply_update(&self.entity, &update.reversed()).await {
                tracing::warn!(
                    entity = %self.entity,
                    index = %index.descriptor().id,
                    error = %err,
                    "index rollback failed"
                );
            }
        }
    }

    fn violation(&self, planned: &PlannedUpdate) -> InternalError {
        let key = planned.update.after_image().unwrap_or(Value::Null);
        tracing::warn!(
            entity = %self.entity,
            index = %planned.descriptor.id,
            key = %key,
            "unique constraint violation"
        );

        InternalError::unique_violation(planned.descriptor.id.to_string(), key)
    }
}
