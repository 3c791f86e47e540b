use crate::{
    error::InternalError,
    index::BucketDirectory,
    model::EntityRef,
    registry::IndexRegistry,
    store::SharedStore,
    value::Value,
    workflow::{WorkflowAck, WorkflowId, WorkflowProcessor, WorkflowQueue},
    writer::{EntityPhase, IndexWriter, PropertyMap},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tokio::sync::Mutex as AsyncMutex;

type Slot = Arc<AsyncMutex<IndexWriter>>;

///
/// EntityTable
///
/// Stand-in for the host runtime's activation directory: one writer slot
/// per entity, each guarded so only one call runs against an entity at a
/// time.
///

pub struct EntityTable {
    registry: Arc<IndexRegistry>,
    directory: Arc<BucketDirectory>,
    store: SharedStore,
    queues: BTreeMap<String, Arc<WorkflowQueue>>,
    slots: Mutex<HashMap<EntityRef, Slot>>,
}

impl EntityTable {
    #[must_use]
    pub fn new(
        registry: Arc<IndexRegistry>,
        directory: Arc<BucketDirectory>,
        store: SharedStore,
        queues: BTreeMap<String, Arc<WorkflowQueue>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            directory,
            store,
            queues,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn slot(&self, entity: &EntityRef) -> Result<Slot, InternalError> {
        let indexes = self.registry.entity(&entity.interface)?;

        let mut slots = self.slots.lock();
        let slot = slots.entry(entity.clone()).or_insert_with(|| {
            Arc::new(AsyncMutex::new(IndexWriter::new(
                entity.clone(),
                indexes.clone(),
                Arc::clone(&self.directory),
                Arc::clone(&self.store),
                self.queues.get(&entity.interface).cloned(),
            )))
        });

        Ok(Arc::clone(slot))
    }

    /// Number of entity slots currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[async_trait]
impl WorkflowAck for EntityTable {
    async fn acknowledge(&self, target: &EntityRef, id: WorkflowId) -> Result<(), InternalError> {
        let slot = self.slot(target)?;
        let mut writer = slot.lock().await;

        if writer.phase() == EntityPhase::Inactive {
            writer.activate().await?;
        }
        writer.acknowledge(id).await?;

        Ok(())
    }
}

///
/// IndexedEntity
///
/// Caller-side handle to one entity. Calls on an inactive entity activate
/// it first, the way the host runtime would.
///

#[derive(Clone)]
pub struct IndexedEntity {
    entity: EntityRef,
    slot: Slot,
    processor: Option<Arc<WorkflowProcessor>>,
}

impl IndexedEntity {
    pub(crate) fn new(
        table: &EntityTable,
        entity: EntityRef,
        processor: Option<Arc<WorkflowProcessor>>,
    ) -> Result<Self, InternalError> {
        Ok(Self {
            slot: table.slot(&entity)?,
            entity,
            processor,
        })
    }

    #[must_use]
    pub const fn entity_ref(&self) -> &EntityRef {
        &self.entity
    }

    pub async fn activate(&self) -> Result<(), InternalError> {
        let mut writer = self.slot.lock().await;
        if writer.phase() == EntityPhase::Active {
            return Ok(());
        }

        writer.activate().await
    }

    pub async fn deactivate(&self) -> Result<(), InternalError> {
        let mut writer = self.slot.lock().await;
        if writer.phase() == EntityPhase::Inactive {
            return Ok(());
        }

        writer.deactivate().await
    }

    /// Replace the entity's property state.
    pub async fn write(&self, state: PropertyMap) -> Result<(), InternalError> {
        let mut writer = self.slot.lock().await;
        if writer.phase() == EntityPhase::Inactive {
            writer.activate().await?;
        }

        writer.write(state).await
    }

    /// Change one property, keeping the rest of the state.
    pub async fn set(&self, property: &str, value: impl Into<Value>) -> Result<(), InternalError> {
        let mut writer = self.slot.lock().await;
        if writer.phase() == EntityPhase::Inactive {
            writer.activate().await?;
        }

        let mut state = writer.state().clone();
        state.insert(property.to_string(), value.into());

        writer.write(state).await
    }

    pub async fn state(&self) -> PropertyMap {
        self.slot.lock().await.state().clone()
    }

    pub async fn phase(&self) -> EntityPhase {
        self.slot.lock().await.phase()
    }

    pub async fn active_workflow_ids(&self) -> BTreeSet<WorkflowId> {
        self.slot.lock().await.active_workflow_ids()
    }

    /// Delete the entity: unindex every property, deliver its pending
    /// workflows, then clear its record.
    pub async fn remove(&self) -> Result<(), InternalError> {
        {
            let mut writer = self.slot.lock().await;
            if writer.phase() == EntityPhase::Inactive {
                writer.activate().await?;
            }
            writer.begin_remove().await?;
        }

        // Delivery acknowledges through the slot, so it must not be held here.
        if let Some(processor) = &self.processor {
            processor.flush_target(&self.entity).await?;
        }

        let mut writer = self.slot.lock().await;
        writer.finish_remove().await?;
        tracing::debug!(entity = %self.entity, "entity removed");

        Ok(())
    }
}
