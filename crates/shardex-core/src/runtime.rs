//! Wiring of registry, partitions, queues, processors and entities.

use crate::{
    config::IndexConfig,
    error::InternalError,
    index::{BucketDirectory, HashIndex},
    model::EntityRef,
    query::{Query, QueryExecutor, ResultObserver},
    registry::IndexRegistry,
    store::SharedStore,
    workflow::{ProcessorHandle, WorkflowAck, WorkflowProcessor, WorkflowQueue},
    writer::{EntityTable, IndexedEntity},
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// IndexRuntime
///
/// One process's view of the index system. Dropping it stops every
/// processor loop and bucket partition; a new runtime over the same store
/// resumes from persisted state.
///

pub struct IndexRuntime {
    registry: Arc<IndexRegistry>,
    config: IndexConfig,
    directory: Arc<BucketDirectory>,
    entities: Arc<EntityTable>,
    processors: BTreeMap<String, Arc<WorkflowProcessor>>,
    loops: Mutex<Vec<ProcessorHandle>>,
}

impl IndexRuntime {
    /// Open every workflow queue and start one processor per interface
    /// that has lazy indexes.
    pub async fn start(
        registry: Arc<IndexRegistry>,
        store: SharedStore,
        config: IndexConfig,
    ) -> Result<Arc<Self>, InternalError> {
        let runtime = Self::open(registry, store, config).await?;

        let loops = runtime.processors.values().map(WorkflowProcessor::spawn).collect();
        *runtime.loops.lock() = loops;

        Ok(runtime)
    }

    /// Like `start`, but without background delivery; queued workflows are
    /// only delivered by `flush`.
    pub async fn open(
        registry: Arc<IndexRegistry>,
        store: SharedStore,
        config: IndexConfig,
    ) -> Result<Arc<Self>, InternalError> {
        config.validate()?;
        let directory = BucketDirectory::new(Arc::clone(&store), &config);

        let mut queues = BTreeMap::new();
        for entity in registry.iter().filter(|e| e.has_lazy()) {
            let queue = WorkflowQueue::open(entity.interface.clone(), Arc::clone(&store)).await?;
            queues.insert(entity.interface.clone(), queue);
        }

        let entities = EntityTable::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            store,
            queues.clone(),
        );
        let ack: Arc<dyn WorkflowAck> = entities.clone();

        let mut processors = BTreeMap::new();
        for (interface, queue) in queues {
            let processor = WorkflowProcessor::new(
                Arc::clone(&registry),
                Arc::clone(&directory),
                queue,
                Arc::clone(&ack),
                &config,
            )?;
            processors.insert(interface, processor);
        }

        tracing::debug!(
            entities = registry.len(),
            processors = processors.len(),
            "index runtime opened"
        );

        Ok(Arc::new(Self {
            registry,
            config,
            directory,
            entities,
            processors,
            loops: Mutex::new(Vec::new()),
        }))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<BucketDirectory> {
        &self.directory
    }

    /// Handle to one entity; it is activated on first use.
    pub fn entity(
        &self,
        interface: &str,
        key: impl Into<String>,
    ) -> Result<IndexedEntity, InternalError> {
        let entity = EntityRef::new(interface, key);
        let processor = self.processors.get(interface).cloned();

        IndexedEntity::new(&self.entities, entity, processor)
    }

    pub fn index(&self, interface: &str, property: &str) -> Result<HashIndex, InternalError> {
        let descriptor = self.registry.descriptor(interface, property)?;

        Ok(HashIndex::new(
            Arc::clone(descriptor),
            Arc::clone(&self.directory),
        ))
    }

    #[must_use]
    pub fn queue(&self, interface: &str) -> Option<&Arc<WorkflowQueue>> {
        self.processors.get(interface).map(|p| p.queue())
    }

    #[must_use]
    pub fn processor(&self, interface: &str) -> Option<&Arc<WorkflowProcessor>> {
        self.processors.get(interface)
    }

    /// Deliver every queued workflow now.
    pub async fn flush(&self) -> Result<(), InternalError> {
        let drains = self.processors.values().map(|p| p.drain());
        join_all(drains).await.into_iter().collect()
    }

    #[must_use]
    pub fn query_executor(&self) -> QueryExecutor {
        QueryExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.directory),
            self.config.query_batch_size,
        )
    }

    /// Run a query, pushing results to `observer`.
    pub async fn query(
        &self,
        query: &Query,
        observer: &dyn ResultObserver,
    ) -> Result<usize, InternalError> {
        self.query_executor().execute(query, observer).await
    }

    /// Run a query and collect the matching entities.
    pub async fn query_all(&self, query: &Query) -> Result<BTreeSet<EntityRef>, InternalError> {
        self.query_executor().run(query).await
    }

    /// Stop background delivery and wait for the loops to exit.
    pub async fn shutdown(&self) {
        let loops: Vec<_> = self.loops.lock().drain(..).collect();
        for handle in loops {
            handle.stop().await;
        }
    }
}

impl Drop for IndexRuntime {
    fn drop(&mut self) {
        self.loops.get_mut().clear();
        self.directory.evict_all();
    }
}
