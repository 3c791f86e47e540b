use crate::{
    config::IndexConfig,
    error::InternalError,
    index::{BucketDirectory, HashIndex},
    model::EntityRef,
    obs::sink::{self, MetricsEvent},
    registry::IndexRegistry,
    update::IndexUpdate,
    workflow::{WorkflowAck, WorkflowQueue, WorkflowQueueEntry},
};
use futures::future::join_all;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};

///
/// WorkflowProcessor
///
/// Delivers one interface's queued workflows: apply, then acknowledge, then
/// dequeue. A failed apply leaves the batch queued under the same ids.
///

pub struct WorkflowProcessor {
    interface: String,
    fault_tolerant: bool,
    registry: Arc<IndexRegistry>,
    directory: Arc<BucketDirectory>,
    queue: Arc<WorkflowQueue>,
    ack: Arc<dyn WorkflowAck>,
    batch_size: usize,
    delay: Duration,
    retry_backoff: Duration,
}

impl WorkflowProcessor {
    pub fn new(
        registry: Arc<IndexRegistry>,
        directory: Arc<BucketDirectory>,
        queue: Arc<WorkflowQueue>,
        ack: Arc<dyn WorkflowAck>,
        config: &IndexConfig,
    ) -> Result<Arc<Self>, InternalError> {
        let interface = queue.interface().to_string();
        let fault_tolerant = registry.entity(&interface)?.fault_tolerant;

        Ok(Arc::new(Self {
            interface,
            fault_tolerant,
            registry,
            directory,
            queue,
            ack,
            batch_size: config.workflow_batch_size.max(1),
            delay: config.lazy_update_delay(),
            retry_backoff: config.retry_backoff(),
        }))
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<WorkflowQueue> {
        &self.queue
    }

    /// Deliver up to one batch from the front of the queue.
    ///
    /// Returns how many entries were delivered and dequeued.
    pub async fn run_once(&self) -> Result<usize, InternalError> {
        let _delivery = self.queue.delivery().await;
        let entries = self.queue.peek(self.batch_size);

        self.deliver(entries).await
    }

    /// Deliver until the queue is empty or a delivery fails.
    pub async fn drain(&self) -> Result<(), InternalError> {
        while !self.queue.is_empty() {
            if self.run_once().await? == 0 {
                // Entries remain but none could be acknowledged yet.
                break;
            }
        }

        Ok(())
    }

    /// Deliver every queued workflow targeting one entity, in order.
    pub async fn flush_target(&self, target: &EntityRef) -> Result<usize, InternalError> {
        let _delivery = self.queue.delivery().await;
        let entries = self.queue.pending_for(target);

        self.deliver(entries).await
    }

    async fn deliver(&self, entries: Vec<WorkflowQueueEntry>) -> Result<usize, InternalError> {
        if entries.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.apply(&entries).await {
            for entry in &entries {
                sink::record(MetricsEvent::WorkflowRetried {
                    interface: &self.interface,
                });
                tracing::warn!(
                    interface = %self.interface,
                    workflow = %entry.workflow_id,
                    error = %err,
                    "workflow delivery failed; will retry"
                );
            }
            return Err(err);
        }

        let mut delivered = BTreeSet::new();
        for entry in &entries {
            sink::record(MetricsEvent::WorkflowApplied {
                interface: &self.interface,
            });

            if !self.fault_tolerant {
                delivered.insert(entry.workflow_id);
                continue;
            }

            match self.ack.acknowledge(&entry.target, entry.workflow_id).await {
                Ok(()) => {
                    sink::record(MetricsEvent::WorkflowAcknowledged {
                        interface: &self.interface,
                    });
                    tracing::trace!(workflow = %entry.workflow_id, target = %entry.target, "workflow acknowledged");
                    delivered.insert(entry.workflow_id);
                }
                Err(err) => {
                    tracing::warn!(
                        workflow = %entry.workflow_id,
                        target = %entry.target,
                        error = %err,
                        "workflow acknowledgement failed; will retry"
                    );
                }
            }
        }

        self.queue.remove(&delivered).await?;

        Ok(delivered.len())
    }

    // Group by property, then by entity, preserving queue order within each
    // entity. Properties are applied concurrently.
    async fn apply(&self, entries: &[WorkflowQueueEntry]) -> Result<(), InternalError> {
        let mut by_property: BTreeMap<&str, BTreeMap<EntityRef, Vec<IndexUpdate>>> =
            BTreeMap::new();
        for entry in entries {
            for named in &entry.updates {
                by_property
                    .entry(named.property.as_str())
                    .or_default()
                    .entry(entry.target.clone())
                    .or_default()
                    .push(named.update.clone());
            }
        }

        let applies = by_property.into_iter().map(|(property, batch)| async move {
            let descriptor = self.registry.descriptor(&self.interface, property)?.clone();
            let index = HashIndex::new(descriptor, self.directory.clone());
            let applied = index.apply_update_batch(&batch).await?;

            Ok::<_, InternalError>((property, applied))
        });

        for result in join_all(applies).await {
            let (property, applied) = result?;
            if !applied {
                // Rejections are permanent; the entry is still acknowledged.
                tracing::warn!(
                    interface = %self.interface,
                    property,
                    "lazy update rejected by unique constraint"
                );
            }
        }

        Ok(())
    }

    /// Start the delivery loop on the current runtime.
    ///
    /// The queue is polled every lazy-update delay; full batches are drained
    /// back to back, and a failed delivery waits the retry backoff.
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> ProcessorHandle {
        let (shutdown, mut stop) = oneshot::channel();
        let processor = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval(processor.delay);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {}
                }

                loop {
                    match processor.run_once().await {
                        Ok(n) if n == processor.batch_size => {}
                        Ok(_) => break,
                        Err(_) => {
                            tokio::select! {
                                _ = &mut stop => return,
                                () = sleep(processor.retry_backoff) => {}
                            }
                            break;
                        }
                    }
                }
            }

            tracing::debug!(interface = %processor.interface, "workflow processor stopped");
        });

        ProcessorHandle {
            shutdown: Some(shutdown),
            task,
        }
    }
}

///
/// ProcessorHandle
///

#[derive(Debug)]
pub struct ProcessorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop the loop after its current delivery and wait for it.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
