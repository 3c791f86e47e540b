//! Bucket partition actor.
//!
//! Each bucket is owned by one tokio task that drains a bounded mailbox one
//! command at a time, so `BucketState` is never shared. Mutations are
//! written through to the state store before the reply is sent.

use crate::{
    error::InternalError,
    index::{
        BucketId,
        bucket::{BucketState, Effect, KeyOp, Lookup, Step},
    },
    obs::sink::{self, MetricsEvent},
    store::{self, SharedStore, keys},
    value::Value,
};
use tokio::sync::{mpsc, oneshot};

///
/// BucketSettings
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct BucketSettings {
    pub unique: bool,
    pub capacity: usize,
}

///
/// BucketCommand
///

pub(crate) enum BucketCommand {
    Apply {
        op: KeyOp,
        reply: oneshot::Sender<Result<Step, InternalError>>,
    },
    Lookup {
        key: Value,
        reply: oneshot::Sender<Result<Lookup, InternalError>>,
    },
    Dispose {
        reply: oneshot::Sender<Result<(), InternalError>>,
    },
    Snapshot {
        reply: oneshot::Sender<BucketState>,
    },
}

///
/// BucketHandle
///
/// Cloneable mailbox address of a live partition.
///

#[derive(Clone, Debug)]
pub(crate) struct BucketHandle {
    id: BucketId,
    tx: mpsc::Sender<BucketCommand>,
}

impl BucketHandle {
    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BucketCommand,
    ) -> Result<T, InternalError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| self.gone())?;

        rx.await.map_err(|_| self.gone())
    }

    fn gone(&self) -> InternalError {
        InternalError::bucket_unavailable(format!("bucket '{}' is not reachable", self.id))
    }

    pub(crate) async fn apply(&self, op: KeyOp) -> Result<Step, InternalError> {
        self.call(|reply| BucketCommand::Apply { op, reply }).await?
    }

    pub(crate) async fn lookup(&self, key: Value) -> Result<Lookup, InternalError> {
        self.call(|reply| BucketCommand::Lookup { key, reply }).await?
    }

    pub(crate) async fn dispose(&self) -> Result<(), InternalError> {
        self.call(|reply| BucketCommand::Dispose { reply }).await?
    }

    pub(crate) async fn snapshot(&self) -> Result<BucketState, InternalError> {
        self.call(|reply| BucketCommand::Snapshot { reply }).await
    }
}

///
/// BucketActor
///

struct BucketActor {
    id: BucketId,
    index: String,
    settings: BucketSettings,
    store: SharedStore,
    state: BucketState,
    persisted: bool,
}

/// Spawn the partition task for `id` and return its handle.
pub(crate) fn spawn(
    id: BucketId,
    settings: BucketSettings,
    store: SharedStore,
    mailbox_capacity: usize,
) -> (BucketHandle, tokio::task::AbortHandle) {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let handle = BucketHandle { id: id.clone(), tx };

    let task = tokio::spawn(run(id, settings, store, rx));

    (handle, task.abort_handle())
}

async fn run(
    id: BucketId,
    settings: BucketSettings,
    store: SharedStore,
    mut rx: mpsc::Receiver<BucketCommand>,
) {
    let key = keys::bucket(&id);
    let loaded = store::load::<BucketState>(store.as_ref(), &key).await;

    let (state, persisted) = match loaded {
        Ok(Some(state)) => (state, true),
        Ok(None) => (BucketState::default(), false),
        Err(err) => {
            tracing::warn!(bucket = %id, error = %err, "bucket state failed to load");
            // Fail the first caller with the load error; the closed mailbox
            // makes the directory respawn on the next resolve.
            if let Some(cmd) = rx.recv().await {
                fail(cmd, err);
            }
            return;
        }
    };

    tracing::trace!(bucket = %id, keys = state.len(), "bucket partition started");

    let mut actor = BucketActor {
        index: id.index.to_string(),
        id,
        settings,
        store,
        state,
        persisted,
    };

    while let Some(cmd) = rx.recv().await {
        actor.handle(cmd).await;
    }

    tracing::trace!(bucket = %actor.id, "bucket partition stopped");
}

fn fail(cmd: BucketCommand, err: InternalError) {
    match cmd {
        BucketCommand::Apply { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        BucketCommand::Lookup { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        BucketCommand::Dispose { reply } => {
            let _ = reply.send(Err(err));
        }
        BucketCommand::Snapshot { .. } => {}
    }
}

impl BucketActor {
    async fn handle(&mut self, cmd: BucketCommand) {
        match cmd {
            BucketCommand::Apply { op, reply } => {
                let result = self.apply(op).await;
                let _ = reply.send(result);
            }
            BucketCommand::Lookup { key, reply } => {
                let result = self.ensure_available().map(|()| self.state.lookup(&key));
                let _ = reply.send(result);
            }
            BucketCommand::Dispose { reply } => {
                let _ = reply.send(self.dispose().await);
            }
            BucketCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    fn ensure_available(&self) -> Result<(), InternalError> {
        if self.state.is_disposed() {
            return Err(InternalError::bucket_unavailable(format!(
                "bucket '{}' is disposed",
                self.id
            )));
        }

        Ok(())
    }

    async fn apply(&mut self, op: KeyOp) -> Result<Step, InternalError> {
        self.ensure_available()?;

        let checkpoint = self.state.checkpoint(op.key());
        let step = self.state.apply(&self.id, &op, self.settings.unique, self.settings.capacity);

        let changed = matches!(
            step,
            Step::Applied { changed: true, .. } | Step::Forward { allocated: true, .. }
        );
        if changed && let Err(err) = self.persist().await {
            self.state.restore(checkpoint);
            tracing::warn!(bucket = %self.id, op = %op, error = %err, "bucket write failed");
            return Err(err);
        }

        tracing::trace!(bucket = %self.id, op = %op, step = ?step, "bucket op");
        self.record(&step);

        Ok(step)
    }

    async fn dispose(&mut self) -> Result<(), InternalError> {
        if self.state.is_disposed() {
            return Ok(());
        }

        let previous = self.state.clone();
        self.state.dispose();

        if let Err(err) = self.persist().await {
            self.state = previous;
            return Err(err);
        }

        tracing::debug!(bucket = %self.id, "bucket disposed");
        sink::record(MetricsEvent::BucketDisposed { index: &self.index });

        Ok(())
    }

    async fn persist(&mut self) -> Result<(), InternalError> {
        store::save(self.store.as_ref(), &keys::bucket(&self.id), &self.state).await?;

        if !self.persisted {
            self.persisted = true;
            sink::record(MetricsEvent::BucketAllocated {
                index: &self.index,
                position: self.id.position,
            });
        }

        Ok(())
    }

    fn record(&self, step: &Step) {
        let index = self.index.as_str();

        match step {
            Step::Applied { effect, .. } => match effect {
                Effect::Inserted => sink::record(MetricsEvent::UpdateApplied {
                    index,
                    inserts: 1,
                    removes: 0,
                }),
                Effect::Removed => sink::record(MetricsEvent::UpdateApplied {
                    index,
                    inserts: 0,
                    removes: 1,
                }),
                Effect::Reserved => sink::record(MetricsEvent::TentativeReserved { index }),
                Effect::Released => sink::record(MetricsEvent::TentativeReleased { index }),
                Effect::Committed => sink::record(MetricsEvent::UpdateApplied {
                    index,
                    inserts: 1,
                    removes: 0,
                }),
                Effect::None => {}
            },
            Step::Rejected => sink::record(MetricsEvent::UniqueViolation { index }),
            Step::Forward {
                next,
                allocated: true,
            } => {
                tracing::debug!(bucket = %self.id, next = %next, "bucket chained");
            }
            Step::Forward { .. } => {}
        }
    }
}
