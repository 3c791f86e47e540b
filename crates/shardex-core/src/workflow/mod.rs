//! Durable lazy-update delivery.
//!
//! A write that touches lazy indexes produces one `WorkflowQueueEntry`. The
//! entry is appended to the per-interface `WorkflowQueue` and, for
//! fault-tolerant entities, also recorded in the entity's own record until
//! acknowledged. The `WorkflowProcessor` applies queued entries, then
//! acknowledges them to the entity, then dequeues them. Each step is
//! idempotent, so a crash between any two of them only causes a replay.

mod processor;
mod queue;


pub use processor::{ProcessorHandle, WorkflowProcessor};
pub use queue::WorkflowQueue;

use crate::{error::InternalError, model::EntityRef, update::NamedUpdate};
use async_trait::async_trait;
use derive_more::{Deref, Display};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};

static ID_GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

///
/// WorkflowId
///
/// Identifier assigned once when a workflow is created and reused for
/// every delivery attempt. Ids generated by one process increase strictly,
/// even within the same millisecond.
///

#[derive(
    Clone, Copy, Debug, Deref, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct WorkflowId(Ulid);

impl WorkflowId {
    #[must_use]
    pub fn generate() -> Self {
        // Only a random-part overflow within one millisecond loses ordering.
        let ulid = ID_GENERATOR.lock().generate().unwrap_or_else(|_| Ulid::new());

        Self(ulid)
    }

    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

///
/// WorkflowQueueEntry
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct WorkflowQueueEntry {
    pub workflow_id: WorkflowId,
    pub target: EntityRef,
    pub updates: Vec<NamedUpdate>,
}

impl WorkflowQueueEntry {
    #[must_use]
    pub fn new(target: EntityRef, updates: Vec<NamedUpdate>) -> Self {
        Self {
            workflow_id: WorkflowId::generate(),
            target,
            updates,
        }
    }
}

///
/// WorkflowAck
///
/// Callback into the owning entity once a workflow is durably applied.
/// Implementations must reactivate the entity if it is not active.
///

#[async_trait]
pub trait WorkflowAck: Send + Sync {
    async fn acknowledge(&self, target: &EntityRef, id: WorkflowId) -> Result<(), InternalError>;
}
