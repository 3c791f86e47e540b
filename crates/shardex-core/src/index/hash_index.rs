use crate::{
    error::InternalError,
    index::{
        BucketDirectory, BucketId,
        actor::BucketSettings,
        bucket::{BucketState, KeyOp, Lookup, Step},
    },
    model::EntityRef,
    obs::sink::{self, MetricsEvent},
    registry::IndexDescriptor,
    update::{IndexUpdate, UpdateOp},
    value::Value,
};
use futures::future::join_all;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// HashIndex
///
/// Client view of one partitioned hash index. Holds no bucket state itself:
/// every call resolves the owning partitions through the directory and
/// walks bucket chains by derived identifier.
///

#[derive(Clone)]
pub struct HashIndex {
    descriptor: Arc<IndexDescriptor>,
    directory: Arc<BucketDirectory>,
}

impl HashIndex {
    #[must_use]
    pub const fn new(descriptor: Arc<IndexDescriptor>, directory: Arc<BucketDirectory>) -> Self {
        Self {
            descriptor,
            directory,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    fn settings(&self) -> BucketSettings {
        BucketSettings {
            unique: self.descriptor.unique,
            capacity: self.descriptor.max_entries_per_bucket,
        }
    }

    fn root(&self, partition: u32) -> BucketId {
        BucketId::root(self.descriptor.id.clone(), partition)
    }

    fn root_for(&self, key: &Value) -> BucketId {
        self.root(self.descriptor.partition_of(key))
    }

    ///
    /// READS
    ///

    /// Entities currently indexed under `key`.
    ///
    /// Null and the declared sentinel are never indexed and return an empty
    /// set. Fails if a bucket on the searched chain is disposed.
    pub async fn lookup(&self, key: &Value) -> Result<BTreeSet<EntityRef>, InternalError> {
        let Some(key) = self.descriptor.index_key(key)? else {
            return Ok(BTreeSet::new());
        };

        let mut id = self.root_for(&key);
        let found = loop {
            let handle = self.directory.resolve(&id, self.settings());
            match handle.lookup(key.clone()).await? {
                Lookup::Found(values) => break values,
                Lookup::Forward(next) => id = next,
                Lookup::Missing => break BTreeSet::new(),
            }
        };

        sink::record(MetricsEvent::LookupExecuted {
            index: &self.descriptor.id.to_string(),
            hits: u64::try_from(found.len()).unwrap_or(u64::MAX),
        });

        Ok(found)
    }

    /// The single entity indexed under `key`.
    pub async fn lookup_unique(&self, key: &Value) -> Result<EntityRef, InternalError> {
        let found = self.lookup(key).await?;
        let index = self.descriptor.id.to_string();

        let mut iter = found.into_iter();
        match (iter.next(), iter.len()) {
            (None, _) => Err(InternalError::index_not_found(index, key)),
            (Some(entity), 0) => Ok(entity),
            (Some(_), rest) => Err(InternalError::index_not_unique(&index, key, rest + 1)),
        }
    }

    ///
    /// WRITES
    ///

    /// Apply one update on behalf of `entity`.
    ///
    /// Returns `false` when a unique key is held by another entity; nothing
    /// from that update is applied past the rejected key.
    pub async fn apply_update(
        &self,
        entity: &EntityRef,
        update: &IndexUpdate,
    ) -> Result<bool, InternalError> {
        for part in self.split(update) {
            for op in KeyOp::from_view(entity, &part.view()) {
                if !self.apply_op(op).await? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Apply many entities' updates.
    ///
    /// Entities proceed concurrently; each entity's updates apply in order,
    /// and each partition serializes whatever reaches it. Returns `true` only
    /// if every update applied.
    pub async fn apply_update_batch(
        &self,
        batch: &BTreeMap<EntityRef, Vec<IndexUpdate>>,
    ) -> Result<bool, InternalError> {
        let lanes = batch.iter().map(|(entity, updates)| async move {
            let mut applied = true;
            for update in updates {
                applied &= self.apply_update(entity, update).await?;
            }
            Ok::<_, InternalError>(applied)
        });

        let mut all_applied = true;
        let mut first_err = None;
        for result in join_all(lanes).await {
            match result {
                Ok(applied) => all_applied &= applied,
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(all_applied),
        }
    }

    // An update whose images route to different partitions becomes an
    // insert on the new partition followed by a delete on the old one.
    fn split(&self, update: &IndexUpdate) -> Vec<IndexUpdate> {
        let view = update.view();
        if let (UpdateOp::Update, Some(before), Some(after)) = (view.op, &view.before, &view.after)
            && self.descriptor.partition_of(before) != self.descriptor.partition_of(after)
        {
            return vec![
                update.with_override(UpdateOp::Insert),
                update.with_override(UpdateOp::Delete),
            ];
        }

        vec![update.clone()]
    }

    async fn apply_op(&self, op: KeyOp) -> Result<bool, InternalError> {
        let mut id = self.root_for(op.key());

        loop {
            let handle = self.directory.resolve(&id, self.settings());
            match handle.apply(op.clone()).await? {
                Step::Applied { .. } => return Ok(true),
                Step::Rejected => return Ok(false),
                Step::Forward { next, .. } => id = next,
            }
        }
    }

    ///
    /// LIFECYCLE
    ///

    /// Dispose one bucket. Disposal is persisted and terminal.
    pub async fn dispose_bucket(&self, id: &BucketId) -> Result<(), InternalError> {
        self.directory.resolve(id, self.settings()).dispose().await
    }

    /// Dispose every bucket of every partition chain.
    pub async fn dispose(&self) -> Result<(), InternalError> {
        for partition in 0..self.descriptor.partitions {
            for id in self.chain(partition).await? {
                self.dispose_bucket(&id).await?;
            }
        }

        Ok(())
    }

    ///
    /// DIAGNOSTICS
    ///

    /// Number of buckets chained under a root partition (at least 1).
    pub async fn chain_len(&self, partition: u32) -> Result<usize, InternalError> {
        Ok(self.chain(partition).await?.len())
    }

    /// Current state of one bucket, as persisted or in memory.
    pub async fn bucket_snapshot(&self, id: &BucketId) -> Result<BucketState, InternalError> {
        self.directory.resolve(id, self.settings()).snapshot().await
    }

    async fn chain(&self, partition: u32) -> Result<Vec<BucketId>, InternalError> {
        let mut ids = Vec::new();
        let mut next = Some(self.root(partition));

        while let Some(id) = next {
            next = self.bucket_snapshot(&id).await?.next;
            ids.push(id);
        }

        Ok(ids)
    }
}
