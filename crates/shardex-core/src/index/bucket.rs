//! Pure bucket state and the per-key apply rules.
//!
//! Nothing here awaits or persists; the partition actor wraps these rules
//! with write-through persistence and chain forwarding.

use crate::{
    index::{BucketEntry, BucketId},
    model::EntityRef,
    update::UpdateView,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
};

///
/// KeyOp
///
/// One single-key mutation derived from an update view.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyOp {
    /// Add the entity under the key; commits a reservation held by the same entity.
    Add { key: Value, entity: EntityRef },
    /// Remove the entity from the key's value set.
    Remove { key: Value, entity: EntityRef },
    /// Reserve a unique key without making it visible.
    Reserve { key: Value, entity: EntityRef },
    /// Release a reservation still held by the entity.
    Release { key: Value, entity: EntityRef },
}

impl KeyOp {
    /// Decompose an update view into ordered key operations.
    ///
    /// Adds run before removes so a rejected unique add leaves the old
    /// value in place.
    #[must_use]
    pub fn from_view(entity: &EntityRef, view: &UpdateView) -> Vec<Self> {
        use crate::update::UpdateOp::{Delete, Insert, Update};

        let add = |key: &Option<Value>| {
            key.clone().map(|key| Self::Add {
                key,
                entity: entity.clone(),
            })
        };
        let remove = |key: &Option<Value>| {
            key.clone().map(|key| Self::Remove {
                key,
                entity: entity.clone(),
            })
        };

        let ops = match (view.tentative, view.reversed, view.op) {
            (false, _, Insert) => vec![add(&view.after)],
            (false, _, Delete) => vec![remove(&view.before)],
            (false, _, Update) => vec![add(&view.after), remove(&view.before)],
            (true, false, Insert | Update) => vec![view.after.clone().map(|key| Self::Reserve {
                key,
                entity: entity.clone(),
            })],
            (true, true, Delete | Update) => vec![view.before.clone().map(|key| Self::Release {
                key,
                entity: entity.clone(),
            })],
            _ => Vec::new(),
        };

        ops.into_iter().flatten().collect()
    }

    #[must_use]
    pub const fn key(&self) -> &Value {
        match self {
            Self::Add { key, .. }
            | Self::Remove { key, .. }
            | Self::Reserve { key, .. }
            | Self::Release { key, .. } => key,
        }
    }

    #[must_use]
    pub const fn entity(&self) -> &EntityRef {
        match self {
            Self::Add { entity, .. }
            | Self::Remove { entity, .. }
            | Self::Reserve { entity, .. }
            | Self::Release { entity, .. } => entity,
        }
    }

    /// Whether this operation may claim a new key slot.
    #[must_use]
    pub const fn claims_slot(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Reserve { .. })
    }
}

impl Display for KeyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Reserve { .. } => "reserve",
            Self::Release { .. } => "release",
        };
        write!(f, "{label} {} -> {}", self.key(), self.entity())
    }
}

///
/// BucketStatus
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum BucketStatus {
    #[default]
    Available,
    Disposed,
}

///
/// Step
///
/// Result of applying one key operation to one bucket.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// Applied (or an idempotent no-op); `changed` says whether state moved.
    Applied { changed: bool, effect: Effect },
    /// Unique constraint held by another entity; nothing changed.
    Rejected,
    /// Key is not here and this bucket is full; continue at `next`.
    /// `allocated` is set when this call created the link.
    Forward { next: BucketId, allocated: bool },
}

///
/// Effect
///
/// What an applied operation did, for metrics.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Effect {
    #[default]
    None,
    Inserted,
    Removed,
    Reserved,
    Released,
    Committed,
}

///
/// Lookup
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Lookup {
    Found(BTreeSet<EntityRef>),
    Forward(BucketId),
    Missing,
}

///
/// BucketState
///
/// Keys are never removed from `entries`: an emptied key keeps its slot.
/// Together with "allocate only when full" this means a bucket that is not
/// full has no successor, and each key lives in exactly one chain position.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BucketState {
    pub entries: BTreeMap<Value, BucketEntry>,
    pub status: BucketStatus,
    pub next: Option<BucketId>,
}

///
/// Checkpoint
///
/// Pre-image of the slot an operation may touch, used to undo it.
///

#[derive(Debug)]
pub struct Checkpoint {
    key: Value,
    entry: Option<BucketEntry>,
    next: Option<BucketId>,
}

impl BucketState {
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        matches!(self.status, BucketStatus::Disposed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn checkpoint(&self, key: &Value) -> Checkpoint {
        Checkpoint {
            key: key.clone(),
            entry: self.entries.get(key).cloned(),
            next: self.next.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        match checkpoint.entry {
            Some(entry) => {
                self.entries.insert(checkpoint.key, entry);
            }
            None => {
                self.entries.remove(&checkpoint.key);
            }
        }
        self.next = checkpoint.next;
    }

    /// Resolve a key against this bucket.
    #[must_use]
    pub fn lookup(&self, key: &Value) -> Lookup {
        match self.entries.get(key) {
            Some(entry) => Lookup::Found(entry.visible().cloned().unwrap_or_default()),
            None => self.next.clone().map_or(Lookup::Missing, Lookup::Forward),
        }
    }

    /// Apply one key operation.
    ///
    /// `id` is this bucket's own identifier, needed to derive the successor
    /// when the bucket is full. Callers must reject disposed buckets first.
    pub fn apply(&mut self, id: &BucketId, op: &KeyOp, unique: bool, capacity: usize) -> Step {
        let key = op.key();

        if !self.entries.contains_key(key) {
            if self.entries.len() >= capacity {
                if let Some(next) = &self.next {
                    return Step::Forward {
                        next: next.clone(),
                        allocated: false,
                    };
                }
                if !op.claims_slot() {
                    return Step::Applied {
                        changed: false,
                        effect: Effect::None,
                    };
                }

                let next = id.next();
                self.next = Some(next.clone());

                return Step::Forward {
                    next,
                    allocated: true,
                };
            }

            if !op.claims_slot() {
                return Step::Applied {
                    changed: false,
                    effect: Effect::None,
                };
            }
        }

        let entry = self.entries.entry(key.clone()).or_default();
        let entity = op.entity();

        if unique {
            Self::apply_unique(entry, op, entity)
        } else {
            Self::apply_plain(entry, op, entity)
        }
    }

    fn apply_plain(entry: &mut BucketEntry, op: &KeyOp, entity: &EntityRef) -> Step {
        let (changed, effect) = match op {
            KeyOp::Add { .. } => (entry.values.insert(entity.clone()), Effect::Inserted),
            KeyOp::Remove { .. } => (entry.values.remove(entity), Effect::Removed),
            // Reservations only mean something for unique indexes.
            KeyOp::Reserve { .. } | KeyOp::Release { .. } => (false, Effect::None),
        };

        Step::Applied {
            changed,
            effect: if changed { effect } else { Effect::None },
        }
    }

    fn apply_unique(entry: &mut BucketEntry, op: &KeyOp, entity: &EntityRef) -> Step {
        let unchanged = Step::Applied {
            changed: false,
            effect: Effect::None,
        };

        match op {
            KeyOp::Add { .. } => {
                if entry.held_by_other(entity) {
                    return Step::Rejected;
                }
                if entry.values.contains(entity) {
                    if !entry.tentative {
                        return unchanged;
                    }
                    entry.tentative = false;
                    return Step::Applied {
                        changed: true,
                        effect: Effect::Committed,
                    };
                }

                entry.values.insert(entity.clone());
                entry.tentative = false;
                Step::Applied {
                    changed: true,
                    effect: Effect::Inserted,
                }
            }

            KeyOp::Reserve { .. } => {
                if entry.held_by_other(entity) {
                    return Step::Rejected;
                }
                if entry.values.contains(entity) {
                    return unchanged;
                }

                entry.values.insert(entity.clone());
                entry.tentative = true;
                Step::Applied {
                    changed: true,
                    effect: Effect::Reserved,
                }
            }

            KeyOp::Release { .. } => {
                if !entry.tentative || !entry.values.contains(entity) {
                    return unchanged;
                }

                entry.values.remove(entity);
                entry.tentative = false;
                Step::Applied {
                    changed: true,
                    effect: Effect::Released,
                }
            }

            KeyOp::Remove { .. } => {
                if !entry.values.remove(entity) {
                    return unchanged;
                }
                if entry.values.is_empty() {
                    entry.tentative = false;
                }
                Step::Applied {
                    changed: true,
                    effect: Effect::Removed,
                }
            }
        }
    }

    /// Mark the bucket disposed and drop its contents.
    pub fn dispose(&mut self) {
        self.status = BucketStatus::Disposed;
        self.entries.clear();
    }
}
