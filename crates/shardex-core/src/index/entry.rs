use crate::model::EntityRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

///
/// BucketEntry
///
/// Value set stored under one key. A tentative entry is a unique-key
/// reservation: it blocks other entities but is invisible to lookups.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BucketEntry {
    pub values: BTreeSet<EntityRef>,
    #[serde(default)]
    pub tentative: bool,
}

impl BucketEntry {
    /// Values visible to lookups.
    #[must_use]
    pub fn visible(&self) -> Option<&BTreeSet<EntityRef>> {
        (!self.tentative).then_some(&self.values)
    }

    /// True when the entry is held by anyone other than `entity`.
    #[must_use]
    pub fn held_by_other(&self, entity: &EntityRef) -> bool {
        self.values.iter().any(|held| held != entity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
