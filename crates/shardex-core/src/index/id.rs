use crate::registry::IndexId;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

///
/// BucketId
///
/// Derivable bucket address: index, root partition, chain position.
/// Position 0 is the partition root; overflow bucket `n + 1` is always the
/// successor of bucket `n`, so no directory of chain links is needed.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BucketId {
    pub index: IndexId,
    pub partition: u32,
    pub position: u32,
}

impl BucketId {
    #[must_use]
    pub const fn root(index: IndexId, partition: u32) -> Self {
        Self {
            index,
            partition,
            position: 0,
        }
    }

    /// Identifier of the overflow bucket chained after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            index: self.index.clone(),
            partition: self.partition,
            position: self.position.saturating_add(1),
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.position == 0
    }
}

impl Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.partition, self.position)
    }
}
