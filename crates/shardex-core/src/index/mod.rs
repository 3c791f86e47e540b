//! Hash-partitioned index.
//!
//! Keys route to a root partition by hash; each partition is a chain of
//! fixed-capacity buckets linked by derived `BucketId`s. Every bucket is a
//! single-owner partition task (see `actor`), so bucket state is mutated by
//! exactly one command at a time without locks.
//!
//! Chains only grow. A key keeps its slot (possibly with an empty value set)
//! for the lifetime of the bucket, which keeps uniqueness checks local to
//! the one bucket that owns the key.

mod actor;
pub(crate) mod bucket;
mod directory;
mod entry;
mod hash_index;
mod id;

#[cfg(test)]
mod tests;

pub use bucket::{BucketState, BucketStatus, KeyOp};
pub use directory::BucketDirectory;
pub use entry::BucketEntry;
pub use hash_index::HashIndex;
pub use id::BucketId;
