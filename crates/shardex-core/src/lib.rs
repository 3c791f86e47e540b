//! Core runtime for Shardex: schemas, the index registry, hash-partitioned
//! buckets, index writers, lazy workflows, and queries.

// public exports are one module level down
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod obs;
pub mod query;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod update;
pub mod value;
pub mod workflow;
pub mod writer;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, stores, or runtime handles are re-exported here.
///

pub mod prelude {
    pub use crate::{
        model::{EntityRef, EntitySchema, IndexKind, IndexScope, PropertySchema, UpdateMode},
        query::{Predicate, Query},
        update::{IndexUpdate, UpdateOp},
        value::{Value, ValueKind},
    };
}
