//! ## Crate layout
//! - `core`: registry, partitions, writers, workflows, queries and metrics.
//! - `error`: the public error type.
//!
//! `Shardex::builder()` wires a registry, a state store and the runtime in
//! one call; the `prelude` carries the vocabulary needed to declare schemas
//! and write queries.

pub use shardex_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

use shardex_core::{
    config::IndexConfig,
    model::EntitySchema,
    registry::IndexRegistry,
    runtime::IndexRuntime,
    store::{MemoryStateStore, SharedStore},
};
use std::sync::Arc;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Shardex
///

pub struct Shardex;

impl Shardex {
    #[must_use]
    pub fn builder() -> ShardexBuilder {
        ShardexBuilder::default()
    }
}

///
/// ShardexBuilder
///

#[derive(Default)]
pub struct ShardexBuilder {
    schemas: Vec<EntitySchema>,
    config: IndexConfig,
    store: Option<SharedStore>,
    manual_delivery: bool,
}

impl ShardexBuilder {
    #[must_use]
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.schemas.push(schema);
        self
    }

    #[must_use]
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the config from a TOML document.
    pub fn config_toml(mut self, input: &str) -> Result<Self, Error> {
        self.config = IndexConfig::from_toml_str(input)?;
        Ok(self)
    }

    /// Persist into `store`; defaults to a fresh in-memory store.
    #[must_use]
    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Skip the background delivery loops; lazy updates are then only
    /// delivered by `IndexRuntime::flush`.
    #[must_use]
    pub const fn manual_delivery(mut self) -> Self {
        self.manual_delivery = true;
        self
    }

    /// Validate every schema and start the runtime.
    pub async fn start(self) -> Result<Arc<IndexRuntime>, Error> {
        let registry = IndexRegistry::build(self.schemas, &self.config)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));

        let runtime = if self.manual_delivery {
            IndexRuntime::open(registry, store, self.config).await?
        } else {
            IndexRuntime::start(registry, store, self.config).await?
        };

        Ok(runtime)
    }
}

///
/// Prelude
///

pub mod prelude {
    pub use crate::{Error, ErrorKind, Shardex};
    pub use shardex_core::prelude::*;
}
