//! Equality queries over entity indexes, pushed to an observer in batches.

mod plan;
mod predicate;
mod stream;

pub use plan::LookupPlan;
pub use predicate::{Predicate, Query};
pub use stream::{ChannelObserver, QueryEvent, QueryStream, ResultObserver};

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    index::BucketDirectory,
    model::EntityRef,
    obs::sink::{self, MetricsEvent},
    registry::IndexRegistry,
    value::{Value, ValueKind},
};
use std::{collections::BTreeSet, sync::Arc};
use thiserror::Error as ThisError;

///
/// QueryError
///

#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("property '{property}' of '{interface}' is not indexed")]
    NotIndexed { interface: String, property: String },

    #[error("composite predicate has no operands")]
    EmptyComposite,

    #[error("value {value} does not match key kind {expected} of '{property}'")]
    KindMismatch {
        property: String,
        expected: ValueKind,
        value: Value,
    },
}

impl QueryError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotIndexed { .. } | Self::EmptyComposite => ErrorClass::Configuration,
            Self::KindMismatch { .. } => ErrorClass::Unsupported,
        }
    }
}

impl From<QueryError> for InternalError {
    fn from(err: QueryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Query, err.to_string())
    }
}

///
/// QueryExecutor
///

#[derive(Clone)]
pub struct QueryExecutor {
    registry: Arc<IndexRegistry>,
    directory: Arc<BucketDirectory>,
    batch_size: usize,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(
        registry: Arc<IndexRegistry>,
        directory: Arc<BucketDirectory>,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            directory,
            batch_size: batch_size.max(1),
        }
    }

    pub fn plan(&self, query: &Query) -> Result<LookupPlan, InternalError> {
        self.registry.entity(&query.interface)?;

        LookupPlan::translate(
            &self.registry,
            &self.directory,
            &query.interface,
            &query.predicate,
        )
        .map_err(InternalError::from)
    }

    /// Evaluate the query and collect every matching entity.
    pub async fn run(&self, query: &Query) -> Result<BTreeSet<EntityRef>, InternalError> {
        let results = self.plan(query)?.execute().await?;

        sink::record(MetricsEvent::QueryExecuted {
            interface: &query.interface,
            results: u64::try_from(results.len()).unwrap_or(u64::MAX),
        });

        Ok(results)
    }

    /// Evaluate the query and push results in batches.
    ///
    /// Ends with `on_completed` on success or `on_error` on failure; the
    /// number of pushed entities is returned.
    pub async fn execute(
        &self,
        query: &Query,
        observer: &dyn ResultObserver,
    ) -> Result<usize, InternalError> {
        let results = match self.run(query).await {
            Ok(results) => results,
            Err(err) => {
                tracing::debug!(interface = %query.interface, error = %err, "query failed");
                observer.on_error(&err).await;
                return Err(err);
            }
        };

        let total = results.len();
        let results: Vec<_> = results.into_iter().collect();
        for chunk in results.chunks(self.batch_size) {
            observer.on_next_batch(chunk.to_vec()).await;
        }
        observer.on_completed().await;

        Ok(total)
    }
}
