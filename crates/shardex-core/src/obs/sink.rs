//! Metrics sink boundary.
//!
//! Index, writer, workflow, and query code MUST NOT touch `obs::metrics`
//! directly. All instrumentation flows through `MetricsEvent` and `record`.

use crate::obs::metrics::{self, EventState};
use parking_lot::RwLock;
use std::sync::Arc;

static SINK_OVERRIDE: RwLock<Option<Arc<dyn MetricsSink>>> = RwLock::new(None);

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    UpdateApplied {
        index: &'a str,
        inserts: u64,
        removes: u64,
    },
    UniqueViolation {
        index: &'a str,
    },
    BucketAllocated {
        index: &'a str,
        position: u32,
    },
    BucketDisposed {
        index: &'a str,
    },
    TentativeReserved {
        index: &'a str,
    },
    TentativeReleased {
        index: &'a str,
    },
    WorkflowEnqueued {
        interface: &'a str,
        updates: u64,
    },
    WorkflowApplied {
        interface: &'a str,
    },
    WorkflowRetried {
        interface: &'a str,
    },
    WorkflowAcknowledged {
        interface: &'a str,
    },
    LookupExecuted {
        index: &'a str,
        hits: u64,
    },
    QueryExecuted {
        interface: &'a str,
        results: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink that writes into the process-wide counter table.
/// Used whenever no override is installed.

pub(crate) struct GlobalMetricsSink;

impl GlobalMetricsSink {
    fn index<'a>(m: &'a mut EventState, index: &str) -> &'a mut metrics::IndexCounters {
        m.indexes.entry(index.to_string()).or_default()
    }

    fn workflow<'a>(
        m: &'a mut EventState,
        interface: &str,
    ) -> &'a mut metrics::WorkflowCounters {
        m.workflows.entry(interface.to_string()).or_default()
    }
}

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::UpdateApplied {
                index,
                inserts,
                removes,
            } => {
                m.ops.index_inserts = m.ops.index_inserts.saturating_add(inserts);
                m.ops.index_removes = m.ops.index_removes.saturating_add(removes);
                let entry = Self::index(m, index);
                entry.index_inserts = entry.index_inserts.saturating_add(inserts);
                entry.index_removes = entry.index_removes.saturating_add(removes);
            }

            MetricsEvent::UniqueViolation { index } => {
                m.ops.unique_violations = m.ops.unique_violations.saturating_add(1);
                let entry = Self::index(m, index);
                entry.unique_violations = entry.unique_violations.saturating_add(1);
            }

            MetricsEvent::BucketAllocated { index, position } => {
                m.ops.buckets_allocated = m.ops.buckets_allocated.saturating_add(1);
                let entry = Self::index(m, index);
                entry.buckets_allocated = entry.buckets_allocated.saturating_add(1);
                entry.max_chain_position = entry.max_chain_position.max(position);
            }

            MetricsEvent::BucketDisposed { index: _ } => {
                m.ops.buckets_disposed = m.ops.buckets_disposed.saturating_add(1);
            }

            MetricsEvent::TentativeReserved { index } => {
                m.ops.tentative_reserved = m.ops.tentative_reserved.saturating_add(1);
                let entry = Self::index(m, index);
                entry.tentative_reserved = entry.tentative_reserved.saturating_add(1);
            }

            MetricsEvent::TentativeReleased { index } => {
                m.ops.tentative_released = m.ops.tentative_released.saturating_add(1);
                let entry = Self::index(m, index);
                entry.tentative_released = entry.tentative_released.saturating_add(1);
            }

            MetricsEvent::WorkflowEnqueued { interface, updates } => {
                m.ops.workflows_enqueued = m.ops.workflows_enqueued.saturating_add(1);
                let entry = Self::workflow(m, interface);
                entry.enqueued = entry.enqueued.saturating_add(1);
                entry.enqueued_updates = entry.enqueued_updates.saturating_add(updates);
            }

            MetricsEvent::WorkflowApplied { interface } => {
                m.ops.workflows_applied = m.ops.workflows_applied.saturating_add(1);
                let entry = Self::workflow(m, interface);
                entry.applied = entry.applied.saturating_add(1);
            }

            MetricsEvent::WorkflowRetried { interface } => {
                m.ops.workflows_retried = m.ops.workflows_retried.saturating_add(1);
                let entry = Self::workflow(m, interface);
                entry.retried = entry.retried.saturating_add(1);
            }

            MetricsEvent::WorkflowAcknowledged { interface } => {
                m.ops.workflows_acknowledged = m.ops.workflows_acknowledged.saturating_add(1);
                let entry = Self::workflow(m, interface);
                entry.acknowledged = entry.acknowledged.saturating_add(1);
            }

            MetricsEvent::LookupExecuted { index, hits } => {
                m.ops.lookups = m.ops.lookups.saturating_add(1);
                m.ops.lookup_hits = m.ops.lookup_hits.saturating_add(hits);
                let entry = Self::index(m, index);
                entry.lookups = entry.lookups.saturating_add(1);
                entry.lookup_hits = entry.lookup_hits.saturating_add(hits);
            }

            MetricsEvent::QueryExecuted { interface, results } => {
                m.ops.queries = m.ops.queries.saturating_add(1);
                m.ops.query_results = m.ops.query_results.saturating_add(results);
                let entry = Self::workflow(m, interface);
                entry.queries = entry.queries.saturating_add(1);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.read().clone();
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a process-wide metrics sink override.
///
/// The override is visible to partition tasks as well, so events recorded
/// by other concurrent work during `f` also reach `sink`.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            *SINK_OVERRIDE.write() = self.0.take();
        }
    }

    let prev = SINK_OVERRIDE.write().replace(sink);
    let _guard = Guard(prev);

    f()
}
