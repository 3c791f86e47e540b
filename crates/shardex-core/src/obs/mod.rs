//! Observability: runtime counters and the metrics sink boundary.
//!
//! Index, writer, workflow, and query code record `MetricsEvent`s through
//! `sink::record`; nothing outside `sink` touches the counter table.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, IndexCounters, IndexSummary, WorkflowCounters};
pub use sink::{MetricsEvent, MetricsSink, metrics_report, metrics_reset_all, with_metrics_sink};
