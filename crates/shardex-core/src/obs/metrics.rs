use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for index maintenance.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub indexes: BTreeMap<String, IndexCounters>,
    pub workflows: BTreeMap<String, WorkflowCounters>,
    pub since_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            indexes: BTreeMap::new(),
            workflows: BTreeMap::new(),
            since_ms: now_millis(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Index maintenance
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
    pub tentative_reserved: u64,
    pub tentative_released: u64,

    // Bucket lifecycle
    pub buckets_allocated: u64,
    pub buckets_disposed: u64,

    // Workflow delivery
    pub workflows_enqueued: u64,
    pub workflows_applied: u64,
    pub workflows_retried: u64,
    pub workflows_acknowledged: u64,

    // Reads
    pub lookups: u64,
    pub lookup_hits: u64,
    pub queries: u64,
    pub query_results: u64,
}

///
/// IndexCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IndexCounters {
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
    pub tentative_reserved: u64,
    pub tentative_released: u64,
    pub buckets_allocated: u64,
    pub max_chain_position: u32,
    pub lookups: u64,
    pub lookup_hits: u64,
}

///
/// WorkflowCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct WorkflowCounters {
    pub enqueued: u64,
    pub enqueued_updates: u64,
    pub applied: u64,
    pub retried: u64,
    pub acknowledged: u64,
    pub queries: u64,
}

static EVENT_STATE: LazyLock<Mutex<EventState>> =
    LazyLock::new(|| Mutex::new(EventState::default()));

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    f(&EVENT_STATE.lock())
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    f(&mut EVENT_STATE.lock())
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `since_ms`.
    pub counters: Option<EventState>,
    /// Per-index counters with derived averages.
    pub index_counters: Vec<IndexSummary>,
}

impl EventReport {
    /// Counters for one index, if it has recorded anything.
    #[must_use]
    pub fn index(&self, index: &str) -> Option<&IndexSummary> {
        self.index_counters.iter().find(|s| s.index == index)
    }

    /// Workflow counters for one entity interface.
    #[must_use]
    pub fn workflow(&self, interface: &str) -> Option<&WorkflowCounters> {
        self.counters.as_ref()?.workflows.get(interface)
    }
}

///
/// IndexSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IndexSummary {
    pub index: String,
    pub index_inserts: u64,
    pub index_removes: u64,
    pub unique_violations: u64,
    pub tentative_reserved: u64,
    pub tentative_released: u64,
    pub buckets_allocated: u64,
    pub max_chain_position: u32,
    pub lookups: u64,
    pub avg_hits_per_lookup: f64,
}

/// Build a report from the in-memory counters.
///
/// `window_start_ms` drops the counters when the current window started
/// before the requested instant.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if window_start_ms.is_some_and(|start| snap.since_ms < start) {
        return EventReport::default();
    }

    let index_counters = snap
        .indexes
        .iter()
        .map(|(index, c)| IndexSummary {
            index: index.clone(),
            index_inserts: c.index_inserts,
            index_removes: c.index_removes,
            unique_violations: c.unique_violations,
            tentative_reserved: c.tentative_reserved,
            tentative_released: c.tentative_released,
            buckets_allocated: c.buckets_allocated,
            max_chain_position: c.max_chain_position,
            lookups: c.lookups,
            avg_hits_per_lookup: if c.lookups > 0 {
                c.lookup_hits as f64 / c.lookups as f64
            } else {
                0.0
            },
        })
        .collect();

    EventReport {
        counters: Some(snap),
        index_counters,
    }
}
