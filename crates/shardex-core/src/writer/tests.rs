use crate::{
    config::IndexConfig,
    error::ErrorClass,
    index::BucketDirectory,
    model::{EntityRef, EntitySchema, PropertySchema},
    registry::IndexRegistry,
    runtime::IndexRuntime,
    store::{MemoryStateStore, SharedStore, keys},
    value::{Value, ValueKind},
    workflow::WorkflowQueue,
    writer::{EntityPhase, IndexWriter, PropertyMap},
};
use std::{collections::BTreeSet, sync::Arc};

fn schemas() -> Vec<EntitySchema> {
    vec![
        EntitySchema::builder("Session")
            .property(PropertySchema::new("status", ValueKind::Text).active().eager())
            .property(PropertySchema::new("league", ValueKind::Text))
            .property(PropertySchema::new("handle", ValueKind::Text).unique())
            .build(),
        EntitySchema::builder("Player")
            .fault_tolerant(true)
            .property(
                PropertySchema::new("name", ValueKind::Text)
                    .non_nullable()
                    .unique()
                    .null_sentinel("NONE"),
            )
            .property(
                PropertySchema::new("league", ValueKind::Text)
                    .single_bucket()
                    .max_entries_per_bucket(2),
            )
            .build(),
    ]
}

fn registry() -> Arc<IndexRegistry> {
    IndexRegistry::build(schemas(), &IndexConfig::default()).expect("fixture schemas are valid")
}

async fn open(store: &Arc<MemoryStateStore>) -> Arc<IndexRuntime> {
    let shared: SharedStore = store.clone();

    IndexRuntime::open(registry(), shared, IndexConfig::default())
        .await
        .expect("runtime opens")
}

async fn lookup(
    runtime: &IndexRuntime,
    interface: &str,
    property: &str,
    value: &str,
) -> BTreeSet<EntityRef> {
    runtime
        .index(interface, property)
        .expect("indexed")
        .lookup(&Value::from(value))
        .await
        .expect("lookup succeeds")
}

fn props(pairs: &[(&str, &str)]) -> PropertyMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::from(*v)))
        .collect()
}

#[tokio::test]
async fn eager_updates_are_visible_before_write_returns() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Session", "a").expect("entity");

    a.set("status", "online").await.expect("write");

    assert_eq!(
        lookup(&runtime, "Session", "status", "online").await,
        BTreeSet::from([EntityRef::new("Session", "a")])
    );
}

#[tokio::test]
async fn active_scope_follows_activation() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Session", "a").expect("entity");
    a.set("status", "online").await.expect("write");

    a.deactivate().await.expect("deactivate");
    assert_eq!(a.phase().await, EntityPhase::Inactive);
    assert!(lookup(&runtime, "Session", "status", "online").await.is_empty());

    a.activate().await.expect("reactivate");
    assert_eq!(a.state().await, props(&[("status", "online")]));
    assert_eq!(lookup(&runtime, "Session", "status", "online").await.len(), 1);
}

#[tokio::test]
async fn lazy_updates_wait_for_delivery() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Session", "a").expect("entity");

    a.set("league", "NFL").await.expect("write");
    assert!(lookup(&runtime, "Session", "league", "NFL").await.is_empty());
    assert_eq!(runtime.queue("Session").expect("queue").len(), 1);

    runtime.flush().await.expect("flush");
    assert_eq!(lookup(&runtime, "Session", "league", "NFL").await.len(), 1);
}

#[tokio::test]
async fn unique_violation_rolls_back_the_whole_write() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Session", "a").expect("entity");
    let b = runtime.entity("Session", "b").expect("entity");

    a.write(props(&[("status", "online"), ("handle", "h1")]))
        .await
        .expect("first holder");

    let err = b
        .write(props(&[("status", "online"), ("handle", "h1")]))
        .await
        .expect_err("handle h1 is reserved");
    assert_eq!(err.class, ErrorClass::Conflict);
    assert!(err.is_unique_violation());

    assert!(b.state().await.is_empty());
    assert_eq!(
        lookup(&runtime, "Session", "status", "online").await,
        BTreeSet::from([EntityRef::new("Session", "a")])
    );

    // The reservation is invisible until delivery commits it.
    assert!(lookup(&runtime, "Session", "handle", "h1").await.is_empty());
    runtime.flush().await.expect("flush");
    assert_eq!(
        lookup(&runtime, "Session", "handle", "h1").await,
        BTreeSet::from([EntityRef::new("Session", "a")])
    );
}

#[tokio::test]
async fn failed_persist_releases_reservations() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Session", "a").expect("entity");
    let b = runtime.entity("Session", "b").expect("entity");
    a.activate().await.expect("activate");

    store.fail_writes_matching("entity/");
    let err = a
        .write(props(&[("status", "online"), ("handle", "h2")]))
        .await
        .expect_err("record write fails");
    assert_eq!(err.class, ErrorClass::Unavailable);
    assert!(a.state().await.is_empty());
    assert!(lookup(&runtime, "Session", "status", "online").await.is_empty());
    assert!(runtime.queue("Session").expect("queue").is_empty());

    store.heal();
    b.set("handle", "h2").await.expect("h2 was released");
}

#[tokio::test]
async fn sentinel_values_produce_no_workflow() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Player", "a").expect("entity");

    a.set("name", "NONE").await.expect("write");

    assert!(a.active_workflow_ids().await.is_empty());
    assert!(runtime.queue("Player").expect("queue").is_empty());
}

#[tokio::test]
async fn fault_tolerant_workflows_stay_pending_until_acknowledged() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Player", "a").expect("entity");

    a.set("name", "X").await.expect("write");
    let pending = a.active_workflow_ids().await;
    assert_eq!(pending.len(), 1);

    runtime.flush().await.expect("flush");
    assert!(a.active_workflow_ids().await.is_empty());
    assert_eq!(
        runtime
            .index("Player", "name")
            .expect("indexed")
            .lookup_unique(&Value::from("X"))
            .await
            .expect("unique hit"),
        EntityRef::new("Player", "a")
    );
}

#[tokio::test]
async fn acknowledgement_reactivates_inactive_entities() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Player", "a").expect("entity");

    a.set("league", "NFL").await.expect("write");
    a.deactivate().await.expect("deactivate");
    assert_eq!(a.phase().await, EntityPhase::Inactive);

    runtime.flush().await.expect("flush");
    assert_eq!(a.phase().await, EntityPhase::Active);
    assert!(a.active_workflow_ids().await.is_empty());
}

#[tokio::test]
async fn unqueued_workflows_are_resubmitted_on_activation() {
    let store = Arc::new(MemoryStateStore::new());
    let pending = {
        let runtime = open(&store).await;
        let a = runtime.entity("Player", "a").expect("entity");

        store.fail_writes_matching("workflow-queue/");
        a.set("league", "NFL").await.expect("write survives queue failure");
        a.active_workflow_ids().await
    };
    assert_eq!(pending.len(), 1);
    store.heal();

    let runtime = open(&store).await;
    let queue = runtime.queue("Player").expect("queue");
    assert!(queue.is_empty());

    let a = runtime.entity("Player", "a").expect("entity");
    a.activate().await.expect("activate");
    assert!(pending.iter().all(|id| queue.contains(*id)));

    runtime.flush().await.expect("flush");
    assert_eq!(
        lookup(&runtime, "Player", "league", "NFL").await,
        BTreeSet::from([EntityRef::new("Player", "a")])
    );
    assert!(a.active_workflow_ids().await.is_empty());
}

#[tokio::test]
async fn remove_delivers_pending_workflows_and_clears_the_record() {
    let store = Arc::new(MemoryStateStore::new());
    let runtime = open(&store).await;
    let a = runtime.entity("Player", "a").expect("entity");
    let entity = EntityRef::new("Player", "a");

    a.write(props(&[("name", "X"), ("league", "NFL")]))
        .await
        .expect("write");
    a.remove().await.expect("remove");

    assert_eq!(a.phase().await, EntityPhase::Inactive);
    assert!(!store.contains(&keys::entity(&entity)));
    assert!(lookup(&runtime, "Player", "league", "NFL").await.is_empty());
    assert!(lookup(&runtime, "Player", "name", "X").await.is_empty());

    // The released name is free again.
    let b = runtime.entity("Player", "b").expect("entity");
    b.set("name", "X").await.expect("name reusable");
}

#[tokio::test]
async fn writer_rejects_calls_out_of_phase() {
    let registry = registry();
    let store: SharedStore = Arc::new(MemoryStateStore::new());
    let directory = BucketDirectory::new(store.clone(), &IndexConfig::default());
    let mut writer = IndexWriter::new(
        EntityRef::new("Session", "a"),
        registry.entity("Session").expect("registered").clone(),
        directory,
        store,
        None,
    );

    let err = writer
        .write(props(&[("status", "online")]))
        .await
        .expect_err("inactive entity cannot write");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    writer.activate().await.expect("activate");
    let err = writer
        .write(props(&[("league", "NFL")]))
        .await
        .expect_err("lazy update without a queue");
    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert!(writer.state().is_empty());
}

#[tokio::test]
async fn removal_is_refused_while_workflows_are_pending() {
    let registry = registry();
    let store: SharedStore = Arc::new(MemoryStateStore::new());
    let directory = BucketDirectory::new(store.clone(), &IndexConfig::default());
    let queue = WorkflowQueue::open("Player", store.clone())
        .await
        .expect("queue opens");
    let mut writer = IndexWriter::new(
        EntityRef::new("Player", "a"),
        registry.entity("Player").expect("registered").clone(),
        directory,
        store,
        Some(queue),
    );

    writer.activate().await.expect("activate");
    writer
        .write(props(&[("league", "NFL")]))
        .await
        .expect("write");
    writer.begin_remove().await.expect("begin remove");
    assert_eq!(writer.active_workflow_ids().len(), 2);

    let err = writer.finish_remove().await.expect_err("workflows pending");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    for id in writer.active_workflow_ids() {
        assert!(writer.acknowledge(id).await.expect("ack"));
    }
    writer.finish_remove().await.expect("nothing pending");
    assert_eq!(writer.phase(), EntityPhase::Inactive);
}
