use crate::{
    config::IndexConfig,
    error::ErrorClass,
    index::{BucketDirectory, BucketId, BucketState, HashIndex, KeyOp},
    model::{EntityRef, EntitySchema, PropertySchema},
    registry::IndexRegistry,
    store::{MemoryStateStore, SharedStore},
    update::IndexUpdate,
    value::{Value, ValueKind},
};
use proptest::prelude::*;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// Fixture
///

struct Fixture {
    store: Arc<MemoryStateStore>,
    directory: Arc<BucketDirectory>,
    registry: Arc<IndexRegistry>,
}

impl Fixture {
    fn new(config: &IndexConfig) -> Self {
        let schema = EntitySchema::builder("Player")
            .property(PropertySchema::new("name", ValueKind::Text).unique())
            .property(
                PropertySchema::new("league", ValueKind::Text)
                    .single_bucket()
                    .max_entries_per_bucket(2),
            )
            .property(PropertySchema::new("team", ValueKind::Text))
            .build();

        let store = Arc::new(MemoryStateStore::new());
        let shared: SharedStore = store.clone();

        Self {
            directory: BucketDirectory::new(shared, config),
            registry: IndexRegistry::build([schema], config).expect("fixture schema is valid"),
            store,
        }
    }

    fn index(&self, property: &str) -> HashIndex {
        let descriptor = self
            .registry
            .descriptor("Player", property)
            .expect("fixture property is indexed")
            .clone();

        HashIndex::new(descriptor, self.directory.clone())
    }
}

fn player(key: &str) -> EntityRef {
    EntityRef::new("Player", key)
}

fn set(entities: &[&str]) -> BTreeSet<EntityRef> {
    entities.iter().map(|k| player(k)).collect()
}

#[tokio::test]
async fn third_key_chains_a_second_bucket() {
    let fx = Fixture::new(&IndexConfig::default());
    let league = fx.index("league");

    for (entity, key) in [("a", "NFL"), ("b", "NBA"), ("c", "MLB")] {
        let applied = league
            .apply_update(&player(entity), &IndexUpdate::insert(Value::from(key)))
            .await
            .expect("insert applies");
        assert!(applied);
    }

    assert_eq!(league.chain_len(0).await.expect("chain walk"), 2);

    let root = BucketId::root(league.descriptor().id.clone(), 0);
    let root_state = league.bucket_snapshot(&root).await.expect("root snapshot");
    assert_eq!(root_state.len(), 2);
    assert_eq!(root_state.next, Some(root.next()));

    for (entity, key) in [("a", "NFL"), ("b", "NBA"), ("c", "MLB")] {
        let found = league.lookup(&Value::from(key)).await.expect("lookup");
        assert_eq!(found, set(&[entity]), "key {key}");
    }
}

#[tokio::test]
async fn emptied_keys_keep_their_slot() {
    let fx = Fixture::new(&IndexConfig::default());
    let league = fx.index("league");

    for (entity, key) in [("a", "NFL"), ("b", "NBA")] {
        league
            .apply_update(&player(entity), &IndexUpdate::insert(Value::from(key)))
            .await
            .expect("insert applies");
    }
    league
        .apply_update(&player("a"), &IndexUpdate::delete(Value::from("NFL")))
        .await
        .expect("delete applies");

    // The root is still full, so a new key chains instead of reusing the slot.
    league
        .apply_update(&player("c"), &IndexUpdate::insert(Value::from("MLB")))
        .await
        .expect("insert applies");

    assert_eq!(league.chain_len(0).await.expect("chain walk"), 2);
    assert!(league.lookup(&Value::from("NFL")).await.expect("lookup").is_empty());
}

#[tokio::test]
async fn unique_key_rejects_second_entity() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");

    let x = IndexUpdate::insert(Value::from("X"));
    assert!(name.apply_update(&player("a"), &x).await.expect("apply"));
    assert!(!name.apply_update(&player("b"), &x).await.expect("apply"));
    assert!(
        name.apply_update(&player("b"), &IndexUpdate::insert(Value::from("Y")))
            .await
            .expect("apply")
    );

    assert_eq!(
        name.lookup_unique(&Value::from("X")).await.expect("unique"),
        player("a")
    );
    assert_eq!(
        name.lookup_unique(&Value::from("Y")).await.expect("unique"),
        player("b")
    );

    let err = name
        .lookup_unique(&Value::from("Z"))
        .await
        .expect_err("absent key");
    assert_eq!(err.class, ErrorClass::NotFound);
}

#[tokio::test]
async fn rejected_update_keeps_previous_key() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");

    name.apply_update(&player("a"), &IndexUpdate::insert(Value::from("X")))
        .await
        .expect("apply");
    name.apply_update(&player("b"), &IndexUpdate::insert(Value::from("Y")))
        .await
        .expect("apply");

    let rename = IndexUpdate::from_images(Some(Value::from("Y")), Some(Value::from("X")));
    assert!(!name.apply_update(&player("b"), &rename).await.expect("apply"));

    assert_eq!(name.lookup(&Value::from("Y")).await.expect("lookup"), set(&["b"]));
    assert_eq!(name.lookup(&Value::from("X")).await.expect("lookup"), set(&["a"]));
}

#[tokio::test]
async fn tentative_reservation_blocks_but_stays_invisible() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");
    let x = IndexUpdate::insert(Value::from("X"));

    assert!(name.apply_update(&player("a"), &x.tentative()).await.expect("reserve"));
    assert!(name.lookup(&Value::from("X")).await.expect("lookup").is_empty());

    assert!(!name.apply_update(&player("b"), &x.tentative()).await.expect("reserve"));
    assert!(!name.apply_update(&player("b"), &x).await.expect("insert"));

    // The reserving entity's plain insert commits the reservation.
    assert!(name.apply_update(&player("a"), &x).await.expect("commit"));
    assert_eq!(name.lookup(&Value::from("X")).await.expect("lookup"), set(&["a"]));
}

#[tokio::test]
async fn reversed_tentative_releases_the_reservation() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");
    let reserve = IndexUpdate::insert(Value::from("X")).tentative();

    name.apply_update(&player("a"), &reserve).await.expect("reserve");
    assert!(
        name.apply_update(&player("a"), &reserve.reversed())
            .await
            .expect("release")
    );

    assert!(
        name.apply_update(&player("b"), &IndexUpdate::insert(Value::from("X")))
            .await
            .expect("insert")
    );
    assert_eq!(name.lookup(&Value::from("X")).await.expect("lookup"), set(&["b"]));
}

#[tokio::test]
async fn releasing_a_committed_key_is_a_no_op() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");
    let x = IndexUpdate::insert(Value::from("X"));

    name.apply_update(&player("a"), &x).await.expect("insert");
    name.apply_update(&player("a"), &x.tentative().reversed())
        .await
        .expect("release");

    assert_eq!(name.lookup(&Value::from("X")).await.expect("lookup"), set(&["a"]));
}

#[tokio::test]
async fn replaying_updates_is_idempotent() {
    let fx = Fixture::new(&IndexConfig::default());
    let team = fx.index("team");
    let updates = [
        IndexUpdate::insert(Value::from("Bears")),
        IndexUpdate::from_images(Some(Value::from("Bears")), Some(Value::from("Lions"))),
    ];

    for update in &updates {
        team.apply_update(&player("a"), update).await.expect("apply");
    }
    let roots: Vec<_> = ["Bears", "Lions"]
        .into_iter()
        .map(|k| {
            BucketId::root(
                team.descriptor().id.clone(),
                team.descriptor().partition_of(&Value::from(k)),
            )
        })
        .collect();

    let mut once = Vec::new();
    for root in &roots {
        once.push(team.bucket_snapshot(root).await.expect("snapshot"));
    }

    for update in &updates {
        team.apply_update(&player("a"), update).await.expect("replay");
    }

    let mut twice = Vec::new();
    for root in &roots {
        twice.push(team.bucket_snapshot(root).await.expect("snapshot"));
    }

    assert_eq!(once, twice);
    assert_eq!(team.lookup(&Value::from("Lions")).await.expect("lookup"), set(&["a"]));
    assert!(team.lookup(&Value::from("Bears")).await.expect("lookup").is_empty());
}

#[tokio::test]
async fn cross_partition_update_moves_entity() {
    let fx = Fixture::new(&IndexConfig::default());
    let team = fx.index("team");
    let descriptor = team.descriptor().clone();

    let from = Value::from("k0");
    let to = (1..64)
        .map(|i| Value::from(format!("k{i}")))
        .find(|k| descriptor.partition_of(k) != descriptor.partition_of(&from))
        .expect("some key routes to another partition");

    team.apply_update(&player("a"), &IndexUpdate::insert(from.clone()))
        .await
        .expect("insert");
    team.apply_update(
        &player("a"),
        &IndexUpdate::from_images(Some(from.clone()), Some(to.clone())),
    )
    .await
    .expect("move");

    assert!(team.lookup(&from).await.expect("lookup").is_empty());
    assert_eq!(team.lookup(&to).await.expect("lookup"), set(&["a"]));
}

#[tokio::test]
async fn batch_applies_across_entities() {
    let fx = Fixture::new(&IndexConfig::default());
    let team = fx.index("team");

    let mut batch = BTreeMap::new();
    for key in ["a", "b", "c", "d"] {
        batch.insert(player(key), vec![IndexUpdate::insert(Value::from("Bears"))]);
    }
    batch.insert(
        player("e"),
        vec![
            IndexUpdate::insert(Value::from("Lions")),
            IndexUpdate::from_images(Some(Value::from("Lions")), Some(Value::from("Bears"))),
        ],
    );

    assert!(team.apply_update_batch(&batch).await.expect("batch"));
    assert_eq!(
        team.lookup(&Value::from("Bears")).await.expect("lookup"),
        set(&["a", "b", "c", "d", "e"])
    );
    assert!(team.lookup(&Value::from("Lions")).await.expect("lookup").is_empty());

    let err = team
        .lookup_unique(&Value::from("Bears"))
        .await
        .expect_err("five holders");
    assert_eq!(err.class, ErrorClass::NotUnique);
}

#[tokio::test]
async fn batch_reports_unique_rejection() {
    let fx = Fixture::new(&IndexConfig::default());
    let name = fx.index("name");

    let mut batch = BTreeMap::new();
    batch.insert(player("a"), vec![IndexUpdate::insert(Value::from("X"))]);
    batch.insert(player("b"), vec![IndexUpdate::insert(Value::from("X"))]);

    assert!(!name.apply_update_batch(&batch).await.expect("batch"));
    assert_eq!(name.lookup(&Value::from("X")).await.expect("lookup").len(), 1);
}

#[tokio::test]
async fn disposed_bucket_fails_fast_and_stays_disposed() {
    let fx = Fixture::new(&IndexConfig::default());
    let league = fx.index("league");

    league
        .apply_update(&player("a"), &IndexUpdate::insert(Value::from("NFL")))
        .await
        .expect("insert");
    let root = BucketId::root(league.descriptor().id.clone(), 0);
    league.dispose_bucket(&root).await.expect("dispose");

    let err = league
        .lookup(&Value::from("NFL"))
        .await
        .expect_err("disposed lookup");
    assert!(err.is_unavailable());

    let err = league
        .apply_update(&player("b"), &IndexUpdate::insert(Value::from("NBA")))
        .await
        .expect_err("disposed apply");
    assert!(err.is_unavailable());

    fx.directory.evict_all();
    let err = league
        .lookup(&Value::from("NFL"))
        .await
        .expect_err("disposal survives restart");
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn bucket_state_survives_eviction() {
    let fx = Fixture::new(&IndexConfig::default());
    let league = fx.index("league");

    for (entity, key) in [("a", "NFL"), ("b", "NBA"), ("c", "MLB")] {
        league
            .apply_update(&player(entity), &IndexUpdate::insert(Value::from(key)))
            .await
            .expect("insert");
    }

    fx.directory.evict_all();
    assert_eq!(fx.directory.live_count(), 0);

    assert_eq!(league.lookup(&Value::from("MLB")).await.expect("lookup"), set(&["c"]));
    assert_eq!(league.chain_len(0).await.expect("chain walk"), 2);
}

#[tokio::test]
async fn failed_write_leaves_bucket_unchanged() {
    let fx = Fixture::new(&IndexConfig::default());
    let team = fx.index("team");

    fx.store.fail_writes_matching("bucket/");
    let err = team
        .apply_update(&player("a"), &IndexUpdate::insert(Value::from("Bears")))
        .await
        .expect_err("write-through fails");
    assert!(err.is_unavailable());

    fx.store.heal();
    assert!(team.lookup(&Value::from("Bears")).await.expect("lookup").is_empty());
}

#[tokio::test]
async fn null_and_sentinel_keys_are_not_indexed() {
    let fx = Fixture::new(&IndexConfig::default());
    let team = fx.index("team");

    assert!(team.lookup(&Value::Null).await.expect("lookup").is_empty());

    let err = team
        .lookup(&Value::Int(4))
        .await
        .expect_err("wrong key kind");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

///
/// Pure bucket rules
///

fn key_op() -> impl Strategy<Value = KeyOp> {
    (0..4u8, 0..3u8, 0..3u8).prop_map(|(kind, entity, key)| {
        let entity = player(&format!("e{entity}"));
        let key = Value::from(format!("k{key}"));
        match kind {
            0 => KeyOp::Add { key, entity },
            1 => KeyOp::Remove { key, entity },
            2 => KeyOp::Reserve { key, entity },
            _ => KeyOp::Release { key, entity },
        }
    })
}

proptest! {
    #[test]
    fn unique_bucket_never_holds_two_entities(ops in proptest::collection::vec(key_op(), 0..64)) {
        let id = BucketId::root(crate::registry::IndexId::new("Player", "name"), 0);
        let mut state = BucketState::default();

        for op in &ops {
            state.apply(&id, op, true, 16);
            for entry in state.entries.values() {
                prop_assert!(entry.values.len() <= 1);
                prop_assert!(!entry.tentative || entry.values.len() == 1);
            }
        }
    }

    #[test]
    fn restore_undoes_any_single_op(ops in proptest::collection::vec(key_op(), 1..32)) {
        let id = BucketId::root(crate::registry::IndexId::new("Player", "team"), 0);
        let mut state = BucketState::default();

        for op in &ops {
            let before = state.clone();
            let checkpoint = state.checkpoint(op.key());
            state.apply(&id, op, false, 2);
            let after = state.clone();

            state.restore(checkpoint);
            prop_assert_eq!(&state, &before);
            state = after;
        }
    }
}
