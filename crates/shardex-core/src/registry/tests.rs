use crate::{
    config::IndexConfig,
    error::{ErrorClass, ErrorDetail, ErrorOrigin},
    model::{EntitySchema, IndexKind, PropertySchema, SchemaError, UpdateMode},
    registry::{IndexId, IndexRegistry},
    value::{Value, ValueKind},
};

fn player_schema() -> EntitySchema {
    EntitySchema::builder("Player")
        .fault_tolerant(true)
        .property(
            PropertySchema::new("name", ValueKind::Text)
                .non_nullable()
                .unique()
                .null_sentinel("NONE"),
        )
        .property(PropertySchema::new("league", ValueKind::Text).max_entries_per_bucket(2))
        .build()
}

fn schema_errors(schemas: Vec<EntitySchema>) -> Vec<String> {
    let err = IndexRegistry::build(schemas, &IndexConfig::default())
        .expect_err("invalid schema should be rejected at build time");
    assert_eq!(err.class, ErrorClass::Configuration);
    assert_eq!(err.origin, ErrorOrigin::Schema);

    match err.detail {
        Some(ErrorDetail::Schema(schema)) => {
            schema.leaves().iter().map(ToString::to_string).collect()
        }
        other => panic!("expected schema detail, got {other:?}"),
    }
}

#[test]
fn valid_schema_resolves_defaults_and_sentinels() {
    let config = IndexConfig {
        partitions_per_index: 4,
        ..IndexConfig::default()
    };
    let registry = IndexRegistry::build([player_schema()], &config).expect("valid schema");

    let name = registry.descriptor("Player", "name").expect("name is indexed");
    assert_eq!(name.id, IndexId::new("Player", "name"));
    assert_eq!(name.null_sentinel, Some(Value::from("NONE")));
    assert_eq!(name.max_entries_per_bucket, config.default_max_entries_per_bucket);
    assert_eq!(name.partitions, 4);

    let league = registry.descriptor("Player", "league").expect("league is indexed");
    assert_eq!(league.max_entries_per_bucket, 2);
    assert_eq!(league.mode, UpdateMode::Lazy);
}

#[test]
fn single_bucket_indexes_have_one_partition() {
    let schema = EntitySchema::builder("Team")
        .property(PropertySchema::new("city", ValueKind::Text).single_bucket())
        .build();
    let registry = IndexRegistry::build([schema], &IndexConfig::default()).expect("valid schema");

    let city = registry.descriptor("Team", "city").expect("city is indexed");
    assert_eq!(city.kind, IndexKind::SingleBucket);
    assert_eq!(city.partitions, 1);
    assert_eq!(city.partition_of(&Value::from("Oslo")), 0);
}

#[test]
fn null_and_sentinel_values_have_no_index_key() {
    let registry = IndexRegistry::build([player_schema()], &IndexConfig::default())
        .expect("valid schema");
    let name = registry.descriptor("Player", "name").expect("name is indexed");

    assert_eq!(name.index_key(&Value::Null).expect("null maps"), None);
    assert_eq!(name.index_key(&Value::from("NONE")).expect("sentinel maps"), None);
    assert_eq!(
        name.index_key(&Value::from("X")).expect("text maps"),
        Some(Value::from("X"))
    );

    let err = name
        .index_key(&Value::Int(3))
        .expect_err("kind mismatch must fail");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn separator_characters_are_rejected_in_names() {
    // Both would otherwise persist under the bucket key "Game.Player.name/..".
    let dotted_interface = EntitySchema::builder("Game.Player")
        .property(PropertySchema::new("name", ValueKind::Text))
        .build();
    let dotted_property = EntitySchema::builder("Game")
        .property(PropertySchema::new("Player.name", ValueKind::Text))
        .build();
    let slashed_property = EntitySchema::builder("Team")
        .property(PropertySchema::new("city/state", ValueKind::Text))
        .build();

    let errors = schema_errors(vec![dotted_interface, dotted_property, slashed_property]);
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("'Game.Player' contains '.'")));
    assert!(errors.iter().any(|e| e.contains("'Player.name' contains '.'")));
    assert!(errors.iter().any(|e| e.contains("'city/state' contains '/'")));
}

#[test]
fn active_unique_index_is_rejected() {
    let schema = EntitySchema::builder("Session")
        .property(PropertySchema::new("token", ValueKind::Text).active().eager().unique())
        .build();

    let errors = schema_errors(vec![schema]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("cannot be unique"), "{errors:?}");
}

#[test]
fn total_eager_index_is_rejected() {
    let schema = EntitySchema::builder("Session")
        .property(PropertySchema::new("token", ValueKind::Text).eager())
        .build();

    let errors = schema_errors(vec![schema]);
    assert!(errors[0].contains("cannot be eager"), "{errors:?}");
}

#[test]
fn fault_tolerant_entity_cannot_mix_modes() {
    let schema = EntitySchema::builder("Game")
        .fault_tolerant(true)
        .property(PropertySchema::new("status", ValueKind::Text).active().eager())
        .property(PropertySchema::new("league", ValueKind::Text))
        .build();

    let errors = schema_errors(vec![schema]);
    assert!(errors[0].contains("mixes eager and lazy"), "{errors:?}");
}

#[test]
fn non_fault_tolerant_entity_may_mix_modes() {
    let schema = EntitySchema::builder("Game")
        .property(PropertySchema::new("status", ValueKind::Text).active().eager())
        .property(PropertySchema::new("league", ValueKind::Text))
        .build();

    let registry = IndexRegistry::build([schema], &IndexConfig::default()).expect("valid schema");
    let game = registry.entity("Game").expect("registered");
    assert_eq!(game.len(), 2);
    assert!(game.has_lazy());
}

#[test]
fn unique_non_nullable_property_needs_sentinel() {
    let schema = EntitySchema::builder("Player")
        .property(PropertySchema::new("name", ValueKind::Text).non_nullable().unique())
        .build();

    let errors = schema_errors(vec![schema]);
    assert!(errors[0].contains("needs a null sentinel"), "{errors:?}");
}

#[test]
fn unparsable_sentinel_is_rejected() {
    let schema = EntitySchema::builder("Player")
        .property(
            PropertySchema::new("rank", ValueKind::Uint)
                .non_nullable()
                .unique()
                .null_sentinel("none"),
        )
        .build();

    let errors = schema_errors(vec![schema]);
    assert!(errors[0].contains("invalid null sentinel"), "{errors:?}");
}

#[test]
fn every_violation_is_reported_in_one_error() {
    let broken = EntitySchema::builder("Broken")
        .property(PropertySchema::new("a", ValueKind::Text).active().unique().eager())
        .property(PropertySchema::new("b", ValueKind::Text).eager())
        .property(PropertySchema::new("b", ValueKind::Text))
        .build();

    let errors = schema_errors(vec![broken, player_schema(), player_schema()]);
    assert_eq!(errors.len(), 4, "{errors:?}");
    assert!(errors.iter().any(|e| e.contains("more than once")));
    assert!(errors.iter().any(|e| e.contains("registered more than once")));
}

#[test]
fn unknown_property_is_configuration_error() {
    let registry = IndexRegistry::build([player_schema()], &IndexConfig::default())
        .expect("valid schema");

    let err = registry
        .descriptor("Player", "age")
        .expect_err("age is not indexed");
    assert_eq!(err.class, ErrorClass::Configuration);

    let err = registry
        .entity("Coach")
        .expect_err("coach is not registered");
    assert_eq!(err.class, ErrorClass::NotFound);
}

#[test]
fn schema_error_list_collapses_single_entry() {
    let single = SchemaError::from_list(vec![SchemaError::EmptyInterface]).expect("one error");
    assert!(matches!(single, SchemaError::EmptyInterface));
    assert!(SchemaError::from_list(Vec::new()).is_none());
}
