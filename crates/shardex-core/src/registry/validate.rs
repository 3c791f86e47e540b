use crate::{
    config::IndexConfig,
    model::{EntitySchema, IndexKind, IndexScope, PropertySchema, SchemaError, UpdateMode},
    registry::{IndexDescriptor, IndexId},
};
use std::collections::BTreeSet;

// Separators in bucket and entity storage keys.
const RESERVED: [char; 2] = ['.', '/'];

fn reserved_character(name: &str) -> Option<SchemaError> {
    name.chars()
        .find(|c| RESERVED.contains(c))
        .map(|character| SchemaError::ReservedCharacter {
            name: name.to_string(),
            character,
        })
}

/// Validate one entity declaration and resolve its descriptors.
pub(super) fn resolve_entity(
    schema: &EntitySchema,
    config: &IndexConfig,
) -> Result<Vec<IndexDescriptor>, Vec<SchemaError>> {
    let mut errors = Vec::new();
    let interface = schema.interface.as_str();

    if interface.is_empty() {
        return Err(vec![SchemaError::EmptyInterface]);
    }
    if let Some(err) = reserved_character(interface) {
        return Err(vec![err]);
    }

    // Phase 1: per-property rules.
    let mut seen = BTreeSet::new();
    let mut descriptors = Vec::with_capacity(schema.properties.len());

    for property in &schema.properties {
        if property.name.is_empty() {
            errors.push(SchemaError::EmptyProperty {
                interface: interface.to_string(),
            });
            continue;
        }
        if let Some(err) = reserved_character(&property.name) {
            errors.push(err);
            continue;
        }
        if !seen.insert(property.name.as_str()) {
            errors.push(SchemaError::DuplicateProperty {
                interface: interface.to_string(),
                property: property.name.clone(),
            });
            continue;
        }

        match resolve_property(interface, property, config) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(mut errs) => errors.append(&mut errs),
        }
    }

    // Phase 2: entity-wide rules.
    if schema.fault_tolerant {
        let modes: BTreeSet<_> = schema
            .properties
            .iter()
            .map(|p| matches!(p.mode, UpdateMode::Eager))
            .collect();
        if modes.len() > 1 {
            errors.push(SchemaError::MixedUpdateModes {
                interface: interface.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(descriptors)
    } else {
        Err(errors)
    }
}

fn resolve_property(
    interface: &str,
    property: &PropertySchema,
    config: &IndexConfig,
) -> Result<IndexDescriptor, Vec<SchemaError>> {
    let mut errors = Vec::new();
    let name = || (interface.to_string(), property.name.clone());

    // Activation churn across the cluster can briefly hold two activations of
    // one entity, so an active index cannot promise uniqueness.
    if property.scope == IndexScope::Active && property.unique {
        let (interface, property) = name();
        errors.push(SchemaError::ActiveUnique {
            interface,
            property,
        });
    }

    if property.scope == IndexScope::Total && property.mode == UpdateMode::Eager {
        let (interface, property) = name();
        errors.push(SchemaError::TotalEager {
            interface,
            property,
        });
    }

    if property.max_entries_per_bucket == Some(0) {
        let (interface, property) = name();
        errors.push(SchemaError::ZeroCapacity {
            interface,
            property,
        });
    }

    let null_sentinel = match &property.null_sentinel {
        Some(raw) => match property.key_kind.parse(raw) {
            Ok(value) => Some(value),
            Err(source) => {
                let (interface, property) = name();
                errors.push(SchemaError::InvalidNullSentinel {
                    interface,
                    property,
                    source,
                });
                None
            }
        },
        None => {
            if property.unique && !property.nullable {
                let (interface, property) = name();
                errors.push(SchemaError::MissingNullSentinel {
                    interface,
                    property,
                });
            }
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let partitions = match property.kind {
        IndexKind::PartitionedHash => config.partitions_per_index,
        IndexKind::SingleBucket => 1,
    };

    Ok(IndexDescriptor {
        id: IndexId::new(interface, property.name.clone()),
        key_kind: property.key_kind,
        nullable: property.nullable,
        kind: property.kind,
        scope: property.scope,
        mode: property.mode,
        unique: property.unique,
        max_entries_per_bucket: property
            .max_entries_per_bucket
            .unwrap_or(config.default_max_entries_per_bucket),
        partitions,
        null_sentinel,
    })
}
