//! Process-wide index registry.
//!
//! Built once at startup from explicit `EntitySchema` declarations, validated,
//! and shared read-only (`Arc<IndexRegistry>`) for the rest of the process.
//! A registry that fails validation never exists, so nothing can serve
//! requests against an invalid schema.

mod validate;
#[cfg(test)]
mod tests;

use crate::{
    config::IndexConfig,
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{EntitySchema, IndexKind, IndexScope, SchemaError, UpdateMode},
    value::{Value, ValueKind},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    sync::Arc,
};

///
/// IndexId
///
/// Stable identity of one index: entity interface plus property name.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct IndexId {
    pub interface: String,
    pub property: String,
}

impl IndexId {
    pub fn new(interface: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            property: property.into(),
        }
    }
}

impl Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.interface, self.property)
    }
}

///
/// IndexDescriptor
///
/// Resolved runtime descriptor for one index.
/// Defaults are applied and the null sentinel is parsed.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexDescriptor {
    pub id: IndexId,
    pub key_kind: ValueKind,
    pub nullable: bool,
    pub kind: IndexKind,
    pub scope: IndexScope,
    pub mode: UpdateMode,
    pub unique: bool,
    pub max_entries_per_bucket: usize,
    pub partitions: u32,
    pub null_sentinel: Option<Value>,
}

impl IndexDescriptor {
    #[must_use]
    pub fn property(&self) -> &str {
        &self.id.property
    }

    #[must_use]
    pub const fn is_eager(&self) -> bool {
        matches!(self.mode, UpdateMode::Eager)
    }

    /// Map a property value onto its index key.
    ///
    /// `Null` and the declared null sentinel both mean "not set" and yield
    /// `None`; such values occupy no slot in the index.
    pub fn index_key(&self, value: &Value) -> Result<Option<Value>, InternalError> {
        if value.is_null() || self.null_sentinel.as_ref() == Some(value) {
            return Ok(None);
        }

        if value.kind() != Some(self.key_kind) {
            return Err(InternalError::new(
                ErrorClass::Unsupported,
                ErrorOrigin::Index,
                format!(
                    "value {value} does not match key kind {} of index '{}'",
                    self.key_kind, self.id
                ),
            ));
        }

        Ok(Some(value.clone()))
    }

    /// Root partition owning `key`.
    #[must_use]
    pub fn partition_of(&self, key: &Value) -> u32 {
        match self.kind {
            IndexKind::SingleBucket => 0,
            IndexKind::PartitionedHash => {
                let partitions = u64::from(self.partitions.max(1));
                u32::try_from(key.routing_hash() % partitions).unwrap_or(0)
            }
        }
    }
}

///
/// EntityIndexes
///
/// All indexes declared by one entity interface.
///

#[derive(Clone, Debug)]
pub struct EntityIndexes {
    pub interface: String,
    pub fault_tolerant: bool,
    indexes: Vec<Arc<IndexDescriptor>>,
}

impl EntityIndexes {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<IndexDescriptor>> {
        self.indexes.iter()
    }

    #[must_use]
    pub fn index(&self, property: &str) -> Option<&Arc<IndexDescriptor>> {
        self.indexes.iter().find(|d| d.property() == property)
    }

    #[must_use]
    pub fn has_lazy(&self) -> bool {
        self.indexes.iter().any(|d| !d.is_eager())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

///
/// IndexRegistry
///

#[derive(Debug, Default)]
pub struct IndexRegistry {
    entities: BTreeMap<String, EntityIndexes>,
}

impl IndexRegistry {
    /// Validate every declaration and build the shared registry.
    ///
    /// All declarations are checked before failing, so one startup error
    /// reports every misconfigured index.
    pub fn build(
        schemas: impl IntoIterator<Item = EntitySchema>,
        config: &IndexConfig,
    ) -> Result<Arc<Self>, InternalError> {
        config.validate()?;

        let mut errors = Vec::new();
        let mut entities = BTreeMap::new();

        for schema in schemas {
            if entities.contains_key(&schema.interface) {
                errors.push(SchemaError::DuplicateInterface(schema.interface.clone()));
                continue;
            }

            match validate::resolve_entity(&schema, config) {
                Ok(indexes) => {
                    entities.insert(
                        schema.interface.clone(),
                        EntityIndexes {
                            interface: schema.interface,
                            fault_tolerant: schema.fault_tolerant,
                            indexes: indexes.into_iter().map(Arc::new).collect(),
                        },
                    );
                }
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        if let Some(err) = SchemaError::from_list(errors) {
            return Err(err.into());
        }

        Ok(Arc::new(Self { entities }))
    }

    /// Resolve the indexes of an entity interface.
    pub fn entity(&self, interface: &str) -> Result<&EntityIndexes, InternalError> {
        self.entities.get(interface).ok_or_else(|| {
            InternalError::new(
                ErrorClass::NotFound,
                ErrorOrigin::Registry,
                format!("entity interface '{interface}' is not registered"),
            )
        })
    }

    /// Resolve one index descriptor; unknown properties are configuration errors.
    pub fn descriptor(
        &self,
        interface: &str,
        property: &str,
    ) -> Result<&Arc<IndexDescriptor>, InternalError> {
        self.entity(interface)?.index(property).ok_or_else(|| {
            InternalError::configuration(
                ErrorOrigin::Registry,
                format!("property '{property}' of '{interface}' is not indexed"),
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityIndexes> {
        self.entities.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
