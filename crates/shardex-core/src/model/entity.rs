use crate::model::property::PropertySchema;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// EntitySchema
/// Index declarations for one entity interface.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntitySchema {
    /// Stable interface name used in index identifiers and storage keys.
    pub interface: String,
    /// Whether lazy updates are tracked per entity for crash recovery.
    pub fault_tolerant: bool,
    /// Indexed properties, in declaration order.
    pub properties: Vec<PropertySchema>,
}

impl EntitySchema {
    pub fn builder(interface: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            schema: Self {
                interface: interface.into(),
                fault_tolerant: false,
                properties: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }
}

///
/// EntitySchemaBuilder
///

#[derive(Clone, Debug)]
pub struct EntitySchemaBuilder {
    schema: EntitySchema,
}

impl EntitySchemaBuilder {
    #[must_use]
    pub const fn fault_tolerant(mut self, fault_tolerant: bool) -> Self {
        self.schema.fault_tolerant = fault_tolerant;
        self
    }

    #[must_use]
    pub fn property(mut self, property: PropertySchema) -> Self {
        self.schema.properties.push(property);
        self
    }

    #[must_use]
    pub fn build(self) -> EntitySchema {
        self.schema
    }
}

///
/// EntityRef
///
/// Reference to one entity instance: its interface plus its primary key.
/// This is the value stored in index entries.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EntityRef {
    pub interface: String,
    pub key: String,
}

impl EntityRef {
    pub fn new(interface: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.interface, self.key)
    }
}
