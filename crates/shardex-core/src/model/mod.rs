//! Declarative index schema.
//!
//! Types in `model` describe *what is indexed*: one `EntitySchema` per entity
//! interface, carrying a `PropertySchema` per indexed property. They are plain
//! builder-constructed values; the `registry` validates and resolves them into
//! the read-only runtime table.

mod entity;
mod error;
mod property;

pub use entity::{EntityRef, EntitySchema, EntitySchemaBuilder};
pub use error::SchemaError;
pub use property::{IndexKind, IndexScope, PropertySchema, UpdateMode};
