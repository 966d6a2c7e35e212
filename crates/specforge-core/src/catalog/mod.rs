//! Schema snapshot model.
//!
//! Entities, their declared attributes, and the snapshots that group them.

mod attribute;
mod entity;
mod snapshot;
mod types;

pub use attribute::AttributeSpec;
pub use entity::EntitySchema;
pub use snapshot::SchemaSnapshot;
pub use types::AttributeType;
