//! specforge core - schema migration planning and bulk resource processing.
//!
//! This crate provides the schema snapshot model, the migration planner and
//! the transactional bulk processor, all on a sled-backed row store.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod error;
pub mod migration;
pub mod naming;
pub mod runtime;
pub mod storage;

pub use catalog::{AttributeSpec, AttributeType, EntitySchema, SchemaSnapshot};
pub use error::Error;
pub use migration::{
    ArtifactStore, DirectoryArtifactStore, MemoryArtifactStore, MigrationArtifact,
    MigrationError, MigrationGrade, MigrationOperation, MigrationPlan, OperationKind,
    PlanBuilder, SafetyGrade, SafetyGrader, SchemaDiff,
};
pub use naming::{class_name, table_name};
pub use runtime::{
    BulkProcessor, EntityContext, EntityRegistry, Model, ProcessError, RuntimeConfig,
    TransactionOutcome,
};
pub use storage::{Record, StorageConfig, StorageEngine, Transaction};

/// Re-export protocol types.
pub use specforge_proto as proto;
