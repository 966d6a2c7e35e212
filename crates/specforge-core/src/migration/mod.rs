//! Schema migration planner.
//!
//! Diffs two schema snapshots, turns the diff into an ordered list of
//! named operations and persists them as artifacts.
//!
//! # Safety Grades
//!
//! | Grade | Description | Examples |
//! |-------|-------------|----------|
//! | **A** | Additive | New entities, new optional columns, relaxed constraints |
//! | **B** | Additive, existing rows need a value | New required column without default |
//! | **C** | Column change | Type change, tightened length |
//! | **D** | Destructive | Column removal |
//!
//! # Example
//!
//! ```ignore
//! use specforge_core::migration::{DirectoryArtifactStore, PlanBuilder};
//!
//! let store = DirectoryArtifactStore::open("database/migrations")?;
//! let plan = PlanBuilder::now()
//!     .with_existing(&store)
//!     .plan(&previous, &current)?;
//! plan.write_to(&store)?;
//! ```

pub mod artifact;
pub mod diff;
pub mod error;
pub mod grader;
pub mod plan;

pub use artifact::{
    ArtifactStore, ColumnDefinition, DirectoryArtifactStore, MemoryArtifactStore,
    MigrationArtifact, TreeArtifactStore,
};
pub use diff::{AttributeChange, ChangeAspect, SchemaDiff};
pub use error::{MigrationError, SafetyGrade};
pub use grader::{MigrationGrade, SafetyGrader};
pub use plan::{
    format_prefix, token_action, MigrationOperation, MigrationPlan, OperationKind,
    OperationPayload, PlanBuilder,
};
