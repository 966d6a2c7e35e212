//! Migration-specific error types.

use thiserror::Error;

/// Safety grade for a migration operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyGrade {
    /// Grade A: additive, existing rows unaffected.
    /// Examples: new entities, new optional columns.
    A,
    /// Grade B: additive, but existing rows need a value.
    /// Examples: new required columns without a default.
    B,
    /// Grade C: changes the meaning or constraints of a column.
    C,
    /// Grade D: destructive.
    /// Examples: column removal.
    D,
}

impl std::fmt::Display for SafetyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SafetyGrade::A => write!(f, "A (additive)"),
            SafetyGrade::B => write!(f, "B (additive, needs backfill)"),
            SafetyGrade::C => write!(f, "C (column change)"),
            SafetyGrade::D => write!(f, "D (destructive)"),
        }
    }
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// An entity named in the plan input is missing from the target snapshot.
    #[error("entity '{entity}' is not declared in the current snapshot")]
    UnknownEntity {
        /// The missing entity.
        entity: String,
    },

    /// Two different artifacts claim the same token.
    #[error("artifact '{token}' already exists with different content")]
    ArtifactConflict {
        /// The conflicting token.
        token: String,
    },

    /// An artifact on disk failed its checksum.
    #[error("artifact '{token}' is corrupted: {message}")]
    ArtifactCorrupted {
        /// The corrupted token.
        token: String,
        /// Description of the corruption.
        message: String,
    },

    /// Artifact store I/O failed.
    #[error("artifact store error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage or decoding error from the core.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
