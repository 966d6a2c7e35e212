//! Bulk processing errors.

use specforge_proto::ErrorObject;
use thiserror::Error;

/// Terminal failure of one bulk invocation.
///
/// Every variant aborts the whole batch; nothing is committed and nothing is
/// retried.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The entity has no generated model, no intake schema, or a
    /// misconfigured policy.
    #[error("entity '{entity}' is not configured: {reason}")]
    Configuration {
        /// Entity name as requested.
        entity: String,
        /// What is missing.
        reason: String,
    },

    /// A requested state is not a legal start state or transition.
    #[error(
        "illegal state for {entity} item {index}: {} -> {}",
        .from_state.as_deref().unwrap_or("(none)"),
        .to_state.as_deref().unwrap_or("(none)")
    )]
    StateViolation {
        /// Entity name.
        entity: String,
        /// Position of the offending item in the batch.
        index: usize,
        /// Identity of the offending row, when it has one.
        identity: Option<String>,
        /// Current persisted state.
        from_state: Option<String>,
        /// Requested state.
        to_state: Option<String>,
    },

    /// An update or delete names a row that does not exist.
    #[error("no {entity} with identity '{identity}' (item {index})")]
    IdentityNotFound {
        /// Entity name.
        entity: String,
        /// Position of the offending item in the batch.
        index: usize,
        /// The missing identity.
        identity: String,
    },

    /// The mutation itself is malformed.
    #[error("invalid {entity} item {index}: {reason}")]
    InvalidMutation {
        /// Entity name.
        entity: String,
        /// Position of the offending item in the batch.
        index: usize,
        /// What is wrong.
        reason: String,
    },

    /// A policy collaborator failed.
    #[error("{policy} failed for {entity} item {index}: {message}")]
    PolicyFailure {
        /// Policy step name.
        policy: String,
        /// Entity name.
        entity: String,
        /// Position of the offending item in the batch.
        index: usize,
        /// Collaborator message.
        message: String,
    },

    /// The store failed.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] crate::error::Error),
}

impl ProcessError {
    /// Whether retrying the same batch could succeed. Never true here: the
    /// processor reports and leaves retries to the caller.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Position of the offending item, when the failure is tied to one.
    pub fn index(&self) -> Option<usize> {
        match self {
            ProcessError::StateViolation { index, .. }
            | ProcessError::IdentityNotFound { index, .. }
            | ProcessError::InvalidMutation { index, .. }
            | ProcessError::PolicyFailure { index, .. } => Some(*index),
            ProcessError::Configuration { .. } | ProcessError::StorageFailure(_) => None,
        }
    }

    /// HTTP status for the error document.
    pub fn status(&self) -> u16 {
        match self {
            ProcessError::Configuration { .. } => 500,
            ProcessError::StateViolation { .. } => 409,
            ProcessError::IdentityNotFound { .. } => 404,
            ProcessError::InvalidMutation { .. } => 400,
            ProcessError::PolicyFailure { .. } => 500,
            ProcessError::StorageFailure(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::Configuration { .. } => "CONFIGURATION_ERROR",
            ProcessError::StateViolation { .. } => "STATE_VIOLATION",
            ProcessError::IdentityNotFound { .. } => "IDENTITY_NOT_FOUND",
            ProcessError::InvalidMutation { .. } => "INVALID_MUTATION",
            ProcessError::PolicyFailure { .. } => "POLICY_FAILURE",
            ProcessError::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// Render as a JSON:API error object.
    pub fn to_error_object(&self) -> ErrorObject {
        let title = match self {
            ProcessError::Configuration { .. } => "Entity not configured",
            ProcessError::StateViolation { .. } => "Illegal state transition",
            ProcessError::IdentityNotFound { .. } => "Resource not found",
            ProcessError::InvalidMutation { .. } => "Invalid resource",
            ProcessError::PolicyFailure { .. } => "Policy failed",
            ProcessError::StorageFailure(_) => "Storage failure",
        };
        let object = ErrorObject::new(self.status(), self.code(), title, self.to_string());
        match self.index() {
            Some(index) => object.at_item(index),
            None => object,
        }
    }
}
