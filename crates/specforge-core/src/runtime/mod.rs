//! Bulk transactional resource processing.
//!
//! A batch of create, update or delete mutations for one entity is applied
//! inside a single storage transaction. Per-item policies (state machine,
//! spell check, identity issuance, bitmask packing) run through a
//! [`Pipeline`] resolved once per entity by the [`EntityRegistry`].

pub mod config;
pub mod error;
pub mod model;
pub mod outcome;
pub mod policy;
pub mod processor;
pub mod registry;

pub use config::{
    BitMaskConfig, EntityPolicyConfig, IdentityConfig, RuntimeConfig, SpellCheckConfig,
    StateMachineConfig, JWT_SECRET_ENV,
};
pub use error::ProcessError;
pub use model::Model;
pub use outcome::{ItemMeta, TransactionOutcome};
pub use policy::{Pipeline, PolicyFlags, PolicyStep, StepScope};
pub use processor::BulkProcessor;
pub use registry::{EntityContext, EntityRegistry};
