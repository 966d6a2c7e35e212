//! Cross-cutting per-item policies.
//!
//! Each policy is a [`PolicyStep`] with three hooks the processor calls for
//! every item of a batch:
//!
//! 1. `admit` - before attributes are copied onto the model
//! 2. `before_persist` - after copying, before the row is written
//! 3. `after_persist` - after the row is written, inside the transaction
//!
//! Every hook takes the model by value and returns the model to carry
//! forward. A step that reloads or replaces the instance returns the new
//! one, so later steps and the response never see a stale model.

pub mod bit_mask;
pub mod identity;
pub mod spell_check;
pub mod state_machine;

use specforge_proto::{MutationKind, ResourceMutation};

use super::error::ProcessError;
use super::model::Model;
use super::outcome::ItemMeta;
use crate::storage::Transaction;

pub use bit_mask::BitMaskPolicy;
pub use identity::{IdentityClaims, IdentityPolicy, JwtIssuer, TokenIssuer};
pub use spell_check::{DictionarySpellChecker, SpellCheckPolicy, SpellChecker};
pub use state_machine::{StateMachine, StateMachinePolicy};

/// What a step may see and touch while handling one item.
pub struct StepScope<'s, 'tx> {
    /// Entity class name.
    pub entity: &'s str,
    /// Storage table.
    pub table: &'s str,
    /// Batch operation.
    pub kind: MutationKind,
    /// Position of the item in the batch.
    pub index: usize,
    /// The inbound mutation.
    pub mutation: &'s ResourceMutation,
    /// The batch's open transaction.
    pub tx: &'s mut Transaction<'tx>,
    /// The item's meta slot.
    pub meta: &'s mut ItemMeta,
}

impl StepScope<'_, '_> {
    /// Build an [`ProcessError::InvalidMutation`] for this item.
    pub fn invalid(&self, reason: impl Into<String>) -> ProcessError {
        ProcessError::InvalidMutation {
            entity: self.entity.to_string(),
            index: self.index,
            reason: reason.into(),
        }
    }

    /// Build a [`ProcessError::PolicyFailure`] for this item.
    pub fn failure(&self, policy: &str, message: impl Into<String>) -> ProcessError {
        ProcessError::PolicyFailure {
            policy: policy.to_string(),
            entity: self.entity.to_string(),
            index: self.index,
            message: message.into(),
        }
    }
}

/// One cross-cutting policy.
pub trait PolicyStep: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Called before the mutation's attributes are copied onto the model.
    fn admit(&self, _scope: &mut StepScope<'_, '_>, model: Model) -> Result<Model, ProcessError> {
        Ok(model)
    }

    /// Called right before the model is written.
    fn before_persist(
        &self,
        _scope: &mut StepScope<'_, '_>,
        model: Model,
    ) -> Result<Model, ProcessError> {
        Ok(model)
    }

    /// Called after the model is written.
    fn after_persist(
        &self,
        _scope: &mut StepScope<'_, '_>,
        model: Model,
    ) -> Result<Model, ProcessError> {
        Ok(model)
    }
}

/// Which policies are active for an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    /// State machine validation.
    pub state_machine: bool,
    /// Spell-check enrichment.
    pub spell_check: bool,
    /// Bitmask flag packing.
    pub bit_mask: bool,
    /// Identity issuance on create.
    pub identity_issuance: bool,
}

/// Ordered list of active policy steps.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn PolicyStep>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn with_step(mut self, step: impl PolicyStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Run every step's `admit` hook in order.
    pub fn admit(&self, scope: &mut StepScope<'_, '_>, model: Model) -> Result<Model, ProcessError> {
        self.steps
            .iter()
            .try_fold(model, |model, step| step.admit(scope, model))
    }

    /// Run every step's `before_persist` hook in order.
    pub fn before_persist(
        &self,
        scope: &mut StepScope<'_, '_>,
        model: Model,
    ) -> Result<Model, ProcessError> {
        self.steps
            .iter()
            .try_fold(model, |model, step| step.before_persist(scope, model))
    }

    /// Run every step's `after_persist` hook in order.
    pub fn after_persist(
        &self,
        scope: &mut StepScope<'_, '_>,
        model: Model,
    ) -> Result<Model, ProcessError> {
        self.steps
            .iter()
            .try_fold(model, |model, step| step.after_persist(scope, model))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageConfig, StorageEngine};

    struct Stamp(&'static str);

    impl PolicyStep for Stamp {
        fn name(&self) -> &'static str {
            self.0
        }

        fn admit(&self, scope: &mut StepScope<'_, '_>, model: Model) -> Result<Model, ProcessError> {
            scope
                .meta
                .insert(self.0.to_string(), serde_json::json!(scope.index));
            Ok(model.with_attribute("trail", self.0))
        }

        fn after_persist(
            &self,
            _scope: &mut StepScope<'_, '_>,
            model: Model,
        ) -> Result<Model, ProcessError> {
            // Hand back a different instance.
            let mut replaced = Model::new(model.entity.clone(), model.table.clone());
            replaced.id = Some(77);
            Ok(replaced)
        }
    }

    #[test]
    fn test_pipeline_threads_model() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
        let mutation = ResourceMutation::create(vec![]);
        let mut meta = ItemMeta::new();
        let mut scope = StepScope {
            entity: "Article",
            table: "article",
            kind: MutationKind::Create,
            index: 4,
            mutation: &mutation,
            tx: &mut tx,
            meta: &mut meta,
        };

        let pipeline = Pipeline::new().with_step(Stamp("first")).with_step(Stamp("second"));
        assert_eq!(pipeline.step_names(), vec!["first", "second"]);

        let model = Model::new("Article", "article");
        let model = pipeline.admit(&mut scope, model).unwrap();
        assert_eq!(model.get_str("trail"), Some("second"));

        let model = pipeline.after_persist(&mut scope, model).unwrap();
        assert_eq!(model.id, Some(77));
        assert!(model.get("trail").is_none());

        assert_eq!(meta.len(), 2);
        assert_eq!(meta["first"], serde_json::json!(4));
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
        let mutation = ResourceMutation::create(vec![]);
        let mut meta = ItemMeta::new();
        let mut scope = StepScope {
            entity: "Article",
            table: "article",
            kind: MutationKind::Create,
            index: 0,
            mutation: &mutation,
            tx: &mut tx,
            meta: &mut meta,
        };

        let pipeline = Pipeline::new();
        let model = Model::new("Article", "article").with_attribute("a", 1i64);
        let out = pipeline.before_persist(&mut scope, model.clone()).unwrap();
        assert_eq!(out, model);
        assert!(pipeline.is_empty());
    }
}
