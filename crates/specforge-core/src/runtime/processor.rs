//! Bulk transactional resource processor.
//!
//! Each batch runs inside exactly one storage transaction. Items are
//! handled strictly in input order; the first failure rolls the whole batch
//! back and becomes the batch's only result. Nothing is retried here.

use specforge_proto::{MutationKind, ResourceMutation};
use tracing::{debug, info, warn};

use super::error::ProcessError;
use super::model::Model;
use super::outcome::{ItemMeta, TransactionOutcome};
use super::policy::StepScope;
use super::registry::EntityContext;
use crate::storage::{StorageEngine, Transaction};

/// Applies create, update and delete batches to one storage engine.
pub struct BulkProcessor<'e> {
    engine: &'e StorageEngine,
}

impl<'e> BulkProcessor<'e> {
    /// Create a processor writing to `engine`.
    pub fn new(engine: &'e StorageEngine) -> Self {
        Self { engine }
    }

    /// Create one row per mutation.
    ///
    /// Client-supplied identities are ignored; every row receives a fresh
    /// one. The outcome carries the authoritative models and one meta slot
    /// per mutation.
    pub fn create_batch(
        &self,
        mutations: &[ResourceMutation],
        ctx: &EntityContext,
    ) -> Result<TransactionOutcome, ProcessError> {
        self.transact(ctx, MutationKind::Create, mutations.len(), |tx| {
            let mut outcome = TransactionOutcome {
                entity: ctx.entity.clone(),
                ..Default::default()
            };
            for (index, mutation) in mutations.iter().enumerate() {
                let mut meta = ItemMeta::new();
                let model = self.create_item(tx, ctx, index, mutation, &mut meta)?;
                outcome.models.push(model);
                outcome.meta.push(meta);
            }
            Ok(outcome)
        })
    }

    /// Overwrite the intake attributes of existing rows.
    ///
    /// A mutation naming a missing row fails the whole batch.
    pub fn update_batch(
        &self,
        mutations: &[ResourceMutation],
        ctx: &EntityContext,
    ) -> Result<TransactionOutcome, ProcessError> {
        self.transact(ctx, MutationKind::Update, mutations.len(), |tx| {
            let mut outcome = TransactionOutcome {
                entity: ctx.entity.clone(),
                ..Default::default()
            };
            for (index, mutation) in mutations.iter().enumerate() {
                let mut meta = ItemMeta::new();
                let model = Self::update_item(tx, ctx, index, mutation, &mut meta)?;
                outcome.models.push(model);
                outcome.meta.push(meta);
            }
            Ok(outcome)
        })
    }

    /// Delete the rows named by `identities`.
    ///
    /// Rows are tombstoned when the entity uses soft deletes. A missing
    /// identity, including one already deleted earlier in the same batch,
    /// fails the whole batch.
    pub fn delete_batch(
        &self,
        identities: &[String],
        ctx: &EntityContext,
    ) -> Result<(), ProcessError> {
        self.transact(ctx, MutationKind::Delete, identities.len(), |tx| {
            for (index, identity) in identities.iter().enumerate() {
                let record = Self::lookup(tx, ctx, index, identity)?;
                if ctx.soft_delete {
                    tx.soft_delete(&ctx.table, record);
                } else {
                    tx.delete(&ctx.table, record.id);
                }
            }
            Ok(())
        })
    }

    /// Run `body` in one transaction, committing only if it succeeds.
    fn transact<T>(
        &self,
        ctx: &EntityContext,
        kind: MutationKind,
        items: usize,
        body: impl FnOnce(&mut Transaction<'e>) -> Result<T, ProcessError>,
    ) -> Result<T, ProcessError> {
        info!(entity = %ctx.entity, operation = %kind, items, "batch started");

        let mut tx = self.engine.transaction();
        let value = match body(&mut tx) {
            Ok(value) => value,
            Err(err) => {
                tx.rollback();
                warn!(
                    entity = %ctx.entity,
                    operation = %kind,
                    index = ?err.index(),
                    error = %err,
                    "batch rolled back"
                );
                return Err(err);
            }
        };

        match tx.commit() {
            Ok(applied) => {
                info!(entity = %ctx.entity, operation = %kind, items, applied, "batch committed");
                Ok(value)
            }
            Err(e) => {
                warn!(entity = %ctx.entity, operation = %kind, error = %e, "batch commit failed");
                Err(e.into())
            }
        }
    }

    fn create_item(
        &self,
        tx: &mut Transaction<'e>,
        ctx: &EntityContext,
        index: usize,
        mutation: &ResourceMutation,
        meta: &mut ItemMeta,
    ) -> Result<Model, ProcessError> {
        Self::expect_kind(ctx, index, mutation, MutationKind::Create)?;
        if let Some(identity) = &mutation.identity {
            debug!(entity = %ctx.entity, index, identity = %identity, "client identity ignored on create");
        }

        let mut scope = StepScope {
            entity: &ctx.entity,
            table: &ctx.table,
            kind: MutationKind::Create,
            index,
            mutation,
            tx,
            meta,
        };

        let mut model = ctx.pipeline.admit(&mut scope, ctx.new_model())?;
        model.fill(mutation, &ctx.intake);
        let model = ctx.pipeline.before_persist(&mut scope, model)?;

        let record = model.to_record(self.engine.next_id()?);
        scope.tx.insert(&ctx.table, record.clone());

        ctx.pipeline
            .after_persist(&mut scope, ctx.model_from_record(record))
    }

    fn update_item(
        tx: &mut Transaction<'e>,
        ctx: &EntityContext,
        index: usize,
        mutation: &ResourceMutation,
        meta: &mut ItemMeta,
    ) -> Result<Model, ProcessError> {
        Self::expect_kind(ctx, index, mutation, MutationKind::Update)?;
        let identity = mutation
            .identity
            .as_deref()
            .ok_or_else(|| ProcessError::InvalidMutation {
                entity: ctx.entity.clone(),
                index,
                reason: "update requires an identity".to_string(),
            })?;
        let current = Self::lookup(tx, ctx, index, identity)?;

        let mut scope = StepScope {
            entity: &ctx.entity,
            table: &ctx.table,
            kind: MutationKind::Update,
            index,
            mutation,
            tx,
            meta,
        };

        let mut model = ctx
            .pipeline
            .admit(&mut scope, ctx.model_from_record(current))?;
        model.fill(mutation, &ctx.intake);
        let model = ctx.pipeline.before_persist(&mut scope, model)?;

        let id = model.id.ok_or_else(|| scope.invalid("model lost its identity"))?;
        scope.tx.update(&ctx.table, model.to_record(id));
        let stored = match scope.tx.find(&ctx.table, id)? {
            Some(record) => ctx.model_from_record(record),
            None => model,
        };

        ctx.pipeline.after_persist(&mut scope, stored)
    }

    /// Find a live row by its wire identity.
    fn lookup(
        tx: &Transaction<'e>,
        ctx: &EntityContext,
        index: usize,
        identity: &str,
    ) -> Result<crate::storage::Record, ProcessError> {
        let found = match identity.parse::<u64>() {
            Ok(id) => tx.find(&ctx.table, id)?,
            Err(_) => None,
        };
        found.ok_or_else(|| ProcessError::IdentityNotFound {
            entity: ctx.entity.clone(),
            index,
            identity: identity.to_string(),
        })
    }

    fn expect_kind(
        ctx: &EntityContext,
        index: usize,
        mutation: &ResourceMutation,
        expected: MutationKind,
    ) -> Result<(), ProcessError> {
        if mutation.kind == expected {
            return Ok(());
        }
        Err(ProcessError::InvalidMutation {
            entity: ctx.entity.clone(),
            index,
            reason: format!("{} mutation in a {} batch", mutation.kind, expected),
        })
    }
}
