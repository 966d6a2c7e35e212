//! Per-entity runtime contexts.
//!
//! A context bundles what the processor needs for one entity: its table,
//! the intake field set, the active policies and the built pipeline.
//! Contexts are resolved once per entity and shared afterwards.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::config::{EntityPolicyConfig, RuntimeConfig};
use super::error::ProcessError;
use super::model::Model;
use super::policy::{
    BitMaskPolicy, IdentityPolicy, JwtIssuer, Pipeline, PolicyFlags, SpellCheckPolicy,
    StateMachinePolicy,
};
use crate::catalog::{EntitySchema, SchemaSnapshot};
use crate::storage::Record;

/// Highest bit a packed flag may use.
pub const MAX_FLAG_BIT: u8 = 62;

/// Everything the processor needs to handle one entity.
#[derive(Debug)]
pub struct EntityContext {
    /// Entity class name.
    pub entity: String,
    /// Storage table.
    pub table: String,
    /// Attributes copied from inbound payloads.
    pub intake: BTreeSet<String>,
    /// Active policies.
    pub flags: PolicyFlags,
    /// Whether delete tombstones rows instead of removing them.
    pub soft_delete: bool,
    /// Policy steps in run order.
    pub pipeline: Arc<Pipeline>,
}

impl EntityContext {
    /// A context with no policies and the given intake.
    pub fn new<I, S>(entity: impl Into<String>, intake: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entity = entity.into();
        Self {
            table: crate::naming::table_name(&entity),
            entity,
            intake: intake.into_iter().map(Into::into).collect(),
            flags: PolicyFlags::default(),
            soft_delete: false,
            pipeline: Arc::new(Pipeline::new()),
        }
    }

    /// A fresh, unsaved model of this entity.
    pub fn new_model(&self) -> Model {
        Model::new(self.entity.clone(), self.table.clone())
    }

    /// A model loaded from a stored row of this entity.
    pub fn model_from_record(&self, record: Record) -> Model {
        Model::from_record(self.entity.clone(), self.table.clone(), record)
    }
}

/// Resolves entity names to shared [`EntityContext`]s.
pub struct EntityRegistry {
    snapshot: SchemaSnapshot,
    config: RuntimeConfig,
    contexts: RwLock<HashMap<String, Arc<EntityContext>>>,
}

impl EntityRegistry {
    /// Create a registry over the generated models and their policies.
    pub fn new(snapshot: SchemaSnapshot, config: RuntimeConfig) -> Self {
        Self {
            snapshot,
            config,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// The schema the registry resolves against.
    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.snapshot
    }

    /// Resolve the context of `entity`, building it on first use.
    pub fn resolve(&self, entity: &str) -> Result<Arc<EntityContext>, ProcessError> {
        if let Some(context) = self.contexts.read().get(entity) {
            return Ok(Arc::clone(context));
        }

        let context = Arc::new(self.build(entity)?);
        let mut contexts = self.contexts.write();
        let context = contexts
            .entry(entity.to_string())
            .or_insert(context)
            .clone();
        debug!(
            entity,
            table = %context.table,
            steps = ?context.pipeline.step_names(),
            "entity context resolved"
        );
        Ok(context)
    }

    fn build(&self, entity: &str) -> Result<EntityContext, ProcessError> {
        let schema = self
            .snapshot
            .entity(entity)
            .ok_or_else(|| configuration(entity, "no generated model"))?;
        let policies = self.config.entity(entity).cloned().unwrap_or_default();

        let intake = Self::intake(schema, &policies)?;
        let mut flags = PolicyFlags::default();
        let mut pipeline = Pipeline::new();

        if let Some(fsm) = &policies.state_machine {
            if fsm.field.is_empty() || fsm.initial.is_empty() {
                return Err(configuration(
                    entity,
                    "state machine needs a field and at least one initial state",
                ));
            }
            require_declared(schema, &fsm.field, "state machine field")?;
            if !intake.contains(&fsm.field) {
                return Err(configuration(
                    entity,
                    format!("state machine field '{}' is not in the intake", fsm.field),
                ));
            }
            flags.state_machine = true;
            pipeline = pipeline.with_step(StateMachinePolicy::new(fsm));
        }

        if let Some(spell) = &policies.spell_check {
            if spell.fields.is_empty() {
                return Err(configuration(entity, "spell check names no fields"));
            }
            flags.spell_check = true;
            pipeline = pipeline.with_step(SpellCheckPolicy::new(spell));
        }

        if let Some(identity) = &policies.identity {
            let secret = self.config.resolve_jwt_secret().ok_or_else(|| {
                configuration(entity, "identity issuance needs a JWT secret")
            })?;
            require_declared(schema, &identity.token_field, "identity token field")?;
            flags.identity_issuance = true;
            pipeline = pipeline.with_step(IdentityPolicy::new(
                identity.clone(),
                JwtIssuer::with_secret_str(&secret, identity.issuer.clone()),
            ));
        }

        if let Some(mask) = &policies.bit_mask {
            if mask.flags.is_empty() {
                return Err(configuration(entity, "bitmask declares no flags"));
            }
            if let Some((flag, bit)) = mask.flags.iter().find(|&(_, &bit)| bit > MAX_FLAG_BIT) {
                return Err(configuration(
                    entity,
                    format!("flag '{flag}' uses bit {bit}, above {MAX_FLAG_BIT}"),
                ));
            }
            require_declared(schema, &mask.column, "bitmask column")?;
            flags.bit_mask = true;
            pipeline = pipeline.with_step(BitMaskPolicy::new(mask));
        }

        Ok(EntityContext {
            entity: schema.name.clone(),
            table: schema.table_name(),
            intake,
            flags,
            soft_delete: policies.soft_delete.unwrap_or(schema.soft_delete),
            pipeline: Arc::new(pipeline),
        })
    }

    fn intake(
        schema: &EntitySchema,
        policies: &EntityPolicyConfig,
    ) -> Result<BTreeSet<String>, ProcessError> {
        let mut intake: BTreeSet<String> = match &policies.intake {
            Some(fields) => {
                for field in fields {
                    require_declared(schema, field, "intake field")?;
                }
                fields.iter().cloned().collect()
            }
            None => schema.attribute_names().map(str::to_string).collect(),
        };

        // Flags are packed by the bitmask step, never stored on their own.
        if let Some(mask) = &policies.bit_mask {
            intake.extend(mask.flags.keys().cloned());
        }
        // Issued tokens are written by the identity step only.
        if let Some(identity) = &policies.identity {
            intake.remove(&identity.token_field);
        }

        if intake.is_empty() {
            return Err(configuration(&schema.name, "no intake schema"));
        }
        Ok(intake)
    }
}

fn configuration(entity: &str, reason: impl Into<String>) -> ProcessError {
    ProcessError::Configuration {
        entity: entity.to_string(),
        reason: reason.into(),
    }
}

fn require_declared(schema: &EntitySchema, field: &str, role: &str) -> Result<(), ProcessError> {
    if schema.has_attribute(field) {
        Ok(())
    } else {
        Err(configuration(
            &schema.name,
            format!("{role} '{field}' is not a declared attribute"),
        ))
    }
}
