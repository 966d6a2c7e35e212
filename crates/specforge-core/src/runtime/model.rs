//! In-memory storage model instances.

use std::collections::BTreeSet;

use serde_json::Map;
use specforge_proto::{FieldValue, ResourceMutation, ResourceObject, Value};

use crate::storage::key::current_timestamp;
use crate::storage::Record;

/// One row of an entity, as the processor and policies see it.
///
/// A model without an id has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Entity class name.
    pub entity: String,
    /// Storage table.
    pub table: String,
    /// Row identity.
    pub id: Option<u64>,
    /// Attribute values in write order.
    pub attributes: Vec<FieldValue>,
    /// Creation time of the persisted row.
    pub created_at: Option<u64>,
    /// Last write time of the persisted row.
    pub updated_at: Option<u64>,
}

impl Model {
    /// Create an unsaved model.
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            id: None,
            attributes: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Load a model from a stored row.
    pub fn from_record(entity: impl Into<String>, table: impl Into<String>, record: Record) -> Self {
        Self {
            entity: entity.into(),
            table: table.into(),
            id: Some(record.id),
            attributes: record.fields,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        }
    }

    /// Check if the model has been persisted.
    pub fn exists(&self) -> bool {
        self.id.is_some()
    }

    /// Identity as it appears on the wire.
    pub fn identity(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }

    /// Look up an attribute.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|fv| fv.field == field)
            .map(|fv| &fv.value)
    }

    /// Look up a string attribute.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|fv| fv.field == field) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(FieldValue { field, value }),
        }
    }

    /// Remove an attribute.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let pos = self.attributes.iter().position(|fv| fv.field == field)?;
        Some(self.attributes.remove(pos).value)
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_attribute(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Copy the mutation's attributes that are in `intake`.
    ///
    /// Keys outside `intake` are dropped without error. Returns the number
    /// of attributes copied.
    pub fn fill(&mut self, mutation: &ResourceMutation, intake: &BTreeSet<String>) -> usize {
        let mut copied = 0;
        for fv in &mutation.attributes {
            if intake.contains(&fv.field) {
                self.set(fv.field.clone(), fv.value.clone());
                copied += 1;
            }
        }
        copied
    }

    /// Stored form of the model under `id`.
    pub fn to_record(&self, id: u64) -> Record {
        let now = current_timestamp();
        Record {
            id,
            fields: self.attributes.clone(),
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
            deleted_at: None,
        }
    }

    /// Wire form of the model.
    pub fn to_resource(&self) -> ResourceObject {
        let attributes: Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|fv| (fv.field.clone(), fv.value.to_json()))
            .collect();

        ResourceObject {
            resource_type: self.entity.clone(),
            id: self.identity(),
            attributes,
        }
    }
}
