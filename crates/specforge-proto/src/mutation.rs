//! Resource mutation types for bulk write operations.

use crate::value::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// The kind of write a bulk request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Create new rows.
    Create,
    /// Overwrite fields of existing rows.
    Update,
    /// Remove existing rows.
    Delete,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Create => write!(f, "create"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A field name and value pair.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct FieldValue {
    /// Field name.
    pub field: String,
    /// Field value.
    pub value: Value,
}

impl FieldValue {
    /// Create a new field-value pair.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// One inbound unit of work inside a bulk request.
///
/// Attributes keep the order in which the client sent them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMutation {
    /// What to do with the resource.
    pub kind: MutationKind,
    /// Identity of the target row. Required for update and delete.
    pub identity: Option<String>,
    /// Attribute values sent by the client.
    pub attributes: Vec<FieldValue>,
}

impl ResourceMutation {
    /// Create mutation with the given attributes.
    pub fn create(attributes: Vec<FieldValue>) -> Self {
        Self {
            kind: MutationKind::Create,
            identity: None,
            attributes,
        }
    }

    /// Update mutation targeting an existing identity.
    pub fn update(identity: impl Into<String>, attributes: Vec<FieldValue>) -> Self {
        Self {
            kind: MutationKind::Update,
            identity: Some(identity.into()),
            attributes,
        }
    }

    /// Delete mutation targeting an existing identity.
    pub fn delete(identity: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Delete,
            identity: Some(identity.into()),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute value.
    pub fn with_attribute(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(FieldValue::new(field, value));
        self
    }

    /// Look up an attribute by name. The last occurrence wins.
    pub fn attribute(&self, field: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .rev()
            .find(|fv| fv.field == field)
            .map(|fv| &fv.value)
    }

    /// Look up a string attribute by name.
    pub fn str_attribute(&self, field: &str) -> Option<&str> {
        self.attribute(field).and_then(Value::as_str)
    }
}
