//! Entity schema definitions.

use super::attribute::AttributeSpec;
use crate::naming;
use serde::{Deserialize, Serialize};

/// The declared attribute schema of one entity.
///
/// Attributes keep declaration order, which is also column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySchema {
    /// Entity class name, e.g. `ArticleTag`.
    pub name: String,
    /// Attributes in declaration order.
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    /// Whether deletes tombstone rows instead of removing them.
    #[serde(default)]
    pub soft_delete: bool,
}

impl EntitySchema {
    /// Create an entity with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            soft_delete: false,
        }
    }

    /// Add an attribute, replacing one with the same name in place.
    pub fn with_attribute(mut self, attribute: AttributeSpec) -> Self {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    /// Enable soft deletes.
    pub fn with_soft_delete(mut self, soft_delete: bool) -> Self {
        self.soft_delete = soft_delete;
        self
    }

    /// Storage table name.
    pub fn table_name(&self) -> String {
        naming::table_name(&self.name)
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check if the entity declares an attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Attribute names in declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}
