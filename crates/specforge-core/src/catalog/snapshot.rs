//! Schema snapshots.

use std::collections::HashSet;
use std::path::Path;

use super::entity::EntitySchema;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// The attribute schema of every entity at one point in time.
///
/// A planning run compares two snapshots: the one already applied and the
/// target. Snapshots are built once and not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Snapshot version.
    #[serde(default)]
    pub version: u64,
    /// Entities in declaration order.
    #[serde(default)]
    pub entities: Vec<EntitySchema>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            entities: Vec::new(),
        }
    }

    /// Add an entity, replacing one with the same name in place.
    pub fn with_entity(mut self, entity: EntitySchema) -> Self {
        match self.entities.iter_mut().find(|e| e.name == entity.name) {
            Some(existing) => *existing = entity,
            None => self.entities.push(entity),
        }
        self
    }

    /// Look up an entity by class name.
    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check if the snapshot declares an entity.
    pub fn contains(&self, name: &str) -> bool {
        self.entity(name).is_some()
    }

    /// Entity names in declaration order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }

    /// Decode a snapshot from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        let snapshot: Self =
            serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Load a snapshot from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject duplicate entity or attribute names.
    pub fn validate(&self) -> Result<(), Error> {
        let mut entities = HashSet::new();
        for entity in &self.entities {
            if !entities.insert(entity.name.as_str()) {
                return Err(Error::InvalidData(format!(
                    "entity '{}' declared twice",
                    entity.name
                )));
            }

            let mut attributes = HashSet::new();
            for attr in &entity.attributes {
                if !attributes.insert(attr.name.as_str()) {
                    return Err(Error::InvalidData(format!(
                        "attribute '{}' declared twice on '{}'",
                        attr.name, entity.name
                    )));
                }
            }
        }
        Ok(())
    }
}
