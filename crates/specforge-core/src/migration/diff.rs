//! Schema diffing.
//!
//! Compares the attribute schema of one entity across two snapshots and
//! reports which attributes were added, removed or changed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::catalog::{AttributeSpec, SchemaSnapshot};

/// Attribute-level diff for one entity.
///
/// An attribute name appears in at most one of `added`, `removed` and
/// `changed`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    /// Entity class name.
    pub entity_name: String,
    /// Attributes only in the current snapshot, in declaration order.
    pub added: Vec<AttributeSpec>,
    /// Attribute names only in the previous snapshot.
    pub removed: BTreeSet<String>,
    /// Attributes present in both with differing constraints.
    pub changed: BTreeMap<String, AttributeChange>,
}

/// Old and new definition of a changed attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    /// Definition in the previous snapshot.
    pub old: AttributeSpec,
    /// Definition in the current snapshot.
    pub new: AttributeSpec,
}

/// Which part of an attribute definition changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeAspect {
    /// Declared type.
    Type,
    /// Required flag.
    Required,
    /// Minimum or maximum length.
    Length,
    /// Default value.
    Default,
    /// Allowed values.
    Enum,
}

impl std::fmt::Display for ChangeAspect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAspect::Type => write!(f, "type"),
            ChangeAspect::Required => write!(f, "required"),
            ChangeAspect::Length => write!(f, "length"),
            ChangeAspect::Default => write!(f, "default"),
            ChangeAspect::Enum => write!(f, "enum"),
        }
    }
}

impl AttributeChange {
    /// The aspects that differ between the two definitions.
    pub fn aspects(&self) -> Vec<ChangeAspect> {
        let (old, new) = (&self.old, &self.new);
        let mut aspects = Vec::new();

        if old.attr_type != new.attr_type {
            aspects.push(ChangeAspect::Type);
        }
        if old.required != new.required {
            aspects.push(ChangeAspect::Required);
        }
        if old.min_length != new.min_length || old.max_length != new.max_length {
            aspects.push(ChangeAspect::Length);
        }
        if old.default != new.default {
            aspects.push(ChangeAspect::Default);
        }
        if old.enum_values != new.enum_values {
            aspects.push(ChangeAspect::Enum);
        }

        aspects
    }

    /// Check if the change only relaxes constraints.
    ///
    /// Dropping `required`, widening or removing length bounds and changing
    /// the default never invalidate an existing row.
    pub fn is_relaxing(&self) -> bool {
        let (old, new) = (&self.old, &self.new);
        let min_relaxed = match (old.min_length, new.min_length) {
            (_, None) => true,
            (Some(o), Some(n)) => n <= o,
            (None, Some(_)) => false,
        };
        let max_relaxed = match (old.max_length, new.max_length) {
            (_, None) => true,
            (Some(o), Some(n)) => n >= o,
            (None, Some(_)) => false,
        };

        old.attr_type == new.attr_type
            && (!new.required || old.required)
            && min_relaxed
            && max_relaxed
            && (new.enum_values.is_empty() || new.enum_values == old.enum_values)
    }
}

impl SchemaDiff {
    /// Diff one entity between two snapshots.
    ///
    /// An entity missing from a snapshot is treated as having no attributes
    /// there.
    pub fn compute(previous: &SchemaSnapshot, current: &SchemaSnapshot, entity_name: &str) -> Self {
        let empty = Vec::new();
        let prev_attrs = previous
            .entity(entity_name)
            .map(|e| &e.attributes)
            .unwrap_or(&empty);
        let curr_attrs = current
            .entity(entity_name)
            .map(|e| &e.attributes)
            .unwrap_or(&empty);

        let prev_map: HashMap<&str, &AttributeSpec> =
            prev_attrs.iter().map(|a| (a.name.as_str(), a)).collect();
        let curr_map: HashMap<&str, &AttributeSpec> =
            curr_attrs.iter().map(|a| (a.name.as_str(), a)).collect();

        let mut added = Vec::new();
        let mut changed = BTreeMap::new();
        for attr in curr_attrs {
            match prev_map.get(attr.name.as_str()) {
                None => added.push(attr.clone()),
                Some(old) if *old != attr => {
                    changed.insert(
                        attr.name.clone(),
                        AttributeChange {
                            old: (*old).clone(),
                            new: attr.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        let removed = prev_attrs
            .iter()
            .filter(|a| !curr_map.contains_key(a.name.as_str()))
            .map(|a| a.name.clone())
            .collect();

        SchemaDiff {
            entity_name: entity_name.to_string(),
            added,
            removed,
            changed,
        }
    }

    /// Diff every entity of the current snapshot, in declaration order.
    pub fn compute_all(previous: &SchemaSnapshot, current: &SchemaSnapshot) -> Vec<Self> {
        current
            .entity_names()
            .map(|name| Self::compute(previous, current, name))
            .collect()
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}
