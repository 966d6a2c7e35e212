//! Packing of boolean flags into one integer column.

use std::collections::BTreeMap;

use specforge_proto::Value;

use super::{PolicyStep, StepScope};
use crate::runtime::config::BitMaskConfig;
use crate::runtime::error::ProcessError;
use crate::runtime::model::Model;

/// Stores named boolean flags as bits of one integer column.
///
/// Flags never reach storage as attributes of their own. After the row is
/// written they are unpacked again onto the returned model, so callers see
/// the flags they sent.
#[derive(Debug, Clone)]
pub struct BitMaskPolicy {
    column: String,
    flags: BTreeMap<String, u8>,
}

impl BitMaskPolicy {
    /// Build from configuration.
    pub fn new(config: &BitMaskConfig) -> Self {
        Self {
            column: config.column.clone(),
            flags: config.flags.clone(),
        }
    }

    /// Set or clear `flag` in `mask`. Unknown flags leave the mask as is.
    pub fn apply(&self, mask: i64, flag: &str, on: bool) -> i64 {
        match self.flags.get(flag) {
            Some(&bit) if on => mask | (1 << bit),
            Some(&bit) => mask & !(1 << bit),
            None => mask,
        }
    }

    /// Unpack every configured flag from `mask`.
    pub fn unpack(&self, mask: i64) -> BTreeMap<&str, bool> {
        self.flags
            .iter()
            .map(|(name, &bit)| (name.as_str(), mask & (1 << bit) != 0))
            .collect()
    }

    fn requested_flag(scope: &StepScope<'_, '_>, flag: &str) -> Result<Option<bool>, ProcessError> {
        match scope.mutation.attribute(flag) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(on)) => Ok(Some(*on)),
            Some(Value::Int(0)) => Ok(Some(false)),
            Some(Value::Int(1)) => Ok(Some(true)),
            Some(other) => Err(scope.invalid(format!(
                "flag '{flag}' must be a boolean, got {other:?}"
            ))),
        }
    }
}

impl PolicyStep for BitMaskPolicy {
    fn name(&self) -> &'static str {
        "bit_mask"
    }

    fn before_persist(
        &self,
        scope: &mut StepScope<'_, '_>,
        mut model: Model,
    ) -> Result<Model, ProcessError> {
        let mut mask = match model.get(&self.column) {
            None | Some(Value::Null) => 0,
            Some(Value::Int(mask)) => *mask,
            Some(other) => {
                return Err(scope.invalid(format!(
                    "mask column '{}' holds {other:?}",
                    self.column
                )))
            }
        };

        for flag in self.flags.keys() {
            if let Some(on) = Self::requested_flag(scope, flag)? {
                mask = self.apply(mask, flag, on);
            }
            model.remove(flag);
        }

        model.set(self.column.clone(), mask);
        Ok(model)
    }

    fn after_persist(
        &self,
        _scope: &mut StepScope<'_, '_>,
        mut model: Model,
    ) -> Result<Model, ProcessError> {
        let mask = model.get(&self.column).and_then(Value::as_i64).unwrap_or(0);
        for (flag, on) in self.unpack(mask) {
            model.set(flag, on);
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::outcome::ItemMeta;
    use crate::storage::{StorageConfig, StorageEngine};
    use specforge_proto::{MutationKind, ResourceMutation};

    fn policy() -> BitMaskPolicy {
        BitMaskPolicy::new(
            &BitMaskConfig::new("permissions")
                .with_flag("a", 0)
                .with_flag("b", 1)
                .with_flag("c", 2),
        )
    }

    fn before(mutation: ResourceMutation, model: Model) -> Result<Model, ProcessError> {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
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
        policy().before_persist(&mut scope, model)
    }

    #[test]
    fn test_apply_and_unpack() {
        let policy = policy();
        let mask = policy.apply(0, "a", true);
        let mask = policy.apply(mask, "c", true);
        assert_eq!(mask, 0b101);
        assert_eq!(policy.apply(mask, "a", false), 0b100);
        assert_eq!(policy.apply(mask, "unknown", true), mask);

        let flags = policy.unpack(0b101);
        assert!(flags["a"]);
        assert!(!flags["b"]);
        assert!(flags["c"]);
    }

    #[test]
    fn test_packs_flags_into_column() {
        let mutation = ResourceMutation::create(vec![])
            .with_attribute("a", true)
            .with_attribute("b", false)
            .with_attribute("c", 1i64);
        let model = Model::new("Article", "article")
            .with_attribute("title", "x")
            .with_attribute("a", true)
            .with_attribute("b", false);

        let packed = before(mutation, model).unwrap();
        assert_eq!(packed.get("permissions"), Some(&Value::Int(0b101)));
        assert!(packed.get("a").is_none());
        assert!(packed.get("b").is_none());
        assert_eq!(packed.get_str("title"), Some("x"));
    }

    #[test]
    fn test_absent_flags_keep_stored_bits() {
        let mutation = ResourceMutation::update("1", vec![]).with_attribute("b", true);
        let model = Model::new("Article", "article").with_attribute("permissions", 0b001i64);

        let packed = before(mutation, model).unwrap();
        assert_eq!(packed.get("permissions"), Some(&Value::Int(0b011)));
    }

    #[test]
    fn test_non_boolean_flag_is_invalid() {
        let mutation = ResourceMutation::create(vec![]).with_attribute("a", "yes");
        let err = before(mutation, Model::new("Article", "article")).unwrap_err();
        assert!(matches!(err, ProcessError::InvalidMutation { .. }));
    }

    #[test]
    fn test_after_persist_unpacks() {
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

        let model = Model::new("Article", "article").with_attribute("permissions", 0b110i64);
        let out = policy().after_persist(&mut scope, model).unwrap();
        assert_eq!(out.get("a"), Some(&Value::Bool(false)));
        assert_eq!(out.get("b"), Some(&Value::Bool(true)));
        assert_eq!(out.get("c"), Some(&Value::Bool(true)));
    }
}
