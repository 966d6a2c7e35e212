//! Migration plan building.
//!
//! Turns schema diffs into an ordered list of named operations. Tokens are
//! derived from a base time plus the sequence id, so building the same diff
//! from the same base always yields the same names.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::artifact::{ArtifactStore, MigrationArtifact};
use super::diff::{AttributeChange, SchemaDiff};
use super::error::{MigrationError, SafetyGrade};
use super::grader::{MigrationGrade, SafetyGrader};
use crate::catalog::{AttributeSpec, EntitySchema, SchemaSnapshot};
use crate::naming;

/// `chrono` format of the token prefix.
pub const PREFIX_FORMAT: &str = "%Y_%m_%d_%H%M%S";

/// Length of a formatted prefix, e.g. `2024_03_01_120000`.
pub const PREFIX_LEN: usize = 17;

/// Format the sortable prefix for a sequence id.
///
/// Sequence ids start at 1; each id adds one second to the base so that
/// lexical order of tokens equals generation order.
pub fn format_prefix(base: DateTime<Utc>, sequence_id: u64) -> String {
    let offset = Duration::seconds(sequence_id.saturating_sub(1) as i64);
    (base + offset).format(PREFIX_FORMAT).to_string()
}

/// Split the action suffix off a token.
///
/// Returns `None` if the token does not start with a well-formed prefix.
pub fn token_action(token: &str) -> Option<&str> {
    let prefix = token.get(..PREFIX_LEN)?;
    let well_formed = prefix.bytes().enumerate().all(|(i, b)| {
        if matches!(i, 4 | 7 | 10) {
            b == b'_'
        } else {
            b.is_ascii_digit()
        }
    });
    if !well_formed || token.as_bytes().get(PREFIX_LEN) != Some(&b'_') {
        return None;
    }
    token.get(PREFIX_LEN + 1..).filter(|action| !action.is_empty())
}

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a table with every current attribute.
    CreateEntity,
    /// Add one column.
    AddColumn,
    /// Change the definition of one column.
    ChangeColumn,
    /// Drop one column.
    DropColumn,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::CreateEntity => write!(f, "create_entity"),
            OperationKind::AddColumn => write!(f, "add_column"),
            OperationKind::ChangeColumn => write!(f, "change_column"),
            OperationKind::DropColumn => write!(f, "drop_column"),
        }
    }
}

/// What an operation carries.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    /// Full table definition.
    Table {
        /// Attributes in declaration order.
        attributes: Vec<AttributeSpec>,
        /// Whether deletes tombstone rows.
        soft_delete: bool,
    },
    /// Added column.
    Column(AttributeSpec),
    /// Changed column.
    Changed(AttributeChange),
    /// Name of the dropped column.
    Dropped(String),
}

/// One named step of a migration plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOperation {
    /// Position in the plan, starting at 1.
    pub sequence_id: u64,
    /// Kind of change.
    pub kind: OperationKind,
    /// Entity class name.
    pub entity_name: String,
    /// Storage table name.
    pub table: String,
    /// Attributes affected.
    pub payload: OperationPayload,
    /// Artifact name, `<prefix>_<action>`.
    pub token: String,
    /// Safety grade.
    pub grade: SafetyGrade,
}

impl MigrationOperation {
    /// The token without its time prefix.
    pub fn action(&self) -> String {
        action_for(&self.table, &self.payload)
    }

    /// Short human-readable description.
    pub fn description(&self) -> String {
        match &self.payload {
            OperationPayload::Table { attributes, .. } => format!(
                "create table '{}' with {} column(s)",
                self.table,
                attributes.len()
            ),
            OperationPayload::Column(attr) => format!(
                "add {} column '{}' to '{}'",
                attr.attr_type, attr.name, self.table
            ),
            OperationPayload::Changed(change) => {
                let aspects: Vec<String> =
                    change.aspects().iter().map(ToString::to_string).collect();
                format!(
                    "change {} of '{}' in '{}'",
                    aspects.join("/"),
                    change.new.name,
                    self.table
                )
            }
            OperationPayload::Dropped(name) => {
                format!("drop column '{}' from '{}'", name, self.table)
            }
        }
    }
}

/// The payload alone decides the action; each kind carries exactly one payload shape.
fn action_for(table: &str, payload: &OperationPayload) -> String {
    match payload {
        OperationPayload::Table { .. } => format!("create_{}", table),
        OperationPayload::Column(attr) => format!("add_column_{}_to_{}", attr.name, table),
        OperationPayload::Changed(change) => {
            format!("change_column_{}_in_{}", change.new.name, table)
        }
        OperationPayload::Dropped(name) => format!("drop_column_{}_from_{}", name, table),
    }
}

/// An ordered migration plan.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Operations in replay order.
    pub operations: Vec<MigrationOperation>,
    /// Actions left out because an artifact already exists for them.
    pub skipped: Vec<String>,
    /// Base time the tokens were derived from.
    pub created_at: DateTime<Utc>,
}

impl MigrationPlan {
    /// Number of operations.
    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Check if the plan has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations for one entity, in plan order.
    pub fn operations_for<'a>(
        &'a self,
        entity_name: &'a str,
    ) -> impl Iterator<Item = &'a MigrationOperation> + 'a {
        self.operations
            .iter()
            .filter(move |op| op.entity_name == entity_name)
    }

    /// Grade the plan.
    pub fn grade(&self) -> MigrationGrade {
        SafetyGrader::grade_plan(&self.operations)
    }

    /// Build the artifact for every operation.
    pub fn artifacts(&self) -> Result<Vec<MigrationArtifact>, MigrationError> {
        self.operations
            .iter()
            .map(MigrationArtifact::from_operation)
            .collect()
    }

    /// Write every artifact to a store. Returns the tokens actually written.
    pub fn write_to(&self, store: &dyn ArtifactStore) -> Result<Vec<String>, MigrationError> {
        let mut written = Vec::new();
        for artifact in self.artifacts()? {
            if store.write(&artifact)? {
                written.push(artifact.token);
            } else {
                debug!(action = %artifact.action, "artifact exists, not rewritten");
            }
        }
        info!(
            written = written.len(),
            total = self.operations.len(),
            "migration artifacts written"
        );
        Ok(written)
    }
}

/// Builds migration plans from schema diffs.
pub struct PlanBuilder<'s> {
    base: DateTime<Utc>,
    existing: Option<&'s dyn ArtifactStore>,
}

impl<'s> PlanBuilder<'s> {
    /// Create a builder deriving token prefixes from `base`.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            existing: None,
        }
    }

    /// Create a builder based on the current time, truncated to seconds.
    pub fn now() -> Self {
        let now = Utc::now();
        let base = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self::new(base)
    }

    /// Skip operations whose artifact already exists in `store`.
    pub fn with_existing(mut self, store: &'s dyn ArtifactStore) -> Self {
        self.existing = Some(store);
        self
    }

    /// Build a plan from per-entity diffs.
    ///
    /// Entities flagged new get exactly one `CreateEntity` carrying the full
    /// current attribute list. Other entities get `AddColumn`, then
    /// `ChangeColumn`, then `DropColumn` operations; an empty diff emits
    /// nothing.
    pub fn build(
        &self,
        diffs: &[SchemaDiff],
        is_new_entity: &HashMap<String, bool>,
        current: &SchemaSnapshot,
    ) -> Result<MigrationPlan, MigrationError> {
        let mut draft = Draft::default();

        for diff in diffs {
            let is_new = is_new_entity
                .get(&diff.entity_name)
                .copied()
                .unwrap_or(false);

            if is_new {
                let entity =
                    current
                        .entity(&diff.entity_name)
                        .ok_or_else(|| MigrationError::UnknownEntity {
                            entity: diff.entity_name.clone(),
                        })?;
                self.push(
                    &mut draft,
                    &entity.name,
                    OperationKind::CreateEntity,
                    OperationPayload::Table {
                        attributes: entity.attributes.clone(),
                        soft_delete: entity.soft_delete,
                    },
                    SafetyGrader::grade_create(),
                )?;
                continue;
            }

            if diff.is_empty() {
                continue;
            }

            for attr in &diff.added {
                self.push(
                    &mut draft,
                    &diff.entity_name,
                    OperationKind::AddColumn,
                    OperationPayload::Column(attr.clone()),
                    SafetyGrader::grade_added(attr),
                )?;
            }

            for change in changes_in_declaration_order(diff, current.entity(&diff.entity_name)) {
                self.push(
                    &mut draft,
                    &diff.entity_name,
                    OperationKind::ChangeColumn,
                    OperationPayload::Changed(change.clone()),
                    SafetyGrader::grade_changed(change),
                )?;
            }

            for name in &diff.removed {
                self.push(
                    &mut draft,
                    &diff.entity_name,
                    OperationKind::DropColumn,
                    OperationPayload::Dropped(name.clone()),
                    SafetyGrader::grade_removed(),
                )?;
            }
        }

        info!(
            operations = draft.operations.len(),
            skipped = draft.skipped.len(),
            "migration plan built"
        );

        Ok(MigrationPlan {
            operations: draft.operations,
            skipped: draft.skipped,
            created_at: self.base,
        })
    }

    /// Diff two snapshots and build the plan.
    ///
    /// Entities absent from `previous` are new. Entities absent from
    /// `current` are left alone.
    pub fn plan(
        &self,
        previous: &SchemaSnapshot,
        current: &SchemaSnapshot,
    ) -> Result<MigrationPlan, MigrationError> {
        let diffs = SchemaDiff::compute_all(previous, current);
        let is_new_entity = current
            .entity_names()
            .map(|name| (name.to_string(), !previous.contains(name)))
            .collect();
        self.build(&diffs, &is_new_entity, current)
    }

    fn push(
        &self,
        draft: &mut Draft,
        entity_name: &str,
        kind: OperationKind,
        payload: OperationPayload,
        grade: SafetyGrade,
    ) -> Result<(), MigrationError> {
        let table = naming::table_name(entity_name);
        let action = action_for(&table, &payload);

        if let Some(store) = self.existing {
            if let Some(existing) = store.find_by_suffix(&action)? {
                debug!(%action, %existing, "operation already materialized");
                draft.skipped.push(action);
                return Ok(());
            }
        }

        let sequence_id = draft.operations.len() as u64 + 1;
        let token = format!("{}_{}", format_prefix(self.base, sequence_id), action);
        debug!(%token, %grade, "planned operation");

        draft.operations.push(MigrationOperation {
            sequence_id,
            kind,
            entity_name: entity_name.to_string(),
            table,
            payload,
            token,
            grade,
        });
        Ok(())
    }
}

#[derive(Default)]
struct Draft {
    operations: Vec<MigrationOperation>,
    skipped: Vec<String>,
}

fn changes_in_declaration_order<'d>(
    diff: &'d SchemaDiff,
    entity: Option<&EntitySchema>,
) -> Vec<&'d AttributeChange> {
    match entity {
        Some(entity) => entity
            .attribute_names()
            .filter_map(|name| diff.changed.get(name))
            .collect(),
        None => diff.changed.values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeType;
    use crate::migration::artifact::MemoryArtifactStore;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn title() -> AttributeSpec {
        AttributeSpec::new("title", AttributeType::String)
            .required()
            .with_length(Some(32), Some(128))
    }

    fn article(attrs: Vec<AttributeSpec>) -> EntitySchema {
        attrs
            .into_iter()
            .fold(EntitySchema::new("Article"), |e, a| e.with_attribute(a))
    }

    #[test]
    fn test_format_prefix() {
        assert_eq!(format_prefix(base(), 1), "2024_03_01_120000");
        assert_eq!(format_prefix(base(), 61), "2024_03_01_120100");
    }

    #[test]
    fn test_token_action() {
        assert_eq!(
            token_action("2024_03_01_120000_add_column_title_to_article"),
            Some("add_column_title_to_article")
        );
        assert_eq!(token_action("create_article"), None);
        assert_eq!(token_action("2024_03_01_120000_"), None);
        assert_eq!(token_action("2024-03-01-120000_create_article"), None);
    }

    #[test]
    fn test_action_per_payload() {
        let table = "article_tag";
        let table_payload = OperationPayload::Table {
            attributes: vec![title()],
            soft_delete: false,
        };
        let changed = OperationPayload::Changed(AttributeChange {
            old: AttributeSpec::new("title", AttributeType::String),
            new: title(),
        });

        assert_eq!(action_for(table, &table_payload), "create_article_tag");
        assert_eq!(
            action_for(table, &OperationPayload::Column(title())),
            "add_column_title_to_article_tag"
        );
        assert_eq!(
            action_for(table, &changed),
            "change_column_title_in_article_tag"
        );
        assert_eq!(
            action_for(table, &OperationPayload::Dropped("legacy".into())),
            "drop_column_legacy_from_article_tag"
        );
    }

    #[test]
    fn test_new_entity_emits_only_create() {
        let current = SchemaSnapshot::new(1).with_entity(article(vec![
            AttributeSpec::new("body", AttributeType::String),
            title(),
        ]));
        let diff = SchemaDiff::compute(&SchemaSnapshot::new(0), &current, "Article");
        let is_new = HashMap::from([("Article".to_string(), true)]);

        let plan = PlanBuilder::new(base()).build(&[diff], &is_new, &current).unwrap();

        assert_eq!(plan.operation_count(), 1);
        let op = &plan.operations[0];
        assert_eq!(op.kind, OperationKind::CreateEntity);
        assert_eq!(op.token, "2024_03_01_120000_create_article");
        match &op.payload {
            OperationPayload::Table { attributes, .. } => assert_eq!(attributes.len(), 2),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_new_entity_ignores_diff_contents() {
        let previous = SchemaSnapshot::new(0).with_entity(article(vec![AttributeSpec::new(
            "legacy",
            AttributeType::String,
        )]));
        let current = SchemaSnapshot::new(1).with_entity(article(vec![title()]));
        let diff = SchemaDiff::compute(&previous, &current, "Article");
        let is_new = HashMap::from([("Article".to_string(), true)]);

        let plan = PlanBuilder::new(base()).build(&[diff], &is_new, &current).unwrap();
        assert_eq!(plan.operation_count(), 1);
        assert_eq!(plan.operations[0].kind, OperationKind::CreateEntity);
    }

    #[test]
    fn test_add_column_carries_constraints() {
        let previous = SchemaSnapshot::new(1)
            .with_entity(article(vec![AttributeSpec::new("body", AttributeType::String)]));
        let current = SchemaSnapshot::new(2).with_entity(article(vec![
            AttributeSpec::new("body", AttributeType::String),
            title(),
        ]));

        let plan = PlanBuilder::new(base()).plan(&previous, &current).unwrap();

        assert_eq!(plan.operation_count(), 1);
        let op = &plan.operations[0];
        assert_eq!(op.kind, OperationKind::AddColumn);
        assert!(op.token.contains("_add_column_title_to_article"));
        assert_eq!(op.grade, SafetyGrade::B);
        match &op.payload {
            OperationPayload::Column(attr) => {
                assert_eq!(attr.min_length, Some(32));
                assert_eq!(attr.max_length, Some(128));
                assert!(attr.required);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_operation_order_and_sequence() {
        let previous = SchemaSnapshot::new(1)
            .with_entity(article(vec![
                AttributeSpec::new("body", AttributeType::String),
                AttributeSpec::new("legacy", AttributeType::String),
            ]))
            .with_entity(EntitySchema::new("Tag"));
        let current = SchemaSnapshot::new(2)
            .with_entity(article(vec![
                AttributeSpec::new("body", AttributeType::String).required(),
                title(),
            ]))
            .with_entity(EntitySchema::new("Tag"))
            .with_entity(EntitySchema::new("ArticleTag"));

        let plan = PlanBuilder::new(base()).plan(&previous, &current).unwrap();
        let kinds: Vec<_> = plan.operations.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::AddColumn,
                OperationKind::ChangeColumn,
                OperationKind::DropColumn,
                OperationKind::CreateEntity,
            ]
        );

        let ids: Vec<_> = plan.operations.iter().map(|op| op.sequence_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);

        let mut tokens: Vec<_> = plan.operations.iter().map(|op| op.token.clone()).collect();
        let generated = tokens.clone();
        tokens.sort();
        assert_eq!(tokens, generated);

        assert_eq!(plan.operations[1].action(), "change_column_body_in_article");
        assert_eq!(plan.operations[2].action(), "drop_column_legacy_from_article");
        assert_eq!(plan.operations[3].action(), "create_article_tag");
        assert_eq!(plan.grade().overall_grade, SafetyGrade::D);
        assert_eq!(plan.operations_for("Article").count(), 3);
    }

    #[test]
    fn test_unknown_new_entity() {
        let diff = SchemaDiff::compute(&SchemaSnapshot::new(0), &SchemaSnapshot::new(1), "Ghost");
        let is_new = HashMap::from([("Ghost".to_string(), true)]);

        let result = PlanBuilder::new(base()).build(&[diff], &is_new, &SchemaSnapshot::new(1));
        assert!(matches!(result, Err(MigrationError::UnknownEntity { .. })));
    }

    #[test]
    fn test_rebuild_against_existing_store_is_noop() {
        let previous = SchemaSnapshot::new(1)
            .with_entity(article(vec![AttributeSpec::new("body", AttributeType::String)]));
        let current = SchemaSnapshot::new(2).with_entity(article(vec![
            AttributeSpec::new("body", AttributeType::String),
            title(),
        ]));
        let store = MemoryArtifactStore::new();

        let first = PlanBuilder::new(base()).plan(&previous, &current).unwrap();
        assert_eq!(first.write_to(&store).unwrap().len(), 1);

        let later = base() + Duration::days(1);
        let second = PlanBuilder::new(later)
            .with_existing(&store)
            .plan(&previous, &current)
            .unwrap();
        assert!(second.is_empty());
        assert_eq!(second.skipped, vec!["add_column_title_to_article".to_string()]);
        assert!(second.write_to(&store).unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_plan_without_changes_is_empty() {
        let snapshot = SchemaSnapshot::new(1).with_entity(article(vec![title()]));
        let plan = PlanBuilder::new(base()).plan(&snapshot, &snapshot).unwrap();
        assert!(plan.is_empty());
        assert!(plan.grade().can_run_online());
    }
}
