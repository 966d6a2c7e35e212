//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::{json, Value as Json};
use specforge_core::migration::{MigrationPlan, SchemaDiff};
use specforge_core::runtime::TransactionOutcome;

use crate::commands::CliError;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format non-empty entity diffs and the names of new entities.
    fn format_diff(&self, diffs: &[SchemaDiff], new_entities: &[&str]) -> String;

    /// Format a migration plan and the tokens written for it.
    fn format_plan(&self, plan: &MigrationPlan, written: &[String]) -> String;

    /// Format a committed create or update batch.
    fn format_outcome(&self, outcome: &TransactionOutcome) -> String;

    /// Format a committed delete batch.
    fn format_deleted(&self, entity: &str, count: usize) -> String;

    /// Format a failed command.
    fn format_error(&self, error: &CliError) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_diff(&self, diffs: &[SchemaDiff], new_entities: &[&str]) -> String {
        if diffs.is_empty() && new_entities.is_empty() {
            return "No changes".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Entity", "Change", "Attribute", "Detail"]);

        for entity in new_entities {
            table.add_row(vec![entity.to_string(), "new".into(), "".into(), "".into()]);
        }
        for diff in diffs {
            for attr in &diff.added {
                let detail = if attr.required { "required" } else { "optional" };
                table.add_row(vec![
                    diff.entity_name.clone(),
                    "added".into(),
                    attr.name.clone(),
                    format!("{} {}", detail, attr.attr_type),
                ]);
            }
            for (name, change) in &diff.changed {
                table.add_row(vec![
                    diff.entity_name.clone(),
                    "changed".into(),
                    name.clone(),
                    aspects(change.aspects()),
                ]);
            }
            for name in &diff.removed {
                table.add_row(vec![
                    diff.entity_name.clone(),
                    "removed".into(),
                    name.clone(),
                    String::new(),
                ]);
            }
        }

        table.to_string()
    }

    fn format_plan(&self, plan: &MigrationPlan, written: &[String]) -> String {
        let grade = plan.grade();
        let mut output = String::new();

        if plan.is_empty() {
            output.push_str("Nothing to migrate");
        } else {
            let mut table = Table::new();
            table.set_header(vec!["#", "Token", "Grade", "Description"]);
            for op in &plan.operations {
                table.add_row(vec![
                    Cell::new(op.sequence_id),
                    Cell::new(&op.token),
                    Cell::new(op.grade.to_string()),
                    Cell::new(op.description()),
                ]);
            }
            output.push_str(&table.to_string());
            output.push_str(&format!("\nOverall grade: {}", grade.overall_grade));
        }

        output.push_str(&format!(
            "\n{} written, {} already present",
            written.len(),
            plan.skipped.len()
        ));
        if grade.requires_backfill() {
            output.push_str(&format!("\nBackfill needed: {}", grade.backfill.join(", ")));
        }
        output
    }

    fn format_outcome(&self, outcome: &TransactionOutcome) -> String {
        if outcome.is_empty() {
            return format!("0 {} row(s) affected", outcome.entity);
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "id", "attributes", "meta"]);
        for (index, (model, meta)) in outcome.models.iter().zip(&outcome.meta).enumerate() {
            let resource = model.to_resource();
            let meta = if meta.is_empty() {
                String::new()
            } else {
                Json::Object(meta.clone()).to_string()
            };
            table.add_row(vec![
                Cell::new(index),
                Cell::new(resource.id.unwrap_or_default()),
                Cell::new(Json::Object(resource.attributes).to_string()),
                Cell::new(meta),
            ]);
        }

        format!(
            "{}\n{} {} row(s) affected",
            table,
            outcome.len(),
            outcome.entity
        )
    }

    fn format_deleted(&self, entity: &str, count: usize) -> String {
        format!("{} {} row(s) deleted", count, entity)
    }

    fn format_error(&self, error: &CliError) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_diff(&self, diffs: &[SchemaDiff], new_entities: &[&str]) -> String {
        let diffs: Vec<Json> = diffs
            .iter()
            .map(|diff| {
                let changed: serde_json::Map<String, Json> = diff
                    .changed
                    .iter()
                    .map(|(name, change)| {
                        let aspects: Vec<String> =
                            change.aspects().iter().map(ToString::to_string).collect();
                        (name.clone(), json!(aspects))
                    })
                    .collect();
                json!({
                    "entity": diff.entity_name,
                    "added": diff.added,
                    "removed": diff.removed,
                    "changed": changed,
                })
            })
            .collect();

        pretty(&json!({
            "newEntities": new_entities,
            "diffs": diffs,
        }))
    }

    fn format_plan(&self, plan: &MigrationPlan, written: &[String]) -> String {
        let operations: Vec<Json> = plan
            .operations
            .iter()
            .map(|op| {
                json!({
                    "sequenceId": op.sequence_id,
                    "token": op.token,
                    "kind": op.kind,
                    "entity": op.entity_name,
                    "grade": op.grade.to_string(),
                    "description": op.description(),
                })
            })
            .collect();
        let grade = plan.grade();

        pretty(&json!({
            "operations": operations,
            "grade": grade.overall_grade.to_string(),
            "backfill": grade.backfill,
            "skipped": plan.skipped,
            "written": written,
        }))
    }

    fn format_outcome(&self, outcome: &TransactionOutcome) -> String {
        serde_json::to_string_pretty(&outcome.to_document()).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_deleted(&self, entity: &str, count: usize) -> String {
        json!({
            "meta": {"entity": entity, "deleted": count}
        })
        .to_string()
    }

    fn format_error(&self, error: &CliError) -> String {
        serde_json::to_string_pretty(&error.to_error_document())
            .unwrap_or_else(|_| json!({"errors": [{"detail": error.to_string()}]}).to_string())
    }
}

fn pretty(value: &Json) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn aspects(aspects: Vec<specforge_core::migration::ChangeAspect>) -> String {
    aspects
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_core::catalog::{AttributeSpec, AttributeType, EntitySchema, SchemaSnapshot};
    use specforge_core::migration::PlanBuilder;

    fn snapshots() -> (SchemaSnapshot, SchemaSnapshot) {
        let previous = SchemaSnapshot::new(1).with_entity(
            EntitySchema::new("Article")
                .with_attribute(AttributeSpec::new("body", AttributeType::String))
                .with_attribute(AttributeSpec::new("legacy", AttributeType::String)),
        );
        let current = SchemaSnapshot::new(2).with_entity(
            EntitySchema::new("Article")
                .with_attribute(AttributeSpec::new("body", AttributeType::String).required())
                .with_attribute(AttributeSpec::new("title", AttributeType::String)),
        );
        (previous, current)
    }

    #[test]
    fn test_table_diff() {
        let (previous, current) = snapshots();
        let diffs = SchemaDiff::compute_all(&previous, &current);
        let output = TableFormatter.format_diff(&diffs, &[]);

        assert!(output.contains("added"));
        assert!(output.contains("title"));
        assert!(output.contains("required"));
        assert!(output.contains("legacy"));
        assert_eq!(TableFormatter.format_diff(&[], &[]), "No changes");
    }

    #[test]
    fn test_json_plan() {
        let (previous, current) = snapshots();
        let plan = PlanBuilder::now().plan(&previous, &current).unwrap();
        let output: Json = serde_json::from_str(&JsonFormatter.format_plan(&plan, &[])).unwrap();

        let kinds: Vec<&str> = output["operations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|op| op["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["add_column", "change_column", "drop_column"]);
        assert_eq!(output["grade"], "D (destructive)");
    }
}
