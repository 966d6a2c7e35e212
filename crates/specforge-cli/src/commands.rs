//! Subcommand execution.

use std::path::Path;

use specforge_core::migration::{
    ArtifactStore, DirectoryArtifactStore, MigrationError, PlanBuilder, SchemaDiff,
};
use specforge_core::runtime::{BulkProcessor, EntityRegistry, ProcessError, RuntimeConfig};
use specforge_core::{SchemaSnapshot, StorageConfig, StorageEngine};
use specforge_proto::{BulkDocument, ErrorDocument, ErrorObject, MutationKind};
use thiserror::Error;
use tracing::info;

use crate::formatter::Formatter;
use crate::{BulkOp, Command};

/// Failure of one CLI invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or decoding an input failed.
    #[error("{0}")]
    Core(#[from] specforge_core::Error),

    /// The bulk document is malformed.
    #[error("{0}")]
    Document(#[from] specforge_proto::Error),

    /// Planning or writing artifacts failed.
    #[error("{0}")]
    Migration(#[from] MigrationError),

    /// The batch was rejected and rolled back.
    #[error("{0}")]
    Process(#[from] ProcessError),

    /// Reading an input file failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Render as a JSON:API error document.
    pub fn to_error_document(&self) -> ErrorDocument {
        let object = match self {
            CliError::Process(e) => e.to_error_object(),
            CliError::Document(e) => {
                ErrorObject::new(400, "INVALID_DOCUMENT", "Invalid document", e.to_string())
            }
            CliError::Core(e) => ErrorObject::new(500, "CORE_ERROR", "Input error", e.to_string()),
            CliError::Migration(e) => {
                ErrorObject::new(500, "MIGRATION_ERROR", "Migration failed", e.to_string())
            }
            CliError::Io(e) => ErrorObject::new(500, "IO_ERROR", "I/O failure", e.to_string()),
        };
        object.into()
    }
}

/// Run one subcommand and return its rendered output.
pub fn execute(command: Command, formatter: &dyn Formatter) -> Result<String, CliError> {
    match command {
        Command::Diff { previous, current } => diff(&previous, &current, formatter),
        Command::Plan {
            previous,
            current,
            out,
            dry_run,
        } => plan(&previous, &current, &out, dry_run, formatter),
        Command::Bulk {
            db,
            schema,
            config,
            entity,
            op,
            input,
        } => bulk(
            &db,
            &schema,
            config.as_deref(),
            &entity,
            op,
            &input,
            formatter,
        ),
    }
}

fn diff(previous: &Path, current: &Path, formatter: &dyn Formatter) -> Result<String, CliError> {
    let previous = SchemaSnapshot::from_path(previous)?;
    let current = SchemaSnapshot::from_path(current)?;

    let diffs: Vec<SchemaDiff> = SchemaDiff::compute_all(&previous, &current)
        .into_iter()
        .filter(|diff| !diff.is_empty() && previous.contains(&diff.entity_name))
        .collect();
    let new_entities: Vec<&str> = current
        .entity_names()
        .filter(|name| !previous.contains(name))
        .collect();

    Ok(formatter.format_diff(&diffs, &new_entities))
}

fn plan(
    previous: &Path,
    current: &Path,
    out: &Path,
    dry_run: bool,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let previous = SchemaSnapshot::from_path(previous)?;
    let current = SchemaSnapshot::from_path(current)?;
    let store = DirectoryArtifactStore::open(out)?;

    let plan = PlanBuilder::now()
        .with_existing(&store)
        .plan(&previous, &current)?;

    let written = if dry_run {
        Vec::new()
    } else {
        plan.write_to(&store)?
    };
    info!(
        dir = %store.path().display(),
        written = written.len(),
        stored = store.tokens()?.len(),
        "plan finished"
    );

    Ok(formatter.format_plan(&plan, &written))
}

#[allow(clippy::too_many_arguments)]
fn bulk(
    db: &Path,
    schema: &Path,
    config: Option<&Path>,
    entity: &str,
    op: BulkOp,
    input: &Path,
    formatter: &dyn Formatter,
) -> Result<String, CliError> {
    let snapshot = SchemaSnapshot::from_path(schema)?;
    let config = match config {
        Some(path) => RuntimeConfig::from_path(path)?,
        None => RuntimeConfig::default(),
    };
    let registry = EntityRegistry::new(snapshot, config);
    let ctx = registry.resolve(entity)?;

    let document = BulkDocument::from_json_str(&std::fs::read_to_string(input)?)?;
    let engine = StorageEngine::open(StorageConfig::new(db))?;
    let processor = BulkProcessor::new(&engine);

    let output = match op {
        BulkOp::Create => {
            let mutations =
                document.into_mutations(MutationKind::Create, Some(ctx.entity.as_str()))?;
            formatter.format_outcome(&processor.create_batch(&mutations, &ctx)?)
        }
        BulkOp::Update => {
            let mutations =
                document.into_mutations(MutationKind::Update, Some(ctx.entity.as_str()))?;
            formatter.format_outcome(&processor.update_batch(&mutations, &ctx)?)
        }
        BulkOp::Delete => {
            let identities: Vec<String> = document
                .into_mutations(MutationKind::Delete, Some(ctx.entity.as_str()))?
                .into_iter()
                .filter_map(|mutation| mutation.identity)
                .collect();
            processor.delete_batch(&identities, &ctx)?;
            formatter.format_deleted(&ctx.entity, identities.len())
        }
    };

    engine.flush()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{create_formatter, OutputFormat};

    const PREVIOUS: &str = r#"{"version": 1, "entities": [
        {"name": "Article", "attributes": [{"name": "body", "type": "string"}]}
    ]}"#;

    const CURRENT: &str = r#"{"version": 2, "entities": [
        {"name": "Article", "attributes": [
            {"name": "body", "type": "string"},
            {"name": "title", "type": "string", "required": true}
        ]},
        {"name": "ArticleTag", "attributes": [{"name": "label", "type": "string"}]}
    ]}"#;

    fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_plan_writes_artifacts_once() {
        let dir = tempfile::tempdir().unwrap();
        let previous = write(dir.path(), "previous.json", PREVIOUS);
        let current = write(dir.path(), "current.json", CURRENT);
        let out = dir.path().join("migrations");
        let formatter = create_formatter(OutputFormat::Json);

        let command = || Command::Plan {
            previous: previous.clone(),
            current: current.clone(),
            out: out.clone(),
            dry_run: false,
        };

        let first: serde_json::Value =
            serde_json::from_str(&execute(command(), &*formatter).unwrap()).unwrap();
        assert_eq!(first["written"].as_array().unwrap().len(), 2);

        let second: serde_json::Value =
            serde_json::from_str(&execute(command(), &*formatter).unwrap()).unwrap();
        assert!(second["operations"].as_array().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_bulk_create_and_error_document() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(dir.path(), "schema.json", CURRENT);
        let input = write(
            dir.path(),
            "tags.json",
            r#"{"data": [{"type": "ArticleTag", "attributes": {"label": "rust"}}]}"#,
        );
        let formatter = create_formatter(OutputFormat::Json);

        let output = execute(
            Command::Bulk {
                db: dir.path().join("db"),
                schema: schema.clone(),
                config: None,
                entity: "ArticleTag".to_string(),
                op: BulkOp::Create,
                input,
            },
            &*formatter,
        )
        .unwrap();
        let response: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(response["data"][0]["attributes"]["label"], "rust");

        let missing = write(
            dir.path(),
            "missing.json",
            r#"{"data": [{"type": "ArticleTag", "id": "999999"}]}"#,
        );
        let err = execute(
            Command::Bulk {
                db: dir.path().join("db"),
                schema,
                config: None,
                entity: "ArticleTag".to_string(),
                op: BulkOp::Delete,
                input: missing,
            },
            &*formatter,
        )
        .unwrap_err();
        let document = err.to_error_document();
        assert_eq!(document.errors[0].status, "404");
        assert_eq!(document.errors[0].code, "IDENTITY_NOT_FOUND");
    }
}
