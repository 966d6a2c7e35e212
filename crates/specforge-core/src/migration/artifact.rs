//! Migration artifacts and the stores that hold them.
//!
//! An artifact is the persisted form of one [`MigrationOperation`]. Stores
//! look artifacts up by their action suffix (the token without its time
//! prefix), which is what makes plan regeneration idempotent.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::MigrationError;
use super::plan::{token_action, MigrationOperation, OperationKind, OperationPayload};
use crate::catalog::AttributeSpec;

/// File extension of artifacts in a directory store.
pub const ARTIFACT_EXTENSION: &str = "json";

/// Column definition as written into an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Storage column type.
    pub column_type: String,
    /// Whether the column accepts nulls.
    pub nullable: bool,
    /// Minimum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    /// Maximum length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values.
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl From<&AttributeSpec> for ColumnDefinition {
    fn from(attr: &AttributeSpec) -> Self {
        Self {
            name: attr.name.clone(),
            column_type: attr.attr_type.column_type().to_string(),
            nullable: !attr.required,
            min_length: attr.min_length,
            max_length: attr.max_length,
            default: attr.default.clone(),
            enum_values: attr.enum_values.clone(),
        }
    }
}

/// Persisted form of one migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationArtifact {
    /// Full token, `<prefix>_<action>`.
    pub token: String,
    /// Token without its time prefix.
    pub action: String,
    /// Operation kind.
    pub kind: OperationKind,
    /// Entity class name.
    pub entity: String,
    /// Storage table name.
    pub table: String,
    /// Whether the table tombstones deleted rows. Only set on table creation.
    #[serde(default)]
    pub soft_delete: bool,
    /// Columns created, added or changed (new definition).
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
    /// Previous definition of a changed column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ColumnDefinition>,
    /// Name of a dropped column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropped: Option<String>,
    /// Hex blake3 hash over the structural content.
    pub checksum: String,
}

impl MigrationArtifact {
    /// Build the artifact for an operation.
    pub fn from_operation(op: &MigrationOperation) -> Result<Self, MigrationError> {
        let (soft_delete, columns, previous, dropped) = match &op.payload {
            OperationPayload::Table {
                attributes,
                soft_delete,
            } => (
                *soft_delete,
                attributes.iter().map(ColumnDefinition::from).collect(),
                None,
                None,
            ),
            OperationPayload::Column(attr) => (false, vec![ColumnDefinition::from(attr)], None, None),
            OperationPayload::Changed(change) => (
                false,
                vec![ColumnDefinition::from(&change.new)],
                Some(ColumnDefinition::from(&change.old)),
                None,
            ),
            OperationPayload::Dropped(name) => (false, Vec::new(), None, Some(name.clone())),
        };

        let mut artifact = Self {
            token: op.token.clone(),
            action: op.action(),
            kind: op.kind,
            entity: op.entity_name.clone(),
            table: op.table.clone(),
            soft_delete,
            columns,
            previous,
            dropped,
            checksum: String::new(),
        };
        artifact.checksum = artifact.compute_checksum()?;
        Ok(artifact)
    }

    /// Hash of everything except the token and the checksum itself.
    ///
    /// Two plans generated at different times for the same change produce
    /// the same checksum.
    pub fn compute_checksum(&self) -> Result<String, MigrationError> {
        let content = serde_json::to_vec(&(
            &self.action,
            self.kind,
            &self.table,
            self.soft_delete,
            &self.columns,
            &self.previous,
            &self.dropped,
        ))
        .map_err(|e| MigrationError::Serialization(e.to_string()))?;
        Ok(blake3::hash(&content).to_hex().to_string())
    }

    /// Check the stored checksum against the content.
    pub fn verify(&self) -> Result<(), MigrationError> {
        let expected = self.compute_checksum()?;
        if expected != self.checksum {
            return Err(MigrationError::ArtifactCorrupted {
                token: self.token.clone(),
                message: format!("checksum {} does not match {}", self.checksum, expected),
            });
        }
        Ok(())
    }

    /// Encode as pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, MigrationError> {
        serde_json::to_vec_pretty(self).map_err(|e| MigrationError::Serialization(e.to_string()))
    }

    /// Decode from JSON and verify the checksum.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MigrationError> {
        let artifact: Self = serde_json::from_slice(bytes)
            .map_err(|e| MigrationError::Deserialization(e.to_string()))?;
        artifact.verify()?;
        Ok(artifact)
    }
}

/// Storage for migration artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Find the token of an artifact with the given action suffix.
    fn find_by_suffix(&self, action: &str) -> Result<Option<String>, MigrationError>;

    /// Write an artifact. Returns `false` without writing when an artifact
    /// with the same action suffix already exists.
    fn write(&self, artifact: &MigrationArtifact) -> Result<bool, MigrationError>;

    /// Read an artifact by full token.
    fn read(&self, token: &str) -> Result<Option<MigrationArtifact>, MigrationError>;

    /// All tokens, sorted (which is also replay order).
    fn tokens(&self) -> Result<Vec<String>, MigrationError>;
}

fn matches_action(token: &str, action: &str) -> bool {
    match token_action(token) {
        Some(existing) => existing == action,
        None => token == action || token.ends_with(&format!("_{}", action)),
    }
}

/// In-memory artifact store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<BTreeMap<String, MigrationArtifact>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn find_by_suffix(&self, action: &str) -> Result<Option<String>, MigrationError> {
        Ok(self
            .artifacts
            .read()
            .keys()
            .find(|token| matches_action(token, action))
            .cloned())
    }

    fn write(&self, artifact: &MigrationArtifact) -> Result<bool, MigrationError> {
        let mut artifacts = self.artifacts.write();
        if artifacts
            .keys()
            .any(|token| matches_action(token, &artifact.action))
        {
            return Ok(false);
        }
        artifacts.insert(artifact.token.clone(), artifact.clone());
        Ok(true)
    }

    fn read(&self, token: &str) -> Result<Option<MigrationArtifact>, MigrationError> {
        Ok(self.artifacts.read().get(token).cloned())
    }

    fn tokens(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.artifacts.read().keys().cloned().collect())
    }
}

/// Artifact store writing one `<token>.json` file per artifact.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    dir: PathBuf,
}

impl DirectoryArtifactStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The store's directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", token, ARTIFACT_EXTENSION))
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn find_by_suffix(&self, action: &str) -> Result<Option<String>, MigrationError> {
        Ok(self
            .tokens()?
            .into_iter()
            .find(|token| matches_action(token, action)))
    }

    fn write(&self, artifact: &MigrationArtifact) -> Result<bool, MigrationError> {
        if let Some(existing) = self.find_by_suffix(&artifact.action)? {
            debug!(token = %existing, action = %artifact.action, "artifact already present");
            return Ok(false);
        }

        let bytes = artifact.to_json()?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.artifact_path(&artifact.token))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(true)
    }

    fn read(&self, token: &str) -> Result<Option<MigrationArtifact>, MigrationError> {
        let path = self.artifact_path(token);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        MigrationArtifact::from_json(&bytes).map(Some)
    }

    fn tokens(&self) -> Result<Vec<String>, MigrationError> {
        let mut tokens = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ARTIFACT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                tokens.push(stem.to_string());
            }
        }
        tokens.sort();
        Ok(tokens)
    }
}

/// Artifact store kept in a sled tree next to the data it migrates.
pub struct TreeArtifactStore {
    tree: sled::Tree,
}

impl TreeArtifactStore {
    /// Tree name for migration artifacts.
    pub const TREE_NAME: &'static str = "migration:artifacts";

    /// Open or create the artifact tree.
    pub fn open(db: &sled::Db) -> Result<Self, MigrationError> {
        let tree = db
            .open_tree(Self::TREE_NAME)
            .map_err(|e| MigrationError::Storage(crate::error::Error::Storage(e)))?;
        Ok(Self { tree })
    }
}

impl ArtifactStore for TreeArtifactStore {
    fn find_by_suffix(&self, action: &str) -> Result<Option<String>, MigrationError> {
        Ok(self
            .tokens()?
            .into_iter()
            .find(|token| matches_action(token, action)))
    }

    fn write(&self, artifact: &MigrationArtifact) -> Result<bool, MigrationError> {
        if self.find_by_suffix(&artifact.action)?.is_some() {
            return Ok(false);
        }
        let bytes = artifact.to_json()?;
        let previous = self
            .tree
            .compare_and_swap(artifact.token.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|e| MigrationError::Storage(crate::error::Error::Storage(e)))?;
        Ok(previous.is_ok())
    }

    fn read(&self, token: &str) -> Result<Option<MigrationArtifact>, MigrationError> {
        match self
            .tree
            .get(token.as_bytes())
            .map_err(|e| MigrationError::Storage(crate::error::Error::Storage(e)))?
        {
            Some(bytes) => MigrationArtifact::from_json(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn tokens(&self) -> Result<Vec<String>, MigrationError> {
        let mut tokens = Vec::new();
        for key in self.tree.iter().keys() {
            let key = key.map_err(|e| MigrationError::Storage(crate::error::Error::Storage(e)))?;
            tokens.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(tokens)
    }
}
