//! Per-entity policy configuration.
//!
//! Decoded from the JSON document the generator writes next to the models:
//!
//! ```json
//! {
//!   "jwtSecret": "...",
//!   "entities": {
//!     "Article": {
//!       "stateMachine": {"field": "status", "initial": ["draft"],
//!                        "transitions": {"draft": ["published"]}},
//!       "spellCheck": {"fields": ["title"], "dictionary": ["hello"], "maxSuggestions": 3},
//!       "bitMask": {"column": "permissions", "flags": {"publish": 0, "comment": 1}},
//!       "identity": {"tokenField": "access_token", "issuer": "specforge", "ttlSecs": 3600},
//!       "softDelete": true
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Environment variable consulted when the config carries no JWT secret.
pub const JWT_SECRET_ENV: &str = "SPECFORGE_JWT_SECRET";

/// Policy configuration for every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Secret used to sign issued identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Policies keyed by entity class name.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityPolicyConfig>,
}

impl RuntimeConfig {
    /// Decode a config from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Load a config from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set the JWT secret.
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Set the policies of one entity.
    pub fn with_entity(mut self, name: impl Into<String>, config: EntityPolicyConfig) -> Self {
        self.entities.insert(name.into(), config);
        self
    }

    /// Policies of one entity, if any are configured.
    pub fn entity(&self, name: &str) -> Option<&EntityPolicyConfig> {
        self.entities.get(name)
    }

    /// The JWT secret from the config, falling back to the environment.
    pub fn resolve_jwt_secret(&self) -> Option<String> {
        self.jwt_secret
            .clone()
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok())
            .filter(|secret| !secret.is_empty())
    }
}

/// Policies enabled for one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPolicyConfig {
    /// State machine validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<StateMachineConfig>,
    /// Spell-check enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_check: Option<SpellCheckConfig>,
    /// Bitmask flag packing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_mask: Option<BitMaskConfig>,
    /// Identity issuance on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityConfig>,
    /// Overrides the schema's soft-delete flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_delete: Option<bool>,
    /// Overrides the intake field set, which defaults to every declared
    /// attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intake: Option<Vec<String>>,
}

impl EntityPolicyConfig {
    /// Enable state machine validation.
    pub fn with_state_machine(mut self, config: StateMachineConfig) -> Self {
        self.state_machine = Some(config);
        self
    }

    /// Enable spell-check enrichment.
    pub fn with_spell_check(mut self, config: SpellCheckConfig) -> Self {
        self.spell_check = Some(config);
        self
    }

    /// Enable bitmask flag packing.
    pub fn with_bit_mask(mut self, config: BitMaskConfig) -> Self {
        self.bit_mask = Some(config);
        self
    }

    /// Enable identity issuance.
    pub fn with_identity(mut self, config: IdentityConfig) -> Self {
        self.identity = Some(config);
        self
    }

    /// Override soft deletes.
    pub fn with_soft_delete(mut self, soft_delete: bool) -> Self {
        self.soft_delete = Some(soft_delete);
        self
    }

    /// Override the intake field set.
    pub fn with_intake<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intake = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Finite state machine over one string attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineConfig {
    /// Attribute holding the state.
    pub field: String,
    /// States a new row may start in.
    pub initial: Vec<String>,
    /// Allowed transitions, `from -> [to, ...]`.
    #[serde(default)]
    pub transitions: BTreeMap<String, Vec<String>>,
}

impl StateMachineConfig {
    /// Create a machine over `field` with the given start states.
    pub fn new<I, S>(field: impl Into<String>, initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            initial: initial.into_iter().map(Into::into).collect(),
            transitions: BTreeMap::new(),
        }
    }

    /// Allow `from -> to`.
    pub fn with_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions
            .entry(from.into())
            .or_default()
            .push(to.into());
        self
    }
}

fn default_max_suggestions() -> usize {
    3
}

/// Spell checking of textual attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellCheckConfig {
    /// Attributes to check.
    pub fields: Vec<String>,
    /// Known words.
    #[serde(default)]
    pub dictionary: Vec<String>,
    /// Suggestions reported per unknown word.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl SpellCheckConfig {
    /// Check `fields` against `dictionary`.
    pub fn new<F, D, S, T>(fields: F, dictionary: D) -> Self
    where
        F: IntoIterator<Item = S>,
        D: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            dictionary: dictionary.into_iter().map(Into::into).collect(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

/// Packing of boolean flags into one integer column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitMaskConfig {
    /// Integer column holding the packed flags.
    pub column: String,
    /// Flag name to bit position.
    pub flags: BTreeMap<String, u8>,
}

impl BitMaskConfig {
    /// Pack into `column`.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            flags: BTreeMap::new(),
        }
    }

    /// Map a flag to a bit position.
    pub fn with_flag(mut self, name: impl Into<String>, bit: u8) -> Self {
        self.flags.insert(name.into(), bit);
        self
    }
}

fn default_token_field() -> String {
    "access_token".to_string()
}

fn default_issuer() -> String {
    "specforge".to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

/// Credential issuance for newly created rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Attribute receiving the issued token.
    #[serde(default = "default_token_field")]
    pub token_field: String,
    /// `iss` claim.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_field: default_token_field(),
            issuer: default_issuer(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_config() {
        let config = RuntimeConfig::from_json_str(
            r#"{
                "jwtSecret": "s3cret",
                "entities": {
                    "Article": {
                        "stateMachine": {"field": "status", "initial": ["draft"],
                                         "transitions": {"draft": ["published"]}},
                        "spellCheck": {"fields": ["title"], "dictionary": ["hello"]},
                        "bitMask": {"column": "permissions", "flags": {"publish": 0, "comment": 1}},
                        "identity": {"tokenField": "api_token"},
                        "softDelete": true,
                        "intake": ["title", "status"]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.resolve_jwt_secret().as_deref(), Some("s3cret"));
        let article = config.entity("Article").unwrap();
        let fsm = article.state_machine.as_ref().unwrap();
        assert_eq!(fsm.transitions["draft"], vec!["published".to_string()]);
        assert_eq!(article.spell_check.as_ref().unwrap().max_suggestions, 3);
        assert_eq!(article.bit_mask.as_ref().unwrap().flags["comment"], 1);
        let identity = article.identity.as_ref().unwrap();
        assert_eq!(identity.token_field, "api_token");
        assert_eq!(identity.issuer, "specforge");
        assert_eq!(identity.ttl_secs, 3600);
        assert_eq!(article.soft_delete, Some(true));
        assert!(config.entity("Tag").is_none());
    }

    #[test]
    fn test_builders() {
        let fsm = StateMachineConfig::new("status", ["draft"])
            .with_transition("draft", "review")
            .with_transition("draft", "published");
        assert_eq!(fsm.transitions["draft"].len(), 2);

        let config = EntityPolicyConfig::default()
            .with_state_machine(fsm)
            .with_intake(["title"]);
        assert_eq!(config.intake, Some(vec!["title".to_string()]));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.json");
        std::fs::write(&path, r#"{"jwtSecret": "k"}"#).unwrap();

        let config = RuntimeConfig::from_path(&path).unwrap();
        assert_eq!(config.jwt_secret.as_deref(), Some("k"));
        assert!(config.entities.is_empty());
    }
}
