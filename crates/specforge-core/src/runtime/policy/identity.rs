//! Identity issuance for newly created rows.
//!
//! Each created row receives a signed HS256 token whose `sub` claim is the
//! row's identity. The token is written back to the row inside the batch
//! transaction, and the reloaded row replaces the model the processor holds.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use specforge_proto::MutationKind;
use tracing::debug;

use super::{PolicyStep, StepScope};
use crate::runtime::config::IdentityConfig;
use crate::runtime::error::ProcessError;
use crate::runtime::model::Model;

/// Claims carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Row identity.
    pub sub: String,
    /// Entity class name.
    pub entity: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: u64,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

impl IdentityClaims {
    /// Claims for `sub` of `entity`, valid for `ttl_secs` from now.
    pub fn new(
        sub: impl Into<String>,
        entity: impl Into<String>,
        issuer: impl Into<String>,
        ttl_secs: u64,
    ) -> Self {
        let iat = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            sub: sub.into(),
            entity: entity.into(),
            iss: issuer.into(),
            iat,
            exp: iat + ttl_secs,
        }
    }
}

/// Signs identity claims.
pub trait TokenIssuer: Send + Sync {
    /// Encode `claims` into a token.
    fn issue(&self, claims: &IdentityClaims) -> Result<String, String>;
}

/// HMAC-SHA256 JWT issuer.
pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtIssuer {
    /// Create an issuer with an HMAC secret.
    pub fn with_secret(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Create an issuer with an HMAC secret string.
    pub fn with_secret_str(secret: &str, issuer: impl Into<String>) -> Self {
        Self::with_secret(secret.as_bytes(), issuer)
    }

    /// Decode and validate a token issued here.
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        decode::<IdentityClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| format!("invalid token: {}", e))
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, claims: &IdentityClaims) -> Result<String, String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| format!("token encoding failed: {}", e))
    }
}

/// Issues a token for every created row.
pub struct IdentityPolicy {
    config: IdentityConfig,
    issuer: Box<dyn TokenIssuer>,
}

impl IdentityPolicy {
    /// Create a policy signing with `issuer`.
    pub fn new(config: IdentityConfig, issuer: impl TokenIssuer + 'static) -> Self {
        Self {
            config,
            issuer: Box::new(issuer),
        }
    }

    /// Attribute receiving the token.
    pub fn token_field(&self) -> &str {
        &self.config.token_field
    }
}

impl PolicyStep for IdentityPolicy {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn after_persist(
        &self,
        scope: &mut StepScope<'_, '_>,
        mut model: Model,
    ) -> Result<Model, ProcessError> {
        if scope.kind != MutationKind::Create {
            return Ok(model);
        }
        let Some(id) = model.id else {
            return Err(scope.failure(self.name(), "row has no identity after insert"));
        };

        let claims = IdentityClaims::new(
            id.to_string(),
            scope.entity,
            self.config.issuer.clone(),
            self.config.ttl_secs,
        );
        let token = self
            .issuer
            .issue(&claims)
            .map_err(|message| scope.failure(self.name(), message))?;

        model.set(self.config.token_field.clone(), token);
        scope.tx.update(scope.table, model.to_record(id));

        // Hand back the stored row, not the instance we wrote from.
        let fresh = scope
            .tx
            .find(scope.table, id)?
            .ok_or_else(|| scope.failure(self.name(), format!("row {id} vanished after write")))?;

        debug!(entity = scope.entity, id, "identity issued");
        Ok(Model::from_record(scope.entity, scope.table, fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::outcome::ItemMeta;
    use crate::storage::{StorageConfig, StorageEngine};
    use specforge_proto::ResourceMutation;

    struct FailingIssuer;

    impl TokenIssuer for FailingIssuer {
        fn issue(&self, _claims: &IdentityClaims) -> Result<String, String> {
            Err("signer offline".to_string())
        }
    }

    fn stored_model(tx: &mut crate::storage::Transaction<'_>) -> Model {
        let model = Model::new("User", "user").with_attribute("name", "ada");
        let record = model.to_record(11);
        tx.insert("user", record.clone());
        Model::from_record("User", "user", record)
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = JwtIssuer::with_secret_str("s3cret", "specforge");
        let claims = IdentityClaims::new("11", "User", "specforge", 60);
        let token = issuer.issue(&claims).unwrap();

        let decoded = issuer.verify(&token).unwrap();
        assert_eq!(decoded, claims);

        let other = JwtIssuer::with_secret_str("other", "specforge");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_token_written_and_model_reloaded() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
        let model = stored_model(&mut tx);
        let mutation = ResourceMutation::create(vec![]);
        let mut meta = ItemMeta::new();
        let mut scope = StepScope {
            entity: "User",
            table: "user",
            kind: MutationKind::Create,
            index: 0,
            mutation: &mutation,
            tx: &mut tx,
            meta: &mut meta,
        };

        let policy = IdentityPolicy::new(
            IdentityConfig::default(),
            JwtIssuer::with_secret_str("s3cret", "specforge"),
        );
        let out = policy.after_persist(&mut scope, model).unwrap();
        let token = out.get_str("access_token").unwrap().to_string();
        assert_eq!(out.get_str("name"), Some("ada"));

        let claims = JwtIssuer::with_secret_str("s3cret", "specforge")
            .verify(&token)
            .unwrap();
        assert_eq!(claims.sub, "11");
        assert_eq!(claims.entity, "User");

        tx.commit().unwrap();
        let record = engine.get("user", 11).unwrap().unwrap();
        assert_eq!(
            record.get("access_token").and_then(|v| v.as_str()),
            Some(token.as_str())
        );
    }

    #[test]
    fn test_update_is_untouched() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
        let model = stored_model(&mut tx);
        let mutation = ResourceMutation::update("11", vec![]);
        let mut meta = ItemMeta::new();
        let mut scope = StepScope {
            entity: "User",
            table: "user",
            kind: MutationKind::Update,
            index: 0,
            mutation: &mutation,
            tx: &mut tx,
            meta: &mut meta,
        };

        let policy = IdentityPolicy::new(
            IdentityConfig::default(),
            JwtIssuer::with_secret_str("s3cret", "specforge"),
        );
        let out = policy.after_persist(&mut scope, model.clone()).unwrap();
        assert_eq!(out, model);
    }

    #[test]
    fn test_issuer_failure_is_policy_failure() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let mut tx = engine.transaction();
        let model = stored_model(&mut tx);
        let mutation = ResourceMutation::create(vec![]);
        let mut meta = ItemMeta::new();
        let mut scope = StepScope {
            entity: "User",
            table: "user",
            kind: MutationKind::Create,
            index: 2,
            mutation: &mutation,
            tx: &mut tx,
            meta: &mut meta,
        };

        let policy = IdentityPolicy::new(IdentityConfig::default(), FailingIssuer);
        let err = policy.after_persist(&mut scope, model).unwrap_err();
        match err {
            ProcessError::PolicyFailure {
                policy,
                index,
                message,
                ..
            } => {
                assert_eq!(policy, "identity");
                assert_eq!(index, 2);
                assert_eq!(message, "signer offline");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
