//! Out-of-band grant of the admin role, run from an operator's machine.
//!
//! Everything runs inside an [`AdminSession`]: a uniquely named set of
//! clients built from a local key file, owned by one run and closed when the
//! run ends whatever its outcome.

use aws_config::{AppName, BehaviorVersion, Region};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client as DynamoClient;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::DEFAULT_USERS_COLLECTION;
use crate::identity::{CognitoIdentityProvider, IdentityError, IdentityProvider, ADMIN_ROLE};
use crate::store::{DocumentStore, DynamoDocumentStore};
use crate::users::{assign_role, AssignRoleError};

pub const DEFAULT_KEY_FILE: &str = "service-account-key.json";

const SESSION_PREFIX: &str = "set-admin-claim";

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("could not read key file {path}: {source}")]
    KeyFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid key file {path}: {source}")]
    KeyFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not open session {name}: {reason}")]
    Session { name: String, reason: String },
    #[error("no user found with uid {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Identity(IdentityError),
    #[error(transparent)]
    AssignRole(#[from] AssignRoleError),
}

/// Privileged credential read from the operator's key file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    pub user_pool_id: String,
    pub table_name: String,
    #[serde(default = "default_users_collection")]
    pub users_collection: String,
}

fn default_users_collection() -> String {
    DEFAULT_USERS_COLLECTION.to_string()
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, BootstrapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| BootstrapError::KeyFileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| BootstrapError::KeyFileParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Session name unique to this run
pub fn session_name() -> String {
    format!("{}-{}", SESSION_PREFIX, chrono::Utc::now().timestamp_millis())
}

pub struct AdminSession {
    name: String,
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    users_collection: String,
}

impl AdminSession {
    /// Build fresh clients from the key file credential, tagged with the session name
    pub async fn open(key: &ServiceAccountKey) -> Result<Self, BootstrapError> {
        let name = session_name();
        let app_name = AppName::new(name.clone()).map_err(|e| BootstrapError::Session {
            name: name.clone(),
            reason: e.to_string(),
        })?;

        let credentials = Credentials::new(
            key.access_key_id.clone(),
            key.secret_access_key.clone(),
            key.session_token.clone(),
            None,
            "service-account-key",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(key.region.clone()))
            .credentials_provider(credentials)
            .app_name(app_name)
            .load()
            .await;

        tracing::debug!(session = %name, region = %key.region, "Admin session opened");

        Ok(Self::with_clients(
            name,
            Arc::new(CognitoIdentityProvider::new(
                CognitoClient::new(&config),
                key.user_pool_id.clone(),
            )),
            Arc::new(DynamoDocumentStore::new(
                DynamoClient::new(&config),
                key.table_name.clone(),
            )),
            key.users_collection.clone(),
        ))
    }

    pub fn with_clients(
        name: impl Into<String>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        users_collection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            identity,
            store,
            users_collection: users_collection.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Verify the account exists, then set the admin role in claims and profile
    pub async fn grant_admin(&self, uid: &str) -> Result<(), BootstrapError> {
        self.identity.get_account(uid).await.map_err(|e| match e {
            IdentityError::NotFound(uid) => BootstrapError::UserNotFound(uid),
            other => BootstrapError::Identity(other),
        })?;
        tracing::info!(session = %self.name, "User {} found, assigning admin role", uid);

        assign_role(
            self.identity.as_ref(),
            self.store.as_ref(),
            &self.users_collection,
            uid,
            ADMIN_ROLE,
        )
        .await?;

        Ok(())
    }

    /// Release the session's clients. Consuming `self` drops both SDK clients
    /// and their connection pools.
    pub fn close(self) {
        tracing::debug!(session = %self.name, "Admin session closed");
    }
}

/// Grant admin inside `session`, closing it on success and failure alike
pub async fn grant_admin_once(session: AdminSession, uid: &str) -> Result<(), BootstrapError> {
    let result = session.grant_admin(uid).await;
    session.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Account, Claims, MemoryIdentityProvider};
    use crate::store::{field, MemoryDocumentStore};
    use serde_json::json;

    fn session(idp: Arc<MemoryIdentityProvider>, store: Arc<MemoryDocumentStore>) -> AdminSession {
        AdminSession::with_clients(session_name(), idp, store, "users")
    }

    #[test]
    fn session_names_carry_prefix() {
        assert!(session_name().starts_with("set-admin-claim-"));
    }

    #[test]
    fn key_file_defaults_users_collection() {
        let key = ServiceAccountKey::parse(
            r#"{
                "project_id": "accounts-prod",
                "region": "us-east-1",
                "access_key_id": "AKIA",
                "secret_access_key": "secret",
                "user_pool_id": "us-east-1_pool",
                "table_name": "accounts-admin"
            }"#,
        )
        .unwrap();
        assert_eq!(key.users_collection, "users");
        assert!(key.session_token.is_none());
    }

    #[test]
    fn missing_key_file_is_reported() {
        let err = ServiceAccountKey::load(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, BootstrapError::KeyFileRead { .. }));
    }

    #[tokio::test]
    async fn grants_admin_in_claims_and_profile() {
        let idp = Arc::new(MemoryIdentityProvider::new());
        let store = Arc::new(MemoryDocumentStore::new());
        idp.insert(Account {
            uid: "U1".to_string(),
            email: "a@b.com".to_string(),
            display_name: "Ann".to_string(),
            claims: Claims::new(),
        });
        store.insert("users", "U1", field("role", "viewer"));

        grant_admin_once(session(idp.clone(), store.clone()), "U1").await.unwrap();

        assert_eq!(idp.account("U1").unwrap().role(), Some("admin"));
        assert_eq!(store.document("users", "U1").unwrap()["role"], json!("admin"));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let idp = Arc::new(MemoryIdentityProvider::new());
        let store = Arc::new(MemoryDocumentStore::new());

        let err = grant_admin_once(session(idp, store.clone()), "ghost").await.unwrap_err();

        assert!(matches!(err, BootstrapError::UserNotFound(uid) if uid == "ghost"));
        assert_eq!(store.count("users"), 0);
    }
}
