//! Identity provider client: account lifecycle and custom claims.

pub mod cognito;
pub mod memory;

pub use cognito::CognitoIdentityProvider;
pub use memory::MemoryIdentityProvider;

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Custom claims attached to an account (claim name -> value)
pub type Claims = BTreeMap<String, String>;

pub const ROLE_CLAIM: &str = "role";
pub const ADMIN_ROLE: &str = "admin";

/// Claims map holding only the role claim
pub fn role_claims(role: &str) -> Claims {
    Claims::from([(ROLE_CLAIM.to_string(), role.to_string())])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub claims: Claims,
}

impl Account {
    pub fn role(&self) -> Option<&str> {
        self.claims.get(ROLE_CLAIM).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("an account with email {0} already exists")]
    AlreadyExists(String),
    #[error("no account found for uid {0}")]
    NotFound(String),
    #[error("password rejected: {0}")]
    InvalidPassword(String),
    #[error("identity provider error: {0}")]
    Service(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates the account and returns its provider-assigned uid. A password
    /// the provider rejects leaves no account behind.
    async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError>;

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError>;

    async fn get_account(&self, uid: &str) -> Result<Account, IdentityError>;

    /// Overwrites the named claims on the account
    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), IdentityError>;
}
