use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Account, Claims, IdentityError, IdentityProvider, NewAccount};

/// Shortest password accepted unless configured otherwise
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

/// In-process identity provider, used by tests and local runs
pub struct MemoryIdentityProvider {
    accounts: Mutex<BTreeMap<String, Account>>,
    min_password_length: usize,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self {
            accounts: Mutex::default(),
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_password_length(mut self, len: usize) -> Self {
        self.min_password_length = len;
        self
    }

    /// Seed an existing account
    pub fn insert(&self, account: Account) {
        self.lock().insert(account.uid.clone(), account);
    }

    pub fn account(&self, uid: &str) -> Option<Account> {
        self.lock().get(uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Account>> {
        // A poisoned map only means another test thread panicked mid-write
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError> {
        if account.password.chars().count() < self.min_password_length {
            return Err(IdentityError::InvalidPassword(format!(
                "must be at least {} characters",
                self.min_password_length
            )));
        }

        let mut accounts = self.lock();
        if accounts.values().any(|a| a.email == account.email) {
            return Err(IdentityError::AlreadyExists(account.email.clone()));
        }

        let uid = uuid::Uuid::new_v4().simple().to_string();
        accounts.insert(
            uid.clone(),
            Account {
                uid: uid.clone(),
                email: account.email.clone(),
                display_name: account.display_name.clone(),
                claims: Claims::new(),
            },
        );
        Ok(uid)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        self.lock()
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| IdentityError::NotFound(uid.to_string()))
    }

    async fn get_account(&self, uid: &str) -> Result<Account, IdentityError> {
        self.account(uid)
            .ok_or_else(|| IdentityError::NotFound(uid.to_string()))
    }

    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), IdentityError> {
        let mut accounts = self.lock();
        let account = accounts
            .get_mut(uid)
            .ok_or_else(|| IdentityError::NotFound(uid.to_string()))?;
        account
            .claims
            .extend(claims.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::role_claims;

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: "secret1".to_string(),
            display_name: "Ann".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let idp = MemoryIdentityProvider::new();
        idp.create_account(&new_account("a@b.com")).await.unwrap();

        let err = idp.create_account(&new_account("a@b.com")).await.unwrap_err();
        assert_eq!(err, IdentityError::AlreadyExists("a@b.com".to_string()));
        assert_eq!(idp.len(), 1);
    }

    #[tokio::test]
    async fn named_claims_are_overwritten_and_others_kept() {
        let idp = MemoryIdentityProvider::new();
        let uid = idp.create_account(&new_account("a@b.com")).await.unwrap();

        let mut claims = role_claims("viewer");
        claims.insert("team".to_string(), "ops".to_string());
        idp.set_custom_claims(&uid, &claims).await.unwrap();
        idp.set_custom_claims(&uid, &role_claims("admin")).await.unwrap();

        let account = idp.get_account(&uid).await.unwrap();
        assert_eq!(account.role(), Some("admin"));
        assert_eq!(account.claims.get("team").map(String::as_str), Some("ops"));
    }

    #[tokio::test]
    async fn rejected_password_creates_nothing() {
        let idp = MemoryIdentityProvider::new().with_min_password_length(8);
        let err = idp.create_account(&new_account("a@b.com")).await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidPassword(_)));
        assert!(idp.is_empty());
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let idp = MemoryIdentityProvider::new();
        assert!(matches!(
            idp.delete_account("ghost").await,
            Err(IdentityError::NotFound(_))
        ));
    }
}
