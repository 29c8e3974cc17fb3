//! Authorization gate shared by every admin operation.

use std::collections::HashMap;
use std::fmt;

use crate::error::AdminError;
use crate::identity::{Claims, ADMIN_ROLE, ROLE_CLAIM};

/// Token claim Cognito uses for the custom role attribute
const COGNITO_ROLE_CLAIM: &str = "custom:role";

/// Claims naming the account, in lookup order. Accounts are keyed by their
/// username (ID token `cognito:username`, access token `username`); `sub`
/// covers tokens from issuers that carry neither.
const UID_CLAIMS: [&str; 3] = ["cognito:username", "username", "sub"];

/// Verified identity of whoever invoked an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub uid: String,
    pub claims: Claims,
}

impl CallerContext {
    pub fn new(uid: impl Into<String>, claims: Claims) -> Self {
        Self { uid: uid.into(), claims }
    }

    /// Build from the authorizer's JWT claims; `None` when no claim names the account
    pub fn from_jwt_claims(jwt: &HashMap<String, String>) -> Option<Self> {
        let uid = UID_CLAIMS
            .iter()
            .find_map(|name| jwt.get(*name).filter(|s| !s.is_empty()))?;
        let mut claims = Claims::new();
        if let Some(role) = jwt.get(COGNITO_ROLE_CLAIM).or_else(|| jwt.get(ROLE_CLAIM)) {
            claims.insert(ROLE_CLAIM.to_string(), role.clone());
        }
        Some(Self::new(uid.clone(), claims))
    }

    pub fn role(&self) -> Option<&str> {
        self.claims.get(ROLE_CLAIM).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateUser,
    DeleteUser,
    SetRole,
    BatchUpdateField,
    CheckRole,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::CreateUser => "createUser",
            Operation::DeleteUser => "deleteUser",
            Operation::SetRole => "setUserRole",
            Operation::BatchUpdateField => "batchUpdateField",
            Operation::CheckRole => "checkUserRole",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    owner_uid: String,
}

impl AccessPolicy {
    pub fn new(owner_uid: impl Into<String>) -> Self {
        Self { owner_uid: owner_uid.into() }
    }

    /// Admin role claim passes every operation. The owner uid passes set-role
    /// only, whatever its claims say.
    pub fn is_authorized(&self, caller: Option<&CallerContext>, op: Operation) -> bool {
        let Some(caller) = caller else {
            return false;
        };

        if caller.role() == Some(ADMIN_ROLE) {
            return true;
        }

        match op {
            Operation::SetRole => caller.uid == self.owner_uid,
            Operation::CreateUser
            | Operation::DeleteUser
            | Operation::BatchUpdateField
            | Operation::CheckRole => false,
        }
    }

    /// Gate an operation, turning a refusal into a permission-denied error
    pub fn require(&self, caller: Option<&CallerContext>, op: Operation) -> Result<(), AdminError> {
        if self.is_authorized(caller, op) {
            return Ok(());
        }
        tracing::warn!(
            uid = caller.map(|c| c.uid.as_str()).unwrap_or("anonymous"),
            operation = %op,
            "Unauthorized admin operation attempt"
        );
        Err(AdminError::permission_denied(op.denial_message()))
    }
}

impl Operation {
    fn denial_message(&self) -> &'static str {
        match self {
            Operation::CreateUser => "Only administrators can create users.",
            Operation::DeleteUser => "Only administrators can delete users.",
            Operation::SetRole => "Only administrators can change roles.",
            Operation::BatchUpdateField | Operation::CheckRole => {
                "Only administrators can perform this operation."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::role_claims;

    const OWNER: &str = "owner-uid";

    fn policy() -> AccessPolicy {
        AccessPolicy::new(OWNER)
    }

    #[test]
    fn admin_passes_every_operation() {
        let admin = CallerContext::new("U1", role_claims("admin"));
        for op in [
            Operation::CreateUser,
            Operation::DeleteUser,
            Operation::SetRole,
            Operation::BatchUpdateField,
            Operation::CheckRole,
        ] {
            assert!(policy().is_authorized(Some(&admin), op), "{op}");
        }
    }

    #[test]
    fn owner_passes_set_role_only() {
        let owner = CallerContext::new(OWNER, Claims::new());
        assert!(policy().is_authorized(Some(&owner), Operation::SetRole));
        assert!(!policy().is_authorized(Some(&owner), Operation::CreateUser));
        assert!(!policy().is_authorized(Some(&owner), Operation::DeleteUser));
        assert!(!policy().is_authorized(Some(&owner), Operation::BatchUpdateField));
    }

    #[test]
    fn other_roles_and_anonymous_are_denied() {
        let viewer = CallerContext::new("U2", role_claims("viewer"));
        assert!(!policy().is_authorized(Some(&viewer), Operation::SetRole));
        assert!(!policy().is_authorized(None, Operation::SetRole));
    }

    #[test]
    fn role_is_read_from_cognito_claim() {
        let jwt = HashMap::from([
            ("sub".to_string(), "U1".to_string()),
            ("custom:role".to_string(), "admin".to_string()),
        ]);
        let caller = CallerContext::from_jwt_claims(&jwt).unwrap();
        assert_eq!(caller.uid, "U1");
        assert_eq!(caller.role(), Some("admin"));
    }

    #[test]
    fn username_claim_wins_over_subject() {
        let id_token = HashMap::from([
            ("sub".to_string(), "1111-sub".to_string()),
            ("cognito:username".to_string(), OWNER.to_string()),
        ]);
        let caller = CallerContext::from_jwt_claims(&id_token).unwrap();
        assert_eq!(caller.uid, OWNER);
        assert!(policy().is_authorized(Some(&caller), Operation::SetRole));

        let access_token = HashMap::from([
            ("sub".to_string(), "1111-sub".to_string()),
            ("username".to_string(), "U1".to_string()),
        ]);
        assert_eq!(CallerContext::from_jwt_claims(&access_token).unwrap().uid, "U1");
    }

    #[test]
    fn claims_without_subject_yield_no_caller() {
        let jwt = HashMap::from([("custom:role".to_string(), "admin".to_string())]);
        assert!(CallerContext::from_jwt_claims(&jwt).is_none());
    }
}
