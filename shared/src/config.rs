use std::env;

/// Operator uid allowed to assign roles without holding the admin claim
pub const DEFAULT_OWNER_UID: &str = "FIz4huk76wQXZjJaTbi8CWVGqJ63";
pub const DEFAULT_TABLE_NAME: &str = "accounts-admin";
pub const DEFAULT_USERS_COLLECTION: &str = "users";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Runtime configuration read once at cold start
#[derive(Debug, Clone)]
pub struct Config {
    pub table_name: String,
    pub user_pool_id: String,
    pub users_collection: String,
    pub owner_uid: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user_pool_id =
            non_empty("COGNITO_USER_POOL_ID").ok_or(ConfigError::Missing("COGNITO_USER_POOL_ID"))?;

        Ok(Self {
            table_name: non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            user_pool_id,
            users_collection: non_empty("USERS_COLLECTION")
                .unwrap_or_else(|| DEFAULT_USERS_COLLECTION.to_string()),
            owner_uid: non_empty("OWNER_UID").unwrap_or_else(|| DEFAULT_OWNER_UID.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_unset() {
        let vars: HashMap<&str, &str> = [("COGNITO_USER_POOL_ID", "us-east-1_abc")].into();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.users_collection, "users");
        assert_eq!(config.owner_uid, DEFAULT_OWNER_UID);
    }

    #[test]
    fn user_pool_is_required() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert_eq!(err.to_string(), "COGNITO_USER_POOL_ID must be set");
    }

    #[test]
    fn owner_can_be_overridden() {
        let vars: HashMap<&str, &str> =
            [("COGNITO_USER_POOL_ID", "pool"), ("OWNER_UID", "operator-1")].into();
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.owner_uid, "operator-1");
    }
}
