use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, MessageActionType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;

use super::{Account, Claims, IdentityError, IdentityProvider, NewAccount};

/// Prefix Cognito puts in front of developer-defined attributes
const CUSTOM_PREFIX: &str = "custom:";

/// Cognito user pool backed identity provider.
///
/// Accounts are created with a generated UUID as username, which doubles as
/// the account uid for every later admin call. Custom claims live in
/// `custom:<name>` attributes and reach the ID token under the same name.
pub struct CognitoIdentityProvider {
    client: CognitoClient,
    user_pool_id: String,
}

impl CognitoIdentityProvider {
    pub fn new(client: CognitoClient, user_pool_id: impl Into<String>) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
        }
    }

    async fn email_in_use(&self, email: &str) -> Result<bool, IdentityError> {
        let filter = format!("email = \"{}\"", email.replace('\\', "\\\\").replace('"', "\\\""));
        let output = self
            .client
            .list_users()
            .user_pool_id(&self.user_pool_id)
            .filter(filter)
            .limit(1)
            .send()
            .await
            .map_err(|e| IdentityError::Service(DisplayErrorContext(&e).to_string()))?;

        Ok(!output.users().is_empty())
    }
}

fn attribute(name: &str, value: &str) -> Result<AttributeType, IdentityError> {
    AttributeType::builder()
        .name(name)
        .value(value)
        .build()
        .map_err(|e| IdentityError::Service(e.to_string()))
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn create_account(&self, account: &NewAccount) -> Result<String, IdentityError> {
        if self.email_in_use(&account.email).await? {
            return Err(IdentityError::AlreadyExists(account.email.clone()));
        }

        let uid = uuid::Uuid::new_v4().to_string();

        // The temporary password is checked against the pool policy before the user exists
        self.client
            .admin_create_user()
            .user_pool_id(&self.user_pool_id)
            .username(&uid)
            .temporary_password(&account.password)
            .user_attributes(attribute("email", &account.email)?)
            .user_attributes(attribute("email_verified", "true")?)
            .user_attributes(attribute("name", &account.display_name)?)
            .message_action(MessageActionType::Suppress)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_username_exists_exception() => {
                    IdentityError::AlreadyExists(account.email.clone())
                }
                Some(err) if err.is_invalid_password_exception() => {
                    IdentityError::InvalidPassword(DisplayErrorContext(&e).to_string())
                }
                _ => IdentityError::Service(DisplayErrorContext(&e).to_string()),
            })?;

        // Admin-created users start in FORCE_CHANGE_PASSWORD; make the supplied one permanent
        let confirmed = self
            .client
            .admin_set_user_password()
            .user_pool_id(&self.user_pool_id)
            .username(&uid)
            .password(&account.password)
            .permanent(true)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_invalid_password_exception() => {
                    IdentityError::InvalidPassword(DisplayErrorContext(&e).to_string())
                }
                _ => IdentityError::Service(DisplayErrorContext(&e).to_string()),
            });

        if let Err(err) = confirmed {
            // An unconfirmed user would block every retry with the same email
            if let Err(cleanup) = self.delete_account(&uid).await {
                tracing::error!(uid = %uid, error = %cleanup, "Failed to remove unconfirmed account");
            }
            return Err(err);
        }

        Ok(uid)
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        self.client
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(uid)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_user_not_found_exception() => {
                    IdentityError::NotFound(uid.to_string())
                }
                _ => IdentityError::Service(DisplayErrorContext(&e).to_string()),
            })?;

        Ok(())
    }

    async fn get_account(&self, uid: &str) -> Result<Account, IdentityError> {
        let output = self
            .client
            .admin_get_user()
            .user_pool_id(&self.user_pool_id)
            .username(uid)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(err) if err.is_user_not_found_exception() => {
                    IdentityError::NotFound(uid.to_string())
                }
                _ => IdentityError::Service(DisplayErrorContext(&e).to_string()),
            })?;

        let mut account = Account {
            uid: output.username().to_string(),
            email: String::new(),
            display_name: String::new(),
            claims: Claims::new(),
        };

        for attr in output.user_attributes() {
            let value = attr.value().unwrap_or_default().to_string();
            match attr.name() {
                "email" => account.email = value,
                "name" => account.display_name = value,
                name => {
                    if let Some(claim) = name.strip_prefix(CUSTOM_PREFIX) {
                        account.claims.insert(claim.to_string(), value);
                    }
                }
            }
        }

        Ok(account)
    }

    async fn set_custom_claims(&self, uid: &str, claims: &Claims) -> Result<(), IdentityError> {
        let mut request = self
            .client
            .admin_update_user_attributes()
            .user_pool_id(&self.user_pool_id)
            .username(uid);

        for (name, value) in claims {
            request = request.user_attributes(attribute(&format!("{CUSTOM_PREFIX}{name}"), value)?);
        }

        request.send().await.map_err(|e| match e.as_service_error() {
            Some(err) if err.is_user_not_found_exception() => IdentityError::NotFound(uid.to_string()),
            _ => IdentityError::Service(DisplayErrorContext(&e).to_string()),
        })?;

        Ok(())
    }
}
