pub mod types;
pub mod config;
pub mod error;
pub mod authz;
pub mod identity;
pub mod store;
pub mod users;
pub mod batch;
pub mod bootstrap;

use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

use authz::AccessPolicy;
use config::Config;
use identity::{CognitoIdentityProvider, IdentityProvider};
use store::{DocumentStore, DynamoDocumentStore};

/// Shared application state
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn DocumentStore>,
    pub policy: AccessPolicy,
    pub users_collection: String,
}

impl AppState {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            store,
            policy: AccessPolicy::new(config.owner_uid.clone()),
            users_collection: config.users_collection.clone(),
        })
    }

    /// State backed by Cognito and DynamoDB
    pub fn from_clients(
        cognito_client: CognitoClient,
        dynamo_client: DynamoClient,
        config: &Config,
    ) -> Arc<Self> {
        Self::new(
            Arc::new(CognitoIdentityProvider::new(cognito_client, config.user_pool_id.clone())),
            Arc::new(DynamoDocumentStore::new(dynamo_client, config.table_name.clone())),
            config,
        )
    }
}
