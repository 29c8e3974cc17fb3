use lambda_http::{run, service_fn, tracing, Error, Request};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use accounts_admin_shared::{config::Config, AppState};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;
    tracing::info!(
        table = %config.table_name,
        users_collection = %config.users_collection,
        "Starting accounts admin lambda"
    );

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let state = AppState::from_clients(
        CognitoClient::new(&aws_config),
        DynamoClient::new(&aws_config),
        &config,
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
