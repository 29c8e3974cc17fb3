use accounts_admin_shared::{
    authz::{CallerContext, Operation},
    batch,
    error::AdminError,
    users, AppState,
};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, RequestExt, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Main Lambda handler - routes admin operations
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let caller = caller_context(&event);
    route(&state, event.method(), event.uri().path(), event.body(), caller.as_ref()).await
}

/// Caller identity from the claims the API Gateway JWT authorizer verified
fn caller_context(event: &Request) -> Option<CallerContext> {
    event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer())
        .and_then(|auth| auth.jwt.as_ref())
        .and_then(|jwt| CallerContext::from_jwt_claims(&jwt.claims))
}

pub(crate) async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    body: &[u8],
    caller: Option<&CallerContext>,
) -> Result<Response<Body>, Error> {
    tracing::info!(
        "Admin API invoked - Method: {} Path: {} Caller: {}",
        method,
        path,
        caller.map(|c| c.uid.as_str()).unwrap_or("anonymous")
    );

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST,OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type,Authorization")
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    if method != Method::POST {
        return json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &serde_json::json!({"error": "Method not allowed"}),
        );
    }

    let operation = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();

    match operation {
        "createUser" => {
            dispatch(state, caller, Operation::CreateUser, body, |req| {
                users::create_user(state, caller, req)
            })
            .await
        }
        "deleteUser" => {
            dispatch(state, caller, Operation::DeleteUser, body, |req| {
                users::delete_user(state, caller, req)
            })
            .await
        }
        "setUserRole" => {
            dispatch(state, caller, Operation::SetRole, body, |req| {
                users::set_user_role(state, caller, req)
            })
            .await
        }
        "batchUpdateField" => {
            dispatch(state, caller, Operation::BatchUpdateField, body, |req| {
                batch::batch_update_field(state, caller, req)
            })
            .await
        }
        "checkUserRole" => {
            dispatch(state, caller, Operation::CheckRole, body, |req| {
                users::check_user_role(state, caller, req)
            })
            .await
        }
        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "Not found"}))
        }
    }
}

/// Parse the body and run the handler. An unreadable body is reported only
/// once the caller has passed the gate, so refusals never depend on input.
async fn dispatch<Req, Res, Fut>(
    state: &AppState,
    caller: Option<&CallerContext>,
    op: Operation,
    body: &[u8],
    handler: impl FnOnce(Req) -> Fut,
) -> Result<Response<Body>, Error>
where
    Req: DeserializeOwned,
    Res: Serialize,
    Fut: Future<Output = Result<Res, AdminError>>,
{
    let result = match parse_body::<Req>(body) {
        Ok(req) => handler(req).await,
        Err(err) => state.policy.require(caller, op).and(Err(err)),
    };
    respond(result)
}

/// Parse a request body, unwrapping a callable-style `{"data": {...}}` envelope
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AdminError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice(body)
            .map_err(|e| AdminError::invalid_argument(format!("Invalid request body: {}", e)))?
    };

    let value = match value {
        Value::Object(mut map) if map.len() == 1 && map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or_default()
        }
        other => other,
    };

    serde_json::from_value(value)
        .map_err(|e| AdminError::invalid_argument(format!("Invalid request body: {}", e)))
}

fn respond<T: Serialize>(result: Result<T, AdminError>) -> Result<Response<Body>, Error> {
    match result {
        Ok(payload) => json_response(StatusCode::OK, &payload),
        Err(err) => {
            let status = StatusCode::from_u16(err.kind.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &err)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(payload)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accounts_admin_shared::config::Config;
    use accounts_admin_shared::identity::{role_claims, Account, Claims, MemoryIdentityProvider};
    use accounts_admin_shared::store::{field, MemoryDocumentStore};
    use serde_json::json;

    const OWNER: &str = "owner-uid";

    struct Fixture {
        idp: Arc<MemoryIdentityProvider>,
        store: Arc<MemoryDocumentStore>,
        state: Arc<AppState>,
    }

    fn fixture() -> Fixture {
        let idp = Arc::new(MemoryIdentityProvider::new());
        let store = Arc::new(MemoryDocumentStore::new());
        let config = Config::from_lookup(|key| match key {
            "COGNITO_USER_POOL_ID" => Some("pool".to_string()),
            "OWNER_UID" => Some(OWNER.to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::new(idp.clone(), store.clone(), &config);
        Fixture { idp, store, state }
    }

    fn admin() -> CallerContext {
        CallerContext::new("admin-1", role_claims("admin"))
    }

    fn body_json(response: &Response<Body>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    async fn post(f: &Fixture, path: &str, body: Value, caller: Option<&CallerContext>) -> Response<Body> {
        let raw = serde_json::to_vec(&body).unwrap();
        route(&f.state, &Method::POST, path, &raw, caller).await.unwrap()
    }

    #[tokio::test]
    async fn create_user_returns_uid() {
        let f = fixture();
        let caller = admin();
        let response = post(
            &f,
            "/createUser",
            json!({"email": "a@b.com", "password": "secret1", "displayName": "Ann", "role": "viewer", "userName": "ann01"}),
            Some(&caller),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["success"], json!(true));
        let uid = body["uid"].as_str().unwrap();
        assert_eq!(f.store.document("users", uid).unwrap()["role"], json!("viewer"));
    }

    #[tokio::test]
    async fn callable_envelope_is_unwrapped() {
        let f = fixture();
        f.idp.insert(Account {
            uid: "U1".to_string(),
            email: "u1@b.com".to_string(),
            display_name: "U1".to_string(),
            claims: Claims::new(),
        });
        f.store.insert("users", "U1", field("role", "viewer"));
        let caller = admin();

        let response = post(
            &f,
            "/setUserRole",
            json!({"data": {"uid": "U1", "role": "editor"}}),
            Some(&caller),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(&response)["message"],
            json!("Role \"editor\" assigned to user U1")
        );
    }

    #[tokio::test]
    async fn anonymous_caller_gets_403() {
        let f = fixture();
        let response = post(&f, "/deleteUser", json!({"uid": "U1"}), None).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(&response)["error"], json!("permission-denied"));
    }

    #[tokio::test]
    async fn malformed_body_from_anonymous_is_still_denied() {
        let f = fixture();
        let response = route(&f.state, &Method::POST, "/batchUpdateField", b"{oops", None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_argument() {
        let f = fixture();
        let caller = admin();
        let response = route(&f.state, &Method::POST, "/createUser", b"{not json", Some(&caller))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&response)["error"], json!("invalid-argument"));
    }

    #[tokio::test]
    async fn internal_errors_carry_details() {
        let f = fixture();
        let caller = admin();
        let response = post(
            &f,
            "/batchUpdateField",
            json!({"collection": "users", "docIds": ["missing"], "fieldName": "status", "findValue": "a", "replaceValue": "b"}),
            Some(&caller),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(&response);
        assert_eq!(body["error"], json!("internal"));
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn unknown_route_and_method() {
        let f = fixture();
        let response = post(&f, "/projects", json!({}), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = route(&f.state, &Method::GET, "/createUser", b"", None).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = route(&f.state, &Method::OPTIONS, "/createUser", b"", None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["Access-Control-Allow-Origin"],
            "*"
        );
    }
}
