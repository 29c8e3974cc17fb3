use crate::authz::{CallerContext, Operation};
use crate::error::AdminError;
use crate::identity::{role_claims, IdentityError, IdentityProvider, NewAccount};
use crate::store::{field, DocumentStore, StoreError};
use crate::types::{
    present, CheckUserRoleRequest, CreateUserRequest, CreateUserResponse, DeleteUserRequest,
    MessageResponse, RoleCheckResponse, SetUserRoleRequest, SuccessResponse, UserProfile,
};
use crate::AppState;

/// Failure of one half of a role assignment. The claim is written first, so
/// a `Document` failure leaves the claim already changed.
#[derive(Debug, thiserror::Error)]
pub enum AssignRoleError {
    #[error("failed to set role claim: {0}")]
    Claims(#[source] IdentityError),
    #[error("failed to update profile document: {0}")]
    Document(#[source] StoreError),
}

/// Write `role` to the account claims, then to the profile document.
/// No rollback: the second write is attempted only after the first succeeds.
pub async fn assign_role(
    identity: &dyn IdentityProvider,
    store: &dyn DocumentStore,
    collection: &str,
    uid: &str,
    role: &str,
) -> Result<(), AssignRoleError> {
    identity
        .set_custom_claims(uid, &role_claims(role))
        .await
        .map_err(|e| {
            tracing::error!(uid, step = "set_claims", error = %e, "Role assignment failed");
            AssignRoleError::Claims(e)
        })?;
    tracing::info!("Role '{}' set in claims for {}", role, uid);

    store
        .update(collection, uid, &field("role", role))
        .await
        .map_err(|e| {
            tracing::error!(
                uid,
                step = "update_document",
                error = %e,
                "Role claim changed but profile document was not updated"
            );
            AssignRoleError::Document(e)
        })?;
    tracing::info!("Role '{}' mirrored to profile document {}", role, uid);

    Ok(())
}

/// Create an account, tag it with its role and write its profile document
pub async fn create_user(
    state: &AppState,
    caller: Option<&CallerContext>,
    req: CreateUserRequest,
) -> Result<CreateUserResponse, AdminError> {
    state.policy.require(caller, Operation::CreateUser)?;

    let (Some(email), Some(password), Some(display_name), Some(role), Some(user_name)) = (
        present(&req.email),
        present(&req.password),
        present(&req.display_name),
        present(&req.role),
        present(&req.user_name),
    ) else {
        return Err(AdminError::invalid_argument(
            "Missing required data (email, password, displayName, role, userName).",
        ));
    };

    let internal = |e: &dyn std::fmt::Display| {
        AdminError::internal("An error occurred on the server while creating the user.", e)
    };

    let uid = state
        .identity
        .create_account(&NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
        })
        .await
        .map_err(|e| {
            tracing::error!(email, step = "create_account", error = %e, "User creation failed");
            match e {
                IdentityError::AlreadyExists(_) => {
                    AdminError::already_exists("The email address is already in use.")
                }
                other => internal(&other),
            }
        })?;
    tracing::info!("Auth account created: {}", uid);

    state
        .identity
        .set_custom_claims(&uid, &role_claims(role))
        .await
        .map_err(|e| {
            tracing::error!(uid = %uid, step = "set_claims", error = %e, "Account created without role claim");
            internal(&e)
        })?;
    tracing::info!("Role '{}' assigned to {}", role, uid);

    let profile = UserProfile {
        email: email.to_string(),
        display_name: display_name.to_string(),
        role: role.to_string(),
        user_name: user_name.to_string(),
        uid: uid.clone(),
    };
    state
        .store
        .set(&state.users_collection, &uid, &profile.to_document())
        .await
        .map_err(|e| {
            tracing::error!(uid = %uid, step = "write_document", error = %e, "Account created without profile document");
            internal(&e)
        })?;
    tracing::info!("Profile document created for {}", uid);

    Ok(CreateUserResponse { success: true, uid })
}

/// Delete the account, then its profile document
pub async fn delete_user(
    state: &AppState,
    caller: Option<&CallerContext>,
    req: DeleteUserRequest,
) -> Result<SuccessResponse, AdminError> {
    state.policy.require(caller, Operation::DeleteUser)?;

    let uid = present(&req.uid).ok_or_else(|| AdminError::invalid_argument("Missing uid."))?;
    let internal = |e: &dyn std::fmt::Display| {
        AdminError::internal("An error occurred while deleting the user.", e)
    };

    state.identity.delete_account(uid).await.map_err(|e| {
        tracing::error!(uid, step = "delete_account", error = %e, "User deletion failed");
        internal(&e)
    })?;

    state
        .store
        .delete(&state.users_collection, uid)
        .await
        .map_err(|e| {
            tracing::error!(uid, step = "delete_document", error = %e, "Account deleted but profile document remains");
            internal(&e)
        })?;
    tracing::info!("User {} deleted", uid);

    Ok(SuccessResponse { success: true })
}

/// Assign a role to an account; the owner uid may call this without the admin claim
pub async fn set_user_role(
    state: &AppState,
    caller: Option<&CallerContext>,
    req: SetUserRoleRequest,
) -> Result<MessageResponse, AdminError> {
    state.policy.require(caller, Operation::SetRole)?;

    let (Some(uid), Some(role)) = (present(&req.uid), present(&req.role)) else {
        return Err(AdminError::invalid_argument("Missing required data (uid, role)."));
    };

    assign_role(
        state.identity.as_ref(),
        state.store.as_ref(),
        &state.users_collection,
        uid,
        role,
    )
    .await
    .map_err(|e| AdminError::internal("An error occurred while assigning the role.", e))?;

    Ok(MessageResponse {
        success: true,
        message: format!("Role \"{}\" assigned to user {}", role, uid),
    })
}

/// Compare the role claim with the profile document's role
pub async fn check_user_role(
    state: &AppState,
    caller: Option<&CallerContext>,
    req: CheckUserRoleRequest,
) -> Result<RoleCheckResponse, AdminError> {
    state.policy.require(caller, Operation::CheckRole)?;

    let uid = present(&req.uid).ok_or_else(|| AdminError::invalid_argument("Missing uid."))?;

    let account = state.identity.get_account(uid).await.map_err(|e| match e {
        IdentityError::NotFound(_) => AdminError::not_found(format!("No user found with uid {}.", uid)),
        other => AdminError::internal("An error occurred while reading the user.", other),
    })?;

    let document = state
        .store
        .get(&state.users_collection, uid)
        .await
        .map_err(|e| AdminError::internal("An error occurred while reading the profile.", e))?;

    let claim_role = account.role().map(str::to_string);
    let document_role = document
        .as_ref()
        .and_then(|doc| doc.get("role"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let consistent = claim_role.is_some() && claim_role == document_role;

    if !consistent {
        tracing::warn!(uid, ?claim_role, ?document_role, "Role claim and profile document diverge");
    }

    Ok(RoleCheckResponse {
        uid: uid.to_string(),
        claim_role,
        document_role,
        consistent,
    })
}
