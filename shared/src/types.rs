use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Document;

// ========== USER PROFILE ==========
/// Document mirror of an account, stored in the users collection under its uid
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub user_name: String,
    pub uid: String,
}

impl UserProfile {
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of plain strings always serializes to an object
            _ => Document::new(),
        }
    }
}

// ========== REQUESTS ==========
// Every field is optional on the wire so that absence is reported as
// invalid-argument by the handler instead of a parse failure.

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DeleteUserRequest {
    #[serde(alias = "identifier")]
    pub uid: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SetUserRoleRequest {
    #[serde(alias = "identifier")]
    pub uid: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CheckUserRoleRequest {
    #[serde(alias = "identifier")]
    pub uid: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchUpdateFieldRequest {
    pub collection: Option<String>,
    pub doc_ids: Option<Vec<String>>,
    pub field_name: Option<String>,
    /// JSON null deserializes to None, so null counts as missing
    pub find_value: Option<Value>,
    pub replace_value: Option<Value>,
}

// ========== RESPONSES ==========

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CreateUserResponse {
    pub success: bool,
    pub uid: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Role as seen by the identity provider versus the profile document
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleCheckResponse {
    pub uid: String,
    pub claim_role: Option<String>,
    pub document_role: Option<String>,
    pub consistent: bool,
}

/// Non-empty string field, or None when absent or blank
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
