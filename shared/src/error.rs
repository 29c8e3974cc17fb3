use serde::Serialize;
use std::fmt;

/// Machine-readable error kinds returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    PermissionDenied,
    InvalidArgument,
    AlreadyExists,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::PermissionDenied => 403,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by every admin operation.
///
/// Serializes as `{"error": <kind>, "message": <text>, "details": <cause>}`;
/// `details` is only present for internal errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct AdminError {
    #[serde(rename = "error")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AdminError {
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::PermissionDenied, message: message.into(), details: None }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::InvalidArgument, message: message.into(), details: None }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::AlreadyExists, message: message.into(), details: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::NotFound, message: message.into(), details: None }
    }

    /// Internal error carrying the underlying cause for diagnostics
    pub fn internal(message: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
            details: Some(cause.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_serializes_details() {
        let err = AdminError::internal("Batch update failed.", "ConditionalCheckFailed");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "internal");
        assert_eq!(json["message"], "Batch update failed.");
        assert_eq!(json["details"], "ConditionalCheckFailed");
    }

    #[test]
    fn non_internal_errors_omit_details() {
        let json = serde_json::to_value(AdminError::permission_denied("nope")).unwrap();
        assert_eq!(json["error"], "permission-denied");
        assert!(json.get("details").is_none());
        assert_eq!(ErrorKind::AlreadyExists.status_code(), 409);
    }
}
