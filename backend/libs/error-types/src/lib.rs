use serde::{Deserialize, Serialize};

/// Error body returned by every failed HTTP action.
///
/// `code` is the stable machine-readable identifier clients branch on,
/// `message` is the human-readable explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short HTTP reason phrase ("Forbidden", "Conflict", ...)
    pub error: String,

    pub message: String,

    pub status: u16,

    /// One of the constants in [`error_kinds`]
    pub error_type: String,

    /// One of the constants in [`error_codes`]
    pub code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Request id propagated by the request-id middleware
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Stable error codes
pub mod error_codes {
    // Request shape
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const INVALID_PAGE_SIZE: &str = "INVALID_PAGE_SIZE";
    pub const INVALID_MESSAGE_KIND: &str = "INVALID_MESSAGE_KIND";
    pub const IDENTITY_MISSING: &str = "IDENTITY_MISSING";

    // Relationships
    pub const NOT_FRIENDS: &str = "NOT_FRIENDS";
    pub const ALREADY_FRIENDS: &str = "ALREADY_FRIENDS";
    pub const FRIEND_REQUEST_PENDING: &str = "FRIEND_REQUEST_PENDING";
    pub const FRIEND_REQUEST_NOT_FOUND: &str = "FRIEND_REQUEST_NOT_FOUND";

    // Groups
    pub const GROUP_NOT_FOUND: &str = "GROUP_NOT_FOUND";
    pub const NOT_GROUP_MEMBER: &str = "NOT_GROUP_MEMBER";
    pub const NOT_GROUP_OPERATOR: &str = "NOT_GROUP_OPERATOR";
    pub const ALREADY_GROUP_MEMBER: &str = "ALREADY_GROUP_MEMBER";
    pub const GROUP_OWNER_PROTECTED: &str = "GROUP_OWNER_PROTECTED";
    pub const SELF_DEMOTION: &str = "SELF_DEMOTION";

    // Messages and principals
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const PRINCIPAL_NOT_FOUND: &str = "PRINCIPAL_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const NOT_MESSAGE_SENDER: &str = "NOT_MESSAGE_SENDER";

    // System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Error categories used for client-side routing of failures
pub mod error_kinds {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Forbidden",
            "only the sender may delete a message",
            403,
            error_kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_MESSAGE_SENDER,
        );

        assert_eq!(error.status, 403);
        assert_eq!(error.error_type, error_kinds::AUTHORIZATION_ERROR);
        assert_eq!(error.code, error_codes::NOT_MESSAGE_SENDER);
        assert!(error.details.is_none());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let error = ErrorResponse::new(
            "Conflict",
            "already friends",
            409,
            error_kinds::CONFLICT_ERROR,
            error_codes::ALREADY_FRIENDS,
        );
        let json = serde_json::to_value(&error).unwrap();
        assert!(json.get("details").is_none());
        assert!(json.get("trace_id").is_none());

        let json = serde_json::to_value(error.with_trace_id("req-1".into())).unwrap();
        assert_eq!(json["trace_id"], "req-1");
    }
}
