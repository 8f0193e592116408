//! Error types for the gateway

use exso_core::{CoreError, DenialNotice};
use hyper::StatusCode;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {}", .0.message())]
    AccessDenied(DenialNotice),

    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Payment provider unreachable or answered non-2xx
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider not configured")]
    ProviderNotConfigured,

    /// Remote gateway could not be reached or timed out
    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvariantViolation(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Http(_) => StatusCode::BAD_REQUEST,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::Malformed(_) => "malformed",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ProviderNotConfigured => "provider_not_configured",
            Self::Unreachable(_) => "unreachable",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Busy(_) => "busy",
            Self::Database(_) => "database",
            Self::Http(_) => "http",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Text safe to show a viewer
    ///
    /// Not-found never says whether the record ever existed, and storage
    /// details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(_) => "This exso is not available.".to_string(),
            Self::AccessDenied(notice) => notice.message().to_string(),
            Self::ProviderUnavailable(_) => {
                "Payment provider is unavailable, please try again shortly.".to_string()
            }
            Self::Database(_)
            | Self::Internal(_)
            | Self::Config(_)
            | Self::Busy(_)
            | Self::Unreachable(_) => {
                "Service temporarily unavailable.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Worth retrying later: the failure was on the way, not in the request
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::ProviderUnavailable(_) | Self::Busy(_) | Self::Database(_)
        )
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "error": self.public_message(),
            "code": self.code(),
        });
        if let Self::AccessDenied(notice) = &self {
            body["reason"] = serde_json::json!(notice);
        }
        (status, body.to_string())
    }
}

impl From<CoreError> for GatewayError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingDraftField(field) => {
                Self::BadRequest(format!("missing field: {}", field))
            }
            CoreError::UnknownExsoType(t) => Self::BadRequest(format!("unknown exso type: {}", t)),
            e @ CoreError::ReplyReferenceImmutable { .. } => Self::InvariantViolation(e.to_string()),
            CoreError::Malformed(msg) => Self::Malformed(msg),
            CoreError::NotFound(what) => Self::NotFound(what),
            CoreError::Storage(msg) => Self::Database(msg),
            CoreError::Contention(what) => Self::Busy(what),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(format!("JSON error: {}", err))
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for GatewayError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for GatewayError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encoding failed: {}", err))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unreachable(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_taxonomy() {
        let err: GatewayError = CoreError::ReplyReferenceImmutable { id: "x".into() }.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "invariant_violation");

        let err: GatewayError = CoreError::MissingDraftField("weight").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err: GatewayError = CoreError::Contention("token".into()).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_not_found_body_is_neutral() {
        let (status, body) = GatewayError::NotFound("exso abc deleted".into()).into_status_code_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!body.contains("deleted"));
        assert!(body.contains("not_found"));
    }

    #[test]
    fn test_denial_body_carries_reason() {
        let (status, body) = GatewayError::AccessDenied(DenialNotice::Exhausted).into_status_code_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["code"], "access_denied");
        assert_eq!(body["reason"], "exhausted");
        assert_eq!(body["error"], DenialNotice::Exhausted.message());
    }

    #[test]
    fn test_transient_errors() {
        assert!(GatewayError::Unreachable("connect refused".into()).is_transient());
        assert!(GatewayError::ProviderUnavailable("502".into()).is_transient());
        assert!(!GatewayError::Http("HTTP 400".into()).is_transient());
        assert!(!GatewayError::Malformed("bad json".into()).is_transient());
    }

    #[test]
    fn test_database_details_stay_private() {
        let (_, body) = GatewayError::Database("auth failed for user root".into()).into_status_code_and_body();
        assert!(!body.contains("root"));
    }
}
