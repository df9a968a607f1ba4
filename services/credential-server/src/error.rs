//! HTTP error responses
//!
//! Every rejection has the same body shape:
//! `{"success": false, "error": {"type", "message", "request_id"}}`.
//! Messages are fixed strings per kind; store and codec detail stays in the
//! server logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failure of a single API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// Failure reported by the credential service
    Credential(credential_core::Error),
    /// Required input missing or malformed
    InvalidRequest,
    /// Route exists but the operation is not supported
    NotImplemented,
}

impl From<credential_core::Error> for ApiError {
    fn from(e: credential_core::Error) -> Self {
        ApiError::Credential(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use credential_core::Error as E;
        match self {
            ApiError::Credential(E::AuthFailure | E::VerifyFailure) => StatusCode::UNAUTHORIZED,
            ApiError::Credential(E::AccessDenied) => StatusCode::FORBIDDEN,
            ApiError::Credential(E::Conflict) => StatusCode::CONFLICT,
            ApiError::Credential(E::StoreUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Credential(E::Encoding) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Label for the response `type` field and the metrics `outcome` label.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Credential(e) => e.kind(),
            ApiError::InvalidRequest => "invalid_request",
            ApiError::NotImplemented => "not_implemented",
        }
    }

    pub fn message(&self) -> &'static str {
        use credential_core::Error as E;
        match self {
            ApiError::Credential(E::AuthFailure) => "invalid client credentials",
            ApiError::Credential(E::VerifyFailure) => "invalid token",
            ApiError::Credential(E::AccessDenied) => "Access Denied",
            ApiError::Credential(E::Conflict) => "client already exists",
            ApiError::Credential(E::StoreUnavailable) => "service temporarily unavailable",
            ApiError::Credential(E::Encoding) => "internal error",
            ApiError::InvalidRequest => "missing or malformed request parameters",
            ApiError::NotImplemented => "not implemented",
        }
    }

    /// Build the uniform rejection response.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": {
                "type": self.kind(),
                "message": self.message(),
                "request_id": request_id,
            }
        });
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
