//! Gateway error types.
//!
//! Every failure on the middleware chain maps to an HTTP status via the
//! `IntoResponse` impl. Client-facing messages are short text reasons;
//! underlying causes are logged server-side and never leak into the body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Gateway error type.
///
/// Maps to the chain's exit codes:
/// - MissingAuth: 400 Bad Request
/// - RateExceeded: 429 Too Many Requests
/// - Internal: 500 Internal Server Error
/// - everything else: 403 Forbidden
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Authorization field missing")]
    MissingAuth,

    #[error("Malformed token")]
    MalformedToken,

    #[error("Unexpected signing method: {0}")]
    UnexpectedSigningMethod(String),

    #[error("Key retrieval failed: {0}")]
    KeyRetrievalFailed(String),

    #[error("No matching KID could be found")]
    NoMatchingKid,

    #[error("No certificates in JWK")]
    NoCertificate,

    #[error("Key ID not found")]
    IdentityNotFound,

    #[error("Key not authorized")]
    KeyNotAuthorized,

    #[error("Key not authorized: no matching policy")]
    NoMatchingPolicy,

    #[error("Rate limit exceeded")]
    RateExceeded,

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("Access denied")]
    AccessDenied,

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// HTTP status code for this error (also used for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::MissingAuth => 400,
            GatewayError::RateExceeded => 429,
            GatewayError::Internal => 500,
            _ => 403,
        }
    }

    /// Short machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingAuth => "MISSING_AUTH",
            GatewayError::MalformedToken => "MALFORMED_TOKEN",
            GatewayError::UnexpectedSigningMethod(_) => "UNEXPECTED_SIGNING_METHOD",
            GatewayError::KeyRetrievalFailed(_) => "KEY_RETRIEVAL_FAILED",
            GatewayError::NoMatchingKid => "NO_MATCHING_KID",
            GatewayError::NoCertificate => "NO_CERTIFICATE",
            GatewayError::IdentityNotFound => "IDENTITY_NOT_FOUND",
            GatewayError::KeyNotAuthorized => "KEY_NOT_AUTHORIZED",
            GatewayError::NoMatchingPolicy => "NO_MATCHING_POLICY",
            GatewayError::RateExceeded => "RATE_LIMIT_EXCEEDED",
            GatewayError::QuotaExceeded => "QUOTA_EXCEEDED",
            GatewayError::AccessDenied => "ACCESS_DENIED",
            GatewayError::Internal => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // The Display impls carry no internal detail except for the two
        // variants that wrap a cause; those log server-side and return a
        // generic reason to the client.
        let message = match &self {
            GatewayError::KeyRetrievalFailed(cause) => {
                tracing::error!(target: "portcullis.errors", cause = %cause, "Key retrieval failed");
                "Key not authorized".to_string()
            }
            GatewayError::UnexpectedSigningMethod(alg) => {
                tracing::error!(target: "portcullis.errors", alg = %alg, "Unexpected signing method");
                "Key not authorized".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}
