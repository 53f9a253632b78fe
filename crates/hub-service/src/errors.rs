//! Hub service error types.
//!
//! Errors on the broadcast path never reach message producers: malformed
//! payloads, failed membership lookups and dead connections are logged and
//! absorbed inside the hub. The variants below surface only at startup, on
//! the producer HTTP endpoints, and when the hub task is gone.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Hub service error type.
///
/// Maps to HTTP status codes for the producer endpoints:
/// - `InvalidPayload`: 400 Bad Request
/// - `HubUnavailable`: 503 Service Unavailable
/// - Database, Membership, Config, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum HubError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Room membership lookup failed.
    #[error("Membership lookup failed: {0}")]
    Membership(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload submitted by a producer could not be accepted.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The hub command loop is not running (shutdown in progress).
    #[error("Hub unavailable")]
    HubUnavailable,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            HubError::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            HubError::Database(_)
            | HubError::Membership(_)
            | HubError::Config(_)
            | HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            HubError::InvalidPayload(reason) => reason.clone(),
            HubError::HubUnavailable => "Server is shutting down, please retry".to_string(),
            HubError::Database(_)
            | HubError::Membership(_)
            | HubError::Config(_)
            | HubError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HubError::InvalidPayload(_) => "INVALID_PAYLOAD",
            HubError::HubUnavailable => "HUB_UNAVAILABLE",
            HubError::Database(_) => "DATABASE_ERROR",
            HubError::Membership(_) => "MEMBERSHIP_ERROR",
            HubError::Config(_) | HubError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(target: "hub.errors", error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for HubError {
    fn from(err: sqlx::Error) -> Self {
        HubError::Database(err.to_string())
    }
}
