//! Signaling service error types.
//!
//! Signaling events never produce error frames back to the sender; failures
//! are logged server-side and the event is dropped. The HTTP surface (socket
//! upgrade, health) maps errors to status codes via `IntoResponse` with
//! client-safe messages only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Signaling service error type.
///
/// Maps to HTTP status codes on the upgrade path:
/// - `Unauthenticated`: 401
/// - `Malformed`: 400
/// - `Store`, `Internal`: 500
/// - `ShuttingDown`: 503
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Call record store operation failed (store unavailable).
    #[error("Store error: {0}")]
    Store(String),

    /// Inbound payload could not be decoded or is missing required fields.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Connection arrived without a usable verified identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Service is shutting down and no longer accepts work.
    #[error("Service is shutting down")]
    ShuttingDown,

    /// Internal error (actor channel failures and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignalingError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            SignalingError::Malformed(_) => StatusCode::BAD_REQUEST,
            SignalingError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            SignalingError::Store(_) | SignalingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SignalingError::Store(_) | SignalingError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SignalingError::Malformed(_) => "Malformed request".to_string(),
            SignalingError::Unauthenticated(_) => "Missing or invalid identity".to_string(),
            SignalingError::ShuttingDown => {
                "Server is shutting down, please reconnect".to_string()
            }
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SignalingError::Store(_) => "store",
            SignalingError::Malformed(_) => "malformed",
            SignalingError::Unauthenticated(_) => "unauthenticated",
            SignalingError::ShuttingDown => "shutting_down",
            SignalingError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: u16,
    message: String,
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: status.as_u16(),
                message: self.client_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            SignalingError::Unauthenticated("no subject".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            SignalingError::Malformed("bad json".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SignalingError::Store("timeout".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            SignalingError::ShuttingDown.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let store_err = SignalingError::Store("connection refused at 10.0.0.7:6379".to_string());
        assert!(!store_err.client_message().contains("10.0.0.7"));
        assert_eq!(store_err.client_message(), "An internal error occurred");

        let internal = SignalingError::Internal("channel send failed: closed".to_string());
        assert!(!internal.client_message().contains("channel"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", SignalingError::Store("timeout".to_string())),
            "Store error: timeout"
        );
        assert_eq!(
            format!("{}", SignalingError::ShuttingDown),
            "Service is shutting down"
        );
    }

    #[test]
    fn test_kind_labels_are_bounded() {
        let labels: Vec<&str> = [
            SignalingError::Store(String::new()),
            SignalingError::Malformed(String::new()),
            SignalingError::Unauthenticated(String::new()),
            SignalingError::ShuttingDown,
            SignalingError::Internal(String::new()),
        ]
        .iter()
        .map(SignalingError::kind)
        .collect();
        assert_eq!(
            labels,
            vec!["store", "malformed", "unauthenticated", "shutting_down", "internal"]
        );
    }
}
