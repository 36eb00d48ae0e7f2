//! Error responses for the facilitator service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use t402::error::ProtocolError;

/// Errors the facilitator service reports as HTTP failures.
///
/// Verification and settlement failures are not HTTP failures; they travel
/// back as regular result JSON with `isValid: false` / `success: false`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Protocol-level fault in the request (version detection, parsing,
    /// or no mechanism for the route).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
