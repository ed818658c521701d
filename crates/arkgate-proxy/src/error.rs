//! Caller-facing errors and their HTTP mapping.
//!
//! Every error detected before the response starts is turned into one JSON
//! body of the form `{"error": "<message>"}`.

use arkgate_core::RequestError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::backend::BackendError;

/// Errors returned by the chat completions endpoint.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed `Authorization` header.
    #[error("Invalid Authorization header")]
    Unauthorized,

    /// Body failed schema binding or is not a JSON object.
    #[error(transparent)]
    BadRequest(#[from] RequestError),

    /// Unknown model name while strict model resolution is enabled.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The backend call failed, locally or remotely.
    #[error("Service unavailable: {0}")]
    Backend(#[from] BackendError),

    /// Anything else that is our fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::UnknownModel(_) => StatusCode::BAD_REQUEST,
            Self::Backend(e) if e.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            Self::Unauthorized | Self::BadRequest(_) | Self::UnknownModel(_) => {
                warn!(status = status.as_u16(), "Rejected request: {self}");
            }
            Self::Backend(e) => {
                warn!(
                    status = status.as_u16(),
                    backend_status = ?e.status(),
                    timeout = e.is_timeout(),
                    "Backend call failed: {e}"
                );
            }
            Self::Internal(msg) => error!("Internal error: {msg}"),
        }

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
