//! Application error type mapping to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use confidant_types::error::{EngineError, ValidationError};

use super::response::RespondBody;

/// Application-level error that maps to HTTP responses.
///
/// Provider failures never get here: the engine turns them into fallback
/// replies.
#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Engine(EngineError::Validation(e))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(EngineError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Engine(EngineError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let AppError::Engine(err) = &self;
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        } else {
            tracing::debug!(error = %err, "Request rejected");
        }

        (status, Json(RespondBody::failure(err.to_string()))).into_response()
    }
}
