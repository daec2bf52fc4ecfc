//! Request handlers.

pub mod respond;
pub mod stream;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use confidant_types::error::ValidationError;

/// Decode a JSON body. Malformed input is a validation error (400), not
/// axum's default 422.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ValidationError> {
    serde_json::from_slice(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}
