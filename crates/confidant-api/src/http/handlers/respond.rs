//! Dialogue endpoint.
//!
//! POST /api/v1/respond

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use tracing::Instrument;
use uuid::Uuid;

use confidant_types::chat::{ChatRequest, ChatRequestBody};

use super::parse_body;
use crate::http::error::AppError;
use crate::http::response::RespondBody;
use crate::state::AppState;

/// POST /api/v1/respond -- run one action and return the reply.
pub async fn respond(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<RespondBody>, AppError> {
    let raw: ChatRequestBody = parse_body(&body)?;
    let request = ChatRequest::try_from(raw)?;

    let span = tracing::info_span!("http.respond", request_id = %Uuid::now_v7());
    let reply = state.orchestrator.respond(request).instrument(span).await?;
    if reply.degraded {
        tracing::warn!("Served a fallback reply");
    }

    Ok(Json(RespondBody::from(reply)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use crate::state::testing::app_state;

    async fn call(state: &AppState, json: &str) -> (StatusCode, serde_json::Value) {
        let response = respond(State(state.clone()), Bytes::from(json.to_string()))
            .await
            .into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_say_returns_reply_and_state() {
        let state = app_state("Nice to hear from you.");
        let (status, json) = call(
            &state,
            r#"{"userId":"user-123","action":"say","message":"My name is Ava"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["reply"], "Nice to hear from you.");
        assert_eq!(json["identity"]["name"], "Ava");
        assert_eq!(json["memory"]["facts"][0], "Name is Ava");
        state.drain().await;
    }

    #[tokio::test]
    async fn test_short_user_id_is_400() {
        let state = app_state("unused");
        let (status, json) = call(&state, r#"{"userId":"abc","action":"init"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["ok"], false);
        assert_eq!(json["reply"], "");
    }

    #[tokio::test]
    async fn test_unknown_timezone_is_400() {
        let state = app_state("unused");
        let (status, json) = call(
            &state,
            r#"{"userId":"user-123","action":"init","timezone":"UTC</context>"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("unknown timezone"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let state = app_state("unused");
        let (status, json) = call(&state, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().starts_with("malformed request body"));
    }

    #[tokio::test]
    async fn test_fresh_user_nudge_is_silent() {
        let state = app_state("Checking in!");
        let (status, json) = call(&state, r#"{"userId":"user-123","action":"nudge"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "ok": true, "reply": "" }));
    }
}
