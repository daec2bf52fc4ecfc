//! SSE streaming dialogue endpoint.
//!
//! POST /api/v1/respond/stream
//!
//! Same request as `say`, minus `action`. Emits `data:` fragments, `:hb`
//! heartbeat comments while waiting, and a terminal
//! `event: done` / `data: [DONE]` once the reply is persisted.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use confidant_core::relay::RelayFrame;
use confidant_core::relay::frame::{DONE_DATA, DONE_EVENT, HEARTBEAT_COMMENT};
use confidant_types::chat::{StreamRequest, StreamRequestBody};

use super::parse_body;
use crate::http::error::AppError;
use crate::state::AppState;

/// POST /api/v1/respond/stream -- stream a `say` reply as SSE.
///
/// Validation and state-loading errors are returned as plain JSON before the
/// stream starts. Once streaming, failures surface as a fallback line.
pub async fn respond_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let raw: StreamRequestBody = parse_body(&body)?;
    let request = StreamRequest::try_from(raw)?;

    let span = tracing::info_span!("http.respond_stream", request_id = %Uuid::now_v7());
    let frames = state
        .orchestrator
        .respond_stream(request)
        .instrument(span)
        .await?;

    // Heartbeats come from the relay itself, so no axum keep-alive here.
    let events = ReceiverStream::new(frames).map(|frame| Ok(to_event(frame)));
    Ok(Sse::new(events))
}

fn to_event(frame: RelayFrame) -> Event {
    match frame {
        RelayFrame::Fragment(text) => Event::default().data(text),
        RelayFrame::Heartbeat => Event::default().comment(HEARTBEAT_COMMENT),
        RelayFrame::Done => Event::default().event(DONE_EVENT).data(DONE_DATA),
    }
}
