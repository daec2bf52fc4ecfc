//! One-shot dialogue commands: `confidant respond` and `confidant stream`.

use std::io::Write;

use console::style;
use tokio::sync::mpsc;

use confidant_core::relay::RelayFrame;
use confidant_types::chat::{ChatRequest, ChatRequestBody, ReplyLength, StreamRequest, StreamRequestBody};

use super::{ActionArg, LenArg};
use crate::http::response::RespondBody;
use crate::state::AppState;

/// Build the request body a client would send for `action`.
pub fn request_body(
    user: String,
    action: ActionArg,
    text: Option<String>,
    len: Option<LenArg>,
    timezone: Option<String>,
) -> ChatRequestBody {
    let mut body = ChatRequestBody {
        user_id: Some(user),
        action: Some(action.as_str().to_string()),
        timezone,
        len: len.map(ReplyLength::from),
        ..ChatRequestBody::default()
    };
    match action {
        ActionArg::Say => body.message = text,
        ActionArg::LearnIdentity => body.name = text,
        ActionArg::AddFact => body.fact = text,
        ActionArg::Init | ActionArg::Nudge => {}
    }
    body
}

pub async fn respond(state: &AppState, body: ChatRequestBody, json: bool) -> anyhow::Result<()> {
    let request = ChatRequest::try_from(body)?;
    let reply = state.orchestrator.respond(request).await?;
    state.drain().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&RespondBody::from(reply))?);
        return Ok(());
    }

    if reply.is_silent() {
        println!("  {}", style("(nothing to say right now)").dim());
        return Ok(());
    }

    println!();
    println!("  {}", reply.text);
    if reply.degraded {
        println!("  {}", style("(fallback reply: the provider did not answer)").yellow());
    }
    println!();
    Ok(())
}

pub async fn stream(state: &AppState, user: String, message: String, len: Option<LenArg>) -> anyhow::Result<()> {
    let request = StreamRequest::try_from(StreamRequestBody {
        user_id: Some(user),
        message: Some(message),
        timezone: None,
        len: len.map(ReplyLength::from),
    })?;
    let frames = state.orchestrator.respond_stream(request).await?;
    print_frames(frames).await?;

    state.drain().await;
    Ok(())
}

/// Print fragments as they arrive, until the terminal frame.
pub(super) async fn print_frames(mut frames: mpsc::Receiver<RelayFrame>) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "\n  ")?;
    while let Some(frame) = frames.recv().await {
        match frame {
            RelayFrame::Fragment(text) => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            RelayFrame::Heartbeat => {}
            RelayFrame::Done => break,
        }
    }
    writeln!(stdout, "\n")?;
    Ok(())
}
