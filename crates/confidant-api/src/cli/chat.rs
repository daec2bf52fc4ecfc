//! Interactive chat: `confidant chat`.
//!
//! Each line is sent as a streamed `say`. While the user is quiet, an
//! [`IdleNudgeTimer`] asks the engine for a check-in with growing pauses;
//! the engine's nudge policy still decides whether anything is said.

use std::sync::Arc;

use console::style;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use confidant_core::memory::backoff::{IdleBackoff, IdleNudgeTimer};
use confidant_types::chat::{ChatAction, ChatRequest, DEFAULT_TIMEZONE, ReplyLength, StreamRequest};
use confidant_types::identity::UserId;

use super::LenArg;
use super::respond::print_frames;
use crate::state::{AppState, ConcreteOrchestrator};

/// Chat over stdin until EOF or `/quit`.
pub async fn chat(state: &AppState, user: String, len: Option<LenArg>) -> anyhow::Result<()> {
    println!(
        "  {}",
        style("Type a message and press Enter. /quit to leave.").dim()
    );
    chat_loop(state, user, len, BufReader::new(tokio::io::stdin())).await
}

async fn chat_loop<R>(
    state: &AppState,
    user: String,
    len: Option<LenArg>,
    input: R,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let user_id = UserId::parse(&user)?;
    let len = len.map(ReplyLength::from).unwrap_or_default();

    let backoff = IdleBackoff::from_config(&state.orchestrator.config().nudge);
    let (timer, activity) = IdleNudgeTimer::new(backoff);
    let orchestrator = Arc::clone(&state.orchestrator);
    let nudge_user = user_id.clone();
    let idle = tokio::spawn(timer.run(move || {
        let orchestrator = Arc::clone(&orchestrator);
        let user_id = nudge_user.clone();
        async move {
            if let Some(text) = idle_nudge(&orchestrator, user_id).await {
                println!("\n  {}\n", style(text).cyan());
            }
        }
    }));

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "/quit" | "/exit") {
            break;
        }

        let _ = activity.send(()).await;
        let request = StreamRequest {
            user_id: user_id.clone(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            message: message.to_string(),
            len,
        };
        let frames = state.orchestrator.respond_stream(request).await?;
        print_frames(frames).await?;
        let _ = activity.send(()).await;
    }

    drop(activity);
    idle.await?;
    state.drain().await;
    Ok(())
}

/// Ask for a check-in. `None` when the engine chose to stay quiet.
async fn idle_nudge(orchestrator: &ConcreteOrchestrator, user_id: UserId) -> Option<String> {
    let request = ChatRequest {
        user_id,
        timezone: DEFAULT_TIMEZONE.to_string(),
        action: ChatAction::Nudge,
    };
    match orchestrator.respond(request).await {
        Ok(reply) if !reply.is_silent() => Some(reply.text),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Idle nudge failed");
            None
        }
    }
}
