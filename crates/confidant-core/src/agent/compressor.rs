//! Thread compressor: read-time summarization of older turns.
//!
//! The stored thread is never rewritten. Each turn, turns older than the
//! recent window are condensed by one buffered provider call into a single
//! context line; on any failure the turn proceeds with the recent window
//! alone.

use std::time::Duration;

use tracing::{Instrument, debug, info_span, warn};

use confidant_types::config::MemoryConfig;
use confidant_types::llm::{CompletionRequest, Message};
use confidant_types::memory::Turn;

use crate::llm::box_provider::BoxLlmProvider;

/// System instruction of every summarization request.
pub const SUMMARY_INSTRUCTION: &str = "You compress conversation history for a companion \
assistant. Write plain third-person prose. Keep the user's goals, decisions, constraints, \
and open items. Drop greetings and small talk.";

/// Context handed to prompt assembly for one turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompressedContext {
    /// Summary of the turns before `recent`, if any were summarized.
    pub summary: Option<String>,
    /// The most recent turns, verbatim and in order.
    pub recent: Vec<Turn>,
}

pub struct ThreadCompressor {
    window: usize,
    max_sentences: u32,
    max_tokens: u32,
    model: String,
    timeout: Duration,
}

impl ThreadCompressor {
    pub fn new(config: &MemoryConfig, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            window: config.compression_window,
            max_sentences: config.summary_sentences,
            max_tokens: config.summary_max_tokens,
            model: model.into(),
            timeout,
        }
    }

    /// Split into `(old, recent)` where `recent` holds the last `window` turns.
    pub fn split(thread: &[Turn], window: usize) -> (&[Turn], &[Turn]) {
        if thread.len() <= window {
            (&[], thread)
        } else {
            thread.split_at(thread.len() - window)
        }
    }

    /// Compress `thread` for this turn's prompt.
    pub async fn compress(&self, provider: &BoxLlmProvider, thread: &[Turn]) -> CompressedContext {
        let (old, recent) = Self::split(thread, self.window);
        let recent = recent.to_vec();
        if old.is_empty() {
            return CompressedContext {
                summary: None,
                recent,
            };
        }

        let summary = self.summarize(provider, old).await;
        CompressedContext { summary, recent }
    }

    async fn summarize(&self, provider: &BoxLlmProvider, old: &[Turn]) -> Option<String> {
        let transcript = old
            .iter()
            .map(|t| format!("{}: {}", t.role, t.text))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SUMMARY_INSTRUCTION),
                Message::user(format!(
                    "Compress this conversation into at most {} sentences:\n\n<conversation>\n{transcript}\n</conversation>",
                    self.max_sentences
                )),
            ],
            max_tokens: self.max_tokens,
            temperature: Some(0.2),
            stream: false,
        };

        let span = info_span!(
            "gen_ai.summarize",
            gen_ai.system = provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            turn_count = old.len(),
        );

        match tokio::time::timeout(self.timeout, provider.complete(&request))
            .instrument(span)
            .await
        {
            Ok(Ok(response)) => {
                let summary = response.content.trim().to_string();
                if summary.is_empty() {
                    debug!("Summarizer returned blank text, continuing without summary");
                    None
                } else {
                    Some(summary)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Summarization failed, continuing without summary");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Summarization timed out, continuing without summary"
                );
                None
            }
        }
    }
}
