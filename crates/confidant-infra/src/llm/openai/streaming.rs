//! SSE stream creation for OpenAI-compatible chat completions.
//!
//! The upstream body is a sequence of `data: {json}` frames, each carrying a
//! `choices[0].delta.content` fragment, closed by `data: [DONE]`. Frames are
//! decoded with [`SseDecoder`], which tolerates chunk boundaries anywhere,
//! including inside a multi-byte character.

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use confidant_core::llm::provider::EventStream;
use confidant_core::llm::sse::{SseDecoder, SseFrame};
use confidant_types::llm::{LlmError, StreamEvent, Usage};

use super::client::{error_for_status, retry_after_secs};
use super::types::{ChatCompletionBody, ChatCompletionChunk};

/// Open a streaming chat completion.
///
/// Connection and status errors are yielded as the first item. The stream
/// ends after [`StreamEvent::Done`], or after the first error.
pub fn create_chat_stream(
    client: &reqwest::Client,
    url: &str,
    body: ChatCompletionBody,
    api_key: &SecretString,
) -> EventStream {
    let request = client
        .post(url)
        .bearer_auth(api_key.expose_secret())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(&body);

    Box::pin(async_stream::stream! {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                yield Err(LlmError::Provider { message: format!("HTTP request failed: {e}") });
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            yield Err(error_for_status(status, retry_after, error_body));
            return;
        }

        let mut bytes = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::Stream(format!("connection lost: {e}")));
                    return;
                }
            };
            for frame in decoder.push(&chunk) {
                match events_for_frame(&frame) {
                    Ok(events) => {
                        for event in events {
                            let done = event == StreamEvent::Done;
                            yield Ok(event);
                            if done {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if let Some(frame) = decoder.finish() {
            match events_for_frame(&frame) {
                Ok(events) => {
                    for event in events {
                        if event != StreamEvent::Done {
                            yield Ok(event);
                        }
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        yield Ok(StreamEvent::Done);
    })
}

/// Translate one SSE frame into provider-agnostic events.
pub(crate) fn events_for_frame(frame: &SseFrame) -> Result<Vec<StreamEvent>, LlmError> {
    if frame.is_done() {
        return Ok(vec![StreamEvent::Done]);
    }
    if frame.data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(&frame.data)
        .map_err(|e| LlmError::Deserialization(format!("invalid stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::Stream(error.message));
    }

    let mut events: Vec<StreamEvent> = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .filter(|text| !text.is_empty())
        .map(|text| StreamEvent::TextDelta { text })
        .collect();

    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(Usage::from(usage)));
    }
    Ok(events)
}
