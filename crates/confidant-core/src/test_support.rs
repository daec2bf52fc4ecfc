//! Deterministic collaborators shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use confidant_types::error::StoreError;
use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent, Usage};

use crate::agent::compressor::SUMMARY_INSTRUCTION;
use crate::clock::Clock;
use crate::llm::provider::{EventStream, LlmProvider};
use crate::observe::ErrorReporter;
use crate::storage::memory::InMemoryStateStore;
use crate::storage::state_store::{StateStore, StoredRecord};

/// Behaviour of one buffered call.
#[derive(Debug, Clone)]
pub(crate) enum CompleteStep {
    Reply(String),
    Fail,
    AuthFailure,
    /// Never resolves; only a caller timeout ends it.
    Hang,
}

/// Behaviour of a streamed call.
#[derive(Debug, Clone)]
pub(crate) enum StreamScript {
    Fragments(Vec<String>),
    /// Yields the fragments, then an error.
    FailAfter(Vec<String>),
    /// Ends immediately without any fragment.
    Empty,
    /// Never yields and never ends.
    Silent,
    /// Waits, then yields the fragments.
    Delayed(Duration, Vec<String>),
    /// Yields the fragments, then stays open without sending anything.
    Stall(Vec<String>),
    /// Yields the same fragment at a fixed interval, forever.
    Trickle(Duration, String),
}

/// Split text into word-sized fragments that concatenate back to it.
pub(crate) fn fragments_of(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    for (i, word) in text.split(' ').enumerate() {
        if i == 0 {
            fragments.push(word.to_string());
        } else {
            fragments.push(format!(" {word}"));
        }
    }
    fragments
}

/// Scripted completion provider. Buffered calls consume `steps` in order,
/// then repeat `fallback`. Summarization requests are answered separately.
pub(crate) struct ScriptedProvider {
    steps: Mutex<VecDeque<CompleteStep>>,
    fallback: CompleteStep,
    stream: StreamScript,
    summary: Option<String>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
    summary_calls: Arc<AtomicUsize>,
    stream_calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub(crate) fn replying(text: &str) -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: CompleteStep::Reply(text.to_string()),
            stream: StreamScript::Fragments(fragments_of(text)),
            summary: None,
            calls: Arc::default(),
            summary_calls: Arc::default(),
            stream_calls: Arc::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fallback: CompleteStep::Fail,
            stream: StreamScript::FailAfter(Vec::new()),
            ..Self::replying("")
        }
    }

    pub(crate) fn with_steps(steps: Vec<CompleteStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::failing()
        }
    }

    pub(crate) fn streaming(mut self, script: StreamScript) -> Self {
        self.stream = script;
        self
    }

    pub(crate) fn summarizing(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }

    /// Buffered non-summary requests seen so far.
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn summary_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.summary_calls)
    }

    pub(crate) fn stream_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stream_calls)
    }

    fn next_step(&self) -> CompleteStep {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn is_summary_request(request: &CompletionRequest) -> bool {
    request
        .messages
        .first()
        .is_some_and(|m| m.content == SUMMARY_INSTRUCTION)
}

fn response(content: String) -> CompletionResponse {
    CompletionResponse {
        content,
        model: "scripted-model".to_string(),
        usage: Usage::default(),
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if is_summary_request(request) {
            self.summary_calls.fetch_add(1, Ordering::SeqCst);
            return match &self.summary {
                Some(summary) => Ok(response(summary.clone())),
                None => Err(LlmError::Provider {
                    message: "summary unavailable".to_string(),
                }),
            };
        }

        self.calls.lock().unwrap().push(request.clone());
        match self.next_step() {
            CompleteStep::Reply(text) => Ok(response(text)),
            CompleteStep::Fail => Err(LlmError::Provider {
                message: "upstream 502".to_string(),
            }),
            CompleteStep::AuthFailure => Err(LlmError::AuthenticationFailed),
            CompleteStep::Hang => std::future::pending().await,
        }
    }

    fn stream(&self, _request: CompletionRequest) -> EventStream {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.stream.clone();
        Box::pin(async_stream::stream! {
            match script {
                StreamScript::Fragments(fragments) => {
                    for text in fragments {
                        yield Ok(StreamEvent::TextDelta { text });
                    }
                    yield Ok(StreamEvent::Done);
                }
                StreamScript::FailAfter(fragments) => {
                    for text in fragments {
                        yield Ok(StreamEvent::TextDelta { text });
                    }
                    yield Err(LlmError::Stream("connection reset".to_string()));
                }
                StreamScript::Empty => {
                    yield Ok(StreamEvent::Done);
                }
                StreamScript::Silent => {
                    std::future::pending::<()>().await;
                }
                StreamScript::Delayed(delay, fragments) => {
                    tokio::time::sleep(delay).await;
                    for text in fragments {
                        yield Ok(StreamEvent::TextDelta { text });
                    }
                    yield Ok(StreamEvent::Done);
                }
                StreamScript::Stall(fragments) => {
                    for text in fragments {
                        yield Ok(StreamEvent::TextDelta { text });
                    }
                    std::future::pending::<()>().await;
                }
                StreamScript::Trickle(every, text) => {
                    loop {
                        tokio::time::sleep(every).await;
                        yield Ok(StreamEvent::TextDelta { text: text.clone() });
                    }
                }
            }
        })
    }
}

/// Clock that only moves when told to.
pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 2026-03-14 09:00:00 UTC.
    pub(crate) fn morning() -> Self {
        Self::at(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap())
    }

    pub(crate) fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Reporter that keeps every report for assertions.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub(crate) fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        self.entries
            .lock()
            .unwrap()
            .push((context.to_string(), error.to_string()));
    }
}

/// Store whose every operation fails as unreachable.
pub(crate) struct UnavailableStore;

impl StateStore for UnavailableStore {
    async fn get(&self, _key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn put(
        &self,
        _key: &str,
        _value: &serde_json::Value,
        _expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Store that reads fine but refuses writes.
#[derive(Default)]
pub(crate) struct ReadOnlyStore {
    pub(crate) inner: InMemoryStateStore,
}

impl StateStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        _key: &str,
        _value: &serde_json::Value,
        _expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("disk full".to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

/// In-memory store that lets a competing writer land right before the
/// next put to a given key, simulating a second tab racing the caller.
#[derive(Default)]
pub(crate) struct RacingStore {
    pub(crate) inner: InMemoryStateStore,
    interleave: Mutex<Option<(String, serde_json::Value)>>,
}

impl RacingStore {
    pub(crate) fn interleave(&self, key: &str, value: serde_json::Value) {
        *self.interleave.lock().unwrap() = Some((key.to_string(), value));
    }
}

impl StateStore for RacingStore {
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let competing = {
            let mut slot = self.interleave.lock().unwrap();
            match slot.as_ref() {
                Some((k, _)) if k == key => slot.take(),
                _ => None,
            }
        };
        if let Some((_, competing)) = competing {
            let current = self.inner.get(key).await?.map(|r| r.version);
            self.inner.put(key, &competing, current).await?;
        }
        self.inner.put(key, value, expected_version).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
