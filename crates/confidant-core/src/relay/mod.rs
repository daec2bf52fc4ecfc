//! Streaming relay: forwards provider text fragments to a client.
//!
//! The relay races the upstream stream against a buffered safety net:
//! - A buffered call starts if no fragment arrives within the silence
//!   window, or when the stream fails or ends before any fragment.
//! - Whichever source yields text first wins; the other is dropped.
//! - An error after fragments were forwarded keeps the partial text.
//! - The upstream is closed when it goes idle or outlives its deadline;
//!   that counts as an error at that point.
//! - A stream that only ever sends whitespace counts as empty.
//! - If both sources fail, a canned line is sent and nothing is persisted.
//!
//! The final text is persisted exactly once, after the winning source is
//! fully consumed, and only then is the terminal frame sent. A client that
//! disconnects stops receiving frames but does not stop the relay.

pub mod frame;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info_span, warn};

use confidant_types::config::RelayConfig;
use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

use crate::agent::phase::{PhaseTracker, TurnPhase};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::EventStream;
use crate::llm::retry::{CallPolicy, complete_with_retry};
use crate::llm::span::StreamInSpan;
use crate::observe::BackgroundTasks;

pub use frame::RelayFrame;

type Upstream = StreamInSpan<EventStream>;
type BufferedCall = Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send>>;

/// Which source produced the delivered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaySource {
    Stream,
    Buffered,
    /// Both sources failed; a canned line was sent.
    Canned,
}

/// What one relay run delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub text: String,
    pub source: RelaySource,
    pub fragments: usize,
    pub client_connected: bool,
}

/// One streamed reply to deliver.
pub struct RelayJob {
    pub request: CompletionRequest,
    /// Sent when neither source produces text.
    pub fallback_text: String,
    pub tracker: PhaseTracker,
}

pub struct StreamingRelay {
    provider: Arc<BoxLlmProvider>,
    config: RelayConfig,
    call_policy: CallPolicy,
}

impl StreamingRelay {
    pub fn new(provider: Arc<BoxLlmProvider>, config: RelayConfig, call_policy: CallPolicy) -> Self {
        Self {
            provider,
            config,
            call_policy,
        }
    }

    /// Run `job` on a tracked background task and return the frame receiver.
    pub fn spawn<P, Fut>(
        self: &Arc<Self>,
        tasks: &BackgroundTasks,
        job: RelayJob,
        persist: P,
    ) -> mpsc::Receiver<RelayFrame>
    where
        P: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let relay = Arc::clone(self);
        tasks.track(async move {
            relay.run(job, tx, persist).await;
        });
        rx
    }

    /// Deliver `job` into `tx`, persist the final text, then send `Done`.
    pub async fn run<P, Fut>(
        &self,
        job: RelayJob,
        tx: mpsc::Sender<RelayFrame>,
        persist: P,
    ) -> RelayOutcome
    where
        P: FnOnce(String) -> Fut,
        Fut: Future<Output = ()>,
    {
        let RelayJob {
            mut request,
            fallback_text,
            mut tracker,
        } = job;
        request.stream = true;

        let span = info_span!(
            "gen_ai.stream",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.stream = true,
        );
        let mut upstream = Some(StreamInSpan::new(self.provider.stream(request.clone()), span));
        tracker.advance(TurnPhase::Streaming);

        let mut client = ClientSink::new(tx);
        let mut streamed = String::new();
        let mut fragments = 0usize;
        let mut buffered: Option<BufferedCall> = None;
        let mut buffered_attempted = false;
        let mut winner: Option<(String, RelaySource)> = None;

        let silence = tokio::time::sleep(Duration::from_millis(self.config.stream_fallback_ms));
        tokio::pin!(silence);
        let mut silence_armed = true;

        let idle_period = Duration::from_millis(self.config.stream_idle_ms.max(1));
        let idle = tokio::time::sleep(idle_period);
        tokio::pin!(idle);
        let deadline = tokio::time::sleep(Duration::from_millis(self.config.stream_max_ms.max(1)));
        tokio::pin!(deadline);

        let period = Duration::from_millis(self.config.heartbeat_ms.max(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let upstream_open = upstream.is_some();
            tokio::select! {
                event = next_event(&mut upstream), if upstream_open => {
                    idle.as_mut().reset(Instant::now() + idle_period);
                    match event {
                        Some(Ok(StreamEvent::TextDelta { text })) if !text.is_empty() => {
                            streamed.push_str(&text);
                            if fragments > 0 {
                                fragments += 1;
                                client.send(RelayFrame::Fragment(text)).await;
                            } else if !streamed.trim().is_empty() {
                                // Leading whitespace rides along with the first real fragment.
                                silence_armed = false;
                                if buffered.take().is_some() {
                                    debug!("Stream produced text first, discarding buffered call");
                                }
                                fragments = 1;
                                let first = streamed.trim_start().to_string();
                                client.send(RelayFrame::Fragment(first)).await;
                            }
                        }
                        Some(Ok(StreamEvent::Done)) | None => upstream = None,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, fragments, "Upstream stream failed");
                            upstream = None;
                        }
                    }
                },
                () = &mut idle, if upstream_open => {
                    warn!(
                        idle_ms = self.config.stream_idle_ms,
                        fragments,
                        "Upstream stream went idle, closing it"
                    );
                    upstream = None;
                },
                () = &mut deadline, if upstream_open => {
                    warn!(
                        max_ms = self.config.stream_max_ms,
                        fragments,
                        "Upstream stream ran past its deadline, closing it"
                    );
                    upstream = None;
                },
                () = &mut silence, if silence_armed => {
                    silence_armed = false;
                    if fragments == 0 && !buffered_attempted {
                        debug!(
                            after_ms = self.config.stream_fallback_ms,
                            "No fragment yet, starting buffered call"
                        );
                        buffered = Some(self.buffered_call(&request));
                        buffered_attempted = true;
                    }
                },
                result = poll_optional(&mut buffered) => {
                    buffered = None;
                    match result {
                        Ok(response) if !response.content.trim().is_empty() => {
                            winner = Some((response.content, RelaySource::Buffered));
                        }
                        Ok(_) => warn!("Buffered call returned blank text"),
                        Err(e) => warn!(error = %e, "Buffered call failed"),
                    }
                },
                _ = heartbeat.tick() => {
                    client.send(RelayFrame::Heartbeat).await;
                },
            }

            if winner.is_some() {
                break;
            }
            if upstream.is_none() {
                if fragments > 0 {
                    winner = Some((std::mem::take(&mut streamed), RelaySource::Stream));
                    break;
                }
                if buffered.is_none() {
                    if buffered_attempted {
                        break;
                    }
                    debug!("Stream ended without text, retrying buffered");
                    buffered = Some(self.buffered_call(&request));
                    buffered_attempted = true;
                }
            }
        }

        let (text, source) = match winner {
            Some((text, RelaySource::Buffered)) => {
                tracker.advance(TurnPhase::Buffered);
                let text = text.trim().to_string();
                client.send(RelayFrame::Fragment(text.clone())).await;
                (text, RelaySource::Buffered)
            }
            Some((text, source)) => (text.trim().to_string(), source),
            None => {
                tracker.advance(TurnPhase::Buffered);
                warn!("Stream and buffered call both failed, sending fallback line");
                client.send(RelayFrame::Fragment(fallback_text.clone())).await;
                (fallback_text, RelaySource::Canned)
            }
        };

        if source != RelaySource::Canned {
            tracker.advance(TurnPhase::Persisting);
            persist(text.clone()).await;
        }
        client.send(RelayFrame::Done).await;
        tracker.advance(TurnPhase::Done);

        debug!(?source, fragments, client_connected = client.connected, "Relay finished");
        RelayOutcome {
            text,
            source,
            fragments,
            client_connected: client.connected,
        }
    }

    fn buffered_call(&self, request: &CompletionRequest) -> BufferedCall {
        let provider = Arc::clone(&self.provider);
        let request = request.clone();
        let policy = self.call_policy;
        Box::pin(
            async move { complete_with_retry(&provider, request, policy).await }
                .instrument(info_span!("relay.buffered")),
        )
    }
}

/// Next upstream event, or never once the upstream is closed.
async fn next_event(upstream: &mut Option<Upstream>) -> Option<Result<StreamEvent, LlmError>> {
    match upstream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Await the call if there is one; otherwise never resolve.
async fn poll_optional(call: &mut Option<BufferedCall>) -> Result<CompletionResponse, LlmError> {
    match call {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}

/// Sender that remembers a client disconnect instead of failing.
struct ClientSink {
    tx: mpsc::Sender<RelayFrame>,
    connected: bool,
}

impl ClientSink {
    fn new(tx: mpsc::Sender<RelayFrame>) -> Self {
        Self {
            tx,
            connected: true,
        }
    }

    async fn send(&mut self, frame: RelayFrame) {
        if !self.connected {
            return;
        }
        if self.tx.send(frame).await.is_err() {
            debug!("Client disconnected, continuing without forwarding");
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CompleteStep, RecordingReporter, ScriptedProvider, StreamScript};
    use confidant_types::llm::Message;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    const CANNED: &str = "I'm here. Try me again in a moment.";

    fn relay(provider: ScriptedProvider) -> StreamingRelay {
        relay_with(provider, RelayConfig::default())
    }

    fn relay_with(provider: ScriptedProvider, config: RelayConfig) -> StreamingRelay {
        StreamingRelay::new(
            Arc::new(BoxLlmProvider::new(provider)),
            config,
            CallPolicy {
                timeout: Duration::from_secs(8),
                retry_budget_factor: 0.5,
            },
        )
    }

    fn job() -> RelayJob {
        RelayJob {
            request: CompletionRequest {
                model: "test".to_string(),
                messages: vec![Message::user("hi")],
                max_tokens: 160,
                temperature: None,
                stream: true,
            },
            fallback_text: CANNED.to_string(),
            tracker: PhaseTracker::new(),
        }
    }

    /// Run the relay to completion, returning frames and persisted texts.
    async fn drive(relay: &StreamingRelay) -> (Vec<RelayFrame>, Vec<String>, RelayOutcome) {
        let (tx, mut rx) = mpsc::channel(64);
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);
        let outcome = relay
            .run(job(), tx, move |text| async move {
                sink.lock().unwrap().push(text);
            })
            .await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        let persisted = persisted.lock().unwrap().clone();
        (frames, persisted, outcome)
    }

    fn fragments(frames: &[RelayFrame]) -> Vec<&str> {
        frames
            .iter()
            .filter_map(|f| match f {
                RelayFrame::Fragment(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_stream_fragments_forwarded_in_order() {
        let (frames, persisted, outcome) =
            drive(&relay(ScriptedProvider::replying("Hello there friend"))).await;

        assert_eq!(fragments(&frames), vec!["Hello", " there", " friend"]);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert_eq!(persisted, vec!["Hello there friend".to_string()]);
        assert_eq!(outcome.source, RelaySource::Stream);
    }

    #[tokio::test]
    async fn test_stream_and_buffered_paths_persist_same_text() {
        let (_, streamed, _) = drive(&relay(ScriptedProvider::replying("Hello there friend"))).await;
        let (frames, buffered, outcome) = drive(&relay(
            ScriptedProvider::replying("Hello there friend").streaming(StreamScript::Empty),
        ))
        .await;

        assert_eq!(outcome.source, RelaySource::Buffered);
        assert_eq!(fragments(&frames), vec!["Hello there friend"]);
        assert_eq!(streamed, buffered);
    }

    #[tokio::test]
    async fn test_error_before_fragments_retries_buffered_once() {
        let scripted = ScriptedProvider::replying("Recovered reply")
            .streaming(StreamScript::FailAfter(Vec::new()));
        let calls = scripted.calls();
        let (frames, persisted, _) = drive(&relay(scripted)).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(fragments(&frames), vec!["Recovered reply"]);
        assert_eq!(persisted, vec!["Recovered reply".to_string()]);
    }

    #[tokio::test]
    async fn test_error_after_fragments_keeps_partial_text() {
        let scripted = ScriptedProvider::replying("unused").streaming(StreamScript::FailAfter(vec![
            "Half".to_string(),
            " a thought".to_string(),
        ]));
        let calls = scripted.calls();
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(fragments(&frames), vec!["Half", " a thought"]);
        assert_eq!(persisted, vec!["Half a thought".to_string()]);
        assert_eq!(outcome.source, RelaySource::Stream);
    }

    #[tokio::test]
    async fn test_both_sources_failing_sends_canned_line_without_persisting() {
        let (frames, persisted, outcome) = drive(&relay(ScriptedProvider::failing())).await;

        assert_eq!(fragments(&frames), vec![CANNED]);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert!(persisted.is_empty());
        assert_eq!(outcome.source, RelaySource::Canned);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_triggers_buffered_call_that_wins() {
        let scripted =
            ScriptedProvider::replying("Buffered answer").streaming(StreamScript::Silent);
        let calls = scripted.calls();
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(fragments(&frames), vec!["Buffered answer"]);
        assert_eq!(persisted, vec!["Buffered answer".to_string()]);
        assert_eq!(outcome.source, RelaySource::Buffered);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_stream_wins_over_pending_buffered_call() {
        let scripted = ScriptedProvider::with_steps(vec![CompleteStep::Hang])
            .streaming(StreamScript::Delayed(
                Duration::from_secs(7),
                vec!["Late".to_string(), " but here".to_string()],
            ));
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert_eq!(fragments(&frames), vec!["Late", " but here"]);
        assert_eq!(persisted, vec!["Late but here".to_string()]);
        assert_eq!(outcome.source, RelaySource::Stream);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_while_waiting() {
        let scripted = ScriptedProvider::with_steps(vec![CompleteStep::Hang, CompleteStep::Hang])
            .streaming(StreamScript::Delayed(
                Duration::from_secs(40),
                vec!["Finally".to_string()],
            ));
        let config = RelayConfig {
            stream_idle_ms: 60_000,
            ..RelayConfig::default()
        };
        let (frames, persisted, _) = drive(&relay_with(scripted, config)).await;

        let heartbeats = frames.iter().filter(|f| **f == RelayFrame::Heartbeat).count();
        assert_eq!(heartbeats, 2);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert_eq!(persisted, vec!["Finally".to_string()]);
    }

    #[tokio::test]
    async fn test_client_disconnect_still_persists() {
        let relay = Arc::new(relay(ScriptedProvider::replying("Kept for later")));
        let tasks = BackgroundTasks::new(Arc::new(RecordingReporter::default()));
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);

        let rx = relay.spawn(&tasks, job(), move |text| async move {
            sink.lock().unwrap().push(text);
        });
        drop(rx);
        tasks.drain().await;

        assert_eq!(*persisted.lock().unwrap(), vec!["Kept for later".to_string()]);
    }

    #[tokio::test]
    async fn test_exactly_one_stream_call() {
        let scripted = ScriptedProvider::replying("Once");
        let streams = scripted.stream_calls();
        drive(&relay(scripted)).await;
        assert_eq!(streams.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_with_failing_buffered_call_ends_with_canned_line() {
        let scripted = ScriptedProvider::failing().streaming(StreamScript::Silent);
        let relay = relay(scripted);
        let started = Instant::now();

        let (frames, persisted, outcome) =
            tokio::time::timeout(Duration::from_secs(3600), drive(&relay))
                .await
                .expect("relay must end on its own");

        assert_eq!(outcome.source, RelaySource::Canned);
        assert_eq!(fragments(&frames), vec![CANNED]);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert!(persisted.is_empty());
        assert!(started.elapsed() <= Duration::from_millis(RelayConfig::default().stream_idle_ms));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_keeps_partial_text() {
        let scripted = ScriptedProvider::failing().streaming(StreamScript::Stall(vec![
            "Half".to_string(),
            " a thought".to_string(),
        ]));
        let calls = scripted.calls();

        let (frames, persisted, outcome) =
            tokio::time::timeout(Duration::from_secs(3600), drive(&relay(scripted)))
                .await
                .expect("relay must end on its own");

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(fragments(&frames), vec!["Half", " a thought"]);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert_eq!(persisted, vec!["Half a thought".to_string()]);
        assert_eq!(outcome.source, RelaySource::Stream);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_stream_is_cut_at_deadline() {
        let scripted = ScriptedProvider::failing()
            .streaming(StreamScript::Trickle(Duration::from_secs(25), "la".to_string()));

        let (frames, persisted, outcome) =
            tokio::time::timeout(Duration::from_secs(3600), drive(&relay(scripted)))
                .await
                .expect("relay must end on its own");

        // Fragments at 25, 50, 75 and 100 seconds; the deadline is 120.
        assert_eq!(outcome.fragments, 4);
        assert_eq!(outcome.source, RelaySource::Stream);
        assert_eq!(frames.last(), Some(&RelayFrame::Done));
        assert_eq!(persisted, vec!["lalalala".to_string()]);
    }

    #[tokio::test]
    async fn test_whitespace_only_stream_falls_back_to_buffered() {
        let scripted = ScriptedProvider::replying("Real answer")
            .streaming(StreamScript::Fragments(vec![" ".to_string(), "\n".to_string()]));
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert_eq!(outcome.source, RelaySource::Buffered);
        assert_eq!(outcome.fragments, 0);
        assert_eq!(fragments(&frames), vec!["Real answer"]);
        assert_eq!(persisted, vec!["Real answer".to_string()]);
    }

    #[tokio::test]
    async fn test_whitespace_only_stream_with_failing_buffered_call_is_canned() {
        let scripted = ScriptedProvider::failing()
            .streaming(StreamScript::Fragments(vec!["  ".to_string(), "\n\n".to_string()]));
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert_eq!(outcome.source, RelaySource::Canned);
        assert_eq!(fragments(&frames), vec![CANNED]);
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn test_leading_whitespace_folds_into_first_fragment() {
        let scripted = ScriptedProvider::failing().streaming(StreamScript::Fragments(vec![
            "\n".to_string(),
            " Hi".to_string(),
            " there".to_string(),
        ]));
        let (frames, persisted, outcome) = drive(&relay(scripted)).await;

        assert_eq!(outcome.source, RelaySource::Stream);
        assert_eq!(fragments(&frames), vec!["Hi", " there"]);
        assert_eq!(persisted, vec!["Hi there".to_string()]);
    }
}
