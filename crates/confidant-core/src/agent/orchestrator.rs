//! Dialogue orchestrator: the per-request turn state machine.
//!
//! `RECEIVED -> LOADING_STATE -> COMPRESSING -> PROMPT_ASSEMBLED ->
//! CALLING_PROVIDER -> {STREAMING | BUFFERED} -> PERSISTING -> DONE`, with
//! `ERROR` reachable from any step.
//!
//! Only a failure to load state reaches the caller. Provider failures turn
//! into canned replies, and writes after loading are best effort: they are
//! reported through the [`ErrorReporter`] and never fail the reply.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, warn};

use confidant_types::chat::{ActionKind, ChatAction, ChatRequest, Reply, ReplyLength, StreamRequest};
use confidant_types::config::EngineConfig;
use confidant_types::error::{EngineError, StoreError};
use confidant_types::identity::{Identity, UserId};
use confidant_types::llm::{CompletionRequest, Message};
use confidant_types::memory::{Memory, Turn, TurnRole};

use super::compressor::ThreadCompressor;
use super::names::extract_name;
use super::phase::{PhaseTracker, TurnPhase};
use super::prompt::{Directive, PromptAssembler, TurnContext};
use super::style::StyleHintProvider;
use crate::clock::Clock;
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::retry::{CallPolicy, complete_with_retry};
use crate::memory::manager::MemoryManager;
use crate::memory::nudge::NudgePolicy;
use crate::observe::{BackgroundTasks, ErrorReporter};
use crate::relay::{RelayFrame, RelayJob, StreamingRelay};
use crate::storage::state_store::StateStore;

const SAY_FALLBACK: &str = "I'm here with you. Could you say that once more?";
const FACT_FALLBACK: &str = "Got it. I'll remember that.";
const NUDGE_FALLBACK: &str = "Just checking in. I'm here whenever you feel like talking.";

pub struct DialogueOrchestrator<S: StateStore + 'static> {
    memory: Arc<MemoryManager<S>>,
    provider: Arc<BoxLlmProvider>,
    compressor: ThreadCompressor,
    prompts: PromptAssembler,
    relay: Arc<StreamingRelay>,
    background: BackgroundTasks,
    config: EngineConfig,
    call_policy: CallPolicy,
    nudge_policy: NudgePolicy,
}

impl<S: StateStore + 'static> DialogueOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        provider: BoxLlmProvider,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        style: Arc<dyn StyleHintProvider>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let provider = Arc::new(provider);
        let call_policy = CallPolicy::from_config(&config.provider);
        Self {
            memory: Arc::new(MemoryManager::new(store, config.memory.clone(), clock)),
            compressor: ThreadCompressor::new(
                &config.memory,
                config.provider.model.clone(),
                call_policy.timeout,
            ),
            prompts: PromptAssembler::new(config.persona.clone(), style),
            relay: Arc::new(StreamingRelay::new(
                Arc::clone(&provider),
                config.relay.clone(),
                call_policy,
            )),
            background: BackgroundTasks::new(reporter),
            nudge_policy: NudgePolicy::from_config(&config.nudge),
            call_policy,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<MemoryManager<S>> {
        &self.memory
    }

    /// Best-effort writes still in flight; drained on shutdown.
    pub fn background(&self) -> &BackgroundTasks {
        &self.background
    }

    /// Handle one validated dialogue request.
    ///
    /// An empty `Reply::text` is returned only for a denied nudge.
    pub async fn respond(&self, request: ChatRequest) -> Result<Reply, EngineError> {
        let span = info_span!(
            "dialogue.respond",
            user_id = %request.user_id,
            action = %request.action.kind(),
        );
        self.respond_inner(request).instrument(span).await
    }

    async fn respond_inner(&self, request: ChatRequest) -> Result<Reply, EngineError> {
        let mut tracker = PhaseTracker::new();
        let ChatRequest {
            user_id,
            timezone,
            action,
        } = request;

        let (mut identity, mut memory) = self.load(&user_id, &mut tracker).await?;

        let reply = match action {
            ChatAction::Init => {
                self.touch_in_background(&user_id, None);
                let fallback = greeting_fallback(&identity, &self.config.persona.assistant_name);
                let (text, degraded) = self
                    .generate(&mut tracker, &identity, &memory, &timezone, Directive::Greet, &fallback)
                    .await;
                tracker.advance(TurnPhase::Persisting);
                build_reply(text, degraded, identity, &memory)
            }
            ChatAction::Say { message, len } => {
                self.record_user_turn(&user_id, &message, &mut identity, &mut memory)
                    .await;
                let snapshot = memory.clone();
                memory.push_turn(
                    Turn::new(TurnRole::User, message.as_str(), self.memory.now()),
                    self.config.memory.thread_cap,
                );

                let directive = Directive::Reply {
                    message: &message,
                    len,
                };
                let (text, degraded) = self
                    .generate(&mut tracker, &identity, &snapshot, &timezone, directive, SAY_FALLBACK)
                    .await;

                tracker.advance(TurnPhase::Persisting);
                if !degraded {
                    self.persist_assistant_turn(&user_id, &text);
                    memory.push_turn(
                        Turn::new(TurnRole::Assistant, text.as_str(), self.memory.now()),
                        self.config.memory.thread_cap,
                    );
                }
                build_reply(text, degraded, identity, &memory)
            }
            ChatAction::LearnIdentity { name } => {
                let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
                self.learn_name(&user_id, &name, &mut identity, &mut memory)
                    .await;
                let fallback = format!("Lovely to meet you, {name}. I'll remember that.");
                let (text, degraded) = self
                    .generate(
                        &mut tracker,
                        &identity,
                        &memory,
                        &timezone,
                        Directive::AcknowledgeName { name: &name },
                        &fallback,
                    )
                    .await;
                tracker.advance(TurnPhase::Persisting);
                build_reply(text, degraded, identity, &memory)
            }
            ChatAction::AddFact { fact } => {
                let facts = [fact.clone()];
                if let Err(e) = self.memory.add_facts(&user_id, &facts).await {
                    self.report("add_facts", &e);
                }
                memory.add_fact(&fact);
                let (text, degraded) = self
                    .generate(
                        &mut tracker,
                        &identity,
                        &memory,
                        &timezone,
                        Directive::AcknowledgeFact { fact: &fact },
                        FACT_FALLBACK,
                    )
                    .await;
                tracker.advance(TurnPhase::Persisting);
                build_reply(text, degraded, identity, &memory)
            }
            ChatAction::Nudge => {
                let decision = match self.memory.try_reserve_nudge(&user_id, &self.nudge_policy).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        self.report("try_reserve_nudge", &e);
                        tracker.advance(TurnPhase::Done);
                        return Ok(Reply::silent());
                    }
                };
                if !decision.allowed() {
                    debug!(reason = decision.as_str(), "Nudge denied");
                    tracker.advance(TurnPhase::Done);
                    return Ok(Reply::silent());
                }

                let (text, degraded) = self
                    .generate(&mut tracker, &identity, &memory, &timezone, Directive::Nudge, NUDGE_FALLBACK)
                    .await;
                tracker.advance(TurnPhase::Persisting);
                if !degraded {
                    self.persist_assistant_turn(&user_id, &text);
                }
                build_reply(text, degraded, identity, &memory)
            }
        };

        tracker.advance(TurnPhase::Done);
        Ok(reply)
    }

    /// Start a streamed `say`. Frames arrive on the returned receiver; the
    /// final text is persisted before the terminal frame.
    pub async fn respond_stream(
        &self,
        request: StreamRequest,
    ) -> Result<mpsc::Receiver<RelayFrame>, EngineError> {
        let span = info_span!("dialogue.respond_stream", user_id = %request.user_id);
        async {
            let mut tracker = PhaseTracker::new();
            let StreamRequest {
                user_id,
                timezone,
                message,
                len,
            } = request;

            let (mut identity, mut memory) = self.load(&user_id, &mut tracker).await?;
            self.record_user_turn(&user_id, &message, &mut identity, &mut memory)
                .await;

            let directive = Directive::Reply {
                message: &message,
                len,
            };
            let messages = self
                .build_messages(&mut tracker, &identity, &memory, &timezone, directive)
                .await;
            tracker.advance(TurnPhase::CallingProvider);

            let job = RelayJob {
                request: self.completion_request(messages, ActionKind::Say, len),
                fallback_text: SAY_FALLBACK.to_string(),
                tracker,
            };

            let manager = Arc::clone(&self.memory);
            let reporter = Arc::clone(self.background.reporter());
            let rx = self.relay.spawn(&self.background, job, move |text| async move {
                if let Err(e) = manager.append_turn(&user_id, TurnRole::Assistant, &text).await {
                    reporter.report("append_turn", &e);
                }
            });
            Ok::<_, EngineError>(rx)
        }
        .instrument(span)
        .await
    }

    async fn load(
        &self,
        user_id: &UserId,
        tracker: &mut PhaseTracker,
    ) -> Result<(Identity, Memory), EngineError> {
        tracker.advance(TurnPhase::LoadingState);
        match tokio::try_join!(self.memory.get_identity(user_id), self.memory.get_memory(user_id)) {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                warn!(error = %e, "Failed to load user state");
                tracker.fail(&e.to_string());
                Err(e.into())
            }
        }
    }

    /// Learn a self-introduced name, persist the user turn, and refresh the topic.
    ///
    /// The user turn is awaited so it is stored before the assistant's.
    async fn record_user_turn(
        &self,
        user_id: &UserId,
        message: &str,
        identity: &mut Identity,
        memory: &mut Memory,
    ) {
        if let Some(name) = extract_name(message) {
            debug!(name = %name, "Learned name from message");
            self.learn_name(user_id, &name, identity, memory).await;
        }

        if let Err(e) = self
            .memory
            .append_turn(user_id, TurnRole::User, message)
            .await
        {
            self.report("append_turn", &e);
        }

        identity.set_topic(message);
        self.touch_in_background(user_id, Some(message));
    }

    async fn learn_name(
        &self,
        user_id: &UserId,
        name: &str,
        identity: &mut Identity,
        memory: &mut Memory,
    ) {
        match self.memory.learn_name(user_id, name).await {
            Ok(updated) => *identity = updated,
            Err(e) => {
                self.report("learn_name", &e);
                identity.name = Some(name.to_string());
            }
        }
        memory.add_fact(&format!("Name is {name}"));
    }

    async fn build_messages(
        &self,
        tracker: &mut PhaseTracker,
        identity: &Identity,
        memory: &Memory,
        timezone: &str,
        directive: Directive<'_>,
    ) -> Vec<Message> {
        tracker.advance(TurnPhase::Compressing);
        let compressed = self.compressor.compress(&self.provider, &memory.thread).await;

        let ctx = TurnContext {
            identity,
            memory,
            compressed: &compressed,
            timezone,
        };
        let messages = self.prompts.assemble(&ctx, directive);
        tracker.advance(TurnPhase::PromptAssembled);
        messages
    }

    /// Run one buffered completion. Returns the trimmed text, or `fallback`
    /// with the degraded flag set.
    async fn generate(
        &self,
        tracker: &mut PhaseTracker,
        identity: &Identity,
        memory: &Memory,
        timezone: &str,
        directive: Directive<'_>,
        fallback: &str,
    ) -> (String, bool) {
        let len = match directive {
            Directive::Reply { len, .. } => len,
            _ => ReplyLength::default(),
        };
        let action = match directive {
            Directive::Greet => ActionKind::Init,
            Directive::Reply { .. } => ActionKind::Say,
            Directive::AcknowledgeName { .. } => ActionKind::LearnIdentity,
            Directive::AcknowledgeFact { .. } => ActionKind::AddFact,
            Directive::Nudge => ActionKind::Nudge,
        };

        let messages = self
            .build_messages(tracker, identity, memory, timezone, directive)
            .await;
        tracker.advance(TurnPhase::CallingProvider);
        let request = self.completion_request(messages, action, len);
        let result = complete_with_retry(&self.provider, request, self.call_policy).await;
        tracker.advance(TurnPhase::Buffered);

        match result {
            Ok(response) if !response.content.trim().is_empty() => {
                (response.content.trim().to_string(), false)
            }
            Ok(_) => {
                warn!(%action, "Provider returned blank text, using fallback reply");
                (fallback.to_string(), true)
            }
            Err(e) => {
                warn!(%action, error = %e, "Provider call failed, using fallback reply");
                (fallback.to_string(), true)
            }
        }
    }

    fn completion_request(
        &self,
        messages: Vec<Message>,
        action: ActionKind,
        len: ReplyLength,
    ) -> CompletionRequest {
        CompletionRequest {
            model: self.config.provider.model.clone(),
            messages,
            max_tokens: self.config.provider.budgets.for_action(action, len),
            temperature: Some(self.config.provider.temperature),
            stream: false,
        }
    }

    fn persist_assistant_turn(&self, user_id: &UserId, text: &str) {
        let manager = Arc::clone(&self.memory);
        let user_id = user_id.clone();
        let text = text.to_string();
        self.background.spawn("append_turn", async move {
            manager
                .append_turn(&user_id, TurnRole::Assistant, &text)
                .await
        });
    }

    fn touch_in_background(&self, user_id: &UserId, topic: Option<&str>) {
        let manager = Arc::clone(&self.memory);
        let user_id = user_id.clone();
        let topic = topic.map(str::to_string);
        self.background.spawn("touch_identity", async move {
            manager
                .touch_identity(&user_id, topic.as_deref())
                .await
                .map(|_| ())
        });
    }

    fn report(&self, context: &str, error: &StoreError) {
        self.background.reporter().report(context, error);
    }
}

fn greeting_fallback(identity: &Identity, assistant_name: &str) -> String {
    match identity.known_name() {
        Some(name) => format!("Welcome back, {name}."),
        None => format!("Hello, I'm {assistant_name}. What should I call you?"),
    }
}

fn build_reply(text: String, degraded: bool, identity: Identity, memory: &Memory) -> Reply {
    Reply {
        text,
        degraded,
        identity: Some(identity),
        memory: Some(memory.view()),
    }
}
