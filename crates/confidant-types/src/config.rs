//! Engine configuration types for Confidant.
//!
//! `EngineConfig` is the top-level `config.toml`. Every field has a default,
//! so an empty file (or no file) yields a working configuration.

use serde::{Deserialize, Serialize};

use crate::chat::{ActionKind, ReplyLength};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub nudge: NudgeConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

/// Thread retention and compression.
///
/// `thread_cap` bounds what is stored; `compression_window` is how many of
/// the most recent stored turns are sent verbatim. Everything older within
/// the stored thread is summarized at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_thread_cap")]
    pub thread_cap: usize,
    #[serde(default = "default_compression_window")]
    pub compression_window: usize,
    #[serde(default = "default_summary_sentences")]
    pub summary_sentences: u32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
}

fn default_thread_cap() -> usize {
    200
}

fn default_compression_window() -> usize {
    20
}

fn default_summary_sentences() -> u32 {
    5
}

fn default_summary_max_tokens() -> u32 {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            thread_cap: default_thread_cap(),
            compression_window: default_compression_window(),
            summary_sentences: default_summary_sentences(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

/// Idle nudge throttling (server) and backoff (client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NudgeConfig {
    /// Minimum quiet time since last thread activity.
    #[serde(default = "default_min_gap_ms")]
    pub min_gap_ms: u64,
    /// Window in which a previous nudge blocks another one.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
}

fn default_min_gap_ms() -> u64 {
    75_000
}

fn default_cooldown_ms() -> u64 {
    5 * 60_000
}

fn default_max_per_day() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    90_000
}

fn default_backoff_ceiling_ms() -> u64 {
    20 * 60_000
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            min_gap_ms: default_min_gap_ms(),
            cooldown_ms: default_cooldown_ms(),
            max_per_day: default_max_per_day(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
        }
    }
}

/// Completion provider connection and per-action output budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Hard timeout of a single provider call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Fraction of the output budget used for the single retry.
    #[serde(default = "default_retry_budget_factor")]
    pub retry_budget_factor: f64,
    #[serde(default)]
    pub budgets: OutputBudgets,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f64 {
    0.9
}

fn default_timeout_ms() -> u64 {
    8_000
}

fn default_retry_budget_factor() -> f64 {
    0.5
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
            retry_budget_factor: default_retry_budget_factor(),
            budgets: OutputBudgets::default(),
        }
    }
}

/// Maximum output tokens per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBudgets {
    #[serde(default = "default_init_budget")]
    pub init: u32,
    #[serde(default = "default_nudge_budget")]
    pub nudge: u32,
    #[serde(default = "default_ack_budget")]
    pub acknowledge: u32,
    #[serde(default = "default_say_short")]
    pub say_short: u32,
    #[serde(default = "default_say_medium")]
    pub say_medium: u32,
    #[serde(default = "default_say_long")]
    pub say_long: u32,
}

fn default_init_budget() -> u32 {
    120
}

fn default_nudge_budget() -> u32 {
    90
}

fn default_ack_budget() -> u32 {
    80
}

fn default_say_short() -> u32 {
    160
}

fn default_say_medium() -> u32 {
    320
}

fn default_say_long() -> u32 {
    640
}

impl Default for OutputBudgets {
    fn default() -> Self {
        Self {
            init: default_init_budget(),
            nudge: default_nudge_budget(),
            acknowledge: default_ack_budget(),
            say_short: default_say_short(),
            say_medium: default_say_medium(),
            say_long: default_say_long(),
        }
    }
}

impl OutputBudgets {
    /// Budget for an action; `len` only matters for `say`.
    pub fn for_action(&self, action: ActionKind, len: ReplyLength) -> u32 {
        match action {
            ActionKind::Init => self.init,
            ActionKind::Nudge => self.nudge,
            ActionKind::LearnIdentity | ActionKind::AddFact => self.acknowledge,
            ActionKind::Say => match len {
                ReplyLength::Short => self.say_short,
                ReplyLength::Medium => self.say_medium,
                ReplyLength::Long => self.say_long,
            },
        }
    }
}

/// Streaming relay timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Silence before a buffered call is raced against the stream.
    #[serde(default = "default_stream_fallback_ms")]
    pub stream_fallback_ms: u64,
    /// Longest gap between upstream events before the stream is closed.
    #[serde(default = "default_stream_idle_ms")]
    pub stream_idle_ms: u64,
    /// Hard limit on the whole upstream stream.
    #[serde(default = "default_stream_max_ms")]
    pub stream_max_ms: u64,
    /// Frames buffered towards a slow client before backpressure applies.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_heartbeat_ms() -> u64 {
    15_000
}

fn default_stream_fallback_ms() -> u64 {
    6_000
}

fn default_stream_idle_ms() -> u64 {
    30_000
}

fn default_stream_max_ms() -> u64 {
    120_000
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
            stream_fallback_ms: default_stream_fallback_ms(),
            stream_idle_ms: default_stream_idle_ms(),
            stream_max_ms: default_stream_max_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Who the assistant is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    #[serde(default = "default_persona_prompt")]
    pub prompt: String,
}

fn default_assistant_name() -> String {
    "Confidant".to_string()
}

fn default_persona_prompt() -> String {
    "You are a warm, perceptive companion. Speak naturally, in 2-6 short sentences, \
     as if read aloud. Prefer concrete detail over abstraction. Ask at most one \
     question, and only when it truly helps."
        .to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            prompt: default_persona_prompt(),
        }
    }
}
