//! Application state wiring the engine to its adapters.
//!
//! The orchestrator is generic over its state store; AppState pins it to the
//! runtime-selected [`StateBackend`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use confidant_core::agent::orchestrator::DialogueOrchestrator;
use confidant_core::agent::style::SeededStyleHints;
use confidant_core::clock::SystemClock;
use confidant_core::llm::box_provider::BoxLlmProvider;
use confidant_core::observe::TracingReporter;
use confidant_core::storage::memory::InMemoryStateStore;
use confidant_infra::config::{load_config, resolve_data_dir};
use confidant_infra::llm::{create_provider, resolve_api_key};
use confidant_infra::sqlite::pool::{DatabasePool, database_url};
use confidant_infra::sqlite::state::SqliteStateStore;
use confidant_infra::store::StateBackend;
use confidant_types::config::EngineConfig;

pub type ConcreteOrchestrator = DialogueOrchestrator<StateBackend>;

/// Shared application state, used by both CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ConcreteOrchestrator>,
    pub data_dir: PathBuf,
    pub store_kind: &'static str,
}

impl AppState {
    /// Load config, open the store, and build the provider.
    ///
    /// `ephemeral` keeps all state in process memory instead of SQLite.
    pub async fn init(ephemeral: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let store = if ephemeral {
            StateBackend::Memory(InMemoryStateStore::new())
        } else {
            let pool = DatabasePool::new(&database_url(&data_dir))
                .await
                .context("failed to open the state database")?;
            StateBackend::Sqlite(SqliteStateStore::new(pool))
        };

        let provider = create_provider(&config.provider, resolve_api_key(&config.provider))
            .with_context(|| {
                format!(
                    "no usable completion provider (is {} set?)",
                    config.provider.api_key_env
                )
            })?;

        tracing::info!(
            store = store.kind(),
            model = %config.provider.model,
            data_dir = %data_dir.display(),
            "Application state initialized"
        );

        Ok(Self::from_parts(store, provider, config, data_dir))
    }

    pub fn from_parts(
        store: StateBackend,
        provider: BoxLlmProvider,
        config: EngineConfig,
        data_dir: PathBuf,
    ) -> Self {
        let store_kind = store.kind();
        let orchestrator = DialogueOrchestrator::new(
            Arc::new(store),
            provider,
            config,
            Arc::new(SystemClock),
            Arc::new(SeededStyleHints::from_entropy()),
            Arc::new(TracingReporter),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            data_dir,
            store_kind,
        }
    }

    /// Wait for best-effort writes still in flight.
    pub async fn drain(&self) {
        self.orchestrator.background().drain().await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-process provider and state for handler tests.

    use futures_util::stream;

    use confidant_core::llm::provider::{EventStream, LlmProvider};
    use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent, Usage};

    use super::*;

    /// Replies with a fixed text, streamed as one fragment per word.
    pub struct CannedProvider {
        pub text: &'static str,
    }

    impl LlmProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.text.to_string(),
                model: request.model.clone(),
                usage: Usage::default(),
            })
        }

        fn stream(&self, _request: CompletionRequest) -> EventStream {
            let mut events: Vec<Result<StreamEvent, LlmError>> = self
                .text
                .split_inclusive(' ')
                .map(|word| {
                    Ok(StreamEvent::TextDelta {
                        text: word.to_string(),
                    })
                })
                .collect();
            events.push(Ok(StreamEvent::Done));
            Box::pin(stream::iter(events))
        }
    }

    pub fn app_state(text: &'static str) -> AppState {
        AppState::from_parts(
            StateBackend::Memory(InMemoryStateStore::new()),
            BoxLlmProvider::new(CannedProvider { text }),
            EngineConfig::default(),
            PathBuf::from("."),
        )
    }
}
