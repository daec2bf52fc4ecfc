//! Completion provider implementations.
//!
//! Contains the concrete implementation of the [`LlmProvider`] trait defined
//! in `confidant-core` for any OpenAI-compatible chat completions API, plus
//! the factory ([`create_provider`]) used by the server and CLI.
//!
//! [`LlmProvider`]: confidant_core::llm::provider::LlmProvider

pub mod openai;

use secrecy::SecretString;

use confidant_core::llm::box_provider::BoxLlmProvider;
use confidant_types::config::ProviderConfig;
use confidant_types::llm::LlmError;

use self::openai::OpenAiCompatibleProvider;

/// Read the API key named by `config.api_key_env` from the environment.
pub fn resolve_api_key(config: &ProviderConfig) -> Option<SecretString> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`].
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no API key is available,
/// or a provider error if the HTTP client cannot be built.
pub fn create_provider(
    config: &ProviderConfig,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    let provider = OpenAiCompatibleProvider::new(key, config.base_url.clone(), config.model.clone())?;
    Ok(BoxLlmProvider::new(provider))
}
