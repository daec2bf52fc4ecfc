//! Buffered provider calls with a hard timeout and one reduced-budget retry.

use std::time::Duration;

use tracing::{Instrument, debug, info_span, warn};

use confidant_types::config::ProviderConfig;
use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::box_provider::BoxLlmProvider;

/// Smallest output budget a retry is allowed to shrink to.
pub const MIN_RETRY_TOKENS: u32 = 32;

/// Timeout and retry budget applied to every buffered call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub retry_budget_factor: f64,
}

impl CallPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            retry_budget_factor: config.retry_budget_factor,
        }
    }

    /// Output budget of the retry attempt.
    pub fn reduced_budget(&self, max_tokens: u32) -> u32 {
        let reduced = (f64::from(max_tokens) * self.retry_budget_factor).floor() as u32;
        reduced.clamp(MIN_RETRY_TOKENS.min(max_tokens), max_tokens)
    }
}

/// Run a buffered completion under `policy`.
///
/// A timeout, a retryable error or a blank response triggers exactly one
/// more attempt with a reduced output budget. The second outcome is
/// returned as is; a blank `Ok` is left for the caller to replace.
pub async fn complete_with_retry(
    provider: &BoxLlmProvider,
    mut request: CompletionRequest,
    policy: CallPolicy,
) -> Result<CompletionResponse, LlmError> {
    request.stream = false;

    match attempt(provider, &request, policy, 1).await {
        Ok(response) if !response.content.trim().is_empty() => return Ok(response),
        Ok(_) => debug!("Provider returned blank text, retrying"),
        Err(e) if !e.is_retryable() => return Err(e),
        Err(e) => warn!(error = %e, "Provider call failed, retrying with reduced budget"),
    }

    request.max_tokens = policy.reduced_budget(request.max_tokens);
    attempt(provider, &request, policy, 2).await
}

async fn attempt(
    provider: &BoxLlmProvider,
    request: &CompletionRequest,
    policy: CallPolicy,
    attempt: u32,
) -> Result<CompletionResponse, LlmError> {
    let span = info_span!(
        "gen_ai.complete",
        gen_ai.system = provider.name(),
        gen_ai.request.model = %request.model,
        gen_ai.request.max_tokens = request.max_tokens,
        gen_ai.request.temperature = ?request.temperature,
        attempt,
    );

    match tokio::time::timeout(policy.timeout, provider.complete(request))
        .instrument(span)
        .await
    {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            after_ms: policy.timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CompleteStep, ScriptedProvider};
    use confidant_types::llm::Message;

    fn request(max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            model: "test".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens,
            temperature: Some(0.9),
            stream: true,
        }
    }

    fn policy() -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(8),
            retry_budget_factor: 0.5,
        }
    }

    #[test]
    fn test_reduced_budget() {
        assert_eq!(policy().reduced_budget(320), 160);
        assert_eq!(policy().reduced_budget(40), 32);
        assert_eq!(policy().reduced_budget(20), 20);
    }

    #[tokio::test]
    async fn test_first_success_is_returned() {
        let scripted = ScriptedProvider::replying("hello");
        let calls = scripted.calls();
        let provider = BoxLlmProvider::new(scripted);

        let response = complete_with_retry(&provider, request(320), policy()).await.unwrap();
        assert_eq!(response.content, "hello");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].stream);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_with_reduced_budget() {
        let scripted = ScriptedProvider::with_steps(vec![
            CompleteStep::Hang,
            CompleteStep::Reply("second".to_string()),
        ]);
        let calls = scripted.calls();
        let provider = BoxLlmProvider::new(scripted);

        let response = complete_with_retry(&provider, request(320), policy()).await.unwrap();
        assert_eq!(response.content, "second");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].max_tokens, 320);
        assert_eq!(calls[1].max_tokens, 160);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_timeouts_surface_timeout() {
        let provider = BoxLlmProvider::new(ScriptedProvider::with_steps(vec![
            CompleteStep::Hang,
            CompleteStep::Hang,
        ]));
        let err = complete_with_retry(&provider, request(320), policy()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout { after_ms: 8000 }));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let scripted = ScriptedProvider::with_steps(vec![
            CompleteStep::AuthFailure,
            CompleteStep::Reply("unused".to_string()),
        ]);
        let calls = scripted.calls();
        let provider = BoxLlmProvider::new(scripted);

        let err = complete_with_retry(&provider, request(320), policy()).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationFailed));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_reply_is_retried() {
        let provider = BoxLlmProvider::new(ScriptedProvider::with_steps(vec![
            CompleteStep::Reply("   ".to_string()),
            CompleteStep::Reply("there".to_string()),
        ]));
        let response = complete_with_retry(&provider, request(100), policy()).await.unwrap();
        assert_eq!(response.content, "there");
    }
}
