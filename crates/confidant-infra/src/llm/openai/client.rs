//! OpenAiCompatibleProvider -- concrete [`LlmProvider`] implementation for
//! OpenAI-compatible chat completions APIs.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use confidant_core::llm::provider::{EventStream, LlmProvider};
use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};

use super::streaming::create_chat_stream;
use super::types::{ChatCompletionBody, ChatCompletionResponse};

/// Provider for any OpenAI-compatible API.
///
/// # API Key Security
///
/// Does NOT derive Debug. The key is only exposed when building the
/// `Authorization` header.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider.
    ///
    /// No overall request timeout is set on the client: callers bound each
    /// call themselves, and a stream may legitimately stay open for long.
    pub fn new(api_key: SecretString, base_url: String, model: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Map a non-success HTTP status to an [`LlmError`].
pub(super) fn error_for_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: String,
) -> LlmError {
    match status.as_u16() {
        400 | 404 | 422 => LlmError::InvalidRequest(body),
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after.map(|secs| secs * 1000),
        },
        503 | 529 => LlmError::Overloaded(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

/// Seconds from a `Retry-After` header, when it is a plain integer.
pub(super) fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatCompletionBody::from_request(request, false);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, retry_after, error_body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(model = %parsed.model, chars = content.len(), "Completion received");

        Ok(CompletionResponse {
            content,
            model: if parsed.model.is_empty() {
                request.model.clone()
            } else {
                parsed.model
            },
            usage: parsed.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let body = ChatCompletionBody::from_request(&request, true);
        create_chat_stream(&self.client, &self.url(), body, &self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, String::new()),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(2), String::new()),
            LlmError::RateLimited {
                retry_after_ms: Some(2000)
            }
        ));
        assert!(matches!(
            error_for_status(StatusCode::SERVICE_UNAVAILABLE, None, "busy".to_string()),
            LlmError::Overloaded(ref body) if body == "busy"
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, None, "bad".to_string()),
            LlmError::InvalidRequest(_)
        ));

        let err = error_for_status(StatusCode::INTERNAL_SERVER_ERROR, None, "oops".to_string());
        assert_eq!(err.to_string(), "provider error: HTTP 500 Internal Server Error: oops");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_secs(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_secs(&headers), Some(7));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAiCompatibleProvider::new(
            SecretString::from("sk-test".to_string()),
            "http://localhost:8080/v1/".to_string(),
            "local".to_string(),
        )
        .unwrap();
        assert_eq!(provider.url(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(provider.model(), "local");
    }
}
