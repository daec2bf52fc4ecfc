//! LlmProvider trait definition.
//!
//! The single abstraction over the remote completion service. Uses RPITIT
//! for `complete` and `Pin<Box<dyn Stream>>` for `stream` (streams need to
//! be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use confidant_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for completion provider backends.
///
/// Implementations live in confidant-infra (e.g., `OpenAiCompatibleProvider`).
/// Callers apply their own timeouts; implementations need not.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// A stream that ends without [`StreamEvent::Done`] is treated the same
    /// as one that ends with it.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
