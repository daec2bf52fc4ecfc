//! OpenAI-compatible chat completions provider.
//!
//! Talks to `{base_url}/chat/completions` directly over reqwest, so any
//! server speaking the OpenAI protocol (OpenAI, Mistral, local gateways)
//! works by changing the base URL.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::OpenAiCompatibleProvider;
