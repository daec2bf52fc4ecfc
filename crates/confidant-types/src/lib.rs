//! Shared domain types for Confidant.
//!
//! This crate contains the domain types used across the conversational engine:
//! per-user Identity and Memory records, the request/reply shapes of the
//! dialogue endpoint, LLM request/stream types, configuration, and errors.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
pub mod memory;
