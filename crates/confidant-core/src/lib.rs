//! Conversational state and delivery logic for Confidant.
//!
//! This crate defines the "ports" (state store, completion provider, clock,
//! error reporter) and the engine built on them: memory management, thread
//! compression, prompt assembly, the dialogue orchestrator, the streaming
//! relay, and idle-nudge scheduling. It depends only on `confidant-types`
//! and tokio -- never on `confidant-infra` or any database/HTTP crate.

pub mod agent;
pub mod clock;
pub mod llm;
pub mod memory;
pub mod observe;
pub mod relay;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
