//! Infrastructure layer for Confidant.
//!
//! Contains implementations of the ports defined in `confidant-core`:
//! SQLite state storage, an OpenAI-compatible completion provider, and the
//! TOML configuration loader.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod store;
