//! State store abstractions for Confidant.
//!
//! Defines the key-value port holding per-user records and an in-process
//! implementation. Durable implementations live in confidant-infra.

pub mod memory;
pub mod state_store;
