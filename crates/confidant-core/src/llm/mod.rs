//! Completion provider abstraction and call helpers.

pub mod box_provider;
pub mod provider;
pub mod retry;
pub mod span;
pub mod sse;
