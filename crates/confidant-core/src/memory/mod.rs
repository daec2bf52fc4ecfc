//! Per-user memory lifecycle and idle-nudge scheduling.

pub mod backoff;
pub mod manager;
pub mod nudge;
