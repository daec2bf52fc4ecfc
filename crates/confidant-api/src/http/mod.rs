//! HTTP API layer for Confidant.
//!
//! Axum-based API at `/api/v1/` with a single JSON dialogue endpoint, its
//! streaming twin, and a health check.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
