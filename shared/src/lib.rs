//! Shared types for the shop services
//!
//! Domain models and the unified error system used by the HTTP
//! service crate. DB row derives are feature-gated behind `db` so
//! non-server consumers do not pull in sqlx.

pub mod error;
pub mod models;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};
