//! Data models
//!
//! Shared between the HTTP service and any future consumers (API
//! clients, admin tooling). DB row types use
//! `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.

pub mod order;
pub mod product;

// Re-exports
pub use order::*;
pub use product::*;
