//! shop-server — storefront order API
//!
//! Axum HTTP service over PostgreSQL. The heart of the crate is the
//! checkout module: idempotent order placement under concurrent stock
//! contention. Everything around it is CRUD.

pub mod api;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
