//! API routes for shop-server

pub mod health;
pub mod order;

use axum::Router;
use axum::routing::{get, patch, post};
use shared::error::{AppError, ErrorCode};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Map a database error to a logged 500 without leaking detail
pub(crate) fn internal(e: impl std::fmt::Display) -> AppError {
    tracing::error!("Order query error: {e}");
    AppError::new(ErrorCode::InternalError)
}

/// Build the fully configured application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health::health_check))
        .route(
            "/api/v1/orders",
            post(order::create_order).get(order::list_orders),
        )
        .route("/api/v1/orders/{id}", get(order::get_order))
        .route(
            "/api/v1/orders/{id}/status",
            patch(order::update_order_status),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
