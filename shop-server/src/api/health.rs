//! Health check endpoint

use axum::Json;
use axum::extract::State;
use http::StatusCode;

use crate::state::AppState;

/// GET /api/v1/health — verifies the database is reachable
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(serde_json::json!({
            "status": if db_ok { "ok" } else { "error" },
            "service": "shop-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
