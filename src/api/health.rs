use crate::api::AppState;
use axum::extract::State;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once at least one collateral branch is configured.
pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let branches: Vec<&str> = state.config.branches.iter().map(|b| b.key.as_str()).collect();
    let status = if branches.is_empty() { "degraded" } else { "ready" };
    Json(serde_json::json!({
        "status": status,
        "branches": branches,
        "orderBook": state.config.order_book_address.is_some(),
    }))
}
