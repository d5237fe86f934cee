//! 探针路由
//!
//! - GET /health
//! - GET /metrics

use axum::{Json, Router, response::IntoResponse, routing::get};
use fleet_telemetry::metrics;

/// 创建探针路由
pub fn create_router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn get_metrics() -> impl IntoResponse {
    Json(metrics().snapshot())
}
