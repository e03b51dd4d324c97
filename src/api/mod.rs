//! HTTP API server and route handlers

pub mod auth_routes;
pub mod classes;
pub mod photos;
pub mod server;
pub mod users;

pub use server::{create_router, run_server, AppState, SharedState};

use axum::response::IntoResponse;
use axum::Json;

/// Health check
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
