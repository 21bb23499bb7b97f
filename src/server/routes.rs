// src/server/routes.rs
//! Axum router configuration for the Canister server

use crate::server::ServerState;
use crate::server::ws;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

/// Create the main application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/ws", get(ws::ws_handler))
        .fallback(not_found)
        .with_state(state)
}

fn timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "OK", "timestamp": timestamp() }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": "404 Not Found", "timestamp": timestamp() })),
    )
}
