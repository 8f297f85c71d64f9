use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::{HealthResponse, RootResponse};
use crate::state::AppState;

pub async fn root_handler(State(state): State<Arc<AppState>>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Text generation gateway is running!".to_string(),
        model: state.coordinator.model().to_string(),
        docs: [
            "POST /generate",
            "GET /metrics",
            "GET /metrics/prometheus",
            "GET /health",
            "DELETE /cache",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
    })
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(state.coordinator.handle_health())
}
