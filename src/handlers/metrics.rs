use axum::{Json, extract::State, http::header, response::IntoResponse};
use std::sync::Arc;

use crate::error::GatewayResult;
use crate::metrics::Stats;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(state.coordinator.handle_metrics())
}

pub async fn prometheus_handler(
    State(state): State<Arc<AppState>>,
) -> GatewayResult<impl IntoResponse> {
    let body = state.coordinator.render_telemetry().await?;
    Ok((
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        body,
    ))
}
