use axum::{Json, extract::State, extract::rejection::JsonRejection};
use std::sync::Arc;

use crate::error::GatewayResult;
use crate::models::{GenerateRequest, GenerateResponse};
use crate::state::AppState;

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> GatewayResult<Json<GenerateResponse>> {
    // report body errors in the same {detail} shape as generation failures
    let Json(payload) = payload?;
    let coordinator = &state.coordinator;
    let params = coordinator.params(payload.max_length, payload.temperature);

    let response = coordinator.handle_generate(&payload.text, params).await?;
    tracing::info!(
        cached = response.cached,
        response_time = response.response_time,
        input_chars = payload.text.chars().count(),
        "generate"
    );
    Ok(Json(response))
}
