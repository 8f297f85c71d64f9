use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::ClearCacheResponse;
use crate::state::AppState;

pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Json<ClearCacheResponse> {
    let cached_items = state.coordinator.handle_clear_cache().await;
    Json(ClearCacheResponse {
        message: "Cache cleared".to_string(),
        cached_items,
    })
}
