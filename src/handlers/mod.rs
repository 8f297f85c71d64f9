mod cache;
mod generate;
mod health;
mod metrics;

pub use cache::clear_cache_handler;
pub use generate::generate_handler;
pub use health::{health_handler, root_handler};
pub use metrics::{metrics_handler, prometheus_handler};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;

use crate::state::AppState;

// creating the router with routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/generate", post(generate_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/prometheus", get(prometheus_handler))
        .route("/health", get(health_handler))
        .route("/cache", delete(clear_cache_handler))
        .with_state(state)
}
