//! The text-generation backend seam.

mod load_balancer;
mod ollama;

pub use load_balancer::{LoadBalancer, Upstream, health_checker};
pub use ollama::OllamaBackend;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BackendError;

/// Knobs forwarded to the backend with every generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub max_length: u32,
    pub temperature: f32,
}

impl GenerationParams {
    pub fn new(max_length: u32, temperature: f32) -> Self {
        Self {
            max_length,
            temperature,
        }
    }
}

/// Black-box text generator: slow and fallible.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, text: &str, params: &GenerationParams) -> Result<String, BackendError>;

    /// Completes once the backend can serve requests.
    async fn warm_up(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Model identifier reported by `/` and `/health`.
    fn model(&self) -> &str;
}
