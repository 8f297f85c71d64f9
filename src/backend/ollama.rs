use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::load_balancer::LoadBalancer;
use super::{GenerationBackend, GenerationParams};
use crate::error::BackendError;

// Ollama API request format
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

// Ollama API response format
#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Generation backend calling one or more Ollama servers.
pub struct OllamaBackend {
    client: reqwest::Client,
    load_balancer: Arc<LoadBalancer>,
    model: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, load_balancer: Arc<LoadBalancer>, model: String) -> Self {
        Self {
            client,
            load_balancer,
            model,
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, text: &str, params: &GenerationParams) -> Result<String, BackendError> {
        let upstream = self
            .load_balancer
            .next()
            .ok_or(BackendError::NoHealthyUpstream)?;
        tracing::debug!(url = %upstream.url, "calling upstream");

        let body = OllamaRequest {
            model: &self.model,
            prompt: text,
            stream: false,
            options: OllamaOptions {
                num_predict: params.max_length,
                temperature: params.temperature,
            },
        };

        let res = self
            .client
            .post(format!("{}/api/generate", upstream.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // Marking upstream as unhealthy on transport error
                upstream.set_healthy(false);
                tracing::warn!(url = %upstream.url, error = %e, "upstream failed, marked unhealthy");
                BackendError::Transport {
                    url: upstream.url.clone(),
                    reason: e.to_string(),
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaResponse = res
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(parsed.response.trim().to_string())
    }

    async fn warm_up(&self) -> Result<(), BackendError> {
        self.load_balancer.probe_all(&self.client).await;
        if self.load_balancer.any_healthy() {
            Ok(())
        } else {
            Err(BackendError::NoHealthyUpstream)
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
