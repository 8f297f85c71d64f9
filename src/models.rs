use serde::{Deserialize, Serialize};

// POST /generate request body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateRequest {
    pub text: String,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

// POST /generate response body
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GenerateResponse {
    pub response: String,
    pub cached: bool,
    /// Seconds spent serving the request.
    pub response_time: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RootResponse {
    pub message: String,
    pub model: String,
    pub docs: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub model: String,
    pub cache_type: String,
    pub backend_version: String,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClearCacheResponse {
    pub message: String,
    pub cached_items: usize,
}
