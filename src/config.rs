use clap::{Parser, ValueEnum};
use std::time::Duration;

// Which store holds cached responses
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "textgen-gateway")]
#[command(about = "Caching text-generation gateway with request metrics")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // Model identifier passed to the backend
    #[arg(short, long, env = "MODEL_NAME", default_value = "llama3.2:1b")]
    pub model: String,

    // Default generation length when the request omits max_length
    #[arg(long, env = "MAX_LENGTH", default_value_t = 100)]
    pub max_length: u32,

    // Default sampling temperature when the request omits it
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, env = "CACHE_BACKEND", value_enum, default_value_t = CacheBackend::Memory)]
    pub cache_backend: CacheBackend,

    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    // Cache TTL in seconds (0 keeps entries until cleared)
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 3600)]
    pub cache_ttl: u64,

    // Backend servers (comma-separated)
    // Example: "localhost:11434,localhost:11435"
    #[arg(short, long, env = "OLLAMA_BACKENDS", default_value = "localhost:11434")]
    pub backends: String,

    // Upstream health check interval in seconds
    #[arg(long, env = "HEALTH_INTERVAL", default_value_t = 30)]
    pub health_interval: u64,

    // Per-call timeout for the generation backend in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 120)]
    pub request_timeout: u64,

    // Number of generation workers
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 10)]
    pub max_concurrent_requests: usize,

    // Share one backend call between concurrent identical requests
    #[arg(long, env = "COALESCE_INFLIGHT", default_value_t = true, action = clap::ArgAction::Set)]
    pub coalesce_inflight: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl > 0).then(|| Duration::from_secs(self.cache_ttl))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::try_parse_from(["textgen-gateway"]).unwrap();
        assert_eq!(args.max_length, 100);
        assert_eq!(args.cache_backend, CacheBackend::Memory);
        assert_eq!(args.cache_ttl(), Some(Duration::from_secs(3600)));
        assert!(args.coalesce_inflight);
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let args = Args::try_parse_from([
            "textgen-gateway",
            "--cache-ttl",
            "0",
            "--cache-backend",
            "redis",
            "--coalesce-inflight",
            "false",
        ])
        .unwrap();
        assert_eq!(args.cache_ttl(), None);
        assert_eq!(args.cache_backend, CacheBackend::Redis);
        assert!(!args.coalesce_inflight);
    }
}
