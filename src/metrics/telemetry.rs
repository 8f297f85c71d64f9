use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Registry, TextEncoder};

/// Prometheus counters for the gateway, registered in their own registry so
/// independent gateways in one process do not collide.
#[derive(Clone)]
pub struct Telemetry {
    registry: Registry,
    pub requests_total: Counter,
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub generation_failures: Counter,
    pub request_latency: Histogram,
    pub cache_size: Gauge,
}

impl Telemetry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = Counter::new("textgen_requests_total", "Total number of requests")?;
        let cache_hits = Counter::new("textgen_cache_hits_total", "Total cache hits")?;
        let cache_misses = Counter::new("textgen_cache_misses_total", "Total cache misses")?;
        let generation_failures = Counter::new(
            "textgen_generation_failures_total",
            "Total failed backend generations",
        )?;
        let request_latency = Histogram::with_opts(HistogramOpts::new(
            "textgen_request_latency_seconds",
            "Request latency in seconds",
        ))?;
        let cache_size = Gauge::new("textgen_cache_size", "Current number of items in cache")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(generation_failures.clone()))?;
        registry.register(Box::new(request_latency.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            cache_hits,
            cache_misses,
            generation_failures,
            request_latency,
            cache_size,
        })
    }

    /// Text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
