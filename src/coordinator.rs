//! Ties the cache, the generation queue and the metrics collector together.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::backend::{GenerationBackend, GenerationParams};
use crate::cache::{ResponseCache, fingerprint};
use crate::error::{BackendError, GatewayError, GatewayResult};
use crate::metrics::{MetricsCollector, Stats, Telemetry};
use crate::models::{GenerateResponse, HealthResponse};
use crate::worker::GenerationQueue;

type PendingGeneration = Shared<BoxFuture<'static, Result<String, BackendError>>>;

struct Inflight {
    id: u64,
    pending: PendingGeneration,
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Used for fields a request leaves out.
    pub defaults: GenerationParams,
    /// Share one backend call between concurrent identical misses.
    pub coalesce_inflight: bool,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            defaults: GenerationParams::new(100, 0.7),
            coalesce_inflight: true,
            workers: 10,
            queue_capacity: 100,
        }
    }
}

pub struct Coordinator {
    cache: Arc<dyn ResponseCache>,
    metrics: Arc<MetricsCollector>,
    telemetry: Telemetry,
    queue: GenerationQueue,
    inflight: Arc<DashMap<String, Inflight>>,
    next_generation: AtomicU64,
    options: CoordinatorOptions,
    model: String,
    ready: AtomicBool,
}

impl Coordinator {
    /// Starts the generation workers, so this must run inside a tokio runtime.
    /// The coordinator starts out not ready; call [`Coordinator::mark_ready`]
    /// once the backend has warmed up.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        cache: Arc<dyn ResponseCache>,
        metrics: Arc<MetricsCollector>,
        options: CoordinatorOptions,
    ) -> GatewayResult<Self> {
        let model = backend.model().to_string();
        let queue = GenerationQueue::spawn(backend, options.workers, options.queue_capacity);
        Ok(Self {
            cache,
            metrics,
            telemetry: Telemetry::new()?,
            queue,
            inflight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            options,
            model,
            ready: AtomicBool::new(false),
        })
    }

    pub fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            tracing::info!(model = %self.model, "backend ready, accepting generations");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Fill missing request fields from the configured defaults.
    pub fn params(&self, max_length: Option<u32>, temperature: Option<f32>) -> GenerationParams {
        GenerationParams {
            max_length: max_length.unwrap_or(self.options.defaults.max_length),
            temperature: temperature.unwrap_or(self.options.defaults.temperature),
        }
    }

    pub async fn handle_generate(
        &self,
        text: &str,
        params: GenerationParams,
    ) -> GatewayResult<GenerateResponse> {
        if !self.is_ready() {
            return Err(GatewayError::NotReady);
        }
        let start = Instant::now();
        self.telemetry.requests_total.inc();

        if let Some(response) = self.cache.get(text).await {
            self.telemetry.cache_hits.inc();
            tracing::debug!("cache hit");
            self.metrics.record(start, text, &response, true);
            return Ok(self.respond(start, response, true));
        }
        self.telemetry.cache_misses.inc();
        tracing::debug!("cache miss, generating");

        let result = if self.options.coalesce_inflight {
            self.join_or_start(text, params).await
        } else {
            self.generation(text, params).await
        };

        match result {
            Ok(response) => {
                self.metrics.record(start, text, &response, false);
                Ok(self.respond(start, response, false))
            }
            Err(e) => {
                self.metrics.record_failure();
                self.telemetry.generation_failures.inc();
                Err(GatewayError::Backend(e))
            }
        }
    }

    pub fn handle_metrics(&self) -> Stats {
        self.metrics.stats()
    }

    pub fn handle_health(&self) -> HealthResponse {
        let ready = self.is_ready();
        HealthResponse {
            status: if ready { "healthy" } else { "initializing" }.to_string(),
            ready,
            model: self.model.clone(),
            cache_type: self.cache.kind().to_string(),
            backend_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub async fn handle_clear_cache(&self) -> usize {
        let cleared = self.cache.clear().await;
        self.telemetry.cache_size.set(self.cache.entry_count().await as f64);
        tracing::info!(cleared, "cache cleared");
        cleared
    }

    /// Refresh gauges that are cheaper to read at scrape time.
    pub async fn render_telemetry(&self) -> GatewayResult<String> {
        self.telemetry.cache_size.set(self.cache.entry_count().await as f64);
        Ok(self.telemetry.render()?)
    }

    fn respond(&self, start: Instant, response: String, cached: bool) -> GenerateResponse {
        let response_time = start.elapsed().as_secs_f64();
        self.telemetry.request_latency.observe(response_time);
        GenerateResponse {
            response,
            cached,
            response_time,
        }
    }

    // Backend call followed by the cache write. Owns everything it touches so
    // it keeps running for other waiters if the originating request goes away.
    fn generation(
        &self,
        text: &str,
        params: GenerationParams,
    ) -> BoxFuture<'static, Result<String, BackendError>> {
        let queue = self.queue.clone();
        let cache = self.cache.clone();
        let text = text.to_string();
        async move {
            let response = queue.submit(text.clone(), params).await?;
            cache.set(&text, &response).await;
            Ok(response)
        }
        .boxed()
    }

    async fn join_or_start(&self, text: &str, params: GenerationParams) -> Result<String, BackendError> {
        let (pending, _guard) = self.claim(text, params);
        pending.await
    }

    // Join the in-flight generation for `text`, or start one. The guard is
    // only handed to the request that started it.
    fn claim(&self, text: &str, params: GenerationParams) -> (PendingGeneration, Option<InflightGuard>) {
        let key = fingerprint(text);
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!("joining in-flight generation");
                (entry.get().pending.clone(), None)
            }
            Entry::Vacant(entry) => {
                let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let generation = self.generation(text, params);
                let inflight = self.inflight.clone();
                let marker = key.clone();
                let pending = async move {
                    let result = generation.await;
                    // unmark before resolving so later misses start a fresh call
                    inflight.remove_if(&marker, |_, current| current.id == id);
                    result
                }
                .boxed()
                .shared();
                entry.insert(Inflight {
                    id,
                    pending: pending.clone(),
                });
                let guard = InflightGuard {
                    inflight: self.inflight.clone(),
                    key,
                    id,
                };
                (pending, Some(guard))
            }
        }
    }
}

// Removes the in-flight marker if the leading request is dropped before the
// generation resolves
struct InflightGuard {
    inflight: Arc<DashMap<String, Inflight>>,
    key: String,
    id: u64,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight
            .remove_if(&self.key, |_, current| current.id == self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::metrics::{FixedSampler, ResourceUsage};
    use async_trait::async_trait;
    use crate::cache::ExpiringCache;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingBackend {
        calls: AtomicUsize,
        delay: Duration,
        failing: AtomicBool,
    }

    impl CountingBackend {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                failing: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for CountingBackend {
        async fn generate(&self, text: &str, params: &GenerationParams) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if text == "boom" || self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Other("CUDA out of memory".into()));
            }
            Ok(format!("{text}:{}", params.max_length))
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    fn setup(delay: Duration, coalesce: bool) -> (Coordinator, Arc<CountingBackend>, Arc<MemoryCache>) {
        let backend = CountingBackend::new(delay);
        let cache = Arc::new(MemoryCache::new());
        let metrics = Arc::new(MetricsCollector::new(Arc::new(FixedSampler(
            ResourceUsage::default(),
        ))));
        let options = CoordinatorOptions {
            defaults: GenerationParams::new(20, 0.7),
            coalesce_inflight: coalesce,
            ..CoordinatorOptions::default()
        };
        let coordinator = Coordinator::new(backend.clone(), cache.clone(), metrics, options).unwrap();
        coordinator.mark_ready();
        (coordinator, backend, cache)
    }

    fn total(stats: Stats) -> (usize, usize) {
        match stats {
            Stats::Aggregate(s) => (s.total_requests, s.cache_hits),
            Stats::Empty { .. } => (0, 0),
        }
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let (coordinator, backend, _) = setup(Duration::ZERO, true);
        let params = coordinator.params(None, None);

        let first = coordinator.handle_generate("Hello", params).await.unwrap();
        let second = coordinator.handle_generate("Hello", params).await.unwrap();

        assert_eq!(first.response, "Hello:20");
        assert!(!first.cached);
        assert_eq!(second.response, "Hello:20");
        assert!(second.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(total(coordinator.handle_metrics()), (2, 1));
    }

    #[tokio::test]
    async fn failures_are_not_cached_or_recorded() {
        let (coordinator, backend, cache) = setup(Duration::ZERO, true);
        let params = coordinator.params(Some(5), None);

        let err = coordinator.handle_generate("boom", params).await.unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));
        assert_eq!(cache.get("boom").await, None);
        assert!(matches!(coordinator.handle_metrics(), Stats::Empty { .. }));

        // failure is not remembered: the next attempt calls the backend again
        let _ = coordinator.handle_generate("boom", params).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(coordinator.inflight.is_empty());
    }

    #[tokio::test]
    async fn rejects_before_ready() {
        let backend = CountingBackend::new(Duration::ZERO);
        let coordinator = Coordinator::new(
            backend.clone(),
            Arc::new(MemoryCache::new()),
            Arc::new(MetricsCollector::new(Arc::new(FixedSampler::default()))),
            CoordinatorOptions::default(),
        )
        .unwrap();

        let params = coordinator.params(None, None);
        let err = coordinator.handle_generate("Hello", params).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotReady));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.handle_health().status, "initializing");

        coordinator.mark_ready();
        assert!(coordinator.handle_generate("Hello", params).await.is_ok());
        assert_eq!(coordinator.handle_health().status, "healthy");
    }

    #[tokio::test]
    async fn concurrent_identical_misses_share_one_call() {
        let (coordinator, backend, _) = setup(Duration::from_millis(100), true);
        let coordinator = Arc::new(coordinator);
        let params = coordinator.params(None, None);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.handle_generate("same", params).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().response, "same:20");
        }

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(coordinator.inflight.is_empty());
        assert_eq!(total(coordinator.handle_metrics()).0, 5);
    }

    #[tokio::test]
    async fn finished_generation_is_not_joined() {
        let (coordinator, backend, _) = setup(Duration::ZERO, true);
        let params = coordinator.params(None, None);

        // keep the leader's guard alive past completion
        let (pending, guard) = coordinator.claim("boom", params);
        assert!(guard.is_some());
        assert!(pending.await.is_err());
        assert!(coordinator.inflight.is_empty());

        let (retry, retry_guard) = coordinator.claim("boom", params);
        assert!(retry_guard.is_some());
        assert!(retry.await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stale_guard_leaves_newer_generation_marked() {
        let (coordinator, _, _) = setup(Duration::from_millis(100), true);
        let params = coordinator.params(None, None);

        let (first, first_guard) = coordinator.claim("a", params);
        first.await.unwrap();
        let (_second, second_guard) = coordinator.claim("a", params);
        assert!(second_guard.is_some());

        drop(first_guard);
        assert_eq!(coordinator.inflight.len(), 1);
        drop(second_guard);
        assert!(coordinator.inflight.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_not_served_after_failed_regeneration() {
        let backend = CountingBackend::new(Duration::ZERO);
        let cache = Arc::new(ExpiringCache::new(MemoryCache::new(), Duration::from_millis(30)));
        let coordinator = Coordinator::new(
            backend.clone(),
            cache,
            Arc::new(MetricsCollector::new(Arc::new(FixedSampler::default()))),
            CoordinatorOptions::default(),
        )
        .unwrap();
        coordinator.mark_ready();
        let params = coordinator.params(None, None);

        coordinator.handle_generate("Hello", params).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        backend.failing.store(true, Ordering::SeqCst);
        assert!(coordinator.handle_generate("Hello", params).await.is_err());
        assert!(coordinator.handle_generate("Hello", params).await.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

        backend.failing.store(false, Ordering::SeqCst);
        let fresh = coordinator.handle_generate("Hello", params).await.unwrap();
        assert!(!fresh.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn without_coalescing_each_miss_is_generated() {
        let (coordinator, backend, cache) = setup(Duration::ZERO, false);
        let params = coordinator.params(None, None);

        coordinator.handle_generate("a", params).await.unwrap();
        coordinator.handle_generate("b", params).await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.entry_count().await, 2);
        assert!(coordinator.inflight.is_empty());
    }

    #[tokio::test]
    async fn clear_cache_forces_regeneration() {
        let (coordinator, backend, _) = setup(Duration::ZERO, true);
        let params = coordinator.params(None, None);

        coordinator.handle_generate("Hello", params).await.unwrap();
        assert_eq!(coordinator.handle_clear_cache().await, 1);
        let again = coordinator.handle_generate("Hello", params).await.unwrap();

        assert!(!again.cached);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn health_reports_identity() {
        let (coordinator, _, _) = setup(Duration::ZERO, true);
        let health = coordinator.handle_health();
        assert!(health.ready);
        assert_eq!(health.model, "test-model");
        assert_eq!(health.cache_type, "memory");
        assert_eq!(health.backend_version, env!("CARGO_PKG_VERSION"));
    }
}
