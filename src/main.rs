use clap::Parser; // for cli
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use textgen_gateway::backend::{
    GenerationBackend, GenerationParams, LoadBalancer, OllamaBackend, health_checker,
};
use textgen_gateway::cache::{ExpiringCache, MemoryCache, RedisCache, ResponseCache};
use textgen_gateway::config::{Args, CacheBackend, LogFormat};
use textgen_gateway::metrics::{MetricsCollector, ProcSampler};
use textgen_gateway::state::AppState;
use textgen_gateway::{Coordinator, CoordinatorOptions, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.log_format);

    let client = reqwest::Client::builder()
        .timeout(args.request_timeout())
        .build()?;
    let load_balancer = Arc::new(LoadBalancer::new(&args.backends)?);
    let backend = Arc::new(OllamaBackend::new(
        client.clone(),
        load_balancer.clone(),
        args.model.clone(),
    ));

    let cache = build_cache(&args).await?;
    let metrics = Arc::new(MetricsCollector::new(Arc::new(ProcSampler::new())));
    let options = CoordinatorOptions {
        defaults: GenerationParams::new(args.max_length, args.temperature),
        coalesce_inflight: args.coalesce_inflight,
        workers: args.max_concurrent_requests,
        queue_capacity: args.max_concurrent_requests.max(1) * 10,
    };
    let coordinator = Arc::new(Coordinator::new(backend.clone(), cache, metrics, options)?);

    // flip readiness once an upstream answers
    let warm_up_coordinator = coordinator.clone();
    let retry = args.health_interval();
    tokio::spawn(async move {
        loop {
            match backend.warm_up().await {
                Ok(()) => {
                    warm_up_coordinator.mark_ready();
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in = ?retry, "backend not ready yet");
                    tokio::time::sleep(retry).await;
                }
            }
        }
    });

    tokio::spawn(health_checker(
        load_balancer,
        client,
        args.health_interval(),
    ));

    let app = handlers::router(AppState::new(coordinator));

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "gateway listening");
    tracing::info!(model = %args.model, backends = %args.backends, "forwarding generations");
    tracing::info!(
        cache = ?args.cache_backend,
        ttl_secs = args.cache_ttl,
        coalesce = args.coalesce_inflight,
        "cache configured"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn build_cache(args: &Args) -> anyhow::Result<Arc<dyn ResponseCache>> {
    let cache: Arc<dyn ResponseCache> = match (args.cache_backend, args.cache_ttl()) {
        (CacheBackend::Memory, Some(ttl)) => Arc::new(ExpiringCache::new(MemoryCache::new(), ttl)),
        (CacheBackend::Memory, None) => Arc::new(MemoryCache::new()),
        (CacheBackend::Redis, ttl) => Arc::new(RedisCache::connect(&args.redis_url, ttl).await?),
    };
    Ok(cache)
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
