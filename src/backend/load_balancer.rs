use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::{Duration, interval};

use crate::error::BackendError;

// Single upstream generation server
pub struct Upstream {
    pub url: String,
    healthy: AtomicBool,
}

impl Upstream {
    pub fn new(url: String) -> Self {
        Self {
            url,
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// Round-robin over healthy upstreams
pub struct LoadBalancer {
    upstreams: Vec<Arc<Upstream>>,
    current: AtomicUsize,
}

impl LoadBalancer {
    // Create from comma-separated urls "localhost:11434, localhost:11435"
    pub fn new(upstreams_str: &str) -> Result<Self, BackendError> {
        let upstreams: Vec<Arc<Upstream>> = upstreams_str
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|url| {
                // add http:// if not present
                let full_url = if url.starts_with("http") {
                    url.trim_end_matches('/').to_string()
                } else {
                    format!("http://{}", url.trim_end_matches('/'))
                };
                Arc::new(Upstream::new(full_url))
            })
            .collect();
        if upstreams.is_empty() {
            return Err(BackendError::Other("at least one backend url is required".into()));
        }

        tracing::info!(count = upstreams.len(), "load balancer initialized");
        for (i, upstream) in upstreams.iter().enumerate() {
            tracing::info!(index = i + 1, url = %upstream.url, "upstream");
        }

        Ok(Self {
            upstreams,
            current: AtomicUsize::new(0),
        })
    }

    // Next healthy upstream (round-robin)
    pub fn next(&self) -> Option<Arc<Upstream>> {
        let len = self.upstreams.len();
        let start = self.current.fetch_add(1, Ordering::Relaxed) % len;

        (0..len)
            .map(|i| &self.upstreams[(start + i) % len])
            .find(|upstream| upstream.is_healthy())
            .cloned()
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }

    pub fn any_healthy(&self) -> bool {
        self.upstreams.iter().any(|u| u.is_healthy())
    }

    // Probe every upstream once, logging status changes
    pub async fn probe_all(&self, client: &reqwest::Client) {
        for upstream in &self.upstreams {
            let url = format!("{}/api/tags", upstream.url);
            let was_healthy = upstream.is_healthy();

            let is_healthy = match client.get(&url).timeout(Duration::from_secs(5)).send().await {
                Ok(res) => res.status().is_success(),
                Err(_) => false,
            };
            upstream.set_healthy(is_healthy);

            if was_healthy != is_healthy {
                if is_healthy {
                    tracing::info!(url = %upstream.url, "upstream is now healthy");
                } else {
                    tracing::warn!(url = %upstream.url, "upstream is now unhealthy");
                }
            }
        }
    }
}

// Periodic upstream health checks
pub async fn health_checker(
    load_balancer: Arc<LoadBalancer>,
    client: reqwest::Client,
    check_interval: Duration,
) {
    let mut interval = interval(check_interval);
    tracing::info!(interval = ?check_interval, "health checker started");

    loop {
        interval.tick().await;
        load_balancer.probe_all(&client).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_normalized() {
        let lb = LoadBalancer::new("localhost:11434, http://gpu-2:11434/ ,").unwrap();
        let urls: Vec<&str> = lb.upstreams().iter().map(|u| u.url.as_str()).collect();
        assert_eq!(urls, ["http://localhost:11434", "http://gpu-2:11434"]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(LoadBalancer::new(" , ").is_err());
    }

    #[test]
    fn round_robin_skips_unhealthy() {
        let lb = LoadBalancer::new("a:1,b:2,c:3").unwrap();
        lb.upstreams()[1].set_healthy(false);

        let picked: Vec<String> = (0..4).map(|_| lb.next().unwrap().url.clone()).collect();
        assert_eq!(picked, ["http://a:1", "http://c:3", "http://c:3", "http://a:1"]);
    }

    #[test]
    fn no_healthy_upstream() {
        let lb = LoadBalancer::new("a:1").unwrap();
        lb.upstreams()[0].set_healthy(false);
        assert!(lb.next().is_none());
        assert!(!lb.any_healthy());
    }
}
