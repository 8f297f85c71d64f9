use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::sampler::ResourceSampler;

pub const DEFAULT_HISTORY: usize = 1000;
pub const DEFAULT_WINDOW: usize = 100;

/// Outcome of one served request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    /// Unix time in seconds when the record was taken.
    pub timestamp: f64,
    /// Seconds between request start and the record.
    pub response_time: f64,
    pub input_length: usize,
    pub output_length: usize,
    pub cache_hit: bool,
    pub memory_usage: f64,
    pub cpu_usage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    /// Records in the whole retained history.
    pub total_requests: usize,
    /// Cache hits within the window.
    pub cache_hits: usize,
    pub avg_response_time: f64,
    pub cache_hit_rate: f64,
    pub avg_memory_usage: f64,
    pub avg_cpu_usage: f64,
    /// Backend failures since startup. These never enter the history.
    pub failed_requests: u64,
    pub latest_request: RequestRecord,
}

/// Result of [`MetricsCollector::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Stats {
    Empty { message: &'static str },
    Aggregate(AggregateStats),
}

impl Stats {
    fn empty() -> Self {
        Stats::Empty {
            message: "No requests recorded",
        }
    }
}

/// Bounded, insertion-ordered history of request outcomes.
pub struct MetricsCollector {
    history: Mutex<VecDeque<RequestRecord>>,
    capacity: usize,
    window: usize,
    failures: AtomicU64,
    sampler: Arc<dyn ResourceSampler>,
}

impl MetricsCollector {
    pub fn new(sampler: Arc<dyn ResourceSampler>) -> Self {
        Self::with_limits(sampler, DEFAULT_HISTORY, DEFAULT_WINDOW)
    }

    /// `capacity` and `window` are clamped to at least 1.
    pub fn with_limits(sampler: Arc<dyn ResourceSampler>, capacity: usize, window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            window: window.max(1),
            failures: AtomicU64::new(0),
            sampler,
        }
    }

    /// Append the outcome of a request that started at `start`.
    pub fn record(&self, start: Instant, input_text: &str, output_text: &str, cache_hit: bool) {
        let response_time = start.elapsed().as_secs_f64();
        let usage = self.sampler.sample();
        let record = RequestRecord {
            timestamp: unix_seconds(),
            response_time,
            input_length: input_text.chars().count(),
            output_length: output_text.chars().count(),
            cache_hit,
            memory_usage: usage.memory_percent,
            cpu_usage: usage.cpu_percent,
        };

        let mut history = self.lock();
        history.push_back(record);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<RequestRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> Stats {
        let history = self.lock();
        let Some(latest) = history.back() else {
            return Stats::empty();
        };

        let window = history.len().min(self.window);
        let recent = history.range(history.len() - window..);
        let n = window as f64;

        let mut cache_hits = 0;
        let (mut response_time, mut memory, mut cpu) = (0.0, 0.0, 0.0);
        for record in recent {
            if record.cache_hit {
                cache_hits += 1;
            }
            response_time += record.response_time;
            memory += record.memory_usage;
            cpu += record.cpu_usage;
        }

        Stats::Aggregate(AggregateStats {
            total_requests: history.len(),
            cache_hits,
            avg_response_time: response_time / n,
            cache_hit_rate: cache_hits as f64 / n,
            avg_memory_usage: memory / n,
            avg_cpu_usage: cpu / n,
            failed_requests: self.failures(),
            latest_request: latest.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RequestRecord>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
