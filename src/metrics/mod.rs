//! Request metrics: the bounded history behind `/metrics`, host sampling,
//! and the Prometheus counters behind `/metrics/prometheus`.

mod collector;
mod sampler;
mod telemetry;

pub use collector::{
    AggregateStats, DEFAULT_HISTORY, DEFAULT_WINDOW, MetricsCollector, RequestRecord, Stats,
};
pub use sampler::{FixedSampler, ProcSampler, ResourceSampler, ResourceUsage};
pub use telemetry::Telemetry;
