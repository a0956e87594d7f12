//! Worker observability: the process-local registry and the fixed metric set.
//!
//! Each worker constructs exactly one [`FleetMetrics`] and passes it by `Arc`
//! to every session. Nothing here is global, so two runtimes in one process
//! (as in tests) keep fully independent counters, just like two workers.

pub mod metrics;
pub mod process;

use wsfleet_core::error::MetricError;

use crate::config::schema::MetricsSection;
pub use metrics::{
    Counter, Gauge, Histogram, HistogramSnapshot, MetricHandle, MetricKind, Registry, Sampled,
};
pub use process::ProcessSampler;

pub const ACTIVE_CONNECTIONS: &str = "active_connections";
pub const TOTAL_CONNECTIONS: &str = "total_connections";
pub const MESSAGES_RECEIVED: &str = "messages_received";
pub const RESPONSE_TIME_SECONDS: &str = "response_time_seconds";
pub const PROCESS_START_TIME_SECONDS: &str = "process_start_time_seconds";
pub const PROCESS_CPU_SECONDS_TOTAL: &str = "process_cpu_seconds_total";
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "process_resident_memory_bytes";

/// Bucket upper bounds for `response_time_seconds`.
pub const RESPONSE_TIME_BUCKETS: [f64; 8] = [0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0];

/// Label carrying the worker pid when `metrics.worker_label` is on.
pub const WORKER_LABEL: &str = "worker_pid";

/// The metrics every worker exports.
pub struct FleetMetrics {
    registry: Registry,
    pub active_connections: Gauge,
    pub total_connections: Counter,
    pub messages_received: Counter,
    pub response_time: Histogram,
    pub process_start_time: Gauge,
    pub process_cpu_seconds: Sampled,
    pub process_resident_memory: Sampled,
    sampler: ProcessSampler,
}

impl FleetMetrics {
    pub fn new(cfg: &MetricsSection, pid: u32) -> Result<Self, MetricError> {
        let mut registry = Registry::new().with_namespace(cfg.namespace.clone());
        if cfg.worker_label {
            registry = registry.with_const_label(WORKER_LABEL, pid.to_string());
        }
        Self::with_registry(registry)
    }

    /// Declare the fixed set on a caller-built registry.
    pub fn with_registry(registry: Registry) -> Result<Self, MetricError> {
        let active_connections =
            registry.gauge(ACTIVE_CONNECTIONS, "Number of active WebSocket connections")?;
        let total_connections =
            registry.counter(TOTAL_CONNECTIONS, "Total WebSocket connections")?;
        let messages_received = registry.counter(MESSAGES_RECEIVED, "Total messages received")?;
        let response_time = registry.histogram(
            RESPONSE_TIME_SECONDS,
            "Time taken to respond to a message",
            &RESPONSE_TIME_BUCKETS,
        )?;
        let process_start_time = registry.gauge(
            PROCESS_START_TIME_SECONDS,
            "Start time of the worker process since unix epoch in seconds",
        )?;
        process_start_time.set(chrono::Utc::now().timestamp());
        let process_cpu_seconds = registry.sampled(
            PROCESS_CPU_SECONDS_TOTAL,
            MetricKind::Counter,
            "Total user and system CPU time spent in seconds",
        )?;
        let process_resident_memory = registry.sampled(
            PROCESS_RESIDENT_MEMORY_BYTES,
            MetricKind::Gauge,
            "Resident memory size in bytes",
        )?;
        let sampler =
            ProcessSampler::new(process_cpu_seconds.clone(), process_resident_memory.clone());

        Ok(Self {
            registry,
            active_connections,
            total_connections,
            messages_received,
            response_time,
            process_start_time,
            process_cpu_seconds,
            process_resident_memory,
            sampler,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Refresh the process samples, then render. Used by the scrape route.
    pub fn scrape(&self) -> String {
        self.sampler.refresh();
        self.registry.render()
    }

    /// Render without touching the process samples.
    pub fn render(&self) -> String {
        self.registry.render()
    }
}
