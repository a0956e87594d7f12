//! Prometheus text exposition (format 0.0.4), collector side.
//!
//! Every worker process owns an independent registry, so a single scrape only
//! ever describes the worker that happened to answer it. Scrapes taken from
//! different workers are sampled at uncoordinated instants and nothing merges
//! them inside the fleet.
//!
//! The aggregation contract for collectors:
//! - scrape every worker individually (one target per worker, or rely on the
//!   `worker_pid` label the gateway attaches to each sample);
//! - sum counters across targets to get service totals;
//! - sum gauges across targets as well (never average them);
//! - never treat one unlabeled scrape as the service total, it undercounts.
//!
//! [`parse`] turns a scrape body into families and samples, and [`FleetView`]
//! applies the summing rules over a set of per-worker scrapes.

mod aggregate;
mod parse;

pub use aggregate::FleetView;
pub use parse::{parse, Exposition, Family, MetricType, Sample};

/// Content type served by `/metrics`.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
