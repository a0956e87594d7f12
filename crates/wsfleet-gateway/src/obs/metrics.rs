//! Process-local metrics registry.
//!
//! Counter/gauge/histogram families are declared once and updated through
//! cheap cloneable handles backed by atomics. A registry belongs to exactly one
//! worker process and knows nothing about its siblings; see
//! `wsfleet_core::exposition` for how collectors combine worker scrapes.
//!
//! Histograms keep one non-cumulative atomic slot per bucket (plus an overflow
//! slot) and derive cumulative counts, `+Inf` and `_count` from a single pass
//! over those slots, so a rendered histogram is always self-consistent.

use std::fmt::{self, Write};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use wsfleet_core::error::MetricError;

/// Metric kind as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let start = |c: char| c.is_ascii_alphabetic() || c == '_' || c == ':';
    chars.next().is_some_and(start) && chars.all(|c| start(c) || c.is_ascii_digit())
}

/// Monotonic counter handle.
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Increment by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Signed gauge handle.
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn dec(&self) {
        self.add(-1);
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Value sampled outside the registry and stored whole, e.g. process CPU
/// time. Renders with the kind it was declared as.
#[derive(Clone, Default)]
pub struct Sampled {
    bits: Arc<AtomicU64>,
}

impl Sampled {
    pub fn set(&self, v: f64) {
        self.bits.store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

struct AtomicHistogram {
    bounds: Box<[f64]>,
    // one slot per bound, plus the overflow slot for values above the last bound
    slots: Box<[AtomicU64]>,
    sum_bits: AtomicU64,
}

/// Point-in-time histogram state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper bound, cumulative count)` for each declared bound.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

/// Histogram handle (fixed buckets, seconds).
#[derive(Clone)]
pub struct Histogram {
    name: Arc<str>,
    inner: Arc<AtomicHistogram>,
}

impl Histogram {
    fn new(name: &str, bounds: &[f64]) -> Self {
        let slots = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            name: Arc::from(name),
            inner: Arc::new(AtomicHistogram {
                bounds: bounds.into(),
                slots,
                sum_bits: AtomicU64::new(0f64.to_bits()),
            }),
        }
    }

    /// Record one observation. Negative or non-finite values are dropped.
    pub fn observe(&self, v: f64) {
        if !v.is_finite() || v < 0.0 {
            tracing::warn!(metric = %self.name, value = v, "dropping invalid histogram observation");
            return;
        }

        let h = &self.inner;
        let idx = h.bounds.partition_point(|b| *b < v);
        h.slots[idx].fetch_add(1, Ordering::Relaxed);

        let _ = h
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + v).to_bits())
            });
    }

    pub fn observe_duration(&self, d: Duration) {
        self.observe(d.as_secs_f64());
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let h = &self.inner;
        let mut cumulative = 0u64;
        let mut buckets = Vec::with_capacity(h.bounds.len());
        for (bound, slot) in h.bounds.iter().zip(h.slots.iter()) {
            cumulative += slot.load(Ordering::Relaxed);
            buckets.push((*bound, cumulative));
        }
        let overflow = h.slots.last().map_or(0, |s| s.load(Ordering::Relaxed));

        HistogramSnapshot {
            buckets,
            count: cumulative + overflow,
            sum: f64::from_bits(h.sum_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Handle returned by [`Registry::declare`]; operations check the kind at runtime.
#[derive(Clone)]
pub enum MetricHandle {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
    /// Counter or gauge whose value is set from a sample.
    Sampled(MetricKind, Sampled),
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Histogram(_) => MetricKind::Histogram,
            MetricHandle::Sampled(kind, _) => *kind,
        }
    }

    fn mismatch(&self, name: &str, op: &'static str) -> MetricError {
        let actual = match self {
            MetricHandle::Sampled(..) => "sampled value",
            other => other.kind().as_str(),
        };
        MetricError::KindMismatch {
            name: name.to_string(),
            actual,
            op,
        }
    }

    /// Gauge deltas must fit in `i64`; `decrement` negates, so `i64::MIN` never appears.
    fn gauge_delta(name: &str, amount: u64) -> Result<i64, MetricError> {
        i64::try_from(amount).map_err(|_| MetricError::AmountOutOfRange {
            name: name.to_string(),
            amount,
        })
    }

    /// Counters and gauges.
    pub fn increment(&self, name: &str, amount: u64) -> Result<(), MetricError> {
        match self {
            MetricHandle::Counter(c) => c.add(amount),
            MetricHandle::Gauge(g) => g.add(Self::gauge_delta(name, amount)?),
            MetricHandle::Histogram(_) | MetricHandle::Sampled(..) => {
                return Err(self.mismatch(name, "increment"))
            }
        }
        Ok(())
    }

    /// Gauges only.
    pub fn decrement(&self, name: &str, amount: u64) -> Result<(), MetricError> {
        match self {
            MetricHandle::Gauge(g) => {
                g.add(-Self::gauge_delta(name, amount)?);
                Ok(())
            }
            _ => Err(self.mismatch(name, "decrement")),
        }
    }

    /// Histograms only.
    pub fn observe(&self, name: &str, value: f64) -> Result<(), MetricError> {
        match self {
            MetricHandle::Histogram(h) => {
                h.observe(value);
                Ok(())
            }
            _ => Err(self.mismatch(name, "observe")),
        }
    }
}

struct Family {
    name: String,
    help: String,
    handle: MetricHandle,
}

/// Process-local registry: declaration order is render order.
#[derive(Default)]
pub struct Registry {
    namespace: Option<String>,
    const_labels: Vec<(String, String)>,
    families: RwLock<Vec<Family>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every declared name with `<namespace>_`. Empty means no prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let ns = namespace.into();
        self.namespace = (!ns.is_empty()).then_some(ns);
        self
    }

    /// Attach a label to every rendered sample (e.g. `worker_pid`).
    pub fn with_const_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.const_labels.push((key.into(), value.into()));
        self
    }

    fn full_name(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}_{name}"),
            None => name.to_string(),
        }
    }

    /// Declare a metric and get its handle.
    ///
    /// `buckets` is required for histograms and ignored otherwise.
    pub fn declare(
        &self,
        name: &str,
        kind: MetricKind,
        help: &str,
        buckets: Option<&[f64]>,
    ) -> Result<MetricHandle, MetricError> {
        let full = self.full_name(name);
        if !valid_name(&full) {
            return Err(MetricError::InvalidName(full));
        }

        let handle = match kind {
            MetricKind::Counter => MetricHandle::Counter(Counter::default()),
            MetricKind::Gauge => MetricHandle::Gauge(Gauge::default()),
            MetricKind::Histogram => {
                let b = buckets.unwrap_or_default();
                let increasing = b.windows(2).all(|w| w[0] < w[1]);
                if b.is_empty() || !increasing || b.iter().any(|v| !v.is_finite()) {
                    return Err(MetricError::InvalidBuckets(full));
                }
                MetricHandle::Histogram(Histogram::new(&full, b))
            }
        };

        self.push_family(full, help, handle)
    }

    /// Declare a counter or gauge whose value is set whole from a sample.
    pub fn sampled(&self, name: &str, kind: MetricKind, help: &str) -> Result<Sampled, MetricError> {
        let full = self.full_name(name);
        if !valid_name(&full) {
            return Err(MetricError::InvalidName(full));
        }
        if kind == MetricKind::Histogram {
            return Err(MetricError::KindMismatch {
                name: full,
                actual: "histogram",
                op: "declare sampled",
            });
        }
        let sampled = Sampled::default();
        self.push_family(full, help, MetricHandle::Sampled(kind, sampled.clone()))?;
        Ok(sampled)
    }

    fn push_family(&self, full: String, help: &str, handle: MetricHandle) -> Result<MetricHandle, MetricError> {
        let mut families = self.families.write();
        if families.iter().any(|f| f.name == full) {
            return Err(MetricError::Duplicate(full));
        }
        families.push(Family {
            name: full,
            help: help.to_string(),
            handle: handle.clone(),
        });
        Ok(handle)
    }

    pub fn counter(&self, name: &str, help: &str) -> Result<Counter, MetricError> {
        match self.declare(name, MetricKind::Counter, help, None)? {
            MetricHandle::Counter(c) => Ok(c),
            other => Err(other.mismatch(name, "declare counter")),
        }
    }

    pub fn gauge(&self, name: &str, help: &str) -> Result<Gauge, MetricError> {
        match self.declare(name, MetricKind::Gauge, help, None)? {
            MetricHandle::Gauge(g) => Ok(g),
            other => Err(other.mismatch(name, "declare gauge")),
        }
    }

    pub fn histogram(&self, name: &str, help: &str, buckets: &[f64]) -> Result<Histogram, MetricError> {
        match self.declare(name, MetricKind::Histogram, help, Some(buckets))? {
            MetricHandle::Histogram(h) => Ok(h),
            other => Err(other.mismatch(name, "declare histogram")),
        }
    }

    /// Look up a declared handle by its rendered name.
    pub fn handle(&self, name: &str) -> Option<MetricHandle> {
        self.families
            .read()
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.handle.clone())
    }

    /// `increment(handle, amount)` by rendered name.
    pub fn increment(&self, name: &str, amount: u64) -> Result<(), MetricError> {
        self.lookup(name)?.increment(name, amount)
    }

    pub fn decrement(&self, name: &str, amount: u64) -> Result<(), MetricError> {
        self.lookup(name)?.decrement(name, amount)
    }

    pub fn observe(&self, name: &str, value: f64) -> Result<(), MetricError> {
        self.lookup(name)?.observe(name, value)
    }

    fn lookup(&self, name: &str) -> Result<MetricHandle, MetricError> {
        self.handle(name)
            .ok_or_else(|| MetricError::InvalidName(name.to_string()))
    }

    fn label_str(&self, extra: Option<(&str, &str)>) -> String {
        let mut parts: Vec<String> = self
            .const_labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect();
        if let Some((k, v)) = extra {
            parts.push(format!("{}=\"{}\"", k, escape_label(v)));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", parts.join(","))
        }
    }

    /// Render in Prometheus text exposition format 0.0.4.
    ///
    /// Total over any registry state: an empty registry renders as an empty
    /// body, declared-but-untouched metrics render their headers and zeros.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let families = self.families.read();
        let labels = self.label_str(None);

        for f in families.iter() {
            let _ = writeln!(out, "# HELP {} {}", f.name, escape_help(&f.help));
            let _ = writeln!(out, "# TYPE {} {}", f.name, f.handle.kind());
            match &f.handle {
                MetricHandle::Counter(c) => {
                    let _ = writeln!(out, "{}{} {}", f.name, labels, c.get());
                }
                MetricHandle::Gauge(g) => {
                    let _ = writeln!(out, "{}{} {}", f.name, labels, g.get());
                }
                MetricHandle::Sampled(_, s) => {
                    let _ = writeln!(out, "{}{} {}", f.name, labels, s.get());
                }
                MetricHandle::Histogram(h) => {
                    let snap = h.snapshot();
                    for (le, count) in &snap.buckets {
                        let le = le.to_string();
                        let bl = self.label_str(Some(("le", &le)));
                        let _ = writeln!(out, "{}_bucket{} {}", f.name, bl, count);
                    }
                    let inf = self.label_str(Some(("le", "+Inf")));
                    let _ = writeln!(out, "{}_bucket{} {}", f.name, inf, snap.count);
                    let _ = writeln!(out, "{}_sum{} {}", f.name, labels, snap.sum);
                    let _ = writeln!(out, "{}_count{} {}", f.name, labels, snap.count);
                }
            }
        }
        out
    }
}
