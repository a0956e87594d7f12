//! Registry semantics and exposition output.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use wsfleet_core::error::MetricError;
use wsfleet_core::exposition::{parse, MetricType};
use wsfleet_gateway::config::MetricsSection;
use wsfleet_gateway::obs::{
    FleetMetrics, MetricKind, Registry, RESPONSE_TIME_BUCKETS, RESPONSE_TIME_SECONDS,
};

#[test]
fn empty_registry_renders_empty_valid_body() {
    let reg = Registry::new();
    let body = reg.render();
    assert!(body.is_empty());
    assert!(parse(&body).unwrap().families.is_empty());
}

#[test]
fn single_metric_registry_parses() {
    let reg = Registry::new();
    let c = reg.counter("hits", "Hits so far").unwrap();
    c.add(3);

    let body = reg.render();
    assert_eq!(body, "# HELP hits Hits so far\n# TYPE hits counter\nhits 3\n");

    let exp = parse(&body).unwrap();
    let f = exp.family("hits").unwrap();
    assert_eq!(f.kind, MetricType::Counter);
    assert_eq!(f.samples[0].value, 3.0);
}

#[test]
fn declared_but_untouched_metrics_render_zeroes() {
    let metrics = FleetMetrics::with_registry(Registry::new()).unwrap();
    let exp = parse(&metrics.render()).unwrap();

    assert_eq!(exp.value("active_connections"), Some(0.0));
    assert_eq!(exp.value("total_connections"), Some(0.0));
    assert_eq!(exp.value("messages_received"), Some(0.0));
    assert_eq!(exp.value("response_time_seconds_count"), Some(0.0));
    assert!(exp.value("process_start_time_seconds").unwrap() > 0.0);
    // process samples stay at zero until a scrape refreshes them
    assert_eq!(exp.value("process_cpu_seconds_total"), Some(0.0));
    assert_eq!(exp.value("process_resident_memory_bytes"), Some(0.0));
}

#[test]
fn scrape_refreshes_process_samples() {
    let metrics = FleetMetrics::with_registry(Registry::new()).unwrap();
    let exp = parse(&metrics.scrape()).unwrap();

    if cfg!(any(target_os = "linux", target_os = "macos")) {
        assert!(exp.value("process_resident_memory_bytes").unwrap() > 0.0);
    }
    let cpu = exp.value("process_cpu_seconds_total").unwrap();
    assert!(cpu >= 0.0);
    assert_eq!(metrics.process_cpu_seconds.get(), cpu);
}

#[test]
fn sampled_values_render_whole_and_reject_increments() {
    let reg = Registry::new();
    let cpu = reg.sampled("cpu_seconds_total", MetricKind::Counter, "cpu").unwrap();
    let mem = reg.sampled("rss_bytes", MetricKind::Gauge, "rss").unwrap();
    assert!(matches!(
        reg.sampled("lat", MetricKind::Histogram, "h"),
        Err(MetricError::KindMismatch { .. })
    ));
    assert!(matches!(
        reg.sampled("rss_bytes", MetricKind::Gauge, "again"),
        Err(MetricError::Duplicate(_))
    ));

    cpu.set(1.25);
    mem.set(4096.0);
    assert!(matches!(
        reg.increment("cpu_seconds_total", 1),
        Err(MetricError::KindMismatch { actual: "sampled value", .. })
    ));
    assert!(reg.decrement("rss_bytes", 1).is_err());

    let body = reg.render();
    assert!(body.contains("# TYPE cpu_seconds_total counter\ncpu_seconds_total 1.25\n"));
    assert!(body.contains("# TYPE rss_bytes gauge\nrss_bytes 4096\n"));
}

#[test]
fn fully_populated_registry_parses_into_triples() {
    let metrics = FleetMetrics::new(&MetricsSection::default(), 4242).unwrap();
    metrics.total_connections.add(3);
    metrics.active_connections.add(2);
    metrics.messages_received.add(5);
    for v in [0.005, 0.2, 0.3, 4.0, 11.0] {
        metrics.response_time.observe(v);
    }

    let body = metrics.render();
    let exp = parse(&body).unwrap();

    let kinds: Vec<(&str, MetricType)> = exp
        .families
        .iter()
        .map(|f| (f.name.as_str(), f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("active_connections", MetricType::Gauge),
            ("total_connections", MetricType::Counter),
            ("messages_received", MetricType::Counter),
            ("response_time_seconds", MetricType::Histogram),
            ("process_start_time_seconds", MetricType::Gauge),
            ("process_cpu_seconds_total", MetricType::Counter),
            ("process_resident_memory_bytes", MetricType::Gauge),
        ]
    );

    for s in exp.samples() {
        assert_eq!(s.label("worker_pid"), Some("4242"), "sample {} lacks pid", s.name);
    }
    assert_eq!(exp.value("active_connections"), Some(2.0));
    assert_eq!(exp.value("total_connections"), Some(3.0));
    assert_eq!(exp.value("messages_received"), Some(5.0));
    assert_eq!(exp.value("response_time_seconds_count"), Some(5.0));

    let hist = exp.family(RESPONSE_TIME_SECONDS).unwrap();
    let buckets: Vec<(String, f64)> = hist
        .samples
        .iter()
        .filter(|s| s.name.ends_with("_bucket"))
        .map(|s| (s.label("le").unwrap().to_string(), s.value))
        .collect();
    assert_eq!(
        buckets,
        vec![
            ("0.01".into(), 1.0),
            ("0.05".into(), 1.0),
            ("0.1".into(), 1.0),
            ("0.5".into(), 3.0),
            ("1".into(), 3.0),
            ("2".into(), 3.0),
            ("5".into(), 4.0),
            ("10".into(), 4.0),
            ("+Inf".into(), 5.0),
        ]
    );
    let sum = exp.value("response_time_seconds_sum").unwrap();
    assert!((sum - 15.505).abs() < 1e-9);
}

/// Per-slot counts (non-cumulative), overflow slot last.
fn slots(snap: &wsfleet_gateway::obs::HistogramSnapshot) -> Vec<u64> {
    let mut out = Vec::new();
    let mut prev = 0;
    for (_, cumulative) in &snap.buckets {
        out.push(cumulative - prev);
        prev = *cumulative;
    }
    out.push(snap.count - prev);
    out
}

#[test]
fn each_observation_lands_in_exactly_one_slot() {
    let reg = Registry::new();
    let h = reg.histogram("lat", "latency", &RESPONSE_TIME_BUCKETS).unwrap();

    // bounds are inclusive; index 8 is the overflow slot
    let cases = [(0.0, 0), (0.01, 0), (0.010001, 1), (0.5, 3), (10.0, 7), (10.5, 8)];
    for (v, expected) in cases {
        let before = slots(&h.snapshot());
        h.observe(v);
        let after = slots(&h.snapshot());

        let deltas: Vec<u64> = after.iter().zip(&before).map(|(a, b)| a - b).collect();
        assert_eq!(deltas.iter().sum::<u64>(), 1, "value {v}");
        assert_eq!(deltas[expected], 1, "value {v}");
    }
}

#[test]
fn negative_and_nan_observations_are_dropped() {
    let reg = Registry::new();
    let h = reg.histogram("lat", "latency", &[1.0]).unwrap();
    h.observe(-0.5);
    h.observe(f64::NAN);
    h.observe(f64::INFINITY);
    assert_eq!(h.snapshot().count, 0);
    h.observe(0.0);
    assert_eq!(h.snapshot().count, 1);
}

#[test]
fn declare_validates_names_and_buckets() {
    let reg = Registry::new();
    assert!(matches!(
        reg.declare("bad name", MetricKind::Counter, "x", None),
        Err(MetricError::InvalidName(_))
    ));
    assert!(matches!(
        reg.declare("h", MetricKind::Histogram, "x", None),
        Err(MetricError::InvalidBuckets(_))
    ));
    assert!(matches!(
        reg.declare("h", MetricKind::Histogram, "x", Some(&[1.0, 0.5])),
        Err(MetricError::InvalidBuckets(_))
    ));
    reg.counter("dup", "x").unwrap();
    assert!(matches!(reg.gauge("dup", "y"), Err(MetricError::Duplicate(_))));
}

#[test]
fn operations_check_metric_kind() {
    let reg = Registry::new();
    reg.counter("c", "counter").unwrap();
    reg.gauge("g", "gauge").unwrap();
    reg.histogram("h", "hist", &[1.0]).unwrap();

    reg.increment("c", 2).unwrap();
    reg.increment("g", 5).unwrap();
    reg.decrement("g", 2).unwrap();
    reg.observe("h", 0.5).unwrap();

    assert!(matches!(reg.decrement("c", 1), Err(MetricError::KindMismatch { .. })));
    assert!(matches!(reg.observe("g", 1.0), Err(MetricError::KindMismatch { .. })));
    assert!(matches!(reg.increment("h", 1), Err(MetricError::KindMismatch { .. })));
    assert!(reg.increment("missing", 1).is_err());

    let exp = parse(&reg.render()).unwrap();
    assert_eq!(exp.value("c"), Some(2.0));
    assert_eq!(exp.value("g"), Some(3.0));
    assert_eq!(exp.value("h_count"), Some(1.0));
}

#[test]
fn gauge_amounts_beyond_i64_are_rejected() {
    let reg = Registry::new();
    reg.gauge("g", "gauge").unwrap();
    reg.counter("c", "counter").unwrap();
    reg.increment("g", 3).unwrap();

    assert!(matches!(
        reg.increment("g", u64::MAX),
        Err(MetricError::AmountOutOfRange { amount: u64::MAX, .. })
    ));
    assert!(matches!(
        reg.decrement("g", 1u64 << 63),
        Err(MetricError::AmountOutOfRange { .. })
    ));
    // largest representable delta still applies
    reg.decrement("g", i64::MAX as u64).unwrap();
    // counters take the full u64 range
    reg.increment("c", u64::MAX).unwrap();

    let exp = parse(&reg.render()).unwrap();
    assert_eq!(exp.value("g"), Some((3 - i64::MAX) as f64));
    assert_eq!(exp.value("c"), Some(u64::MAX as f64));
}

#[test]
fn help_text_with_backslashes_survives_render_and_parse() {
    let reg = Registry::new();
    reg.gauge("paths", "path C:\\new and a\nsecond line").unwrap();

    let body = reg.render();
    assert!(body.contains("# HELP paths path C:\\\\new and a\\nsecond line\n"));

    let exp = parse(&body).unwrap();
    assert_eq!(
        exp.family("paths").unwrap().help.as_deref(),
        Some("path C:\\new and a\nsecond line")
    );
}

#[test]
fn namespace_and_const_labels_apply_to_every_sample() {
    let reg = Registry::new()
        .with_namespace("socket")
        .with_const_label("worker_pid", "7")
        .with_const_label("zone", "a\"b");
    reg.gauge("active_connections", "x").unwrap().inc();
    reg.histogram("rt", "y", &[1.0]).unwrap().observe(0.5);

    let body = reg.render();
    assert!(body.contains("socket_active_connections{worker_pid=\"7\",zone=\"a\\\"b\"} 1\n"));
    assert!(body.contains("socket_rt_bucket{worker_pid=\"7\",zone=\"a\\\"b\",le=\"1\"} 1\n"));

    let exp = parse(&body).unwrap();
    for s in exp.samples() {
        assert_eq!(s.label("zone"), Some("a\"b"));
    }
}

#[test]
fn counters_stay_monotonic_under_concurrent_updates() {
    let reg = Arc::new(Registry::new());
    let c = reg.counter("n", "n").unwrap();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let c = c.clone();
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    c.inc();
                }
            })
        })
        .collect();

    let mut last = 0.0;
    for _ in 0..200 {
        let v = parse(&reg.render()).unwrap().value("n").unwrap();
        assert!(v >= last);
        last = v;
    }
    for w in writers {
        w.join().unwrap();
    }
    assert_eq!(c.get(), 40_000);
}

#[test]
fn histogram_snapshots_stay_consistent_under_concurrent_observes() {
    let reg = Arc::new(Registry::new());
    let h = reg.histogram("rt", "rt", &RESPONSE_TIME_BUCKETS).unwrap();

    let writer = {
        let h = h.clone();
        std::thread::spawn(move || {
            for i in 0..20_000u32 {
                h.observe(f64::from(i % 13));
            }
        })
    };

    for _ in 0..200 {
        let snap = h.snapshot();
        let mut prev = 0;
        for (_, cumulative) in &snap.buckets {
            assert!(*cumulative >= prev);
            prev = *cumulative;
        }
        assert!(snap.count >= prev);
    }
    writer.join().unwrap();
    assert_eq!(h.snapshot().count, 20_000);
}
