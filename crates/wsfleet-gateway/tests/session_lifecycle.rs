//! Connection session state machine against a worker's registry.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};

use wsfleet_core::error::{ClientCode, FleetError, Result};
use wsfleet_core::exposition::{parse, FleetView};
use wsfleet_core::protocol::event::{MessagePayload, EVENT_MESSAGE};
use wsfleet_gateway::app_state::AppState;
use wsfleet_gateway::config::FleetConfig;
use wsfleet_gateway::dispatch::{Dispatcher, MessageCtx, MessageHandler};
use wsfleet_gateway::realtime::{SessionEntry, SessionRegistry, SessionState};
use wsfleet_gateway::services::SimulatedWork;

/// Completes only when the test hands out a permit.
struct Gated(Arc<Semaphore>);

#[async_trait]
impl MessageHandler for Gated {
    fn event(&self) -> &'static str {
        EVENT_MESSAGE
    }

    async fn handle(&self, _ctx: MessageCtx, _payload: MessagePayload) -> Result<Option<Value>> {
        let permit = self.0.acquire().await.map_err(|e| FleetError::Handler(e.to_string()))?;
        permit.forget();
        Ok(None)
    }
}

struct Failing;

#[async_trait]
impl MessageHandler for Failing {
    fn event(&self) -> &'static str {
        EVENT_MESSAGE
    }

    async fn handle(&self, _ctx: MessageCtx, _payload: MessagePayload) -> Result<Option<Value>> {
        Err(FleetError::Handler("downstream unavailable".into()))
    }
}

struct Panicking;

#[async_trait]
impl MessageHandler for Panicking {
    fn event(&self) -> &'static str {
        EVENT_MESSAGE
    }

    async fn handle(&self, _ctx: MessageCtx, _payload: MessagePayload) -> Result<Option<Value>> {
        panic!("handler bug");
    }
}

struct Echo;

#[async_trait]
impl MessageHandler for Echo {
    fn event(&self) -> &'static str {
        EVENT_MESSAGE
    }

    async fn handle(&self, ctx: MessageCtx, payload: MessagePayload) -> Result<Option<Value>> {
        Ok(Some(json!({ "seq": ctx.seq, "bytes": payload.len() })))
    }
}

fn worker(pid: u32, handler: Arc<dyn MessageHandler>) -> AppState {
    let dispatcher = Dispatcher::new();
    dispatcher.register(handler);
    AppState::with_dispatcher(FleetConfig::default(), pid, dispatcher).unwrap()
}

fn quick_worker(pid: u32) -> AppState {
    worker(pid, Arc::new(SimulatedWork::new(Duration::from_millis(5))))
}

fn payload(s: &str) -> MessagePayload {
    MessagePayload::Json(serde_json::value::RawValue::from_string(s.to_string()).unwrap())
}

#[tokio::test]
async fn three_connects_one_disconnect() {
    let app = quick_worker(1);
    let mut sessions: Vec<_> = (0..3).map(|_| app.new_session()).collect();
    for s in &mut sessions {
        assert_eq!(s.state(), SessionState::Connecting);
        s.open();
        assert_eq!(s.state(), SessionState::Open);
    }
    assert!(sessions[1].close());
    assert_eq!(sessions[1].state(), SessionState::Closed);

    let exp = parse(&app.metrics().render()).unwrap();
    assert_eq!(exp.value("active_connections"), Some(2.0));
    assert_eq!(exp.value("total_connections"), Some(3.0));
}

#[tokio::test]
async fn active_gauge_tracks_connects_minus_disconnects() {
    let app = quick_worker(1);
    let metrics = app.metrics();
    let mut open = Vec::new();
    let (mut connects, mut disconnects) = (0i64, 0i64);

    // deterministic interleaving, including redundant closes
    for step in 0..60u32 {
        if step % 3 == 2 && !open.is_empty() {
            let mut s: wsfleet_gateway::realtime::ConnectionSession = open.remove(0);
            assert!(s.close());
            assert!(!s.close());
            disconnects += 1;
        } else {
            let mut s = app.new_session();
            s.open();
            s.open();
            open.push(s);
            connects += 1;
        }
        let active = metrics.active_connections.get();
        assert_eq!(active, connects - disconnects);
        assert!(active >= 0);
        assert_eq!(metrics.total_connections.get() as i64, connects);
    }
}

#[tokio::test]
async fn closing_a_never_opened_session_leaves_gauges_alone() {
    let app = quick_worker(1);
    let mut s = app.new_session();
    assert!(s.close());
    assert_eq!(app.metrics().active_connections.get(), 0);
    assert_eq!(app.metrics().total_connections.get(), 0);
}

#[tokio::test]
async fn dropping_an_open_session_closes_it() {
    let app = quick_worker(1);
    {
        let mut s = app.new_session();
        s.open();
        assert_eq!(app.metrics().active_connections.get(), 1);
    }
    assert_eq!(app.metrics().active_connections.get(), 0);
}

#[tokio::test]
async fn five_messages_then_all_completions_recorded() {
    let app = quick_worker(1);
    let mut s = app.new_session();
    s.open();

    for i in 0..5 {
        s.on_message(EVENT_MESSAGE, payload(&format!("{{\"n\":{i}}}")), None).unwrap();
    }
    assert_eq!(s.message_count(), 5);

    s.close();
    tokio::time::timeout(Duration::from_secs(5), s.drained()).await.unwrap();

    let exp = parse(&app.metrics().render()).unwrap();
    assert_eq!(exp.value("messages_received"), Some(5.0));
    assert_eq!(exp.value("response_time_seconds_count"), Some(5.0));
    assert!(exp.value("response_time_seconds_sum").unwrap() >= 0.0);
}

#[tokio::test]
async fn disconnect_does_not_cancel_pending_completions() {
    let gate = Arc::new(Semaphore::new(0));
    let app = worker(1, Arc::new(Gated(Arc::clone(&gate))));
    let metrics = app.metrics();

    let mut s = app.new_session();
    s.open();
    for _ in 0..3 {
        s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap();
    }
    s.close();

    tokio::task::yield_now().await;
    assert_eq!(s.pending(), 3);
    assert_eq!(metrics.response_time.snapshot().count, 0);
    assert_eq!(metrics.active_connections.get(), 0);

    gate.add_permits(3);
    tokio::time::timeout(Duration::from_secs(5), s.drained()).await.unwrap();
    assert_eq!(s.pending(), 0);
    assert_eq!(metrics.response_time.snapshot().count, 3);
}

#[tokio::test]
async fn closed_session_rejects_new_messages() {
    let app = quick_worker(1);
    let mut s = app.new_session();
    s.open();
    s.close();

    let err = s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap_err();
    assert_eq!(err.client_code(), ClientCode::SessionClosed);
    assert_eq!(app.metrics().messages_received.get(), 0);
}

#[tokio::test]
async fn unknown_events_are_not_counted() {
    let app = quick_worker(1);
    let mut s = app.new_session();
    s.open();

    let err = s.on_message("typing", MessagePayload::Empty, None).unwrap_err();
    assert_eq!(err.client_code(), ClientCode::UnknownEvent);
    assert_eq!(app.metrics().messages_received.get(), 0);
    assert_eq!(s.message_count(), 0);
}

#[tokio::test]
async fn ack_frames_carry_handler_output() {
    let app = worker(1, Arc::new(Echo));
    let (tx, mut rx) = mpsc::channel(8);
    let mut s = app.new_session().with_replies(tx);
    s.open();

    s.on_message(EVENT_MESSAGE, payload("\"hi\""), Some(7)).unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let v: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(v["event"], "ack");
    assert_eq!(v["ack"], 7);
    assert_eq!(v["data"]["seq"], 1);
    assert_eq!(v["data"]["bytes"], 4);

    // no ack id, no frame
    s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap();
    s.close();
    s.drained().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn handler_errors_are_reported_and_still_timed() {
    let app = worker(1, Arc::new(Failing));
    let (tx, mut rx) = mpsc::channel(8);
    let mut s = app.new_session().with_replies(tx);
    s.open();

    s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let v: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(v["event"], "error");
    assert_eq!(v["code"], "HANDLER_FAILED");

    s.close();
    s.drained().await;
    assert_eq!(app.metrics().response_time.snapshot().count, 1);
    assert_eq!(s.state(), SessionState::Closed);
}

#[tokio::test]
async fn handler_panics_stay_inside_the_completion() {
    let app = worker(1, Arc::new(Panicking));
    let (tx, mut rx) = mpsc::channel(8);
    let mut s = app.new_session().with_replies(tx);
    s.open();

    s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(frame.contains("\"INTERNAL\""));

    // the session keeps accepting work
    s.on_message(EVENT_MESSAGE, MessagePayload::Empty, None).unwrap();
    assert_eq!(app.metrics().messages_received.get(), 2);
    s.close();
    s.drained().await;
}

#[tokio::test]
async fn session_ids_are_unique_within_a_worker() {
    let app = quick_worker(1);
    let ids: Vec<_> = (0..100).map(|_| app.new_session().id()).collect();
    let mut dedup = ids.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), ids.len());
}

#[tokio::test]
async fn workers_keep_independent_registries() {
    let a = quick_worker(101);
    let b = quick_worker(202);

    let mut held = Vec::new();
    for app in [&a, &b] {
        for _ in 0..2 {
            let mut s = app.new_session();
            s.open();
            held.push(s);
        }
    }

    let scrape_a = a.metrics().render();
    let scrape_b = b.metrics().render();
    let single_a = parse(&scrape_a).unwrap().value("active_connections").unwrap();
    let single_b = parse(&scrape_b).unwrap().value("active_connections").unwrap();
    assert_eq!(single_a, 2.0);
    assert_eq!(single_b, 2.0);

    let fleet = FleetView::from_scrapes([&scrape_a, &scrape_b]).unwrap();
    assert_eq!(fleet.total("active_connections"), 4.0);
    assert_ne!(single_a, 4.0);
    assert_ne!(single_b, 4.0);
}

fn entry() -> SessionEntry {
    SessionEntry {
        connected_at: chrono::Utc::now(),
        remote: Some("127.0.0.1:9".parse().unwrap()),
    }
}

#[test]
fn registry_guard_removes_entry_when_dropped() {
    let registry = Arc::new(SessionRegistry::new());
    let id = registry.next_id();
    {
        let guard = registry.enter(id, entry());
        assert_eq!(guard.id(), id);
        assert_eq!(registry.len(), 1);
    }
    assert!(registry.is_empty());
}

#[test]
fn registry_guard_removes_entry_on_unwind() {
    let registry = Arc::new(SessionRegistry::new());
    let id = registry.next_id();

    let reg = Arc::clone(&registry);
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _guard = reg.enter(id, entry());
        panic!("session task failed");
    }));
    assert!(outcome.is_err());
    assert!(registry.is_empty());
}

#[test]
fn leaving_returns_the_recorded_entry() {
    let registry = Arc::new(SessionRegistry::new());
    let a = registry.enter(registry.next_id(), entry());
    let _b = registry.enter(registry.next_id(), entry());

    let left = a.leave().unwrap();
    assert_eq!(left.remote, Some("127.0.0.1:9".parse().unwrap()));
    assert_eq!(registry.len(), 1);
}
