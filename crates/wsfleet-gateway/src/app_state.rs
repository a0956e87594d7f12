//! Shared state of one worker runtime.
//!
//! One registry, one session set, one dispatcher per worker. Cloning the state
//! clones `Arc`s only.

use std::sync::Arc;
use std::time::Duration;

use wsfleet_core::error::Result;

use crate::config::FleetConfig;
use crate::dispatch::Dispatcher;
use crate::obs::FleetMetrics;
use crate::realtime::{ConnectionSession, SessionId, SessionRegistry};
use crate::services::SimulatedWork;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    metrics: Arc<FleetMetrics>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<Dispatcher>,
}

struct AppStateInner {
    cfg: FleetConfig,
    pid: u32,
}

impl AppState {
    /// State for the current process with the built-in simulated workload.
    pub fn new(cfg: FleetConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new();
        dispatcher.register(Arc::new(SimulatedWork::new(Duration::from_millis(
            cfg.work.max_delay_ms,
        ))));
        Self::with_dispatcher(cfg, std::process::id(), dispatcher)
    }

    /// State with a caller-supplied pid tag and handler table.
    pub fn with_dispatcher(cfg: FleetConfig, pid: u32, dispatcher: Dispatcher) -> Result<Self> {
        cfg.validate()?;
        let metrics = FleetMetrics::new(&cfg.metrics, pid)?;

        tracing::debug!(pid, events = ?dispatcher.registered_events(), "worker state ready");

        Ok(Self {
            inner: Arc::new(AppStateInner { cfg, pid }),
            metrics: Arc::new(metrics),
            sessions: Arc::new(SessionRegistry::new()),
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn cfg(&self) -> &FleetConfig {
        &self.inner.cfg
    }

    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn metrics(&self) -> Arc<FleetMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// New `Connecting` session wired to this worker's registry.
    pub fn new_session(&self) -> ConnectionSession {
        let id: SessionId = self.sessions.next_id();
        ConnectionSession::new(id, self.pid(), self.metrics(), self.dispatcher())
    }
}
