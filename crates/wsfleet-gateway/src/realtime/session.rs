//! Per-connection state machine: `Connecting -> Open -> Closed`.
//!
//! A session attributes its lifecycle and messages to the worker's
//! [`FleetMetrics`]. Every accepted message runs on its own completion task;
//! closing the session stops intake but never cancels those tasks, and
//! [`ConnectionSession::drained`] resolves once the last one has recorded its
//! response time.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use wsfleet_core::error::{FleetError, Result};
use wsfleet_core::protocol::event::{MessagePayload, ServerFrame};

use crate::dispatch::{Dispatcher, MessageCtx};
use crate::obs::FleetMetrics;

/// Session id, unique within one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

pub struct ConnectionSession {
    id: SessionId,
    sid: Arc<str>,
    pid: u32,
    connected_at: DateTime<Utc>,
    opened_at: Option<Instant>,
    state: SessionState,
    message_count: u64,
    metrics: Arc<FleetMetrics>,
    dispatcher: Arc<Dispatcher>,
    replies: Option<mpsc::Sender<String>>,
    pending: TaskTracker,
}

impl ConnectionSession {
    pub fn new(id: SessionId, pid: u32, metrics: Arc<FleetMetrics>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id,
            sid: Arc::from(id.to_string()),
            pid,
            connected_at: Utc::now(),
            opened_at: None,
            state: SessionState::Connecting,
            message_count: 0,
            metrics,
            dispatcher,
            replies: None,
            pending: TaskTracker::new(),
        }
    }

    /// Outbound text frames (acks, handler errors) go to this queue.
    pub fn with_replies(mut self, tx: mpsc::Sender<String>) -> Self {
        self.replies = Some(tx);
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Completions not yet resolved.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// `Connecting -> Open`. No-op in any other state.
    pub fn open(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.state = SessionState::Open;
        self.opened_at = Some(Instant::now());
        self.metrics.total_connections.inc();
        self.metrics.active_connections.inc();
    }

    /// Accept one inbound event.
    ///
    /// Counts it, then runs the registered handler on a completion task that
    /// observes `response_time_seconds` when the handler finishes.
    pub fn on_message(&mut self, event: &str, payload: MessagePayload, ack: Option<u64>) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(FleetError::SessionClosed(self.sid.to_string()));
        }
        let handler = self.dispatcher.handler(event)?;

        let start = Instant::now();
        self.metrics.messages_received.inc();
        self.message_count += 1;

        let ctx = MessageCtx {
            pid: self.pid,
            sid: Arc::clone(&self.sid),
            seq: self.message_count,
        };
        let metrics = Arc::clone(&self.metrics);
        let replies = self.replies.clone();

        self.pending.spawn(async move {
            let sid = Arc::clone(&ctx.sid);
            let pid = ctx.pid;
            let outcome = AssertUnwindSafe(handler.handle(ctx, payload))
                .catch_unwind()
                .await;
            metrics.response_time.observe_duration(start.elapsed());

            let reply = match outcome {
                Ok(Ok(data)) => match ack {
                    Some(ack) => ServerFrame::Ack { ack, data }.to_json().ok(),
                    None => None,
                },
                Ok(Err(e)) => {
                    tracing::warn!(pid, sid = %sid, error = %e, "message handler failed");
                    let code = e.client_code().as_str();
                    let msg = e.to_string();
                    ServerFrame::Error { code, msg: &msg }.to_json().ok()
                }
                Err(_) => {
                    tracing::error!(pid, sid = %sid, "message handler panicked");
                    ServerFrame::Error { code: "INTERNAL", msg: "handler panicked" }
                        .to_json()
                        .ok()
                }
            };

            // the client may be gone already; acks are best-effort
            if let (Some(tx), Some(frame)) = (replies, reply) {
                let _ = tx.try_send(frame);
            }
        });

        Ok(())
    }

    /// Move to `Closed`. Returns false when already closed.
    pub fn close(&mut self) -> bool {
        match self.state {
            SessionState::Closed => return false,
            SessionState::Open => self.metrics.active_connections.dec(),
            SessionState::Connecting => {}
        }
        self.state = SessionState::Closed;
        self.replies = None;
        self.pending.close();
        true
    }

    /// Time spent open so far (zero if never opened).
    pub fn open_for(&self) -> std::time::Duration {
        self.opened_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Resolves after the session is closed and every completion finished.
    pub async fn drained(&self) {
        self.pending.wait().await;
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
