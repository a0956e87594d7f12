//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS
//! - Drive one `ConnectionSession` per socket: open, feed messages, close
//! - Keep per-frame faults local: a bad frame gets an `error` frame back and
//!   the session keeps running
//! - Optional idle timeout (disabled by default)

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use wsfleet_core::error::{FleetError, Result};
use wsfleet_core::protocol::event::{MessagePayload, ServerFrame, EVENT_MESSAGE};

use crate::app_state::AppState;
use crate::realtime::{ConnectionSession, SessionEntry, SessionGuard};
use crate::transport::codec::{decode, Inbound};

fn error_frame(e: &FleetError) -> Option<String> {
    let msg = e.to_string();
    ServerFrame::Error {
        code: e.client_code().as_str(),
        msg: &msg,
    }
    .to_json()
    .ok()
}

/// Why the read loop ended.
#[derive(Debug, Clone, Copy)]
enum CloseReason {
    ClientClose,
    StreamEnded,
    TransportError,
    IdleTimeout,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClose => "client_close",
            CloseReason::StreamEnded => "stream_ended",
            CloseReason::TransportError => "transport_error",
            CloseReason::IdleTimeout => "idle_timeout",
        }
    }
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    ws: WebSocketUpgrade,
) -> Response {
    let remote = remote.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| async move {
        let pid = app.pid();
        if let Err(e) = run_session(app, remote, socket).await {
            tracing::warn!(pid, error = %e, "session ended with error");
        }
    })
}

// --------------------
// Core session loop
// --------------------
async fn run_session(app: AppState, remote: Option<SocketAddr>, socket: WebSocket) -> Result<()> {
    let pid = app.pid();
    let gw = &app.cfg().gateway;

    let (out_tx, mut out_rx) = mpsc::channel::<String>(gw.outbound_queue);
    let mut session = app.new_session().with_replies(out_tx.clone());
    let sid = session.id();

    session.open();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let hello = ServerFrame::Connected {
        sid: &sid.to_string(),
        pid,
    }
    .to_json()?;
    out_tx
        .send(hello)
        .await
        .map_err(|_| FleetError::Internal("outbound channel closed".into()))?;

    let registration = app.sessions().enter(
        sid,
        SessionEntry {
            connected_at: session.connected_at(),
            remote,
        },
    );
    tracing::info!(pid, sid = %sid, remote = ?remote, "client connected");

    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let idle_enabled = !idle_timeout.is_zero();
    let mut last_activity = Instant::now();

    let reason = loop {
        tokio::select! {
            // outbound writer
            maybe_out = out_rx.recv() => {
                let Some(text) = maybe_out else { break CloseReason::StreamEnded; };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break CloseReason::TransportError;
                }
            }

            // inbound reader
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break CloseReason::StreamEnded; };
                let msg = match incoming {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(pid, sid = %sid, error = %e, "transport error");
                        break CloseReason::TransportError;
                    }
                };
                last_activity = Instant::now();

                let outcome = match decode(msg) {
                    Ok(Inbound::Event(frame)) => {
                        session.on_message(&frame.event, MessagePayload::from(frame.data), frame.ack)
                    }
                    Ok(Inbound::Binary(payload)) => {
                        session.on_message(EVENT_MESSAGE, MessagePayload::Binary(payload), None)
                    }
                    Ok(Inbound::Ping(payload)) => {
                        if ws_tx.send(Message::Pong(payload)).await.is_err() {
                            break CloseReason::TransportError;
                        }
                        Ok(())
                    }
                    Ok(Inbound::Pong) => Ok(()),
                    Ok(Inbound::Close) => break CloseReason::ClientClose,
                    Err(e) => Err(e),
                };

                if let Err(e) = outcome {
                    tracing::debug!(pid, sid = %sid, error = %e, "frame rejected");
                    if let Some(frame) = error_frame(&e) {
                        let _ = out_tx.try_send(frame);
                    }
                }
            }

            // idle timeout
            _ = tokio::time::sleep_until(last_activity + idle_timeout), if idle_enabled => {
                if let Some(frame) = error_frame(&FleetError::BadRequest("idle timeout".into())) {
                    let _ = ws_tx.send(Message::Text(frame)).await;
                }
                break CloseReason::IdleTimeout;
            }
        }
    };

    finish_session(&app, &mut session, registration, reason);
    drop(out_rx);
    drop(out_tx);
    let _ = ws_tx.close().await;

    // completions from this session still record their timing
    session.drained().await;
    tracing::debug!(pid, sid = %sid, "session drained");
    Ok(())
}

fn finish_session(
    app: &AppState,
    session: &mut ConnectionSession,
    registration: SessionGuard,
    reason: CloseReason,
) {
    let sid = session.id();
    session.close();
    let remote = registration.leave().and_then(|e| e.remote);
    tracing::info!(
        pid = app.pid(),
        sid = %sid,
        remote = ?remote,
        reason = reason.as_str(),
        messages = session.message_count(),
        pending = session.pending(),
        open_ms = session.open_for().as_millis() as u64,
        "client disconnected"
    );
}
