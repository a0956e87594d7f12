//! Axum router wiring.
//!
//! - `/ws`      : real-time channel (WebSocket upgrade)
//! - `/metrics` : scrape endpoint
//! - `/healthz` : liveness

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub const WS_PATH: &str = "/ws";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(WS_PATH, get(transport::ws::ws_upgrade))
        .route("/metrics", get(ops::metrics))
        .route("/healthz", get(ops::healthz))
        .with_state(state)
}
