//! Worker runtime: one shared-port listener, one registry, one session set.
//!
//! Each worker process runs exactly one `WorkerRuntime` on a single-threaded
//! tokio runtime. All sessions and scrapes of that worker interleave on that
//! thread; workers never talk to each other.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use wsfleet_core::error::Result;

use crate::app_state::AppState;
use crate::config::FleetConfig;
use crate::router;
use crate::transport::listener;

pub struct WorkerRuntime {
    state: AppState,
}

impl WorkerRuntime {
    pub fn new(cfg: FleetConfig) -> Result<Self> {
        Ok(Self::from_state(AppState::new(cfg)?))
    }

    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        router::build_router(self.state.clone())
    }

    /// Bind the configured address with `SO_REUSEPORT`.
    pub async fn bind(&self) -> Result<TcpListener> {
        listener::bind_shared(&self.state.cfg().gateway.listen_addr()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pid = self.state.pid();
        let local = listener.local_addr()?;
        tracing::info!(pid, addr = %local, "worker listening on http://{local}");

        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!(pid, open_sessions = self.state.sessions().len(), "worker stopped");
        Ok(())
    }

    /// Bind `gateway.host:port` and serve.
    pub async fn start<F>(self, port: u16, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{port}", self.state.cfg().gateway.host);
        let listener = listener::bind_shared(&addr).await?;
        self.serve(listener, shutdown).await
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
