//! wsFleet gateway binary.
//!
//! Started without `WSFLEET_WORKER_SLOT` it is the supervisor; the supervisor
//! re-executes this binary with the variable set for every worker.

use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use wsfleet_core::error::Result;
use wsfleet_gateway::config::{self, FleetConfig, LogFormat};
use wsfleet_gateway::runtime::{shutdown_signal, WorkerRuntime};
use wsfleet_gateway::supervisor::{worker_slot_from_env, Supervisor, WorkerCommand};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => fmt().with_env_filter(filter).init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).init(),
    }
}

fn main() -> ExitCode {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("wsfleet: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(cfg.log.format);

    let outcome = match worker_slot_from_env() {
        Some(slot) => run_worker(cfg, slot),
        None => run_supervisor(cfg),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(pid = std::process::id(), error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

fn run_worker(cfg: FleetConfig, slot: usize) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let port = cfg.gateway.port;
        let worker = WorkerRuntime::new(cfg)?;
        tracing::info!(pid = worker.state().pid(), slot, port, "worker starting");
        worker.start(port, shutdown_signal()).await
    })
}

fn run_supervisor(cfg: FleetConfig) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async move {
        let supervisor = Supervisor::from_config(&cfg.supervisor, WorkerCommand::current_exe()?);
        tracing::info!(
            pid = std::process::id(),
            workers = supervisor.worker_count(),
            port = cfg.gateway.port,
            "primary process running"
        );
        supervisor.run(shutdown_signal()).await
    })
}
