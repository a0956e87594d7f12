//! Worker process plumbing: how to start one and how to read its exit.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use wsfleet_core::error::{FleetError, Result};

/// Set by the supervisor on every worker it spawns; holds the slot index.
pub const WORKER_SLOT_ENV: &str = "WSFLEET_WORKER_SLOT";

/// Slot index when this process was spawned as a worker.
pub fn worker_slot_from_env() -> Option<usize> {
    std::env::var(WORKER_SLOT_ENV).ok()?.trim().parse().ok()
}

/// Program, arguments and extra environment used to spawn a worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Re-execute the running binary with its own arguments.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        Ok(Self::new(exe).args(std::env::args_os().skip(1)))
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub(crate) fn spawn(&self, slot: usize) -> Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_SLOT_ENV, slot.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FleetError::Spawn(format!("{}: {e}", self.program.display())))
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitReason {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReason {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitReason {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Ask a worker to stop (SIGTERM).
#[cfg(unix)]
pub(crate) fn terminate(pid: u32) {
    send_signal(pid, nix::sys::signal::Signal::SIGTERM);
}

/// Stop a worker that ignored SIGTERM.
#[cfg(unix)]
pub(crate) fn kill(pid: u32) {
    send_signal(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(unix)]
fn send_signal(pid: u32, sig: nix::sys::signal::Signal) {
    let Ok(raw) = i32::try_from(pid) else { return };
    if let Err(e) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), sig) {
        tracing::debug!(pid, signal = sig.as_str(), error = %e, "signal delivery failed");
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate(pid: u32) {
    tracing::warn!(pid, "graceful worker stop is only supported on unix");
}

#[cfg(not(unix))]
pub(crate) fn kill(pid: u32) {
    tracing::warn!(pid, "worker kill is only supported on unix");
}
