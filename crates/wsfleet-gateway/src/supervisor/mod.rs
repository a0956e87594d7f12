//! Process supervisor: one worker per CPU, one replacement per exit.
//!
//! The supervisor owns no sockets and never looks at connection or metrics
//! state. Its only input is OS process exit. Each slot always has exactly one
//! record; a slot's record is replaced only once the replacement has been
//! spawned, so `live_workers()` reports `workers` entries in steady state.
//!
//! Restarts are unconditional and immediate by default. `restart_backoff` and
//! the crash-loop cap (`max_restarts` per `restart_window`) are opt-in and
//! keep the "one exit, one restart" rule.

mod process;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use wsfleet_core::error::{FleetError, Result};

use crate::config::SupervisorSection;
pub use process::{worker_slot_from_env, ExitReason, WorkerCommand, WORKER_SLOT_ENV};

/// Grace period between SIGTERM and SIGKILL on shutdown.
const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Exited(ExitReason),
}

/// One spawned worker process.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    pub slot: usize,
    pub pid: u32,
    pub state: Liveness,
    pub spawned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Spawned { slot: usize, pid: u32 },
    Exited { slot: usize, pid: u32, reason: ExitReason },
}

/// Restart behaviour. The default restarts immediately and without limit.
#[derive(Debug, Clone, Default)]
pub struct RestartPolicy {
    pub backoff: Duration,
    /// `Some((max, window))`: give up after `max` restarts within `window`.
    pub crash_loop: Option<(usize, Duration)>,
}

impl From<&SupervisorSection> for RestartPolicy {
    fn from(cfg: &SupervisorSection) -> Self {
        Self {
            backoff: Duration::from_millis(cfg.restart_backoff_ms),
            crash_loop: cfg
                .max_restarts
                .map(|max| (max, Duration::from_secs(cfg.restart_window_secs))),
        }
    }
}

/// Read-only view of a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    table: Arc<Mutex<BTreeMap<usize, WorkerProcess>>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Current record of every slot, ordered by slot.
    pub fn workers(&self) -> Vec<WorkerProcess> {
        self.table.lock().values().cloned().collect()
    }

    pub fn live_workers(&self) -> Vec<WorkerProcess> {
        self.table
            .lock()
            .values()
            .filter(|w| w.state == Liveness::Running)
            .cloned()
            .collect()
    }
}

type ExitNotice = (usize, u32, ExitReason);

pub struct Supervisor {
    workers: usize,
    policy: RestartPolicy,
    command: WorkerCommand,
    handle: SupervisorHandle,
}

impl Supervisor {
    pub fn new(workers: usize, policy: RestartPolicy, command: WorkerCommand) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            workers: workers.max(1),
            policy,
            command,
            handle: SupervisorHandle {
                table: Arc::new(Mutex::new(BTreeMap::new())),
                events,
            },
        }
    }

    /// Worker count from config, bounded by the CPU count.
    pub fn from_config(cfg: &SupervisorSection, command: WorkerCommand) -> Self {
        let cpus = num_cpus::get();
        Self::new(cfg.worker_count(cpus), RestartPolicy::from(cfg), command)
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Spawn all workers and keep the count until `shutdown` resolves.
    ///
    /// Returns `CrashLoop` when the configured cap is exceeded, or `Spawn`
    /// when a worker cannot be started at all. Workers are stopped in every
    /// case before returning.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ExitNotice>();
        tracing::info!(
            pid = std::process::id(),
            workers = self.workers,
            program = %self.command.program().display(),
            "supervisor starting"
        );

        let mut result = Ok(());
        for slot in 0..self.workers {
            if let Err(e) = self.spawn_slot(slot, &exit_tx) {
                result = Err(e);
                break;
            }
        }
        if result.is_err() {
            self.stop_all(&mut exit_rx).await;
            return result;
        }

        let mut restarts: VecDeque<Instant> = VecDeque::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(pid = std::process::id(), "supervisor shutting down");
                    break;
                }
                Some((slot, pid, reason)) = exit_rx.recv() => {
                    if !self.record_exit(slot, pid, reason) {
                        continue;
                    }
                    tracing::warn!(
                        slot,
                        pid,
                        code = ?reason.code,
                        signal = ?reason.signal,
                        "worker {pid} died, restarting"
                    );

                    if let Some((max, window)) = self.policy.crash_loop {
                        let now = Instant::now();
                        while restarts.front().is_some_and(|t| now.duration_since(*t) > window) {
                            restarts.pop_front();
                        }
                        if restarts.len() >= max {
                            tracing::error!(restarts = restarts.len(), window_secs = window.as_secs(), "crash loop detected, giving up");
                            result = Err(FleetError::CrashLoop {
                                restarts: restarts.len(),
                                window_secs: window.as_secs(),
                            });
                            break;
                        }
                        restarts.push_back(now);
                    }

                    if !self.policy.backoff.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.policy.backoff) => {}
                            _ = &mut shutdown => break,
                        }
                    }

                    if let Err(e) = self.spawn_slot(slot, &exit_tx) {
                        tracing::error!(slot, error = %e, "replacement spawn failed");
                        result = Err(e);
                        break;
                    }
                }
            }
        }

        self.stop_all(&mut exit_rx).await;
        result
    }

    fn spawn_slot(&self, slot: usize, exit_tx: &mpsc::UnboundedSender<ExitNotice>) -> Result<()> {
        let mut child = self.command.spawn(slot)?;
        let pid = child
            .id()
            .ok_or_else(|| FleetError::Spawn("worker exited before reporting a pid".into()))?;

        self.handle.table.lock().insert(
            slot,
            WorkerProcess {
                slot,
                pid,
                state: Liveness::Running,
                spawned_at: Utc::now(),
            },
        );
        let _ = self.handle.events.send(SupervisorEvent::Spawned { slot, pid });
        tracing::info!(slot, pid, "worker spawned");

        let exit_tx = exit_tx.clone();
        tokio::spawn(async move {
            let reason = match child.wait().await {
                Ok(status) => ExitReason::from(status),
                Err(e) => {
                    tracing::error!(slot, pid, error = %e, "waiting on worker failed");
                    ExitReason::default()
                }
            };
            let _ = exit_tx.send((slot, pid, reason));
        });

        Ok(())
    }

    /// Mark the slot's record exited. False when the notice is stale.
    fn record_exit(&self, slot: usize, pid: u32, reason: ExitReason) -> bool {
        let mut table = self.handle.table.lock();
        match table.get_mut(&slot) {
            Some(w) if w.pid == pid && w.state == Liveness::Running => {
                w.state = Liveness::Exited(reason);
            }
            _ => return false,
        }
        drop(table);
        let _ = self
            .handle
            .events
            .send(SupervisorEvent::Exited { slot, pid, reason });
        true
    }

    /// SIGTERM every running worker, wait, SIGKILL stragglers.
    async fn stop_all(&self, exit_rx: &mut mpsc::UnboundedReceiver<ExitNotice>) {
        let mut running: HashSet<u32> = self
            .handle
            .live_workers()
            .into_iter()
            .map(|w| w.pid)
            .collect();
        if running.is_empty() {
            return;
        }

        tracing::info!(workers = running.len(), "stopping workers");
        for pid in &running {
            process::terminate(*pid);
        }

        let deadline = tokio::time::sleep(STOP_GRACE);
        tokio::pin!(deadline);
        let mut killed = false;

        while !running.is_empty() {
            tokio::select! {
                notice = exit_rx.recv() => {
                    let Some((slot, pid, reason)) = notice else { break };
                    running.remove(&pid);
                    self.record_exit(slot, pid, reason);
                    tracing::info!(slot, pid, code = ?reason.code, signal = ?reason.signal, "worker stopped");
                }
                _ = &mut deadline, if !killed => {
                    tracing::warn!(workers = running.len(), "workers ignored SIGTERM, killing");
                    for pid in &running {
                        process::kill(*pid);
                    }
                    killed = true;
                }
            }
        }
    }
}
