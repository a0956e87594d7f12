use serde::Deserialize;
use wsfleet_core::error::{FleetError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    #[serde(default)]
    pub work: WorkSection,

    #[serde(default)]
    pub log: LogSection,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            supervisor: SupervisorSection::default(),
            metrics: MetricsSection::default(),
            work: WorkSection::default(),
            log: LogSection::default(),
        }
    }
}

impl FleetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(FleetError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.supervisor.validate()?;
        self.metrics.validate()?;
        self.work.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 0 disables the idle timeout.
    #[serde(default)]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_ms: 0,
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(FleetError::Config("gateway.host must not be empty".into()));
        }
        if self.idle_timeout_ms != 0 && !(1000..=3_600_000).contains(&self.idle_timeout_ms) {
            return Err(FleetError::Config(
                "gateway.idle_timeout_ms must be 0 (disabled) or between 1000 and 3600000".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(FleetError::Config(
                "gateway.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    4000
}
fn default_outbound_queue() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// Worker count; defaults to the CPU count and is capped by it.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Delay before spawning a replacement. 0 restarts immediately.
    #[serde(default)]
    pub restart_backoff_ms: u64,

    /// Crash-loop cap: give up after this many restarts within the window.
    /// Absent means unbounded.
    #[serde(default)]
    pub max_restarts: Option<usize>,

    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            workers: None,
            restart_backoff_ms: 0,
            max_restarts: None,
            restart_window_secs: default_restart_window_secs(),
        }
    }
}

impl SupervisorSection {
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(FleetError::Config("supervisor.workers must be at least 1".into()));
        }
        if self.max_restarts == Some(0) {
            return Err(FleetError::Config(
                "supervisor.max_restarts must be at least 1 (omit it for unbounded)".into(),
            ));
        }
        if self.restart_backoff_ms > 60_000 {
            return Err(FleetError::Config(
                "supervisor.restart_backoff_ms must be at most 60000".into(),
            ));
        }
        if self.restart_window_secs == 0 {
            return Err(FleetError::Config(
                "supervisor.restart_window_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Requested worker count bounded to `[1, cpus]`.
    pub fn worker_count(&self, cpus: usize) -> usize {
        let cpus = cpus.max(1);
        self.workers.unwrap_or(cpus).clamp(1, cpus)
    }
}

fn default_restart_window_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default)]
    pub namespace: String,

    /// Attach `worker_pid` to every sample.
    #[serde(default = "default_true")]
    pub worker_label: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            worker_label: true,
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        let ns = &self.namespace;
        let ok = ns.is_empty()
            || (ns.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && ns.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !ok {
            return Err(FleetError::Config(format!(
                "metrics.namespace {ns:?} is not a valid metric name prefix"
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkSection {
    /// Upper bound of the simulated per-message delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for WorkSection {
    fn default() -> Self {
        Self {
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl WorkSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_delay_ms > 60_000 {
            return Err(FleetError::Config("work.max_delay_ms must be at most 60000".into()));
        }
        Ok(())
    }
}

fn default_max_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    #[serde(default)]
    pub format: LogFormat,
}
