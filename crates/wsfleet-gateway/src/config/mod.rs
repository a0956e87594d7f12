//! Fleet config loader (strict parsing + `PORT` override).

pub mod schema;

use std::fs;
use std::path::Path;

use wsfleet_core::error::{FleetError, Result};

pub use schema::{
    FleetConfig, GatewaySection, LogFormat, LogSection, MetricsSection, SupervisorSection,
    WorkSection,
};

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "wsfleet.yaml";

/// Environment variable overriding `gateway.port`.
pub const PORT_ENV: &str = "PORT";

pub fn load_from_file(path: impl AsRef<Path>) -> Result<FleetConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| FleetError::Config(format!("read {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<FleetConfig> {
    let cfg: FleetConfig = serde_yaml::from_str(s)
        .map_err(|e| FleetError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load `wsfleet.yaml` when present (defaults otherwise), then apply `PORT`.
pub fn load() -> Result<FleetConfig> {
    let mut cfg = if Path::new(DEFAULT_CONFIG_FILE).exists() {
        load_from_file(DEFAULT_CONFIG_FILE)?
    } else {
        FleetConfig::default()
    };
    apply_port_override(&mut cfg, std::env::var(PORT_ENV).ok().as_deref())?;
    Ok(cfg)
}

pub fn apply_port_override(cfg: &mut FleetConfig, port: Option<&str>) -> Result<()> {
    let Some(raw) = port else { return Ok(()) };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    cfg.gateway.port = raw
        .parse()
        .map_err(|_| FleetError::Config(format!("{PORT_ENV}={raw:?} is not a valid port")))?;
    Ok(())
}
