//! Shared error type across wsFleet crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed frame.
    BadRequest,
    /// Event name not understood by this endpoint.
    UnknownEvent,
    /// Frame arrived after the session was closed.
    SessionClosed,
    /// The unit-of-work hook failed.
    HandlerFailed,
    /// Unsupported protocol or config version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON `error` frames.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::UnknownEvent => "UNKNOWN_EVENT",
            ClientCode::SessionClosed => "SESSION_CLOSED",
            ClientCode::HandlerFailed => "HANDLER_FAILED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("session {0} is closed")]
    SessionClosed(String),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("invalid config: {0}")]
    Config(String),
    #[error("metrics: {0}")]
    Metrics(#[from] MetricError),
    #[error("exposition parse error at line {line}: {msg}")]
    Exposition { line: usize, msg: String },
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    #[error("crash loop: {restarts} restarts within {window_secs}s")]
    CrashLoop { restarts: usize, window_secs: u64 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl FleetError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            FleetError::BadRequest(_) | FleetError::Exposition { .. } => ClientCode::BadRequest,
            FleetError::UnknownEvent(_) => ClientCode::UnknownEvent,
            FleetError::SessionClosed(_) => ClientCode::SessionClosed,
            FleetError::Handler(_) => ClientCode::HandlerFailed,
            FleetError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            FleetError::Config(_)
            | FleetError::Metrics(_)
            | FleetError::Spawn(_)
            | FleetError::CrashLoop { .. }
            | FleetError::Io(_)
            | FleetError::Internal(_) => ClientCode::Internal,
        }
    }
}

/// Metrics registry misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricError {
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),
    #[error("metric already declared: {0}")]
    Duplicate(String),
    #[error("invalid histogram buckets for {0}: must be non-empty, finite and strictly increasing")]
    InvalidBuckets(String),
    #[error("{name} is a {actual}, cannot {op}")]
    KindMismatch {
        name: String,
        actual: &'static str,
        op: &'static str,
    },
    #[error("{name}: amount {amount} is out of range for a gauge")]
    AmountOutOfRange { name: String, amount: u64 },
}
