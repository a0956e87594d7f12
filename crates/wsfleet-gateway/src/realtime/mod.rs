//! Realtime sessions for one worker.
//!
//! `session` is the per-connection state machine; `core` holds the set of
//! currently open sessions.

pub mod core;
pub mod session;

pub use self::core::{SessionEntry, SessionGuard, SessionRegistry};
pub use session::{ConnectionSession, SessionId, SessionState};
