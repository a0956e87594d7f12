//! Worker-wide realtime state shared by all sessions.

mod session_registry;

pub use session_registry::{SessionEntry, SessionGuard, SessionRegistry};
