//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler, the decode-once codec, and the shared-port
//! listener used by every worker.

pub mod codec;
pub mod listener;
pub mod ws;
