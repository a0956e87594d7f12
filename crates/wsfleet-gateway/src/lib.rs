//! wsFleet gateway library entry.
//!
//! A supervisor process spawns one worker process per CPU. Every worker
//! binds the same port, accepts WebSocket sessions, counts and times their
//! messages in its own registry, and serves that registry at `/metrics`.
//!
//! Scrapes are worker-local by construction: collectors must scrape every
//! worker and sum, see `wsfleet_core::exposition`.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod runtime;
pub mod services;
pub mod supervisor;
pub mod transport;
