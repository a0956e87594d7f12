//! wsFleet core: transport-agnostic wire frames, error types, and the
//! collector-side exposition parser.
//!
//! This crate carries no transport or runtime dependencies so it can be used
//! by the gateway, by test harnesses, and by scrape collectors that need to
//! combine per-worker metrics into service totals.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths surface as `FleetError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod exposition;
pub mod protocol;

/// Shared result type.
pub use error::{FleetError, Result};
