//! Wire contracts shared by the gateway and clients.
//!
//! - `event`: JSON frames exchanged on the real-time channel.
//!
//! Parsers are panic-free: malformed input surfaces as `FleetError` so one
//! hostile client cannot take down the worker.

pub mod event;
