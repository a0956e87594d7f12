//! Top-level facade crate for wsFleet.
//!
//! Re-exports the wire/exposition contracts and the gateway library so users
//! can depend on a single crate.

pub mod core {
    pub use wsfleet_core::*;
}

pub mod gateway {
    pub use wsfleet_gateway::*;
}

pub use wsfleet_core::exposition::FleetView;
pub use wsfleet_gateway::config::FleetConfig;
pub use wsfleet_gateway::runtime::WorkerRuntime;
pub use wsfleet_gateway::supervisor::Supervisor;
