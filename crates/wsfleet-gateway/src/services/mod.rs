//! Built-in message handlers.

mod simulated;

pub use simulated::SimulatedWork;
