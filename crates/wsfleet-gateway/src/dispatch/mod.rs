//! Unit-of-work hook for inbound messages.
//!
//! Sessions resolve a [`MessageHandler`] by event name and time how long it
//! takes; what the handler does is up to the deployment.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, MessageCtx, MessageHandler};
