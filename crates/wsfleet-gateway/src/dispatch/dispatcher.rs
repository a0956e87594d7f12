use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use wsfleet_core::error::{FleetError, Result};
use wsfleet_core::protocol::event::MessagePayload;

/// Per-message context handed to the unit-of-work hook.
#[derive(Debug, Clone)]
pub struct MessageCtx {
    pub pid: u32,
    pub sid: Arc<str>,
    /// 1-based position of this message within its session.
    pub seq: u64,
}

/// Unit of work run for every inbound event it is registered for.
///
/// The returned value, if any, is sent back in the `ack` frame when the client
/// asked for an acknowledgement.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn event(&self) -> &'static str;
    async fn handle(&self, ctx: MessageCtx, payload: MessagePayload) -> Result<Option<Value>>;
}

/// Event name -> handler table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<&'static str, Arc<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    pub fn register(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.event(), handler);
    }

    pub fn registered_events(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| *e.key()).collect()
    }

    pub fn handler(&self, event: &str) -> Result<Arc<dyn MessageHandler>> {
        self.handlers
            .get(event)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| FleetError::UnknownEvent(event.to_string()))
    }
}
