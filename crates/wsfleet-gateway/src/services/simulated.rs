use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use wsfleet_core::error::Result;
use wsfleet_core::protocol::event::{MessagePayload, EVENT_MESSAGE};

use crate::dispatch::{MessageCtx, MessageHandler};

/// Stand-in workload: waits a uniformly random delay in `[0, max_delay)`.
pub struct SimulatedWork {
    max_delay: Duration,
}

impl SimulatedWork {
    pub fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }

    fn pick_delay(&self) -> Duration {
        let max = self.max_delay.as_micros() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::random_range(0..max))
    }
}

#[async_trait]
impl MessageHandler for SimulatedWork {
    fn event(&self) -> &'static str {
        EVENT_MESSAGE
    }

    async fn handle(&self, ctx: MessageCtx, payload: MessagePayload) -> Result<Option<Value>> {
        tracing::debug!(pid = ctx.pid, sid = %ctx.sid, seq = ctx.seq, bytes = payload.len(), "message received");

        let delay = self.pick_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(None)
    }
}
