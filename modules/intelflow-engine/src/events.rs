//! Step-level progress events.
//!
//! The sink is invoked exactly once per terminal step, in completion
//! order. The engine never reorders emissions; a total order across steps
//! only exists when `max_concurrent_steps = 1`.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use intelflow_common::{SearchResult, Step};

/// Payload delivered for every terminal step.
#[derive(Debug, Clone, Serialize)]
pub struct StepCompleted {
    pub step: Step,
    pub result: SearchResult,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Called exactly once per terminal step. Implementations must be
    /// non-blocking or tolerate back-pressure.
    async fn on_step_completed(&self, step: &Step, result: &SearchResult);
}

/// Sink backed by an unbounded channel. The receiver observes the stream
/// end when the run finalizes and the engine drops its sender.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StepCompleted>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StepCompleted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_step_completed(&self, step: &Step, result: &SearchResult) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.tx.send(StepCompleted {
            step: step.clone(),
            result: result.clone(),
        });
    }
}
