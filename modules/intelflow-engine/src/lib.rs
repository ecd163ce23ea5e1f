//! Dynamic search pipeline engine.
//!
//! One seed query fans out across the connector registry; categorized
//! keywords extracted from each result batch are routed to every connector
//! declaring the category searchable, until the depth bound is reached or
//! no admissible work remains. Every step, result, and payload row is
//! persisted through the [`store::PipelineStore`] port, and terminal steps
//! stream to an optional [`events::EventSink`].
//!
//! The engine holds no process-wide state: each run owns its queue, dedup
//! set, and ledger, so independent pipelines can run concurrently in one
//! process.

pub mod events;
pub mod pipeline;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use events::{ChannelSink, EventSink, StepCompleted};
pub use pipeline::orchestrator::{CancelToken, Orchestrator, RunOutcome};
pub use pipeline::stats::PipelineStats;
pub use store::PipelineStore;
