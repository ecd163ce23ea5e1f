//! Owns the lifecycle of one pipeline run.
//!
//! Seeds the queue from the registry's affinity map, drives it with a
//! bounded worker pool, applies the global inter-step delay, honors
//! cancellation as an orderly drain, and finalizes the header exactly
//! once. Re-entrant: every run owns its queue, dedup set, and ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use intelflow_common::{IntelflowError, Pipeline, PipelineConfig, Step};
use intelflow_connectors::ConnectorRegistry;

use crate::events::EventSink;
use crate::pipeline::dedup::DedupSet;
use crate::pipeline::executor::StepExecutor;
use crate::pipeline::queue::WorkQueue;
use crate::pipeline::stats::{PipelineStats, RunLedger};
use crate::store::PipelineStore;

// --- Cancellation ---

/// Cooperative cancellation: the drive loop stops dequeuing, the
/// inter-step delay returns immediately, in-flight steps complete.
#[derive(Default)]
pub struct CancelToken {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// --- Orchestrator ---

pub struct RunOutcome {
    pub pipeline_id: Uuid,
    pub stats: PipelineStats,
}

pub struct Orchestrator {
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn PipelineStore>,
    cancel: Arc<CancelToken>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ConnectorRegistry>, store: Arc<dyn PipelineStore>) -> Self {
        Self {
            registry,
            store,
            cancel: Arc::new(CancelToken::new()),
        }
    }

    /// Share an externally owned cancellation token (deadline handling is
    /// the caller firing it from a timer).
    pub fn with_cancel(mut self, cancel: Arc<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> Arc<CancelToken> {
        self.cancel.clone()
    }

    /// Run to completion without a subscriber.
    pub async fn run(&self, config: PipelineConfig) -> Result<RunOutcome, IntelflowError> {
        self.run_with_id(Uuid::new_v4(), config, None).await
    }

    /// Run to completion, pushing every terminal step to `sink`. The sink
    /// is released when the run finalizes, which closes channel-backed
    /// subscribers.
    pub async fn run_streaming(
        &self,
        config: PipelineConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, IntelflowError> {
        self.run_with_id(Uuid::new_v4(), config, Some(sink)).await
    }

    /// Run under a caller-chosen pipeline id, so HTTP surfaces can hand
    /// the id out before the run finishes.
    pub async fn run_with_id(
        &self,
        pipeline_id: Uuid,
        config: PipelineConfig,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Result<RunOutcome, IntelflowError> {
        // Configuration errors surface before any state is created.
        config.validate()?;
        for tag in &config.available_domains {
            self.registry.get(*tag)?;
        }

        // Header first, so streaming subscribers can resolve the id.
        let pipeline = Pipeline::with_id(pipeline_id, config.clone());
        self.store.create_pipeline(&pipeline).await?;
        info!(pipeline_id = %pipeline.id, query = config.query.as_str(), "Pipeline run starting");

        let queue = Arc::new(WorkQueue::new());
        let dedup = Arc::new(DedupSet::new(config.skip_duplicates));
        let ledger = Arc::new(RunLedger::new());
        let executor = Arc::new(StepExecutor::new(
            self.registry.clone(),
            self.store.clone(),
            queue.clone(),
            dedup.clone(),
            ledger.clone(),
            sink,
            config.clone(),
        ));

        self.seed(&pipeline, &config, &queue, &dedup).await;
        self.drive(&config, &queue, executor).await;

        // Finalize: one counter model, computed from the ledger.
        let stats = ledger.finalize();
        self.store
            .update_pipeline_counters(
                pipeline.id,
                stats.steps_executed,
                stats.steps_succeeded,
                stats.steps_failed,
                stats.max_depth_reached,
            )
            .await?;

        if self.cancel.is_cancelled() {
            info!(pipeline_id = %pipeline.id, "Pipeline run cancelled, header finalized with observed counters");
        }
        info!("{stats}");

        Ok(RunOutcome {
            pipeline_id: pipeline.id,
            stats,
        })
    }

    /// Enqueue one depth-0 step per seed-affinity entry, in `DomainTag`
    /// declaration order, restricted to the configured domains.
    async fn seed(
        &self,
        pipeline: &Pipeline,
        config: &PipelineConfig,
        queue: &Arc<WorkQueue>,
        dedup: &Arc<DedupSet>,
    ) {
        for (tag, category) in self.registry.seed_affinity() {
            if !config.allows_domain(tag) {
                continue;
            }
            let step = Step::seed(pipeline.id, tag, category, &config.query);
            // Register the seed pair so derived work cannot re-schedule it.
            dedup.admit(tag, &config.query);
            if let Err(e) = self.store.create_step(&step).await {
                warn!(tag = %tag, error = %e, "Failed to persist seed step, skipping");
                continue;
            }
            queue.push(step);
        }
    }

    /// Pop-and-dispatch until the queue is empty and all workers are
    /// idle, or cancellation fires. At most `max_concurrent_steps` steps
    /// run at once; the inter-step delay applies globally between any two
    /// dispatches.
    async fn drive(
        &self,
        config: &PipelineConfig,
        queue: &Arc<WorkQueue>,
        executor: Arc<StepExecutor>,
    ) {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_steps));
        let delay = Duration::from_secs(config.delay_between_steps_seconds);
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut dispatched_any = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let Some(step) = queue.pop() else {
                // Transiently empty: a worker may still enqueue children.
                // Empty with all workers idle is the termination condition.
                match workers.join_next().await {
                    Some(_) => continue,
                    None => break,
                }
            };

            if dispatched_any && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }
            dispatched_any = true;

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("step semaphore closed");
            if self.cancel.is_cancelled() {
                break;
            }

            let executor = executor.clone();
            workers.spawn(async move {
                let _permit = permit;
                executor.execute(step).await;
            });
        }

        // Cancellation or drain: in-flight steps complete, queued steps
        // are discarded.
        while workers.join_next().await.is_some() {}
    }
}
