//! Executes one dequeued step end to end.
//!
//! Dispatch → classify → extract → persist → emit → expand. Exactly one
//! terminal transition per step, no retries. Connector and persistence
//! failures are fatal to the step, never to the pipeline.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use intelflow_common::{
    DomainTag, IntelflowError, PipelineConfig, SearchResult, Step,
};
use intelflow_connectors::ConnectorRegistry;

use crate::events::EventSink;
use crate::pipeline::dedup::{is_self_cycle, DedupSet};
use crate::pipeline::extractor::extract_keywords;
use crate::pipeline::queue::WorkQueue;
use crate::pipeline::stats::{RunLedger, StepOutcome};
use crate::store::PipelineStore;

pub struct StepExecutor {
    registry: Arc<ConnectorRegistry>,
    store: Arc<dyn PipelineStore>,
    queue: Arc<WorkQueue>,
    dedup: Arc<DedupSet>,
    ledger: Arc<RunLedger>,
    sink: Option<Arc<dyn EventSink>>,
    config: PipelineConfig,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        store: Arc<dyn PipelineStore>,
        queue: Arc<WorkQueue>,
        dedup: Arc<DedupSet>,
        ledger: Arc<RunLedger>,
        sink: Option<Arc<dyn EventSink>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            dedup,
            ledger,
            sink,
            config,
        }
    }

    /// Run one step to a terminal state. Never fails the pipeline: every
    /// outcome, including persistence trouble, lands in the ledger.
    pub async fn execute(&self, mut step: Step) {
        // Dispatch
        let connector = match self.registry.get(step.domain_tag) {
            Ok(c) => c.clone(),
            Err(e) => {
                // Seeding and expansion only target registered domains, so
                // this indicates a registry rebuilt mid-run. Terminal-fail
                // the step and move on.
                error!(tag = %step.domain_tag, error = %e, "No connector for dequeued step");
                step.success = false;
                step.error_text = e.to_string();
                step.completed_at = Some(Utc::now());
                let _ = self.store.update_step_terminal(&step).await;
                let result = SearchResult::failure(&step, step.error_text.clone());
                self.emit(&step, &result).await;
                self.record(&step, 0, 0, 0);
                return;
            }
        };

        let search_outcome = connector.search(&step.search_parameter).await;
        step.completed_at = Some(Utc::now());

        // Classify + extract
        let result = match search_outcome {
            Ok(records) => {
                step.success = true;
                let keywords = extract_keywords(connector.as_ref(), &records);
                SearchResult::success(&step, keywords, records)
            }
            Err(e) => {
                step.success = false;
                step.error_text = e.to_string();
                warn!(
                    tag = %step.domain_tag,
                    parameter = step.search_parameter.as_str(),
                    error = %e,
                    "Connector search failed"
                );
                SearchResult::failure(&step, step.error_text.clone())
            }
        };

        // Persist: terminal step, then result, then payload rows. Order is
        // the referential-integrity contract; any failure fails the step
        // and drops its children.
        if let Err(e) = self.persist(&step, &result, connector.payload_kind()).await {
            error!(
                step_id = %step.id,
                tag = %step.domain_tag,
                error = %e,
                "Step persistence failed"
            );
            step.success = false;
            step.error_text = format!("persistence failed: {e}");
            // Best effort: leave a terminal trace if the store recovers.
            let _ = self.store.update_step_terminal(&step).await;
            self.emit(&step, &result).await;
            self.record(&step, result.keywords_per_category.keyword_count() as u32, 0, 0);
            return;
        }

        // Emit
        self.emit(&step, &result).await;

        // Expand
        let (children, duplicates) = if step.success && step.depth < self.config.max_depth {
            self.expand(&step, &result).await
        } else {
            (0, 0)
        };

        self.record(
            &step,
            result.keywords_per_category.keyword_count() as u32,
            children,
            duplicates,
        );
    }

    async fn persist(
        &self,
        step: &Step,
        result: &SearchResult,
        payload_kind: DomainTag,
    ) -> Result<(), IntelflowError> {
        self.store.update_step_terminal(step).await?;
        self.store.create_search_result(result).await?;
        if !result.records.is_empty() {
            self.store
                .create_payload_rows(payload_kind, result.id, &result.records)
                .await?;
        }
        Ok(())
    }

    async fn emit(&self, step: &Step, result: &SearchResult) {
        if let Some(sink) = &self.sink {
            sink.on_step_completed(step, result).await;
        }
    }

    /// Route extracted keywords to admissible connectors and enqueue the
    /// children. Categories iterate in declaration order, keywords in
    /// first-observed order, candidate domains in declaration order.
    async fn expand(&self, parent: &Step, result: &SearchResult) -> (u32, u32) {
        let mut children = 0u32;
        let mut duplicates = 0u32;

        for (category, keywords) in result.keywords_per_category.iter() {
            for keyword in keywords {
                for tag in self.registry.searchable_on(category) {
                    if !self.config.allows_domain(tag) {
                        continue;
                    }
                    if is_self_cycle(parent, tag, keyword) {
                        continue;
                    }
                    if !self.dedup.admit(tag, keyword) {
                        duplicates += 1;
                        continue;
                    }

                    let child = Step::derived(
                        parent.pipeline_id,
                        tag,
                        category,
                        keyword,
                        parent.depth + 1,
                    );
                    // Child rows persist strictly after the parent's
                    // search result; a failed insert drops the child.
                    if let Err(e) = self.store.create_step(&child).await {
                        warn!(tag = %tag, keyword, error = %e, "Failed to persist derived step, dropping");
                        continue;
                    }
                    self.queue.push(child);
                    children += 1;
                }
            }
        }

        (children, duplicates)
    }

    fn record(&self, step: &Step, keywords: u32, children: u32, duplicates: u32) {
        self.ledger.record(StepOutcome {
            domain_tag: step.domain_tag,
            depth: step.depth,
            success: step.success,
            keywords_extracted: keywords,
            children_enqueued: children,
            duplicates_skipped: duplicates,
        });
    }
}
