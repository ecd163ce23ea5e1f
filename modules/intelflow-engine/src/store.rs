//! Persistence port consumed by the engine.
//!
//! Each operation is independently atomic; the engine never composes them
//! into larger transactions. The Postgres implementation lives in
//! `intelflow-store`; tests run against the in-memory store in
//! `crate::testing`.

use async_trait::async_trait;
use uuid::Uuid;

use intelflow_common::{
    DomainRecord, DomainTag, IntelflowError, Pipeline, SearchResult, Step,
};

#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Insert the pipeline header. Called before the first step so that
    /// streaming subscribers can observe progress against a known id.
    async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<(), IntelflowError>;

    /// One-time counter update at finalization.
    async fn update_pipeline_counters(
        &self,
        id: Uuid,
        total_steps: u32,
        successful_steps: u32,
        failed_steps: u32,
        max_depth_reached: u32,
    ) -> Result<(), IntelflowError>;

    /// Insert a pending step row (seed or derived).
    async fn create_step(&self, step: &Step) -> Result<(), IntelflowError>;

    /// Write a step's terminal state.
    async fn update_step_terminal(&self, step: &Step) -> Result<(), IntelflowError>;

    /// Insert the 1:1 result row for a completed step.
    async fn create_search_result(&self, result: &SearchResult) -> Result<(), IntelflowError>;

    /// Insert payload rows into the table selected by `payload_kind`.
    async fn create_payload_rows(
        &self,
        payload_kind: DomainTag,
        search_result_id: Uuid,
        records: &[DomainRecord],
    ) -> Result<(), IntelflowError>;

    async fn list_steps_by_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<Step>, IntelflowError>;

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, IntelflowError>;

    /// Remove a pipeline and, by cascade, its steps, results, and payload
    /// rows.
    async fn delete_pipeline(&self, id: Uuid) -> Result<(), IntelflowError>;
}
