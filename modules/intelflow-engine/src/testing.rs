//! Deterministic test doubles for the engine: no network, no database.
//!
//! `MockConnector` serves canned batches and extracts whatever keyword map
//! a record's snippet encodes. `MemoryStore` implements the persistence
//! port over hash maps with referential checks. `CapturingSink` records
//! every emission.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use intelflow_common::{
    Category, DomainRecord, DomainTag, IntelflowError, KeywordMap, Pipeline, SearchResult, Step,
    WebLinkRecord,
};
use intelflow_connectors::Connector;

use crate::events::{EventSink, StepCompleted};
use crate::store::PipelineStore;

// --- Helpers ---

pub fn keyword_map(entries: &[(Category, &[&str])]) -> KeywordMap {
    let mut map = KeywordMap::new();
    for (category, keywords) in entries {
        for keyword in *keywords {
            map.push(*category, *keyword);
        }
    }
    map
}

// --- MockConnector ---

/// Connector double. Batches are keyed by query; extraction reads the
/// keyword map encoded in each record's snippet, so tests declare both
/// the records a search returns and the keywords they yield in one place.
pub struct MockConnector {
    tag: DomainTag,
    payload_kind: DomainTag,
    searchable: Vec<Category>,
    extracted: Vec<Category>,
    batches: HashMap<String, Vec<DomainRecord>>,
    default_batch: Vec<DomainRecord>,
    fail_message: Option<String>,
    searches: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(tag: DomainTag) -> Self {
        Self {
            tag,
            payload_kind: tag,
            searchable: vec![Category::CompanyName],
            extracted: Vec::new(),
            batches: HashMap::new(),
            default_batch: Vec::new(),
            fail_message: None,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn searchable(mut self, categories: &[Category]) -> Self {
        self.searchable = categories.to_vec();
        self
    }

    pub fn extracted(mut self, categories: &[Category]) -> Self {
        self.extracted = categories.to_vec();
        self
    }

    /// Batch returned for one specific query.
    pub fn with_batch(mut self, query: &str, records: Vec<DomainRecord>) -> Self {
        self.batches.insert(query.to_string(), records);
        self
    }

    /// Batch returned for any query without a specific entry.
    pub fn with_default_batch(mut self, records: Vec<DomainRecord>) -> Self {
        self.default_batch = records;
        self
    }

    /// Every search fails with this message.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_message = Some(message.to_string());
        self
    }

    pub fn with_payload_kind(mut self, tag: DomainTag) -> Self {
        self.payload_kind = tag;
        self
    }

    /// Queries observed so far, in call order.
    pub fn seen_queries(&self) -> Vec<String> {
        self.searches.lock().expect("mock lock poisoned").clone()
    }

    /// A record whose extraction yields exactly `entries`.
    pub fn record_with_keywords(entries: &[(Category, &[&str])]) -> DomainRecord {
        let map = keyword_map(entries);
        DomainRecord::WebLink(WebLinkRecord {
            title: "mock".to_string(),
            url: "https://mock.test/record".to_string(),
            snippet: serde_json::to_string(&map).expect("keyword map serializes"),
            source: "mock".to_string(),
        })
    }

    /// A record whose extraction fails.
    pub fn malformed_record() -> DomainRecord {
        DomainRecord::WebLink(WebLinkRecord {
            title: "mock".to_string(),
            url: "https://mock.test/broken".to_string(),
            snippet: "not a keyword map".to_string(),
            source: "mock".to_string(),
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn tag(&self) -> DomainTag {
        self.tag
    }

    async fn search(&self, query: &str) -> Result<Vec<DomainRecord>, IntelflowError> {
        self.searches
            .lock()
            .expect("mock lock poisoned")
            .push(query.to_string());
        if let Some(message) = &self.fail_message {
            return Err(IntelflowError::Connector(message.clone()));
        }
        Ok(self
            .batches
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default_batch.clone()))
    }

    fn searchable_categories(&self) -> &[Category] {
        &self.searchable
    }

    fn extracted_categories(&self) -> &[Category] {
        &self.extracted
    }

    fn extract(&self, record: &DomainRecord) -> Result<KeywordMap, IntelflowError> {
        let DomainRecord::WebLink(r) = record else {
            return Err(IntelflowError::Extraction("unexpected record shape".into()));
        };
        serde_json::from_str(&r.snippet)
            .map_err(|e| IntelflowError::Extraction(format!("snippet is not a keyword map: {e}")))
    }

    fn payload_kind(&self) -> DomainTag {
        self.payload_kind
    }
}

// --- MemoryStore ---

pub struct PayloadBatch {
    pub payload_kind: DomainTag,
    pub search_result_id: Uuid,
    pub records: Vec<DomainRecord>,
}

/// In-memory persistence port with the same referential rules as the
/// Postgres store: results require their step, payload rows require their
/// result, deletes cascade.
#[derive(Default)]
pub struct MemoryStore {
    pub pipelines: Mutex<HashMap<Uuid, Pipeline>>,
    pub steps: Mutex<Vec<Step>>,
    pub results: Mutex<Vec<SearchResult>>,
    pub payloads: Mutex<Vec<PayloadBatch>>,
    pub fail_step_updates: AtomicBool,
    pub fail_result_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps_for(&self, pipeline_id: Uuid) -> Vec<Step> {
        self.steps
            .lock()
            .expect("store lock poisoned")
            .iter()
            .filter(|s| s.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    pub fn results_for(&self, pipeline_id: Uuid) -> Vec<SearchResult> {
        let step_ids: Vec<Uuid> = self.steps_for(pipeline_id).iter().map(|s| s.id).collect();
        self.results
            .lock()
            .expect("store lock poisoned")
            .iter()
            .filter(|r| step_ids.contains(&r.step_id))
            .cloned()
            .collect()
    }

    pub fn payload_batches(&self) -> Vec<(DomainTag, Uuid, usize)> {
        self.payloads
            .lock()
            .expect("store lock poisoned")
            .iter()
            .map(|p| (p.payload_kind, p.search_result_id, p.records.len()))
            .collect()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn create_pipeline(&self, pipeline: &Pipeline) -> Result<(), IntelflowError> {
        self.pipelines
            .lock()
            .expect("store lock poisoned")
            .insert(pipeline.id, pipeline.clone());
        Ok(())
    }

    async fn update_pipeline_counters(
        &self,
        id: Uuid,
        total_steps: u32,
        successful_steps: u32,
        failed_steps: u32,
        max_depth_reached: u32,
    ) -> Result<(), IntelflowError> {
        let mut pipelines = self.pipelines.lock().expect("store lock poisoned");
        let pipeline = pipelines
            .get_mut(&id)
            .ok_or_else(|| IntelflowError::Database(format!("no pipeline {id}")))?;
        pipeline.total_steps = total_steps;
        pipeline.successful_steps = successful_steps;
        pipeline.failed_steps = failed_steps;
        pipeline.max_depth_reached = max_depth_reached;
        pipeline.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn create_step(&self, step: &Step) -> Result<(), IntelflowError> {
        self.steps
            .lock()
            .expect("store lock poisoned")
            .push(step.clone());
        Ok(())
    }

    async fn update_step_terminal(&self, step: &Step) -> Result<(), IntelflowError> {
        if self.fail_step_updates.load(Ordering::SeqCst) {
            return Err(IntelflowError::Database("injected step update failure".into()));
        }
        let mut steps = self.steps.lock().expect("store lock poisoned");
        let existing = steps
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| IntelflowError::Database(format!("no step {}", step.id)))?;
        *existing = step.clone();
        Ok(())
    }

    async fn create_search_result(&self, result: &SearchResult) -> Result<(), IntelflowError> {
        if self.fail_result_inserts.load(Ordering::SeqCst) {
            return Err(IntelflowError::Database(
                "injected result insert failure".into(),
            ));
        }
        let steps = self.steps.lock().expect("store lock poisoned");
        if !steps.iter().any(|s| s.id == result.step_id) {
            return Err(IntelflowError::Database(format!(
                "no step {} for search result",
                result.step_id
            )));
        }
        drop(steps);
        self.results
            .lock()
            .expect("store lock poisoned")
            .push(result.clone());
        Ok(())
    }

    async fn create_payload_rows(
        &self,
        payload_kind: DomainTag,
        search_result_id: Uuid,
        records: &[DomainRecord],
    ) -> Result<(), IntelflowError> {
        let results = self.results.lock().expect("store lock poisoned");
        if !results.iter().any(|r| r.id == search_result_id) {
            return Err(IntelflowError::Database(format!(
                "no search result {search_result_id} for payload rows"
            )));
        }
        drop(results);
        self.payloads
            .lock()
            .expect("store lock poisoned")
            .push(PayloadBatch {
                payload_kind,
                search_result_id,
                records: records.to_vec(),
            });
        Ok(())
    }

    async fn list_steps_by_pipeline(
        &self,
        pipeline_id: Uuid,
    ) -> Result<Vec<Step>, IntelflowError> {
        Ok(self.steps_for(pipeline_id))
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, IntelflowError> {
        Ok(self
            .pipelines
            .lock()
            .expect("store lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn delete_pipeline(&self, id: Uuid) -> Result<(), IntelflowError> {
        self.pipelines.lock().expect("store lock poisoned").remove(&id);
        let removed_steps: Vec<Uuid> = {
            let mut steps = self.steps.lock().expect("store lock poisoned");
            let removed = steps
                .iter()
                .filter(|s| s.pipeline_id == id)
                .map(|s| s.id)
                .collect();
            steps.retain(|s| s.pipeline_id != id);
            removed
        };
        let removed_results: Vec<Uuid> = {
            let mut results = self.results.lock().expect("store lock poisoned");
            let removed = results
                .iter()
                .filter(|r| removed_steps.contains(&r.step_id))
                .map(|r| r.id)
                .collect();
            results.retain(|r| !removed_steps.contains(&r.step_id));
            removed
        };
        self.payloads
            .lock()
            .expect("store lock poisoned")
            .retain(|p| !removed_results.contains(&p.search_result_id));
        Ok(())
    }
}

// --- CapturingSink ---

#[derive(Default)]
pub struct CapturingSink {
    events: Mutex<Vec<StepCompleted>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StepCompleted> {
        self.events.lock().expect("sink lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("sink lock poisoned").len()
    }
}

#[async_trait]
impl EventSink for CapturingSink {
    async fn on_step_completed(&self, step: &Step, result: &SearchResult) {
        self.events
            .lock()
            .expect("sink lock poisoned")
            .push(StepCompleted {
                step: step.clone(),
                result: result.clone(),
            });
    }
}
