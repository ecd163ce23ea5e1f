//! Engine integration tests: full orchestrator runs over mocks.
//!
//! MOCK CONNECTORS → ORCHESTRATOR → MEMORY STORE + CAPTURING SINK.
//! Deterministic: no network, no database, concurrency 1, zero delay
//! unless a test says otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use intelflow_common::{Category, DomainTag, PipelineConfig, SearchResult, Step};
use intelflow_connectors::{Connector, ConnectorRegistry};

use crate::events::EventSink;
use crate::pipeline::orchestrator::{CancelToken, Orchestrator, RunOutcome};
use crate::store::PipelineStore;
use crate::testing::*;

const SEED_DOMAINS: [DomainTag; 5] = [
    DomainTag::Onapi,
    DomainTag::Scj,
    DomainTag::Dgii,
    DomainTag::Pgr,
    DomainTag::WebSearch,
];

/// Registry with one mock per seed domain, category tables mirroring the
/// production connectors, all batches empty unless overridden.
fn seed_registry(overrides: Vec<MockConnector>) -> Arc<ConnectorRegistry> {
    let mut connectors: Vec<Arc<dyn Connector>> = Vec::new();
    let overridden: HashSet<DomainTag> = overrides.iter().map(|c| c.tag()).collect();
    for mock in overrides {
        connectors.push(Arc::new(mock));
    }
    for tag in SEED_DOMAINS {
        if !overridden.contains(&tag) {
            connectors.push(Arc::new(default_mock(tag)));
        }
    }
    Arc::new(ConnectorRegistry::new(connectors))
}

fn default_mock(tag: DomainTag) -> MockConnector {
    MockConnector::new(tag).searchable(searchable_for(tag))
}

fn searchable_for(tag: DomainTag) -> &'static [Category] {
    match tag {
        DomainTag::Onapi => &[Category::CompanyName],
        DomainTag::Scj => &[
            Category::CompanyName,
            Category::PersonName,
            Category::ContributorId,
        ],
        DomainTag::Dgii => &[Category::CompanyName, Category::ContributorId],
        DomainTag::Pgr => &[Category::PersonName, Category::CompanyName],
        _ => &[Category::CompanyName, Category::PersonName],
    }
}

/// Sequential, unthrottled config over the five seed domains.
fn test_config(query: &str) -> PipelineConfig {
    let mut config = PipelineConfig::new(query);
    config.max_concurrent_steps = 1;
    config.delay_between_steps_seconds = 0;
    config.available_domains = SEED_DOMAINS.to_vec();
    config
}

async fn run(
    registry: Arc<ConnectorRegistry>,
    store: Arc<MemoryStore>,
    config: PipelineConfig,
) -> RunOutcome {
    Orchestrator::new(registry, store)
        .run(config)
        .await
        .expect("pipeline run failed")
}

fn step_triples(steps: &[Step]) -> HashSet<(DomainTag, String, u32)> {
    steps
        .iter()
        .map(|s| (s.domain_tag, s.search_parameter.clone(), s.depth))
        .collect()
}

// ---------------------------------------------------------------------------
// Trivial seed: empty returns everywhere
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batches_yield_one_successful_seed_per_affinity_entry() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("ZZZZZZ");
    config.max_depth = 3;

    let outcome = run(seed_registry(vec![]), store.clone(), config).await;

    let steps = store.steps_for(outcome.pipeline_id);
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.success));
    assert!(steps.iter().all(|s| s.depth == 0));
    assert_eq!(outcome.stats.steps_failed, 0);
    assert_eq!(outcome.stats.max_depth_reached, 0);

    let pipeline = store
        .get_pipeline(outcome.pipeline_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pipeline.total_steps, 5);
    assert_eq!(pipeline.successful_steps, 5);
    assert_eq!(pipeline.failed_steps, 0);
    assert_eq!(pipeline.max_depth_reached, 0);
}

#[tokio::test]
async fn seeds_enqueue_in_domain_declaration_order() {
    let store = Arc::new(MemoryStore::new());
    let outcome = run(seed_registry(vec![]), store.clone(), test_config("ZZZZZZ")).await;

    let domains: Vec<DomainTag> = store
        .steps_for(outcome.pipeline_id)
        .iter()
        .map(|s| s.domain_tag)
        .collect();
    assert_eq!(
        domains,
        vec![
            DomainTag::Onapi,
            DomainTag::Scj,
            DomainTag::Dgii,
            DomainTag::Pgr,
            DomainTag::WebSearch,
        ]
    );
}

// ---------------------------------------------------------------------------
// One-level expansion
// ---------------------------------------------------------------------------

fn novasco_onapi() -> MockConnector {
    MockConnector::new(DomainTag::Onapi)
        .searchable(&[Category::CompanyName])
        .extracted(&[Category::CompanyName, Category::PersonName])
        .with_batch(
            "Novasco",
            vec![MockConnector::record_with_keywords(&[
                (Category::CompanyName, &["Novasco Holdings"][..]),
                (Category::PersonName, &["Ada Pérez"][..]),
            ])],
        )
}

#[tokio::test]
async fn one_level_expansion_routes_keywords_by_category() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 1;

    let outcome = run(seed_registry(vec![novasco_onapi()]), store.clone(), config).await;

    let steps = store.steps_for(outcome.pipeline_id);
    let derived: Vec<&Step> = steps.iter().filter(|s| s.depth == 1).collect();

    // "Novasco Holdings" routes to every company-name domain; the ONAPI
    // parent pair was (onapi, "Novasco"), so (onapi, "Novasco Holdings")
    // is not a self-cycle and is scheduled too.
    let expected: HashSet<(DomainTag, &str)> = [
        (DomainTag::Onapi, "Novasco Holdings"),
        (DomainTag::Scj, "Novasco Holdings"),
        (DomainTag::Dgii, "Novasco Holdings"),
        (DomainTag::Pgr, "Novasco Holdings"),
        (DomainTag::WebSearch, "Novasco Holdings"),
        (DomainTag::Scj, "Ada Pérez"),
        (DomainTag::Pgr, "Ada Pérez"),
        (DomainTag::WebSearch, "Ada Pérez"),
    ]
    .into_iter()
    .collect();
    let actual: HashSet<(DomainTag, &str)> = derived
        .iter()
        .map(|s| (s.domain_tag, s.search_parameter.as_str()))
        .collect();
    assert_eq!(actual, expected);

    // Derived steps carry their origin.
    for step in &derived {
        assert_eq!(step.origin_keywords, vec![step.search_parameter.clone()]);
        assert!(searchable_for(step.domain_tag).contains(&step.origin_category));
    }

    // Depth bound: nothing beyond depth 1.
    assert!(steps.iter().all(|s| s.depth <= 1));
    assert_eq!(outcome.stats.max_depth_reached, 1);
}

#[tokio::test]
async fn payload_rows_land_under_the_connector_payload_kind() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 0;

    let outcome = run(seed_registry(vec![novasco_onapi()]), store.clone(), config).await;

    let results = store.results_for(outcome.pipeline_id);
    let onapi_result = results
        .iter()
        .find(|r| r.domain_tag == DomainTag::Onapi)
        .unwrap();

    let batches = store.payload_batches();
    assert_eq!(batches.len(), 1);
    let (kind, result_id, count) = batches[0];
    assert_eq!(kind, DomainTag::Onapi);
    assert_eq!(result_id, onapi_result.id);
    assert_eq!(count, 1);
}

// ---------------------------------------------------------------------------
// Dedup on and off
// ---------------------------------------------------------------------------

fn dual_emitters() -> Vec<MockConnector> {
    let emission = vec![MockConnector::record_with_keywords(&[(
        Category::CompanyName,
        &["Novasco Holdings"][..],
    )])];
    vec![
        MockConnector::new(DomainTag::Onapi)
            .searchable(&[Category::CompanyName])
            .extracted(&[Category::CompanyName])
            .with_batch("Novasco", emission.clone()),
        MockConnector::new(DomainTag::WebSearch)
            .searchable(&[Category::CompanyName, Category::PersonName])
            .extracted(&[Category::CompanyName])
            .with_batch("Novasco", emission),
    ]
}

#[tokio::test]
async fn duplicate_emissions_are_collapsed_when_skipping_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 2;
    config.skip_duplicates = true;

    let outcome = run(seed_registry(dual_emitters()), store.clone(), config).await;

    let steps = store.steps_for(outcome.pipeline_id);
    // 5 seeds + one derived step per company-name domain; the second
    // identical emission is fully deduplicated.
    assert_eq!(steps.len(), 10);
    assert!(outcome.stats.duplicates_skipped > 0);

    // At most one step per (domain, parameter) pair.
    let mut seen = HashSet::new();
    for step in &steps {
        assert!(
            seen.insert((step.domain_tag, step.search_parameter.clone())),
            "duplicate step for {:?} {:?}",
            step.domain_tag,
            step.search_parameter
        );
    }
}

#[tokio::test]
async fn duplicate_emissions_fan_out_when_not_skipping() {
    let dedup_store = Arc::new(MemoryStore::new());
    let mut dedup_config = test_config("Novasco");
    dedup_config.max_depth = 2;
    dedup_config.skip_duplicates = true;
    let deduped = run(
        seed_registry(dual_emitters()),
        dedup_store.clone(),
        dedup_config,
    )
    .await;

    let fanout_store = Arc::new(MemoryStore::new());
    let mut fanout_config = test_config("Novasco");
    fanout_config.max_depth = 2;
    fanout_config.skip_duplicates = false;
    let fanned = run(
        seed_registry(dual_emitters()),
        fanout_store.clone(),
        fanout_config,
    )
    .await;

    // Both emissions produce their own derived steps.
    assert_eq!(fanned.stats.steps_executed, 15);
    assert!(fanned.stats.steps_executed > deduped.stats.steps_executed);
}

// ---------------------------------------------------------------------------
// Connector failure mid-run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_connector_marks_steps_failed_without_derived_work() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("X");
    config.max_depth = 2;

    let mocks = vec![
        MockConnector::new(DomainTag::Dgii)
            .searchable(&[Category::CompanyName, Category::ContributorId])
            .failing("remote unavailable"),
        MockConnector::new(DomainTag::Onapi)
            .searchable(&[Category::CompanyName])
            .extracted(&[Category::CompanyName])
            .with_batch(
                "X",
                vec![MockConnector::record_with_keywords(&[(
                    Category::CompanyName,
                    &["Target Corp"][..],
                )])],
            ),
    ];

    let outcome = run(seed_registry(mocks), store.clone(), config).await;

    let steps = store.steps_for(outcome.pipeline_id);
    let dgii_steps: Vec<&Step> = steps
        .iter()
        .filter(|s| s.domain_tag == DomainTag::Dgii)
        .collect();
    assert!(!dgii_steps.is_empty());
    for step in &dgii_steps {
        assert!(!step.success);
        assert!(!step.error_text.is_empty());
    }

    // Failed steps extract nothing, so nothing derives from DGII.
    let results = store.results_for(outcome.pipeline_id);
    for result in results.iter().filter(|r| r.domain_tag == DomainTag::Dgii) {
        assert!(!result.success);
        assert!(result.keywords_per_category.is_empty());
        assert!(result.records.is_empty());
    }

    // No DGII payload rows exist.
    assert!(store
        .payload_batches()
        .iter()
        .all(|(kind, _, _)| *kind != DomainTag::Dgii));

    assert!(outcome.stats.steps_failed >= dgii_steps.len() as u32);
    // Other domains proceed normally.
    assert!(outcome.stats.steps_succeeded > 0);
}

// ---------------------------------------------------------------------------
// Cancellation after the first completed step
// ---------------------------------------------------------------------------

/// Sink that fires a cancel token after the first emission.
struct CancelAfterFirst {
    inner: CapturingSink,
    cancel: Arc<CancelToken>,
}

#[async_trait]
impl EventSink for CancelAfterFirst {
    async fn on_step_completed(&self, step: &Step, result: &SearchResult) {
        self.inner.on_step_completed(step, result).await;
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn cancellation_stops_dequeuing_and_finalizes_observed_counters() {
    let store = Arc::new(MemoryStore::new());
    let registry = seed_registry(vec![novasco_onapi()]);
    let mut config = test_config("Novasco");
    config.max_depth = 1;

    let cancel = Arc::new(CancelToken::new());
    let sink = Arc::new(CancelAfterFirst {
        inner: CapturingSink::new(),
        cancel: cancel.clone(),
    });

    let orchestrator = Orchestrator::new(registry, store.clone()).with_cancel(cancel);
    let outcome = orchestrator
        .run_streaming(config, sink.clone())
        .await
        .expect("cancelled run still finalizes");

    // The first seed completed; subsequent dequeues stopped.
    assert_eq!(outcome.stats.steps_executed, 1);
    assert_eq!(sink.inner.count(), 1);

    // The header reflects only the completed work.
    let pipeline = store
        .get_pipeline(outcome.pipeline_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pipeline.total_steps, 1);
    assert_eq!(
        pipeline.total_steps,
        pipeline.successful_steps + pipeline.failed_steps
    );
}

// ---------------------------------------------------------------------------
// Depth bound and chained expansion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn steps_at_the_depth_bound_execute_but_never_expand() {
    let store = Arc::new(MemoryStore::new());
    let chain = MockConnector::new(DomainTag::Onapi)
        .searchable(&[Category::CompanyName])
        .extracted(&[Category::CompanyName])
        .with_batch(
            "Alpha Corp",
            vec![MockConnector::record_with_keywords(&[(
                Category::CompanyName,
                &["Beta Corp"][..],
            )])],
        )
        .with_batch(
            "Beta Corp",
            vec![MockConnector::record_with_keywords(&[(
                Category::CompanyName,
                &["Gamma Corp"][..],
            )])],
        )
        .with_batch(
            "Gamma Corp",
            vec![MockConnector::record_with_keywords(&[(
                Category::CompanyName,
                &["Delta Corp"][..],
            )])],
        );

    let registry = Arc::new(ConnectorRegistry::new(vec![
        Arc::new(chain) as Arc<dyn Connector>
    ]));
    let mut config = test_config("Alpha Corp");
    config.max_depth = 2;
    config.available_domains = vec![DomainTag::Onapi];

    let outcome = Orchestrator::new(registry, store.clone())
        .run(config)
        .await
        .unwrap();

    let steps = store.steps_for(outcome.pipeline_id);
    let triples = step_triples(&steps);
    assert!(triples.contains(&(DomainTag::Onapi, "Alpha Corp".into(), 0)));
    assert!(triples.contains(&(DomainTag::Onapi, "Beta Corp".into(), 1)));
    assert!(triples.contains(&(DomainTag::Onapi, "Gamma Corp".into(), 2)));
    // The depth-2 step executed but its extraction spawned nothing.
    assert!(steps.iter().all(|s| s.depth <= 2));
    assert_eq!(steps.len(), 3);
    assert_eq!(outcome.stats.max_depth_reached, 2);
}

// ---------------------------------------------------------------------------
// Self-cycle guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn a_step_never_spawns_its_own_pair_even_without_dedup() {
    let store = Arc::new(MemoryStore::new());
    // Extraction re-emits the exact search parameter.
    let echo = MockConnector::new(DomainTag::Onapi)
        .searchable(&[Category::CompanyName])
        .extracted(&[Category::CompanyName])
        .with_default_batch(vec![MockConnector::record_with_keywords(&[(
            Category::CompanyName,
            &["Echo Corp"][..],
        )])]);

    let registry = Arc::new(ConnectorRegistry::new(vec![
        Arc::new(echo) as Arc<dyn Connector>
    ]));
    let mut config = test_config("Echo Corp");
    config.max_depth = 3;
    config.skip_duplicates = false;
    config.available_domains = vec![DomainTag::Onapi];

    let outcome = Orchestrator::new(registry, store.clone())
        .run(config)
        .await
        .unwrap();

    let steps = store.steps_for(outcome.pipeline_id);
    // Every execution re-emits "Echo Corp"; the self-cycle rule blocks the
    // child each time, so only the seed exists.
    assert_eq!(steps.len(), 1);
    assert_eq!(outcome.stats.steps_executed, 1);
}

// ---------------------------------------------------------------------------
// Determinism at sequential concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rerunning_the_same_config_produces_the_same_step_set() {
    let first_store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 1;
    let first = run(
        seed_registry(vec![novasco_onapi()]),
        first_store.clone(),
        config.clone(),
    )
    .await;

    let second_store = Arc::new(MemoryStore::new());
    let second = run(
        seed_registry(vec![novasco_onapi()]),
        second_store.clone(),
        config,
    )
    .await;

    assert_eq!(
        step_triples(&first_store.steps_for(first.pipeline_id)),
        step_triples(&second_store.steps_for(second.pipeline_id)),
    );
}

// ---------------------------------------------------------------------------
// Event faithfulness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sink_fires_exactly_once_per_terminal_step() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CapturingSink::new());
    let mut config = test_config("Novasco");
    config.max_depth = 1;

    let outcome = Orchestrator::new(seed_registry(vec![novasco_onapi()]), store.clone())
        .run_streaming(config, sink.clone())
        .await
        .unwrap();

    assert_eq!(sink.count() as u32, outcome.stats.steps_executed);

    let persisted: HashSet<uuid::Uuid> = store
        .steps_for(outcome.pipeline_id)
        .iter()
        .map(|s| s.id)
        .collect();
    for event in sink.events() {
        assert!(persisted.contains(&event.step.id));
        assert_eq!(event.result.step_id, event.step.id);
    }
}

// ---------------------------------------------------------------------------
// Referential closure and cascade delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_and_payloads_reference_their_owners_and_cascade_on_delete() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 1;

    let outcome = run(seed_registry(vec![novasco_onapi()]), store.clone(), config).await;

    let steps = store.steps_for(outcome.pipeline_id);
    let results = store.results_for(outcome.pipeline_id);
    // 1:1 step to result.
    assert_eq!(steps.len(), results.len());
    for result in &results {
        assert_eq!(steps.iter().filter(|s| s.id == result.step_id).count(), 1);
    }
    let result_ids: HashSet<uuid::Uuid> = results.iter().map(|r| r.id).collect();
    for (_, result_id, _) in store.payload_batches() {
        assert!(result_ids.contains(&result_id));
    }

    store.delete_pipeline(outcome.pipeline_id).await.unwrap();
    assert!(store.steps_for(outcome.pipeline_id).is_empty());
    assert!(store.results_for(outcome.pipeline_id).is_empty());
    assert!(store.payload_batches().is_empty());
    assert!(store
        .get_pipeline(outcome.pipeline_id)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Persistence failure during a step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn result_insert_failure_fails_the_step_and_drops_children() {
    let store = Arc::new(MemoryStore::new());
    store
        .fail_result_inserts
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let mut config = test_config("Novasco");
    config.max_depth = 1;
    config.available_domains = vec![DomainTag::Onapi];

    let registry = Arc::new(ConnectorRegistry::new(vec![
        Arc::new(novasco_onapi()) as Arc<dyn Connector>
    ]));
    let outcome = Orchestrator::new(registry, store.clone())
        .run(config)
        .await
        .expect("pipeline survives step persistence failures");

    // The lone seed counts as failed, nothing was derived.
    assert_eq!(outcome.stats.steps_executed, 1);
    assert_eq!(outcome.stats.steps_failed, 1);
    assert_eq!(outcome.stats.children_enqueued, 0);
}

// ---------------------------------------------------------------------------
// Configuration errors precede any persisted state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_config_creates_no_pipeline_row() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(seed_registry(vec![]), store.clone());

    let empty_query = PipelineConfig::new("");
    assert!(orchestrator.run(empty_query).await.is_err());

    // A selected domain without a registered connector is a config error.
    let mut missing_domain = test_config("Novasco");
    missing_domain.available_domains = vec![DomainTag::Onapi, DomainTag::SocialMedia];
    assert!(orchestrator.run(missing_domain).await.is_err());

    assert!(store.pipelines.lock().unwrap().is_empty());
}

#[tokio::test]
async fn available_domains_restricts_seeding() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.available_domains = vec![DomainTag::Onapi, DomainTag::Dgii];

    let outcome = run(seed_registry(vec![]), store.clone(), config).await;

    let domains: HashSet<DomainTag> = store
        .steps_for(outcome.pipeline_id)
        .iter()
        .map(|s| s.domain_tag)
        .collect();
    let expected: HashSet<DomainTag> = [DomainTag::Onapi, DomainTag::Dgii].into_iter().collect();
    assert_eq!(domains, expected);
}

// ---------------------------------------------------------------------------
// Concurrency cap still drains the whole queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_workers_process_the_full_expansion() {
    let store = Arc::new(MemoryStore::new());
    let mut config = test_config("Novasco");
    config.max_depth = 1;
    config.max_concurrent_steps = 4;

    let outcome = run(seed_registry(vec![novasco_onapi()]), store.clone(), config).await;

    // Same step set as the sequential run, whatever the interleaving.
    let steps = store.steps_for(outcome.pipeline_id);
    assert_eq!(steps.len(), 13);
    assert_eq!(
        outcome.stats.steps_executed,
        outcome.stats.steps_succeeded + outcome.stats.steps_failed
    );
    assert_eq!(outcome.stats.steps_executed as usize, steps.len());
}
