//! REST surface: run pipelines (fire-and-return or SSE) and read them back.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::Stream;
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use intelflow_common::{DomainTag, IntelflowError, PipelineConfig};
use intelflow_engine::{ChannelSink, Orchestrator, PipelineStore};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DynamicParams {
    q: String,
    depth: Option<u32>,
    skip_duplicates: Option<bool>,
    concurrency: Option<usize>,
    delay: Option<u64>,
    /// Comma-separated domain tags; all when absent.
    domains: Option<String>,
    stream: Option<bool>,
}

fn build_config(params: &DynamicParams) -> Result<PipelineConfig, IntelflowError> {
    let mut config = PipelineConfig::new(params.q.clone());
    if let Some(depth) = params.depth {
        config.max_depth = depth;
    }
    if let Some(skip) = params.skip_duplicates {
        config.skip_duplicates = skip;
    }
    if let Some(concurrency) = params.concurrency {
        config.max_concurrent_steps = concurrency;
    }
    if let Some(delay) = params.delay {
        config.delay_between_steps_seconds = delay;
    }
    if let Some(domains) = &params.domains {
        let mut tags = Vec::new();
        for raw in domains.split(',').filter(|s| !s.trim().is_empty()) {
            let tag: DomainTag = raw
                .trim()
                .parse()
                .map_err(IntelflowError::Validation)?;
            tags.push(tag);
        }
        config.available_domains = tags;
    }
    config.validate()?;
    Ok(config)
}

fn bad_request(e: &IntelflowError) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// `GET /dynamic?q=…&depth=…&skip_duplicates=…[&stream=true]`.
///
/// With `stream=true` the response is an SSE stream of terminal step
/// events, ending with a `done` event carrying the finalized counters.
/// Without it, the run is spawned and the pipeline id returned at once.
pub async fn dynamic_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DynamicParams>,
) -> axum::response::Response {
    let config = match build_config(&params) {
        Ok(c) => c,
        Err(e) => return bad_request(&e),
    };
    // Surface missing-connector config errors before starting anything.
    for tag in &config.available_domains {
        if let Err(e) = state.registry.get(*tag) {
            return bad_request(&e);
        }
    }

    let pipeline_id = Uuid::new_v4();

    if params.stream.unwrap_or(false) {
        return step_stream(state, pipeline_id, config).into_response();
    }

    let orchestrator = Orchestrator::new(state.registry.clone(), state.store.clone());
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_with_id(pipeline_id, config, None).await {
            error!(pipeline_id = %pipeline_id, error = %e, "Pipeline run failed");
        }
    });

    info!(pipeline_id = %pipeline_id, "Pipeline run started");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"pipeline_id": pipeline_id})),
    )
        .into_response()
}

/// Subscribe a channel sink, run the pipeline, forward terminal steps as
/// SSE. The channel closes when the run finalizes and drops the sink.
fn step_stream(
    state: Arc<AppState>,
    pipeline_id: Uuid,
    config: PipelineConfig,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sink, mut rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(state.registry.clone(), state.store.clone());

    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .run_with_id(pipeline_id, config, Some(Arc::new(sink)))
            .await
        {
            error!(pipeline_id = %pipeline_id, error = %e, "Streaming pipeline run failed");
        }
    });

    let store = state.store.clone();
    let stream = async_stream::stream! {
        while let Some(completed) = rx.recv().await {
            match Event::default().event("step").json_data(&completed) {
                Ok(event) => yield Ok(event),
                Err(e) => error!(error = %e, "Failed to serialize step event"),
            }
        }

        // Run finalized: emit the header counters.
        let done = match store.get_pipeline(pipeline_id).await {
            Ok(Some(pipeline)) => serde_json::json!({
                "pipeline_id": pipeline.id,
                "total_steps": pipeline.total_steps,
                "successful_steps": pipeline.successful_steps,
                "failed_steps": pipeline.failed_steps,
                "max_depth_reached": pipeline.max_depth_reached,
            }),
            Ok(None) => serde_json::json!({"pipeline_id": pipeline_id}),
            Err(e) => serde_json::json!({"pipeline_id": pipeline_id, "error": e.to_string()}),
        };
        if let Ok(event) = Event::default().event("done").json_data(&done) {
            yield Ok(event);
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn pipeline_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    let pipeline = match state.store.get_pipeline(id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "pipeline not found"})),
            )
                .into_response()
        }
        Err(e) => {
            error!(pipeline_id = %id, error = %e, "Failed to load pipeline");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    match state.store.list_steps_by_pipeline(id).await {
        Ok(steps) => Json(serde_json::json!({
            "pipeline": pipeline,
            "steps": steps,
        }))
        .into_response(),
        Err(e) => {
            error!(pipeline_id = %id, error = %e, "Failed to load steps");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

pub async fn pipeline_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> axum::response::Response {
    match state.store.delete_pipeline(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(pipeline_id = %id, error = %e, "Failed to delete pipeline");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
