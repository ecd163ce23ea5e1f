use std::sync::Arc;

use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use intelflow_common::AppConfig;
use intelflow_connectors::ConnectorRegistry;
use intelflow_store::PgStore;

mod rest;

pub struct AppState {
    pub store: Arc<PgStore>,
    pub registry: Arc<ConnectorRegistry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("intelflow=info".parse()?))
        .init();

    info!("Intelflow API starting...");

    let config = AppConfig::from_env();
    config.log_redacted();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.migrate().await?;

    let registry = Arc::new(ConnectorRegistry::from_config(&config));

    let state = Arc::new(AppState {
        store,
        registry,
    });

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/healthz", get(rest::healthz))
        .route("/dynamic", get(rest::dynamic_handler))
        .route(
            "/pipelines/{id}",
            get(rest::pipeline_detail).delete(rest::pipeline_delete),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Intelflow API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
