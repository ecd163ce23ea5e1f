use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use intelflow_common::{AppConfig, DomainTag, IntelflowError, PipelineConfig};
use intelflow_connectors::ConnectorRegistry;
use intelflow_engine::Orchestrator;
use intelflow_store::PgStore;

#[derive(Parser)]
#[command(name = "intelflow", about = "Iterative multi-source intelligence aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline from a seed query.
    Run {
        /// Company name, tax identifier, or person name.
        query: String,

        #[arg(long, default_value_t = 5)]
        max_depth: u32,

        /// true/false; collapses repeat (domain, keyword) pairs.
        #[arg(long)]
        skip_duplicates: Option<bool>,

        /// Seconds between any two dispatches.
        #[arg(long)]
        delay: Option<u64>,

        /// Upper bound on concurrent step executions.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Comma-separated domain tags; all when absent.
        #[arg(long)]
        domains: Option<String>,
    },
}

/// Exit codes: 0 success, 1 configuration error, 2 runtime error.
#[tokio::main]
async fn main() -> ExitCode {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "intelflow=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            query,
            max_depth,
            skip_duplicates,
            delay,
            concurrency,
            domains,
        } => {
            let pipeline_config =
                match build_config(query, max_depth, skip_duplicates, delay, concurrency, domains)
                {
                    Ok(c) => c,
                    Err(e) => {
                        error!(error = %e, "Invalid configuration");
                        return ExitCode::from(1);
                    }
                };
            run_pipeline(pipeline_config).await
        }
    }
}

fn build_config(
    query: String,
    max_depth: u32,
    skip_duplicates: Option<bool>,
    delay: Option<u64>,
    concurrency: Option<usize>,
    domains: Option<String>,
) -> Result<PipelineConfig, IntelflowError> {
    let mut config = PipelineConfig::new(query);
    config.max_depth = max_depth;
    if let Some(skip) = skip_duplicates {
        config.skip_duplicates = skip;
    }
    if let Some(delay) = delay {
        config.delay_between_steps_seconds = delay;
    }
    if let Some(concurrency) = concurrency {
        config.max_concurrent_steps = concurrency;
    }
    if let Some(domains) = domains {
        let mut tags = Vec::new();
        for raw in domains.split(',').filter(|s| !s.trim().is_empty()) {
            let tag: DomainTag = raw.trim().parse().map_err(IntelflowError::Validation)?;
            tags.push(tag);
        }
        config.available_domains = tags;
    }
    config.validate()?;
    Ok(config)
}

async fn run_pipeline(pipeline_config: PipelineConfig) -> ExitCode {
    let app_config = AppConfig::from_env();
    app_config.log_redacted();

    let store = match PgStore::connect(&app_config.database_url).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "Failed to connect to Postgres");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = store.migrate().await {
        error!(error = %e, "Migrations failed");
        return ExitCode::from(2);
    }

    let registry = Arc::new(ConnectorRegistry::from_config(&app_config));
    let orchestrator = Orchestrator::new(registry, store);

    match orchestrator.run(pipeline_config).await {
        Ok(outcome) => {
            info!(pipeline_id = %outcome.pipeline_id, "Pipeline run complete. {}", outcome.stats);
            ExitCode::SUCCESS
        }
        Err(e @ (IntelflowError::Config(_) | IntelflowError::Validation(_))) => {
            error!(error = %e, "Configuration error");
            ExitCode::from(1)
        }
        Err(e) => {
            error!(error = %e, "Pipeline run failed");
            ExitCode::from(2)
        }
    }
}
