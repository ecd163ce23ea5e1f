use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use intelflow_common::AppConfig;
use intelflow_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("intelflow=info".parse()?))
        .init();

    info!("Intelflow migrate starting...");

    let config = AppConfig::from_env();
    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    info!("Migrations complete");
    Ok(())
}
