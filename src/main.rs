use anyhow::Context;
use tracing::info;

use food_city_ingest::{init_tracing, AppConfig, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    info!(config = ?config.public_profile(), "starting ingestion run");

    let pipeline = Pipeline::new(config).context("failed to set up pipeline")?;
    let summary = pipeline.run().await.context("ingestion run failed")?;
    for table in &summary.tables {
        info!(
            table = table.table,
            inserted = table.inserted,
            failed_batches = table.failed_batches,
            failed_rows = table.failed_rows,
            "table summary"
        );
    }
    Ok(())
}
