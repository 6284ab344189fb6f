pub mod config;
pub mod db;
pub mod errors;
pub mod geocode;
pub mod journal;
pub mod loader;
pub mod locations;
pub mod normalize;
pub mod pipeline;
pub mod records;
pub mod schema;
pub mod sources;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{AppConfig, DatabaseSettings};
pub use errors::{AppError, AppResult};
pub use journal::RunJournal;
pub use loader::BatchLoader;
pub use pipeline::{
    load_tables, transform_sources, unify, BatchSizes, Pipeline, RunSummary, SourceData,
    TableSummary, TransformedSources,
};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,food_city_ingest=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
