use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod play;
pub mod repo;

use config::Config;
use engine::RandomSource;
use metrics::Metrics;
use oracle::ConcurrencyOracle;
use repo::PgPromotionStore;

/// Shared application state, grounded on `predictiq-api::AppState` — one
/// `Clone`-everywhere struct threaded through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub metrics: Metrics,
    pub store: PgPromotionStore,
    pub oracle: Arc<dyn ConcurrencyOracle>,
    pub rng: Arc<dyn RandomSource>,
}
