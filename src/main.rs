use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use instawin_api::{
    config::Config,
    engine::{RandomSource, ThreadRngSource},
    handlers,
    metrics::Metrics,
    oracle::{ConcurrencyOracle, InProcessOracle, OracleConfig},
    repo::PgPromotionStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let metrics = Metrics::new()?;
    let store = PgPromotionStore::new(&config.database_url).await?;
    let oracle: Arc<dyn ConcurrencyOracle> = Arc::new(InProcessOracle::new(OracleConfig::new(
        config.customer_oracle_max_requests,
        config.customer_oracle_window,
    )));
    let rng: Arc<dyn RandomSource> = Arc::new(ThreadRngSource);

    let bind_addr = config.bind_addr;

    let state = Arc::new(AppState {
        config,
        metrics,
        store,
        oracle,
        rng,
    });

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/v1/promotions/:promotion_id/play",
            post(handlers::play_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("API listening on {bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
