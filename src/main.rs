use rust_datatico_api::config::Config;
use rust_datatico_api::db::Database;
use rust_datatico_api::handlers::AppState;
use rust_datatico_api::{obs, routes};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

/// Main entry point for the application.
///
/// Loads configuration, connects to Postgres (creating the `registry`
/// schema when missing), builds the shared state, and serves the API with
/// per-IP rate limiting on everything except `/health`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    obs::init_tracing("rust_datatico_api=debug,tower_http=debug");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");
    tracing::info!(
        "Searching {} collections: {}",
        config.search_collections.len(),
        config.search_collections.join(", ")
    );

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    let port = config.port;
    let app_state = Arc::new(AppState::new(db.pool.clone(), config));

    // Import tasks do not survive a restart
    app_state.store.fail_interrupted_runs().await?;

    if app_state.geocoder.is_some() {
        tracing::info!("✓ Google geocoding enabled");
    } else {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set, record geocoding disabled");
    }

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = routes::api_routes(app_state.clone()).layer(
        ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }),
    );

    // Health check bypasses rate limiting
    let app = routes::finish(
        routes::health_routes().merge(protected_routes),
        app_state,
    );

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
