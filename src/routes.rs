use crate::admin_handler;
use crate::handlers::{self, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request size limit: 5MB max payload.
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Health probes, kept outside rate limiting.
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::api_health))
}

/// Public API, docs, and the admin surface.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route(
            "/imports",
            post(admin_handler::start_import).get(admin_handler::list_imports),
        )
        .route("/imports/:task_id", get(admin_handler::import_status))
        .route(
            "/collections/:collection/records",
            post(admin_handler::insert_records),
        )
        .route(
            "/collections/:collection/dedup",
            post(admin_handler::dedup_collection),
        )
        .route(
            "/collections/:collection/unique-index",
            post(admin_handler::create_unique_index),
        )
        .route(
            "/collections/:collection/export",
            get(admin_handler::export_collection),
        )
        .route(
            "/records/:collection/enrich-by-key",
            post(admin_handler::enrich_by_key),
        )
        .route(
            "/records/:collection/:id",
            patch(admin_handler::enrich_record),
        )
        .route(
            "/records/:collection/:id/geocode",
            post(admin_handler::geocode_record),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            admin_handler::require_admin,
        ))
        // Login is added after route_layer so it stays unauthenticated
        .route("/login", post(admin_handler::admin_login));

    Router::new()
        .route("/", get(handlers::index_page))
        // API Documentation
        .route("/docs", get(handlers::serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(handlers::serve_openapi_spec))
        // Search and lookup
        .route("/api/stats", get(handlers::stats))
        .route("/api/ultra-search", get(handlers::ultra_search))
        .route("/api/search/profiles", get(handlers::search_profiles))
        .route("/api/cedula/:cedula", get(handlers::cedula_lookup))
        .nest("/api/admin", admin)
        .layer(
            ServiceBuilder::new()
                // Json extractors default to 2MB; raise them to the same cap
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
}

/// Attaches state plus tracing and CORS layers.
pub fn finish(router: Router<Arc<AppState>>, state: Arc<AppState>) -> Router {
    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Full application without rate limiting, as used by the router tests.
pub fn app(state: Arc<AppState>) -> Router {
    let api = api_routes(state.clone());
    finish(health_routes().merge(api), state)
}
