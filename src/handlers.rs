use crate::circuit_breaker::create_db_circuit_breaker;
use crate::config::Config;
use crate::db_storage::DocumentStore;
use crate::errors::AppError;
use crate::imports::ImportManager;
use crate::models::*;
use crate::normalization::{cedula_digits, classify_cedula, detect_search_type, normalize_cedula};
use crate::profiles::fuse_profiles;
use crate::search::{tag_hit, validate_query, SearchService, TOTAL_LIMIT};
use crate::services::GeocodingService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use moka::future::Cache;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// How long an admin bearer token stays valid.
pub const ADMIN_TOKEN_TTL: Duration = Duration::from_secs(12 * 3600);

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Document store over `registry.documents`.
    pub store: DocumentStore,
    /// Multi-collection search with its result cache.
    pub search: SearchService,
    /// Background import jobs.
    pub imports: ImportManager,
    /// Google geocoding client, absent when no API key is configured.
    pub geocoder: Option<GeocodingService>,
    /// Issued admin tokens. Key: token, Value: admin username.
    pub admin_tokens: Cache<String, String>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let store = DocumentStore::new(db.clone());
        let search = SearchService::new(
            db.clone(),
            config.search_collections.clone(),
            Arc::new(create_db_circuit_breaker()),
        );
        let imports = ImportManager::new(store.clone());
        let geocoder = GeocodingService::from_config(&config);
        let admin_tokens = Cache::builder()
            .time_to_live(ADMIN_TOKEN_TTL)
            .max_capacity(1_000)
            .build();

        Self {
            db,
            config,
            store,
            search,
            imports,
            geocoder,
            admin_tokens,
        }
    }
}

/// Liveness probe. Does not touch the database.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-datatico-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/health
///
/// Pings the database and counts the primary collection. Answers 503 with
/// `database: disconnected` when the database cannot be reached.
pub async fn api_health(State(state): State<Arc<AppState>>) -> Response {
    let primary = state.config.primary_collection.clone();

    let count = match state.store.ping().await {
        Ok(()) => state.store.count_collection(&primary).await,
        Err(e) => Err(e),
    };

    match count {
        Ok(total_records) => Json(HealthResponse {
            status: "healthy".to_string(),
            database: "connected".to_string(),
            database_name: state.config.db_name.clone(),
            primary_collection: primary,
            total_records,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "database_name": state.config.db_name,
                    "error": "database unreachable"
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/stats
///
/// Real document counts per collection and per source label.
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, AppError> {
    let collections = state.store.collection_counts().await?;
    let sources = state.store.source_counts().await?;
    let total_records = collections.iter().map(|c| c.count).sum();

    Ok(Json(StatsResponse {
        total_records,
        collections,
        sources,
        generated_at: chrono::Utc::now(),
    }))
}

/// GET /api/ultra-search?q=
pub async fn ultra_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<SearchResponse>, AppError> {
    tracing::info!("GET /api/ultra-search - q: {:?}", params.q);
    let response = state.search.ultra_search(params.q.as_deref()).await?;
    Ok(Json(response))
}

/// GET /api/search/profiles?q=
///
/// Same search as ultra search, with hits merged per cedula.
pub async fn search_profiles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<ProfilesResponse>, AppError> {
    let query = validate_query(params.q.as_deref())?;
    let outcome = state.search.search_collections(&query).await;
    let profiles = fuse_profiles(&outcome.hits);

    tracing::info!(
        "Profile search '{}': {} records fused into {} profiles",
        query,
        outcome.hits.len(),
        profiles.len()
    );

    Ok(Json(ProfilesResponse {
        search_type: detect_search_type(&query),
        total_profiles: profiles.len(),
        total_raw_records: outcome.hits.len(),
        profiles,
        query,
        skipped_collections: outcome.skipped,
    }))
}

/// GET /api/cedula/:cedula
///
/// Exact cedula lookup across the searched collections, ignoring separators.
pub async fn cedula_lookup(
    State(state): State<Arc<AppState>>,
    Path(cedula): Path<String>,
) -> Result<Json<CedulaLookupResponse>, AppError> {
    let digits = cedula_digits(&cedula);
    if digits.len() < 9 {
        return Err(AppError::BadRequest(
            "A cedula needs at least 9 digits".to_string(),
        ));
    }

    let docs = state
        .store
        .find_by_cedula_digits(state.search.collections(), &digits, TOTAL_LIMIT as i64)
        .await?;

    if docs.is_empty() {
        return Err(AppError::NotFound(format!(
            "No records for cedula {}",
            normalize_cedula(&cedula)
        )));
    }

    let results: Vec<SearchHit> = docs
        .into_iter()
        .map(|doc| tag_hit(&doc.collection, doc.to_export_value()))
        .collect();

    Ok(Json(CedulaLookupResponse {
        cedula: normalize_cedula(&cedula),
        tipo_cedula: classify_cedula(&cedula),
        total_found: results.len(),
        results,
    }))
}

/// GET /
pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

/// Serves the OpenAPI specification YAML file from the working directory.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            "OpenAPI spec not found. Run the server from the repository root.",
        )
            .into_response(),
    }
}

/// Serves a Swagger UI page pointed at `serve_openapi_spec`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>DataTico API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}
