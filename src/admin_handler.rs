//! Admin endpoints: login, import jobs, and collection maintenance.
//!
//! Every route except login sits behind `require_admin`, which expects an
//! `Authorization: Bearer <token>` header carrying a token issued by
//! `admin_login`.
use crate::errors::AppError;
use crate::handlers::{AppState, ADMIN_TOKEN_TTL};
use crate::models::*;
use crate::services::build_address;
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

const EXPORT_PAGE_SIZE: i64 = 1_000;
const RECENT_IMPORTS: i64 = 50;

/// Compares two secrets through their SHA-256 digests so the comparison
/// time does not depend on where the inputs differ.
fn secrets_match(given: &str, expected: &str) -> bool {
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// POST /api/admin/login
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdminLoginRequest>,
) -> Result<Json<AdminLoginResponse>, AppError> {
    let user_ok = secrets_match(&payload.username, &state.config.admin_username);
    let pass_ok = secrets_match(&payload.password, &state.config.admin_password);
    if !(user_ok && pass_ok) {
        return Err(AppError::Unauthorized("Invalid admin credentials".to_string()));
    }

    let token = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    state
        .admin_tokens
        .insert(token.clone(), payload.username.clone())
        .await;

    tracing::info!("Admin '{}' logged in", payload.username);

    Ok(Json(AdminLoginResponse {
        success: true,
        token,
        expires_in_secs: ADMIN_TOKEN_TTL.as_secs(),
    }))
}

/// Rejects requests without a live admin bearer token.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let Some(admin) = state.admin_tokens.get(token).await else {
        return Err(AppError::Unauthorized("Invalid or expired token".to_string()));
    };

    tracing::debug!("Admin request by '{}': {}", admin, request.uri().path());
    Ok(next.run(request).await)
}

/// POST /api/admin/imports
///
/// Answers 202 right away; the import continues in the background.
pub async fn start_import(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportAccepted>), AppError> {
    let task = state.imports.start(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ImportAccepted {
            task_id: task.task_id,
            records_queued: task.records_received as usize,
            message: format!(
                "Import into {} started. Poll /api/admin/imports/{} for progress.",
                task.collection, task.task_id
            ),
        }),
    ))
}

/// GET /api/admin/imports/:task_id
pub async fn import_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ImportTask>, AppError> {
    state
        .imports
        .status(task_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Import task {} not found", task_id)))
}

/// GET /api/admin/imports
pub async fn list_imports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImportTask>>, AppError> {
    Ok(Json(state.imports.recent(RECENT_IMPORTS).await?))
}

/// POST /api/admin/collections/:collection/records
///
/// Synchronous insert for small batches.
pub async fn insert_records(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(payload): Json<InsertRequest>,
) -> Result<Json<InsertReport>, AppError> {
    if payload.records.len() > crate::db_storage::INSERT_BATCH_SIZE * 10 {
        return Err(AppError::BadRequest(
            "Too many records for a synchronous insert; use /api/admin/imports".to_string(),
        ));
    }
    let report = state
        .store
        .insert_documents(&collection, payload.records, &payload.fuente)
        .await?;
    Ok(Json(report))
}

/// POST /api/admin/collections/:collection/dedup
pub async fn dedup_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(payload): Json<DedupRequest>,
) -> Result<Json<DedupReport>, AppError> {
    let report = state
        .store
        .deduplicate(&collection, &payload.field, payload.dry_run)
        .await?;
    Ok(Json(report))
}

/// POST /api/admin/collections/:collection/unique-index
pub async fn create_unique_index(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(payload): Json<UniqueIndexRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let index = state
        .store
        .ensure_unique_index(&collection, &payload.field)
        .await?;
    Ok(Json(json!({
        "collection": collection,
        "field": payload.field,
        "index": index
    })))
}

/// PATCH /api/admin/records/:collection/:id
pub async fn enrich_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, Uuid)>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let doc = state.store.enrich(&collection, id, &patch).await?;
    Ok(Json(doc.to_export_value()))
}

/// POST /api/admin/records/:collection/enrich-by-key
pub async fn enrich_by_key(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
    Json(payload): Json<EnrichByKeyRequest>,
) -> Result<Json<EnrichByKeyResponse>, AppError> {
    let matched = state
        .store
        .enrich_by_key(&collection, &payload.field, &payload.value, &payload.patch)
        .await?;
    Ok(Json(EnrichByKeyResponse {
        collection,
        field: payload.field,
        matched,
    }))
}

/// GET /api/admin/collections/:collection/export
///
/// Newline-delimited JSON, one document per line with its `_id`.
pub async fn export_collection(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> Result<Response, AppError> {
    let mut body = String::new();
    let mut after: Option<Uuid> = None;
    let mut exported = 0usize;

    loop {
        let page = state
            .store
            .export_page(&collection, after, EXPORT_PAGE_SIZE)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        for doc in &page {
            let line = serde_json::to_string(&doc.to_export_value())
                .map_err(|e| AppError::InternalError(format!("Failed to encode document: {}", e)))?;
            body.push_str(&line);
            body.push('\n');
        }
        exported += page.len();

        if (page.len() as i64) < EXPORT_PAGE_SIZE {
            break;
        }
    }

    tracing::info!("Exported {} documents from {}", exported, collection);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/x-ndjson".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.ndjson\"", collection),
            ),
        ],
        Body::from(body),
    )
        .into_response())
}

/// POST /api/admin/records/:collection/:id/geocode
///
/// Geocodes the record's address and stores the result under `ubicacion`.
pub async fn geocode_record(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let geocoder = state.geocoder.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("GOOGLE_MAPS_API_KEY is not configured".to_string())
    })?;

    let doc = state
        .store
        .get_document(&collection, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {} not found in {}", id, collection)))?;

    let address = build_address(&doc.data)
        .ok_or_else(|| AppError::NotFound(format!("Document {} has no address fields", id)))?;

    let location = geocoder
        .geocode(&address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No geocoding result for '{}'", address)))?;

    let patch = json!({
        "ubicacion": {
            "lat": location.lat,
            "lng": location.lng,
            "direccion_formateada": location.formatted_address,
            "geocodificado_en": chrono::Utc::now()
        }
    });
    let updated = state.store.enrich(&collection, id, &patch).await?;
    Ok(Json(updated.to_export_value()))
}
