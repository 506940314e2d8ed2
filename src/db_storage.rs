use crate::errors::{AppError, ResultExt};
use crate::models::{
    CollectionCount, DedupReport, ImportTask, IngestRunRow, InsertReport, SourceCount,
    StoredDocument,
};
use crate::normalization::{is_valid_email, normalize_cedula, validate_cr_phone};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// Fields that hold an identification number in one source or another.
pub const CEDULA_FIELDS: &[&str] = &["cedula", "cedula_juridica", "numero_cedula"];

/// Rows written per transaction when inserting documents.
pub const INSERT_BATCH_SIZE: usize = 500;

/// Collection and field names end up inside SQL text (index names, JSON
/// paths), so they are restricted to lowercase identifiers.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= 63
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub fn validate_identifier(kind: &str, name: &str) -> Result<(), AppError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid {} name '{}': use lowercase letters, digits and underscores",
            kind, name
        )))
    }
}

/// Cleans a raw record before it is stored.
///
/// Cedula fields are normalized, a valid phone becomes E.164, an invalid
/// email is dropped, and the caller's source label is recorded in `fuente`.
/// A source label already present in the record is kept as `fuente_original`.
pub fn prepare_document(record: Value, fuente: &str, now: DateTime<Utc>) -> Result<Value, String> {
    let mut map: Map<String, Value> = match record {
        Value::Object(map) => map,
        other => {
            return Err(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))
        }
    };

    map.remove("_id");
    if map.is_empty() {
        return Err("record has no fields".to_string());
    }

    for field in CEDULA_FIELDS {
        let normalized = match map.get(*field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(normalize_cedula(s)),
            Some(Value::Number(n)) => Some(normalize_cedula(&n.to_string())),
            _ => None,
        };
        if let Some(cedula) = normalized {
            map.insert(field.to_string(), Value::String(cedula));
        }
    }

    if let Some(Value::String(phone)) = map.get("telefono") {
        let (valid, normalized) = validate_cr_phone(phone);
        if valid {
            map.insert("telefono".to_string(), Value::String(normalized));
        }
    }

    if let Some(Value::String(email)) = map.get("email") {
        if !is_valid_email(email.trim()) {
            tracing::debug!("Dropping invalid email '{}' from record", email);
            map.remove("email");
        }
    }

    match map.get("fuente") {
        Some(Value::String(existing)) if existing != fuente => {
            let existing = existing.clone();
            map.insert("fuente_original".to_string(), Value::String(existing));
        }
        _ => {}
    }
    map.insert("fuente".to_string(), Value::String(fuente.to_string()));

    if !map.contains_key("created_at") {
        map.insert("created_at".to_string(), Value::String(now.to_rfc3339()));
    }

    Ok(Value::Object(map))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn ensure_patch_object(patch: &Value) -> Result<(), AppError> {
    match patch {
        Value::Object(map) if !map.is_empty() => Ok(()),
        Value::Object(_) => Err(AppError::BadRequest("patch has no fields".to_string())),
        _ => Err(AppError::BadRequest("patch must be a JSON object".to_string())),
    }
}

/// `OR` of exact digit-only matches of every cedula field against `$param`.
fn cedula_digits_predicate(param: usize) -> String {
    CEDULA_FIELDS
        .iter()
        .map(|field| {
            format!(
                "regexp_replace(COALESCE(data->>'{}', ''), '[^0-9]', '', 'g') = ${}",
                field, param
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Bounded, collision-free name of the unique index on `collection`.`field`.
///
/// Postgres truncates identifiers past 63 bytes, so the name is a digest
/// rather than the concatenated inputs.
pub fn unique_index_name(collection: &str, field: &str) -> String {
    let digest = Sha256::digest(format!("{}.{}", collection, field).as_bytes());
    format!("documents_uniq_{}", &hex::encode(digest)[..16])
}

/// Storage operations over `registry.documents` and `registry.ingest_runs`.
#[derive(Clone)]
pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("database ping")?;
        Ok(())
    }

    /// Insert records into a collection, all labelled with `fuente`.
    ///
    /// Records that cannot be stored are counted as rejected rather than
    /// failing the whole call. Rows hitting a unique index are counted as
    /// duplicates.
    pub async fn insert_documents(
        &self,
        collection: &str,
        records: Vec<Value>,
        fuente: &str,
    ) -> Result<InsertReport, AppError> {
        validate_identifier("collection", collection)?;
        let fuente = fuente.trim();
        if fuente.is_empty() {
            return Err(AppError::BadRequest(
                "fuente (record source) is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut report = InsertReport {
            received: records.len(),
            ..Default::default()
        };

        let mut prepared = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            match prepare_document(record, fuente, now) {
                Ok(doc) => prepared.push(doc),
                Err(reason) => report.reject(format!("record {}: {}", idx, reason)),
            }
        }

        for batch in prepared.chunks(INSERT_BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for doc in batch {
                let result = sqlx::query(
                    r#"
                    INSERT INTO registry.documents (id, collection, data)
                    VALUES ($1, $2, $3)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(collection)
                .bind(doc)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("inserting into {}", collection))?;

                if result.rows_affected() == 0 {
                    report.duplicates += 1;
                } else {
                    report.inserted += 1;
                }
            }
            tx.commit().await?;
        }

        tracing::info!(
            "Inserted {} documents into {} (fuente={}, rejected={}, duplicates={})",
            report.inserted,
            collection,
            fuente,
            report.rejected,
            report.duplicates
        );

        Ok(report)
    }

    pub async fn get_document(
        &self,
        collection: &str,
        id: Uuid,
    ) -> Result<Option<StoredDocument>, AppError> {
        let doc = sqlx::query_as::<_, StoredDocument>(
            "SELECT id, collection, data, created_at, updated_at FROM registry.documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Shallow `$set` merge of `patch` into one document.
    pub async fn enrich(
        &self,
        collection: &str,
        id: Uuid,
        patch: &Value,
    ) -> Result<StoredDocument, AppError> {
        validate_identifier("collection", collection)?;
        ensure_patch_object(patch)?;

        sqlx::query_as::<_, StoredDocument>(
            r#"
            UPDATE registry.documents
            SET data = data || $3,
                updated_at = now()
            WHERE collection = $1 AND id = $2
            RETURNING id, collection, data, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {} not found in {}", id, collection)))
    }

    /// Shallow merge of `patch` into every document whose `field` equals `value`.
    pub async fn enrich_by_key(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        patch: &Value,
    ) -> Result<u64, AppError> {
        validate_identifier("collection", collection)?;
        validate_identifier("field", field)?;
        ensure_patch_object(patch)?;

        let result = sqlx::query(
            r#"
            UPDATE registry.documents
            SET data = data || $4,
                updated_at = now()
            WHERE collection = $1 AND data->>$2 = $3
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .bind(patch)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Enriched {} documents in {} where {} = {}",
            result.rows_affected(),
            collection,
            field,
            value
        );
        Ok(result.rows_affected())
    }

    /// Creates a partial unique index on `data->>field` for one collection.
    /// Blank values are left out of the index, matching `deduplicate`.
    /// Fails with 400 when duplicates already exist.
    pub async fn ensure_unique_index(
        &self,
        collection: &str,
        field: &str,
    ) -> Result<String, AppError> {
        validate_identifier("collection", collection)?;
        validate_identifier("field", field)?;

        let index_name = unique_index_name(collection, field);
        let statement = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON registry.documents ((data->>'{}')) WHERE collection = '{}' AND btrim(data->>'{}') <> ''",
            index_name, field, collection, field
        );

        match sqlx::query(&statement).execute(&self.pool).await {
            Ok(_) => {
                tracing::info!("Unique index {} ensured", index_name);
                Ok(index_name)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                Err(AppError::BadRequest(format!(
                    "{} has duplicate values for '{}'; deduplicate before adding a unique index",
                    collection, field
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Keeps the first inserted document of every group sharing `field` and
    /// removes the rest. Documents where the field is missing or blank are
    /// never touched.
    pub async fn deduplicate(
        &self,
        collection: &str,
        field: &str,
        dry_run: bool,
    ) -> Result<DedupReport, AppError> {
        validate_identifier("collection", collection)?;
        validate_identifier("field", field)?;

        let mut tx = self.pool.begin().await?;

        let (duplicate_groups, extra_documents): (i64, i64) = sqlx::query_as(
            r#"
            WITH ranked AS (
                SELECT id,
                       ROW_NUMBER() OVER (PARTITION BY data->>$2 ORDER BY created_at, seq) AS rn,
                       COUNT(*) OVER (PARTITION BY data->>$2) AS group_size
                FROM registry.documents
                WHERE collection = $1 AND NULLIF(btrim(data->>$2), '') IS NOT NULL
            )
            SELECT COUNT(*) FILTER (WHERE rn = 1 AND group_size > 1),
                   COUNT(*) FILTER (WHERE rn > 1)
            FROM ranked
            "#,
        )
        .bind(collection)
        .bind(field)
        .fetch_one(&mut *tx)
        .await
        .context("counting duplicate groups")?;

        let documents_removed = if dry_run || extra_documents == 0 {
            0
        } else {
            let result = sqlx::query(
                r#"
                WITH ranked AS (
                    SELECT id,
                           ROW_NUMBER() OVER (PARTITION BY data->>$2 ORDER BY created_at, seq) AS rn
                    FROM registry.documents
                    WHERE collection = $1 AND NULLIF(btrim(data->>$2), '') IS NOT NULL
                )
                DELETE FROM registry.documents
                WHERE id IN (SELECT id FROM ranked WHERE rn > 1)
                "#,
            )
            .bind(collection)
            .bind(field)
            .execute(&mut *tx)
            .await
            .context("removing duplicates")?;
            result.rows_affected() as i64
        };

        tx.commit().await?;

        tracing::info!(
            "Dedup {}.{}: {} groups, {} removed (dry_run={})",
            collection,
            field,
            duplicate_groups,
            documents_removed,
            dry_run
        );

        Ok(DedupReport {
            collection: collection.to_string(),
            field: field.to_string(),
            duplicate_groups,
            documents_removed: if dry_run { extra_documents } else { documents_removed },
            dry_run,
        })
    }

    /// One page of a collection ordered by id, starting after `after`.
    pub async fn export_page(
        &self,
        collection: &str,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<StoredDocument>, AppError> {
        validate_identifier("collection", collection)?;
        let docs = sqlx::query_as::<_, StoredDocument>(
            r#"
            SELECT id, collection, data, created_at, updated_at
            FROM registry.documents
            WHERE collection = $1 AND ($2::uuid IS NULL OR id > $2)
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(collection)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    pub async fn count_collection(&self, collection: &str) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM registry.documents WHERE collection = $1")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn collection_counts(&self) -> Result<Vec<CollectionCount>, AppError> {
        let counts = sqlx::query_as::<_, CollectionCount>(
            "SELECT collection, COUNT(*) AS count FROM registry.documents GROUP BY collection ORDER BY collection",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    pub async fn source_counts(&self) -> Result<Vec<SourceCount>, AppError> {
        let counts = sqlx::query_as::<_, SourceCount>(
            r#"
            SELECT COALESCE(data->>'fuente', 'desconocida') AS fuente, COUNT(*) AS count
            FROM registry.documents
            GROUP BY 1
            ORDER BY count DESC, fuente
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }

    /// Documents in `collections` where any cedula field, compared digit by
    /// digit, equals `digits`.
    pub async fn find_by_cedula_digits(
        &self,
        collections: &[String],
        digits: &str,
        limit: i64,
    ) -> Result<Vec<StoredDocument>, AppError> {
        let sql = format!(
            r#"
            SELECT id, collection, data, created_at, updated_at
            FROM registry.documents
            WHERE collection = ANY($1) AND ({})
            ORDER BY array_position($1, collection), created_at, seq
            LIMIT $3
            "#,
            cedula_digits_predicate(2)
        );
        let docs = sqlx::query_as::<_, StoredDocument>(&sql)
            .bind(collections)
            .bind(digits)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(docs)
    }

    // ============ Ingest runs ============

    pub async fn save_ingest_run(&self, task: &ImportTask) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO registry.ingest_runs (
                task_id, collection, fuente, status, records_received, records_inserted,
                records_rejected, records_duplicate, error_message, created_at, started_at,
                completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (task_id) DO UPDATE
            SET status = EXCLUDED.status,
                records_inserted = EXCLUDED.records_inserted,
                records_rejected = EXCLUDED.records_rejected,
                records_duplicate = EXCLUDED.records_duplicate,
                error_message = EXCLUDED.error_message,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(task.task_id)
        .bind(&task.collection)
        .bind(&task.fuente)
        .bind(task.status.as_str())
        .bind(task.records_received)
        .bind(task.records_inserted)
        .bind(task.records_rejected)
        .bind(task.records_duplicate)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .context("saving ingest run")?;
        Ok(())
    }

    /// Marks runs left `pending` or `in_progress` by a previous process as
    /// failed. Their tokio tasks died with that process.
    pub async fn fail_interrupted_runs(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE registry.ingest_runs
            SET status = 'failed',
                error_message = 'interrupted by restart',
                completed_at = now()
            WHERE status IN ('pending', 'in_progress')
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failing interrupted ingest runs")?;

        if result.rows_affected() > 0 {
            tracing::warn!(
                "Marked {} interrupted import runs as failed",
                result.rows_affected()
            );
        }
        Ok(result.rows_affected())
    }

    pub async fn load_ingest_run(&self, task_id: Uuid) -> Result<Option<ImportTask>, AppError> {
        let row = sqlx::query_as::<_, IngestRunRow>(
            "SELECT * FROM registry.ingest_runs WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ImportTask::from))
    }

    pub async fn recent_ingest_runs(&self, limit: i64) -> Result<Vec<ImportTask>, AppError> {
        let rows = sqlx::query_as::<_, IngestRunRow>(
            "SELECT * FROM registry.ingest_runs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ImportTask::from).collect())
    }
}
