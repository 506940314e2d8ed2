use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Statements creating the document store. Each one is idempotent so startup
/// can run them unconditionally.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS registry",
    r#"
    CREATE TABLE IF NOT EXISTS registry.documents (
        id          UUID PRIMARY KEY,
        seq         BIGSERIAL NOT NULL,
        collection  TEXT NOT NULL,
        data        JSONB NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ
    )
    "#,
    // created_at is the transaction time, shared by a whole insert batch;
    // seq breaks ties in insertion order
    "ALTER TABLE registry.documents ADD COLUMN IF NOT EXISTS seq BIGSERIAL NOT NULL",
    "CREATE INDEX IF NOT EXISTS documents_collection_seq_idx ON registry.documents (collection, created_at, seq)",
    "CREATE INDEX IF NOT EXISTS documents_cedula_idx ON registry.documents ((data->>'cedula'))",
    "CREATE INDEX IF NOT EXISTS documents_fuente_idx ON registry.documents ((data->>'fuente'))",
    r#"
    CREATE TABLE IF NOT EXISTS registry.ingest_runs (
        task_id            UUID PRIMARY KEY,
        collection         TEXT NOT NULL,
        fuente             TEXT NOT NULL,
        status             TEXT NOT NULL,
        records_received   BIGINT NOT NULL DEFAULT 0,
        records_inserted   BIGINT NOT NULL DEFAULT 0,
        records_rejected   BIGINT NOT NULL DEFAULT 0,
        records_duplicate  BIGINT NOT NULL DEFAULT 0,
        error_message      TEXT,
        created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
        started_at         TIMESTAMPTZ,
        completed_at       TIMESTAMPTZ
    )
    "#,
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        ensure_schema(&pool).await?;

        Ok(Self { pool })
    }
}

/// Creates the `registry` schema, document table, and ingest run table.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("registry schema verified");
    Ok(())
}
