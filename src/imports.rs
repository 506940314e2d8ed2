//! Background import jobs.
//!
//! An import is accepted immediately and runs on its own tokio task. Its
//! progress lives in a moka cache for fast polling and is written to
//! `registry.ingest_runs` at start, after every batch, and at the end, so
//! status survives a restart.
use crate::db_storage::{validate_identifier, DocumentStore, INSERT_BATCH_SIZE};
use crate::errors::AppError;
use crate::models::{ImportRequest, ImportTask, InsertReport, TaskStatus};
use chrono::Utc;
use moka::future::Cache;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_RECORDS_PER_IMPORT: usize = 100_000;

#[derive(Clone)]
pub struct ImportManager {
    store: DocumentStore,
    tasks: Cache<Uuid, ImportTask>,
}

impl ImportManager {
    pub fn new(store: DocumentStore) -> Self {
        Self {
            store,
            tasks: Cache::builder()
                .time_to_live(Duration::from_secs(86_400))
                .max_capacity(1_000)
                .build(),
        }
    }

    /// Validates the request, records a pending task, and spawns the import.
    pub async fn start(&self, request: ImportRequest) -> Result<ImportTask, AppError> {
        validate_identifier("collection", &request.collection)?;
        let fuente = request.fuente.trim().to_string();
        if fuente.is_empty() {
            return Err(AppError::BadRequest(
                "fuente (record source) is required".to_string(),
            ));
        }
        if request.records.is_empty() {
            return Err(AppError::BadRequest("records cannot be empty".to_string()));
        }
        if request.records.len() > MAX_RECORDS_PER_IMPORT {
            return Err(AppError::BadRequest(format!(
                "at most {} records per import",
                MAX_RECORDS_PER_IMPORT
            )));
        }

        let task = ImportTask::pending(&request.collection, &fuente, request.records.len());
        self.store.save_ingest_run(&task).await?;
        self.tasks.insert(task.task_id, task.clone()).await;

        tracing::info!(
            "Import task {} queued: {} records into {} (fuente={})",
            task.task_id,
            task.records_received,
            task.collection,
            task.fuente
        );

        let manager = self.clone();
        let queued = task.clone();
        tokio::spawn(async move {
            manager.run(queued, request.records).await;
        });

        Ok(task)
    }

    async fn run(&self, mut task: ImportTask, records: Vec<Value>) {
        task.status = TaskStatus::InProgress;
        task.started_at = Some(Utc::now());
        self.publish(&task).await;

        let total = records.len().max(1);
        let mut report = InsertReport::default();
        let mut failure: Option<String> = None;

        let mut remaining = records.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<Value> = remaining.by_ref().take(INSERT_BATCH_SIZE).collect();
            match self
                .store
                .insert_documents(&task.collection, batch, &task.fuente)
                .await
            {
                Ok(batch_report) => report.absorb(batch_report),
                Err(e) => {
                    tracing::error!("Import task {} failed: {}", task.task_id, e);
                    failure = Some(e.to_string());
                    break;
                }
            }

            task.records_inserted = report.inserted as i64;
            task.records_rejected = report.rejected as i64;
            task.records_duplicate = report.duplicates as i64;
            task.progress_percentage = (report.received as f64 / total as f64) * 100.0;
            self.publish(&task).await;
        }

        task.completed_at = Some(Utc::now());
        match failure {
            Some(message) => {
                task.status = TaskStatus::Failed;
                task.error_message = Some(message);
            }
            None => {
                task.status = TaskStatus::Completed;
                task.progress_percentage = 100.0;
            }
        }
        self.publish(&task).await;

        tracing::info!(
            "Import task {} {}: inserted={}, rejected={}, duplicates={}",
            task.task_id,
            task.status.as_str(),
            task.records_inserted,
            task.records_rejected,
            task.records_duplicate
        );
    }

    /// Updates the cache and persists the run; a failed write is logged only,
    /// the cached copy still answers status requests.
    async fn publish(&self, task: &ImportTask) {
        self.tasks.insert(task.task_id, task.clone()).await;
        if let Err(e) = self.store.save_ingest_run(task).await {
            tracing::warn!("Could not persist import task {}: {}", task.task_id, e);
        }
    }

    pub async fn status(&self, task_id: Uuid) -> Result<Option<ImportTask>, AppError> {
        if let Some(task) = self.tasks.get(&task_id).await {
            return Ok(Some(task));
        }
        self.store.load_ingest_run(task_id).await
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ImportTask>, AppError> {
        self.store.recent_ingest_runs(limit).await
    }
}
