/// Startup recovery of import runs, against a real Postgres.
/// Kept in its own test binary: it rewrites every unfinished run, so it must
/// not share a process with tests that start imports. Set TEST_DATABASE_URL
/// to run.
use rust_datatico_api::db::Database;
use rust_datatico_api::db_storage::DocumentStore;
use rust_datatico_api::models::{ImportTask, TaskStatus};
use std::env;

#[tokio::test]
#[ignore]
async fn unfinished_runs_fail_on_startup() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL to run this test"))?;
    let db = Database::new(&db_url).await?;
    let store = DocumentStore::new(db.pool.clone());

    let pending = ImportTask::pending("personas_fisicas", "prueba reinicio", 10);
    let mut running = ImportTask::pending("personas_fisicas", "prueba reinicio", 10);
    running.status = TaskStatus::InProgress;
    running.started_at = Some(chrono::Utc::now());
    store.save_ingest_run(&pending).await?;
    store.save_ingest_run(&running).await?;

    let failed = store.fail_interrupted_runs().await?;
    assert!(failed >= 2);

    for task_id in [pending.task_id, running.task_id] {
        let run = store
            .load_ingest_run(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("run {} not found", task_id))?;
        assert_eq!(run.status, TaskStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("interrupted by restart"));
        assert!(run.completed_at.is_some());
    }

    // Nothing is left to recover on a second pass
    assert_eq!(store.fail_interrupted_runs().await?, 0);

    sqlx::query("DELETE FROM registry.ingest_runs WHERE fuente = 'prueba reinicio'")
        .execute(store.pool())
        .await?;
    Ok(())
}
