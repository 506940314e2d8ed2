//! Loads a newline-delimited JSON file into a collection.
//!
//! Every record is labelled with the given `--fuente`. Lines that are not
//! JSON objects are counted as rejected and reported at the end.

use clap::Parser;
use rust_datatico_api::db::Database;
use rust_datatico_api::db_storage::{DocumentStore, INSERT_BATCH_SIZE};
use rust_datatico_api::models::InsertReport;
use rust_datatico_api::obs;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "import_jsonl", about = "Import NDJSON records into a collection")]
struct Args {
    /// Target collection, e.g. personas_fisicas
    #[arg(long)]
    collection: String,

    /// Source label stored on every record
    #[arg(long)]
    fuente: String,

    /// Path to the .jsonl / .ndjson file
    #[arg(long)]
    file: PathBuf,

    /// Records per insert transaction
    #[arg(long, default_value_t = INSERT_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    obs::init_tracing("import_jsonl=info,rust_datatico_api=info");

    let args = Args::parse();
    if args.batch_size == 0 {
        anyhow::bail!("--batch-size must be greater than zero");
    }

    let db = Database::new(&args.database_url).await?;
    let store = DocumentStore::new(db.pool.clone());

    let file = tokio::fs::File::open(&args.file).await?;
    let mut lines = BufReader::new(file).lines();

    let mut report = InsertReport::default();
    let mut batch: Vec<Value> = Vec::with_capacity(args.batch_size);
    let mut line_no = 0usize;

    tracing::info!(
        "Importing {} into {} (fuente={})",
        args.file.display(),
        args.collection,
        args.fuente
    );

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => batch.push(value),
            Ok(_) => {
                report.received += 1;
                report.reject(format!("line {}: not a JSON object", line_no));
            }
            Err(e) => {
                report.received += 1;
                report.reject(format!("line {}: {}", line_no, e));
            }
        }

        if batch.len() >= args.batch_size {
            let chunk = std::mem::take(&mut batch);
            report.absorb(
                store
                    .insert_documents(&args.collection, chunk, &args.fuente)
                    .await?,
            );
            tracing::info!(
                "Progress: {} lines read, {} inserted",
                line_no,
                report.inserted
            );
        }
    }

    if !batch.is_empty() {
        report.absorb(
            store
                .insert_documents(&args.collection, batch, &args.fuente)
                .await?,
        );
    }

    tracing::info!(
        "Import complete: received={}, inserted={}, duplicates={}, rejected={}",
        report.received,
        report.inserted,
        report.duplicates,
        report.rejected
    );
    for reason in &report.rejections {
        tracing::warn!("Rejected: {}", reason);
    }

    Ok(())
}
