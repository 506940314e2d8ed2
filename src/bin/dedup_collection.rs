//! Removes duplicate documents from a collection, keeping the earliest
//! document for every value of `--field`. Optionally adds a unique index
//! afterwards so new duplicates are refused at insert time.

use clap::Parser;
use rust_datatico_api::db::Database;
use rust_datatico_api::db_storage::DocumentStore;
use rust_datatico_api::obs;

#[derive(Parser, Debug)]
#[command(name = "dedup_collection", about = "Deduplicate a collection by one field")]
struct Args {
    #[arg(long)]
    collection: String,

    /// Field whose value identifies a record, e.g. cedula
    #[arg(long, default_value = "cedula")]
    field: String,

    /// Report what would be removed without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Create a unique index on the field after deduplicating
    #[arg(long)]
    unique_index: bool,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    obs::init_tracing("dedup_collection=info,rust_datatico_api=info");

    let args = Args::parse();
    let db = Database::new(&args.database_url).await?;
    let store = DocumentStore::new(db.pool.clone());

    let report = store
        .deduplicate(&args.collection, &args.field, args.dry_run)
        .await?;

    tracing::info!(
        "{}: {} duplicate groups on '{}', {} documents {}",
        report.collection,
        report.duplicate_groups,
        report.field,
        report.documents_removed,
        if report.dry_run { "would be removed" } else { "removed" }
    );

    if args.unique_index {
        if args.dry_run {
            tracing::warn!("--unique-index ignored with --dry-run");
        } else {
            let index = store
                .ensure_unique_index(&args.collection, &args.field)
                .await?;
            tracing::info!("Unique index {} in place", index);
        }
    }

    Ok(())
}
