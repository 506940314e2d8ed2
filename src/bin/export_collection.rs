//! Writes every document of a collection as NDJSON, to a file or stdout.

use clap::Parser;
use rust_datatico_api::db::Database;
use rust_datatico_api::db_storage::DocumentStore;
use rust_datatico_api::obs;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "export_collection", about = "Export a collection as NDJSON")]
struct Args {
    #[arg(long)]
    collection: String,

    /// Output file; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    page_size: i64,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // stdout carries the NDJSON
    obs::init_tracing_stderr("export_collection=info,rust_datatico_api=info");

    let args = Args::parse();
    if args.page_size <= 0 {
        anyhow::bail!("--page-size must be positive");
    }

    let db = Database::new(&args.database_url).await?;
    let store = DocumentStore::new(db.pool.clone());

    let mut out: Box<dyn tokio::io::AsyncWrite + Unpin> = match &args.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await?),
        None => Box::new(tokio::io::stdout()),
    };

    let mut after: Option<Uuid> = None;
    let mut exported = 0usize;
    loop {
        let page = store
            .export_page(&args.collection, after, args.page_size)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        for doc in &page {
            let mut line = serde_json::to_vec(&doc.to_export_value())?;
            line.push(b'\n');
            out.write_all(&line).await?;
        }
        exported += page.len();

        if (page.len() as i64) < args.page_size {
            break;
        }
    }
    out.flush().await?;

    tracing::info!("Exported {} documents from {}", exported, args.collection);
    Ok(())
}
