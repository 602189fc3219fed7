//! Seeder Service - Loads the business knowledge base into Qdrant
//!
//! Responsibilities:
//! - Read business definitions, table DDL and validated queries from config
//! - Embed each entry with an OpenAI-compatible embeddings API
//! - Create (or recreate) the vector collection
//! - Upsert every embedded entry with a stable point id
//! - Verify the point count and run a test search
//!
//! Usage:
//!   cargo run --bin seeder -- --config config/knowledge.json
//!
//!   # Start over:
//!   cargo run --bin seeder -- --recreate
//!
//!   # Only the validated queries, without writing:
//!   cargo run --bin seeder -- --kind question-sql --dry-run

mod embeddings;
mod error;
mod knowledge;
mod qdrant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::embeddings::Embedder;
use crate::knowledge::{Entry, EntryKind};
use crate::qdrant::{Point, QdrantClient};

#[derive(Parser, Debug)]
#[command(name = "seeder", about = "Seeds the business knowledge base into Qdrant")]
struct Args {
    /// Path to the knowledge base file
    #[arg(long, default_value = "config/knowledge.json")]
    config: PathBuf,

    /// Collection name (defaults to QDRANT_COLLECTION)
    #[arg(long)]
    collection: Option<String>,

    /// Drop and recreate the collection before seeding
    #[arg(long, default_value = "false")]
    recreate: bool,

    /// Only seed entries of this kind
    #[arg(long, value_enum)]
    kind: Option<EntryKind>,

    /// Dry run - list entries, don't call any API
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Query used for the post-seed test search
    #[arg(long, default_value = "Perfect Orders")]
    verify_query: String,

    /// Skip the post-seed verification
    #[arg(long, default_value = "false")]
    skip_verify: bool,
}

#[derive(Debug, Clone)]
struct Config {
    qdrant_url: String,
    qdrant_api_key: Option<String>,
    openai_api_key: String,
    openai_base_url: String,
    embed_model: String,
    embed_dim: usize,
    collection: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        Ok(Self {
            qdrant_url: std::env::var("QDRANT_URL").context("QDRANT_URL env var missing")?,
            qdrant_api_key: std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY env var missing")?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            embed_model: std::env::var("EMBED_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            embed_dim: std::env::var("EMBED_DIM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1536),
            collection: std::env::var("QDRANT_COLLECTION")
                .unwrap_or_else(|_| "rappi_business_context".to_string()),
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_entries(entries: &[&Entry]) {
    for kind in [EntryKind::Documentation, EntryKind::QuestionSql, EntryKind::Ddl] {
        let count = entries.iter().filter(|e| e.kind() == kind).count();
        println!("  {}: {}", kind.as_str(), count);
    }
}

/// Embed every entry; failures are reported and skipped
async fn embed_entries(
    embedder: &Embedder,
    entries: &[&Entry],
    seeded_at: &str,
) -> (Vec<Point>, usize) {
    let mut points = Vec::with_capacity(entries.len());
    let mut failed = 0;

    for (i, entry) in entries.iter().enumerate() {
        let text = entry.embedding_text();
        match embedder.embed(&text).await {
            Ok(vector) => {
                println!(
                    "  [{}/{}] ✓ {}: {}",
                    i + 1,
                    entries.len(),
                    entry.kind().as_str(),
                    entry.label()
                );
                points.push(Point {
                    id: entry.point_id(),
                    vector,
                    payload: entry.payload(seeded_at),
                });
            }
            Err(e) => {
                failed += 1;
                println!("  [{}/{}] ✗ {}: {}", i + 1, entries.len(), entry.label(), e);
            }
        }
    }

    (points, failed)
}

async fn verify(qdrant: &QdrantClient, embedder: &Embedder, collection: &str, query: &str) {
    println!("\n=== Verification ===");
    match qdrant.collection_info(collection).await {
        Ok(Some(info)) => println!(
            "  Points in {}: {} (status {})",
            collection,
            info.points_count.unwrap_or(0),
            info.status.as_deref().unwrap_or("unknown")
        ),
        Ok(None) => warn!("collection {} not found", collection),
        Err(e) => warn!("could not read collection info: {}", e),
    }

    let vector = match embedder.embed(query).await {
        Ok(v) => v,
        Err(e) => {
            warn!("could not embed test query: {}", e);
            return;
        }
    };

    match qdrant.search(collection, &vector, 3).await {
        Ok(found) => {
            println!("  Test search '{}':", query);
            for point in found {
                let id = point.id_text();
                let payload = point.payload.unwrap_or_default();
                let kind = payload["type"].as_str().unwrap_or("?");
                let title = ["title", "question", "table_name"]
                    .iter()
                    .find_map(|key| payload[*key].as_str())
                    .unwrap_or("N/A");
                println!("    {} [{}] (score: {:.3}, id {})", title, kind, point.score, id);
            }
        }
        Err(e) => warn!("test search failed: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let started = Utc::now();

    println!("=== Knowledge Base Seeding ===");
    println!("Started: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));

    let kb = knowledge::load_knowledge(&args.config).await?;
    let entries: Vec<&Entry> = kb
        .entries
        .iter()
        .filter(|e| args.kind.map_or(true, |k| e.kind() == k))
        .collect();

    println!("Knowledge base v{}: {} entries selected", kb.version, entries.len());
    print_entries(&entries);

    if args.dry_run {
        for entry in &entries {
            println!("  - [{}] {} ({})", entry.kind().as_str(), entry.label(), entry.point_id());
        }
        println!("\nDry run - nothing embedded or stored");
        return Ok(());
    }

    let config = Config::from_env()?;
    let collection = args.collection.clone().unwrap_or_else(|| config.collection.clone());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent("RappiInsights-Seeder/1.0")
        .build()?;

    let qdrant = QdrantClient::new(
        client.clone(),
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
    );
    let embedder = Embedder::new(
        client,
        &config.openai_base_url,
        config.openai_api_key.clone(),
        config.embed_model.clone(),
        config.embed_dim,
    );
    info!("Embedding with {} ({} dims)", embedder.model(), config.embed_dim);

    qdrant
        .ensure_collection(&collection, config.embed_dim, args.recreate)
        .await
        .context("Failed to prepare collection")?;

    println!("\nEmbedding {} entries...", entries.len());
    let seeded_at = started.to_rfc3339();
    let (points, failed) = embed_entries(&embedder, &entries, &seeded_at).await;

    if points.is_empty() {
        anyhow::bail!("No entries were embedded; nothing to store");
    }

    qdrant
        .upsert(&collection, &points)
        .await
        .context("Failed to upsert points")?;
    println!("\nStored {} points in {}", points.len(), collection);

    if !args.skip_verify {
        verify(&qdrant, &embedder, &collection, &args.verify_query).await;
    }

    let elapsed = Utc::now() - started;
    println!("\n=== Seeding Complete ===");
    println!("  Seeded: {}", points.len());
    println!("  Failed: {}", failed);
    println!("Elapsed: {}s", elapsed.num_seconds());

    if failed > 0 {
        anyhow::bail!("{} entries failed to embed", failed);
    }

    Ok(())
}
