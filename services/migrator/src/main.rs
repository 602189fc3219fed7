//! Migrator Service - Loads spreadsheet metrics and order counts into Postgres
//!
//! Responsibilities:
//! - Locate the spreadsheet among a fixed list of candidate paths
//! - Read the metrics and orders sheets (xlsx/xls/ods via calamine, or CSV)
//! - Clean every cell with one shared null vocabulary
//! - Deduplicate by identity key, last row wins
//! - Upload in fixed-size batches, isolating failed batches
//! - Verify row counts after the run
//!
//! Usage:
//!   cargo run --bin migrator -- --file data/raw/rappi_data.xlsx --yes
//!   cargo run --bin migrator -- --print-ddl
//!   cargo run --bin migrator -- --dry-run

mod cleaners;
mod error;
mod pipeline;
mod schema;
mod sheet;
mod upload;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::pipeline::Prepared;
use crate::schema::{Schema, METRICS, ORDERS};
use crate::upload::{PgSink, UploadSummary};

#[derive(Parser, Debug)]
#[command(name = "migrator", about = "Loads spreadsheet metrics and orders into Postgres")]
struct Args {
    /// Spreadsheet path (defaults to EXCEL_FILE)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Sheet holding the wide metric rows
    #[arg(long, default_value = "RAW_INPUT_METRICS")]
    metrics_sheet: String,

    /// Sheet holding the weekly order counts
    #[arg(long, default_value = "RAW_ORDERS")]
    orders_sheet: String,

    /// Separate file for order counts (needed when the source is a CSV)
    #[arg(long)]
    orders_file: Option<PathBuf>,

    /// Records per insert batch (defaults to BATCH_SIZE or 100)
    #[arg(long)]
    batch_size: Option<NonZeroUsize>,

    /// Dry run - prepare and report, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Delete existing rows of each table before uploading
    #[arg(long, default_value = "false")]
    clear: bool,

    /// Skip the confirmation prompt
    #[arg(long, default_value = "false")]
    yes: bool,

    /// Print the table DDL and exit
    #[arg(long, default_value = "false")]
    print_ddl: bool,

    /// Create missing tables and indexes before uploading
    #[arg(long, default_value = "false")]
    create_tables: bool,

    /// Skip the post-upload row count check
    #[arg(long, default_value = "false")]
    skip_verify: bool,
}

#[derive(Debug, Clone)]
struct Config {
    db_url: Option<String>,
    excel_file: PathBuf,
    batch_size: NonZeroUsize,
}

impl Config {
    fn from_env() -> Result<Self> {
        let default_batch = NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            db_url: std::env::var("DB_URL").ok(),
            excel_file: PathBuf::from(
                std::env::var("EXCEL_FILE").unwrap_or_else(|_| sheet::DEFAULT_WORKBOOK.to_string()),
            ),
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_batch),
        })
    }

    fn db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_ddl() {
    println!("-- Run these statements in the target database (or use --create-tables)");
    for schema in [&METRICS, &ORDERS] {
        println!("\n-- {}", schema.table.to_uppercase());
        println!("{}", schema.ddl.trim());
    }
}

/// Ask a yes/no question on stdin
fn confirm(question: &str) -> Result<bool> {
    print!("{} (y/n) ", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

fn print_prepared(prepared: &Prepared) {
    println!("\n[{}] from sheet '{}'", prepared.table, prepared.sheet);
    println!("  Columns: {}", prepared.columns.join(", "));
    println!("  Rows read: {}", prepared.rows);
    if prepared.blank_rows > 0 {
        println!("  Blank rows skipped: {}", prepared.blank_rows);
    }
    println!("  Records before deduplication: {}", prepared.dedup.input);
    println!("  Records after deduplication: {}", prepared.dedup.records.len());
    println!("  Duplicates removed: {}", prepared.dedup.removed);
}

fn print_samples(prepared: &Prepared) {
    for (i, record) in prepared.dedup.records.iter().take(3).enumerate() {
        let json = serde_json::to_string(record).unwrap_or_default();
        println!("  [{}] {}", i + 1, json);
    }
    if prepared.dedup.records.len() > 3 {
        println!("  ... and {} more", prepared.dedup.records.len() - 3);
    }
}

fn print_upload_summary(table: &str, summary: &UploadSummary) {
    println!("\n[{}] upload complete", table);
    println!("  Batches: {}", summary.batches);
    println!("  Uploaded: {}", summary.uploaded);
    println!("  Failed: {}", summary.failed);

    if !summary.failures.is_empty() {
        println!("  Failed batches (first 3 of {}):", summary.failures.len());
        for failure in summary.failures.iter().take(3) {
            let error: String = failure.error.chars().take(150).collect();
            println!("    Batch {}: {}", failure.batch, error);
            if let Some(sample) = &failure.sample {
                let json = serde_json::to_string(sample).unwrap_or_default();
                println!("      Sample: {}", json);
            }
        }
    }
}

/// Where the orders data came from, or why there is none
#[derive(Debug)]
enum OrdersInput {
    Loaded(sheet::Sheet),
    /// Metrics came from a CSV and no separate orders file was given
    CsvSource,
    SheetMissing,
}

fn load_orders(
    orders_file: Option<&Path>,
    orders_sheet: &str,
    source: &Path,
    base: &Path,
) -> Result<OrdersInput> {
    let path = match orders_file {
        Some(file) => sheet::resolve_source(file, base)?,
        None if sheet::is_csv(source) => return Ok(OrdersInput::CsvSource),
        None => source.to_path_buf(),
    };
    Ok(match sheet::load_sheet(&path, orders_sheet, false)? {
        Some(loaded) => OrdersInput::Loaded(loaded),
        None => OrdersInput::SheetMissing,
    })
}

async fn verify_upload(pool: &PgPool) {
    println!("\n=== Verification ===");
    for schema in [&METRICS, &ORDERS] {
        match upload::count_rows(pool, schema.table).await {
            Ok(count) => println!("  {}: {} records", schema.table, count),
            Err(e) => warn!("could not count {}: {}", schema.table, e),
        }
    }

    match upload::sample_metrics(pool, 3).await {
        Ok(rows) => {
            println!("  Sample from {}:", METRICS.table);
            for row in rows {
                println!(
                    "    {} - {} - {}: {}",
                    row.country.as_deref().unwrap_or("?"),
                    row.zone.as_deref().unwrap_or("?"),
                    row.metric.as_deref().unwrap_or("?"),
                    row.l0w_value
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "null".to_string())
                );
            }
        }
        Err(e) => warn!("could not sample {}: {}", METRICS.table, e),
    }
}

async fn upload_table(
    pool: &PgPool,
    schema: &Schema,
    prepared: &Prepared,
    batch_size: NonZeroUsize,
    clear: bool,
) -> UploadSummary {
    if clear {
        match upload::clear_table(pool, schema.table).await {
            Ok(removed) => println!("Cleared {}: {} rows removed", schema.table, removed),
            Err(e) => warn!("could not clear {}: {}", schema.table, e),
        }
    }

    let sink = PgSink::new(pool);
    let summary =
        upload::upload_batches(&sink, schema.table, &prepared.dedup.records, batch_size).await;
    print_upload_summary(schema.table, &summary);
    summary
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;
    let started = Utc::now();

    println!("=== Spreadsheet Migration ===");
    println!("Started: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    if args.print_ddl {
        print_ddl();
        return Ok(());
    }

    let requested = args.file.clone().unwrap_or_else(|| config.excel_file.clone());
    let base = std::env::current_dir().context("Cannot determine working directory")?;
    let source = sheet::resolve_source(&requested, &base)?;
    println!("Source: {}", source.display());
    println!("Hash: {}", sheet::fingerprint(&source)?);

    let metrics_sheet = sheet::load_sheet(&source, &args.metrics_sheet, true)?
        .context("Metrics sheet could not be loaded")?;
    let metrics = pipeline::prepare(&METRICS, &metrics_sheet);
    print_prepared(&metrics);

    let orders_input = load_orders(
        args.orders_file.as_deref(),
        &args.orders_sheet,
        &source,
        &base,
    )?;
    let orders = match orders_input {
        OrdersInput::Loaded(orders_sheet) => {
            let prepared = pipeline::prepare(&ORDERS, &orders_sheet);
            print_prepared(&prepared);
            Some(prepared)
        }
        OrdersInput::CsvSource => {
            warn!("CSV source holds metrics only; pass --orders-file to load orders");
            None
        }
        OrdersInput::SheetMissing => {
            warn!("sheet '{}' not found, skipping orders", args.orders_sheet);
            None
        }
    };

    let batch_size = args.batch_size.unwrap_or(config.batch_size);

    if args.dry_run {
        println!("\nSample {} records:", METRICS.table);
        print_samples(&metrics);
        if let Some(orders) = &orders {
            println!("\nSample {} records:", ORDERS.table);
            print_samples(orders);
        }
        println!("\nDry run - nothing uploaded (batch size {})", batch_size);
        return Ok(());
    }

    if !args.yes && !confirm("\nThis will upload data to the database. Continue?")? {
        println!("Cancelled by user");
        return Ok(());
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(config.db_url()?)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    if args.create_tables {
        upload::create_tables(&pool, &[&METRICS, &ORDERS])
            .await
            .context("Failed to create tables")?;
    }

    let mut failed = 0;
    let summary = upload_table(&pool, &METRICS, &metrics, batch_size, args.clear).await;
    failed += summary.failed;

    if let Some(orders) = &orders {
        let summary = upload_table(&pool, &ORDERS, orders, batch_size, args.clear).await;
        failed += summary.failed;
    } else {
        println!("\nSkipping {} migration (no orders data)", ORDERS.table);
    }

    if !args.skip_verify {
        verify_upload(&pool).await;
    }

    let elapsed = Utc::now() - started;
    println!("\n=== Migration Complete ===");
    println!("Elapsed: {}s", elapsed.num_seconds());

    if failed > 0 {
        anyhow::bail!("{} records failed to upload; re-run after fixing the reported batches", failed);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_csv_source_without_orders_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("metrics.csv");
        fs::write(&source, b"country,zone,metric\nMX,Polanco,Perfect Orders\n").unwrap();

        let input = load_orders(None, "RAW_ORDERS", &source, dir.path()).unwrap();
        assert!(matches!(input, OrdersInput::CsvSource));
    }

    #[test]
    fn test_separate_orders_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("metrics.csv");
        let orders = dir.path().join("orders.csv");
        fs::write(&source, b"country,zone,metric\nMX,Polanco,Perfect Orders\n").unwrap();
        fs::write(&orders, b"country,zone,l0w\nMX,Polanco,1250\n").unwrap();

        let input = load_orders(Some(orders.as_path()), "RAW_ORDERS", &source, dir.path()).unwrap();
        match input {
            OrdersInput::Loaded(sheet) => {
                assert_eq!(sheet.columns, vec!["country", "zone", "l0w"]);
                assert_eq!(sheet.rows.len(), 1);
            }
            other => panic!("unexpected orders input {other:?}"),
        }
    }
}
