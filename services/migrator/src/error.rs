//! Error type for the migration run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can stop (or, for a single batch, be recorded by) a migration run.
///
/// Malformed cells never surface here: the cleaners absorb them as absent values.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// None of the candidate locations holds the spreadsheet.
    #[error("source file not found, tried: {tried:?}")]
    SourceNotFound { tried: Vec<PathBuf> },

    /// The workbook could not be opened or a sheet could not be read.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// The workbook has no sheets at all.
    #[error("workbook '{0}' has no sheets")]
    NoSheets(PathBuf),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection, DDL or insert failure reported by Postgres.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
