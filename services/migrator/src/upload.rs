//! Batch upload of prepared records, plus the Postgres-side helpers
//! (DDL, clearing, verification) used around it.

use sqlx::{PgPool, Postgres, QueryBuilder};
use std::num::NonZeroUsize;
use tracing::{error, info};

use crate::error::MigrateError;
use crate::pipeline::{Field, Record};
use crate::schema::Schema;

/// Destination for record batches
pub trait RecordSink {
    /// Persist one batch. All records of a batch share the same columns.
    async fn insert_batch(&self, table: &str, batch: &[Record]) -> Result<(), MigrateError>;
}

/// Diagnostic context for one failed batch
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// 1-based batch index
    pub batch: usize,
    pub error: String,
    pub sample: Option<Record>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub batches: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

/// Submit `records` in contiguous batches of at most `batch_size`.
///
/// A failing batch is recorded and the remaining batches are still attempted.
/// Nothing is retried.
pub async fn upload_batches<S: RecordSink>(
    sink: &S,
    table: &str,
    records: &[Record],
    batch_size: NonZeroUsize,
) -> UploadSummary {
    let batch_size = batch_size.get();
    let mut summary = UploadSummary {
        batches: records.len().div_ceil(batch_size),
        ..Default::default()
    };

    info!(
        "Uploading {} records to {} in {} batches",
        records.len(),
        table,
        summary.batches
    );

    for (idx, batch) in records.chunks(batch_size).enumerate() {
        let number = idx + 1;
        match sink.insert_batch(table, batch).await {
            Ok(()) => {
                summary.uploaded += batch.len();
                info!(
                    "[{}] batch {}/{}: {} records",
                    table,
                    number,
                    summary.batches,
                    batch.len()
                );
            }
            Err(e) => {
                summary.failed += batch.len();
                error!("[{}] batch {} failed: {}", table, number, e);
                summary.failures.push(BatchFailure {
                    batch: number,
                    error: e.to_string(),
                    sample: batch.first().cloned(),
                });
            }
        }
    }

    summary
}

/// Postgres caps a statement at this many bind parameters
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Records per INSERT statement so that `columns` binds per row stay under the cap
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Postgres sink issuing multi-row INSERTs, one transaction per batch.
///
/// A batch wider than the bind-parameter cap is split across several
/// statements inside that transaction, so it still commits or fails whole.
pub struct PgSink<'a> {
    pool: &'a PgPool,
}

impl<'a> PgSink<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl RecordSink for PgSink<'_> {
    async fn insert_batch(&self, table: &str, batch: &[Record]) -> Result<(), MigrateError> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        let columns: Vec<&str> = first.columns().collect();
        let prefix = format!("INSERT INTO {} ({}) ", table, columns.join(", "));

        let mut tx = self.pool.begin().await?;
        for chunk in batch.chunks(rows_per_statement(columns.len())) {
            let mut query: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            query.push_values(chunk, |mut row, record| {
                for (_, field) in record.fields() {
                    match field {
                        Field::Text(v) => row.push_bind(v.clone()),
                        Field::Number(v) => row.push_bind(*v),
                        Field::Integer(v) => row.push_bind(*v),
                    };
                }
            });
            query.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Run the CREATE TABLE / CREATE INDEX statements of each schema
pub async fn create_tables(pool: &PgPool, schemas: &[&Schema]) -> Result<(), MigrateError> {
    for schema in schemas {
        sqlx::raw_sql(schema.ddl).execute(pool).await?;
        info!("Ensured table {}", schema.table);
    }
    Ok(())
}

/// Delete every row of `table`, returning the number removed
pub async fn clear_table(pool: &PgPool, table: &str) -> Result<u64, MigrateError> {
    let sql = format!("DELETE FROM {}", table);
    let result = sqlx::query(&sql).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count_rows(pool: &PgPool, table: &str) -> Result<i64, MigrateError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(count)
}

/// A few uploaded metric rows, for the post-run check
#[derive(Debug, sqlx::FromRow)]
pub struct MetricSample {
    pub country: Option<String>,
    pub zone: Option<String>,
    pub metric: Option<String>,
    pub l0w_value: Option<f64>,
}

pub async fn sample_metrics(pool: &PgPool, limit: i64) -> Result<Vec<MetricSample>, MigrateError> {
    let rows = sqlx::query_as::<_, MetricSample>(
        "SELECT country, zone, metric, l0w_value::float8 AS l0w_value FROM metrics_input LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory sink that fails the listed 1-based batch numbers
    struct FakeSink {
        fail: Vec<usize>,
        calls: RefCell<Vec<usize>>,
    }

    impl FakeSink {
        fn new(fail: Vec<usize>) -> Self {
            Self {
                fail,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl RecordSink for FakeSink {
        async fn insert_batch(&self, _table: &str, batch: &[Record]) -> Result<(), MigrateError> {
            let number = self.calls.borrow().len() + 1;
            self.calls.borrow_mut().push(batch.len());
            if self.fail.contains(&number) {
                return Err(MigrateError::Database(sqlx::Error::Protocol(format!(
                    "batch {} rejected",
                    number
                ))));
            }
            Ok(())
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(vec![
                    ("zone", Field::Text(Some(format!("zone-{}", i)))),
                    ("l0w", Field::Integer(Some(i as i64))),
                ])
            })
            .collect()
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_rows_per_statement_stays_under_bind_cap() {
        let metrics = crate::schema::METRICS.columns.len();
        let rows = rows_per_statement(metrics);
        assert!(rows * metrics <= MAX_BIND_PARAMS);
        assert!((rows + 1) * metrics > MAX_BIND_PARAMS);

        assert_eq!(rows_per_statement(15), 4369);
        assert_eq!(rows_per_statement(12), 5461);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
    }

    #[test]
    fn test_large_batch_splits_into_statements() {
        let statements = records(5000).chunks(rows_per_statement(15)).count();
        assert_eq!(statements, 2);
    }

    #[tokio::test]
    async fn test_batch_partitioning() {
        let sink = FakeSink::new(vec![]);
        let summary = upload_batches(&sink, "orders", &records(250), size(100)).await;

        assert_eq!(*sink.calls.borrow(), vec![100, 100, 50]);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.uploaded, 250);
        assert_eq!(summary.failed, 0);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn test_batch_partitioning_exact_multiple() {
        let sink = FakeSink::new(vec![]);
        let summary = upload_batches(&sink, "orders", &records(200), size(100)).await;

        assert_eq!(*sink.calls.borrow(), vec![100, 100]);
        assert_eq!(summary.batches, 2);
    }

    #[tokio::test]
    async fn test_no_records_no_calls() {
        let sink = FakeSink::new(vec![]);
        let summary = upload_batches(&sink, "orders", &[], size(100)).await;

        assert!(sink.calls.borrow().is_empty());
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.uploaded, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_later_batches() {
        let sink = FakeSink::new(vec![2]);
        let summary = upload_batches(&sink, "orders", &records(10), size(3)).await;

        assert_eq!(*sink.calls.borrow(), vec![3, 3, 3, 1]);
        assert_eq!(summary.uploaded, 7);
        assert_eq!(summary.failed, 3);
        let failed: Vec<usize> = summary.failures.iter().map(|f| f.batch).collect();
        assert_eq!(failed, vec![2]);
    }

    #[tokio::test]
    async fn test_failure_reports_error_and_sample() {
        let sink = FakeSink::new(vec![1, 3]);
        let input = records(5);
        let summary = upload_batches(&sink, "orders", &input, size(2)).await;

        let failed: Vec<usize> = summary.failures.iter().map(|f| f.batch).collect();
        assert_eq!(failed, vec![1, 3]);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.uploaded, 2);
        assert!(summary.failures[0].error.contains("batch 1 rejected"));
        assert_eq!(summary.failures[0].sample.as_ref(), Some(&input[0]));
        assert_eq!(summary.failures[1].sample.as_ref(), Some(&input[4]));
    }
}
