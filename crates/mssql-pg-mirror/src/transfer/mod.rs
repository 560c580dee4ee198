//! Chunked transfer engine.
//!
//! Reads a source cursor one batch at a time, normalizes each batch and
//! appends it to the destination. Every batch of a table goes through one
//! destination transaction: the table is loaded completely or not at all.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::TransferSettings;
use crate::error::{MigrateError, Result};
use crate::resolve::ColumnDescriptor;
use crate::source::RowCursor;
use crate::target::{Destination, LoadTransaction};
use crate::value::{Batch, SqlValue};

/// Streams one table from a cursor into the destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferEngine {
    settings: TransferSettings,
}

impl TransferEngine {
    pub fn new(settings: TransferSettings) -> Self {
        Self { settings }
    }

    /// Rows requested from the cursor per fetch.
    pub fn chunk_size(&self) -> usize {
        self.settings.chunk_size.max(1)
    }

    /// Copy every row of `cursor` into `table`, returning the row count.
    ///
    /// On any error the transaction is rolled back and the error carries the
    /// table name. A cursor with no rows commits an empty transaction and
    /// returns 0; the table is then left absent.
    pub async fn transfer(
        &self,
        cursor: &mut dyn RowCursor,
        destination: &mut dyn Destination,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<u64> {
        let started = Instant::now();
        let mut txn = destination.begin().await.map_err(|e| e.for_table(table))?;

        let outcome = self.copy_batches(cursor, txn.as_mut(), table, columns).await;
        match outcome {
            Ok(total) => {
                txn.commit().await.map_err(|e| e.for_table(table))?;
                info!(
                    "[{}] done, {} rows total in {:.1}s",
                    table,
                    total,
                    started.elapsed().as_secs_f64()
                );
                Ok(total)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!("[{}] rollback failed: {}", table, rollback_err);
                }
                Err(err.for_table(table))
            }
        }
    }

    async fn copy_batches(
        &self,
        cursor: &mut dyn RowCursor,
        txn: &mut dyn LoadTransaction,
        table: &str,
        columns: &[ColumnDescriptor],
    ) -> Result<u64> {
        let names: Vec<String> = columns.iter().map(|c| c.sanitized.clone()).collect();
        let mut total: u64 = 0;

        loop {
            let rows = cursor.fetch(self.chunk_size()).await?;
            if rows.is_empty() {
                debug!("[{}] cursor exhausted", table);
                break;
            }

            let batch = Batch::new(names.clone(), normalize_rows(rows, names.len(), table)?);
            if batch.is_empty() {
                break;
            }

            let inserted = txn.append(table, &batch).await?;
            total += inserted;
            info!("[{}] inserted {} rows ({} so far)", table, inserted, total);
        }

        Ok(total)
    }
}

fn normalize_rows(
    rows: Vec<Vec<SqlValue>>,
    width: usize,
    table: &str,
) -> Result<Vec<Vec<SqlValue>>> {
    rows.into_iter()
        .map(|row| {
            if row.len() != width {
                return Err(MigrateError::transfer(
                    table,
                    format!("row has {} values, expected {}", row.len(), width),
                ));
            }
            Ok(row.into_iter().map(SqlValue::normalize).collect())
        })
        .collect()
}
