//! Table runner
//!
//! Streams each table's batches through the manipulator chain and into the
//! sink. The runner keeps one batch of lookahead so it knows which batch is
//! the last one; an empty table still gets a (empty) last batch so that
//! finalizers run. A table that fails part way is aborted on every
//! manipulator so shared key cache claims are dropped. Tables run
//! concurrently up to a configured limit.

use arkmig_common::{Batch, Result, Table};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::manipulator::ManipulatorChain;
use crate::repository::{BatchSink, DataRepository};

/// Outcome of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: String,
    pub batches: usize,
    pub rows_read: usize,
    pub rows_written: u64,
}

#[derive(Clone)]
pub struct TableRunner {
    repository: Arc<dyn DataRepository>,
    sink: Arc<dyn BatchSink>,
    chain: Arc<ManipulatorChain>,
}

impl TableRunner {
    pub fn new(
        repository: Arc<dyn DataRepository>,
        sink: Arc<dyn BatchSink>,
        chain: Arc<ManipulatorChain>,
    ) -> Self {
        Self {
            repository,
            sink,
            chain,
        }
    }

    /// Process every batch of `table`
    pub async fn run_table(&self, table: &Table) -> Result<TableSummary> {
        let start = Instant::now();
        let mut summary = TableSummary {
            table: table.target_name().to_string(),
            batches: 0,
            rows_read: 0,
            rows_written: 0,
        };

        if let Err(e) = self.stream_table(table, &mut summary).await {
            self.chain.abort(table).await;
            return Err(e);
        }

        info!(
            "{}: {} rows read, {} rows written in {} batches ({:.2}s)",
            summary.table,
            summary.rows_read,
            summary.rows_written,
            summary.batches,
            start.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    async fn stream_table(&self, table: &Table, summary: &mut TableSummary) -> Result<()> {
        let mut batches = self.repository.data_get_from_table(table);
        let mut pending: Option<Batch> = None;
        while let Some(batch) = batches.try_next().await? {
            summary.rows_read += batch.len();
            if let Some(previous) = pending.replace(batch) {
                self.process(table, previous, false, summary).await?;
            }
        }
        self.process(table, pending.unwrap_or_default(), true, summary)
            .await
    }

    async fn process(
        &self,
        table: &Table,
        batch: Batch,
        is_last: bool,
        summary: &mut TableSummary,
    ) -> Result<()> {
        let batch = self.chain.process_batch(table, batch, is_last).await?;
        summary.rows_written += self.sink.write_batch(table, &batch).await?;
        summary.batches += 1;
        Ok(())
    }

    /// Run `tables` with at most `max_concurrent` in flight
    ///
    /// A failing table does not stop the others; results come back in the
    /// order of `tables`.
    pub async fn run_tables(
        &self,
        tables: Vec<Arc<Table>>,
        max_concurrent: usize,
    ) -> Vec<(String, Result<TableSummary>)> {
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for (index, table) in tables.iter().enumerate() {
            let runner = self.clone();
            let table = Arc::clone(table);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (index, runner.run_table(&table).await)
            });
        }

        let mut results: Vec<Option<Result<TableSummary>>> =
            tables.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Err(e) = &result {
                        error!("Table {} failed: {}", tables[index].target_name(), e);
                    }
                    results[index] = Some(result);
                }
                Err(e) => error!("Table task panicked: {}", e),
            }
        }

        tables
            .iter()
            .zip(results)
            .map(|(table, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(arkmig_common::Error::InvalidInput(format!(
                        "Table {} did not complete",
                        table.target_name()
                    )))
                });
                (table.target_name().to_string(), result)
            })
            .collect()
    }
}
