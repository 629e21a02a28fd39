//! Collaborator traits between manipulators and storage
//!
//! - [`DataRepository`]: streams row batches of a table
//! - [`DataQueryer`]: optional point lookups by key value
//! - [`BatchSink`]: persists manipulated batches

use arkmig_common::{Batch, Criteria, Key, Result, Row, Table};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

/// Ordered stream of row batches; an `Err` item ends the stream
pub type BatchStream<'a> = BoxStream<'a, Result<Batch>>;

/// Source of row batches
pub trait DataRepository: Send + Sync {
    /// Batches of `table` as delivered by the source, restricted by its record filters
    fn data_get_from_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a>;

    /// Batches of `table` as already written to the target
    fn data_get_for_target_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a>;

    /// Point-lookup interface, when the repository offers one
    fn data_queryer(&self) -> Option<&dyn DataQueryer> {
        None
    }
}

/// Point lookups against a table's source data
#[async_trait]
pub trait DataQueryer: Send + Sync {
    /// Number of rows of `table` whose `key` equals the key string `value`
    /// and which satisfy every criterion in `extra`
    async fn count_matching_key(
        &self,
        table: &Table,
        key: &Key,
        extra: &[Criteria],
        value: &str,
    ) -> Result<i64>;
}

/// Destination for manipulated batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Persist `batch` for `table`; returns the number of rows written
    async fn write_batch(&self, table: &Table, batch: &[Row]) -> Result<u64>;
}

/// Drain a stream into one batch
pub async fn collect_rows(stream: BatchStream<'_>) -> Result<Batch> {
    stream
        .try_fold(Vec::new(), |mut rows, batch| async move {
            rows.extend(batch);
            Ok(rows)
        })
        .await
}
