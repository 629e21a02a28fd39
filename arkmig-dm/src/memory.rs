//! In-memory repository
//!
//! Holds source rows per table and collects written batches. Counts scans and
//! point lookups so callers can observe how often the store was consulted.

use arkmig_common::{Batch, Criteria, Error, Key, Result, Row, Table};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::repository::{BatchSink, BatchStream, DataQueryer, DataRepository};

/// Repository backed by in-memory row vectors, keyed by table target name
pub struct MemoryRepository {
    source: RwLock<HashMap<String, Vec<Row>>>,
    target: RwLock<HashMap<String, Vec<Row>>>,
    batch_size: usize,
    point_lookups: bool,
    scans: AtomicUsize,
    queries: AtomicUsize,
}

fn table_key(table: &Table) -> String {
    table.target_name().to_lowercase()
}

impl MemoryRepository {
    pub fn new(batch_size: usize) -> Self {
        Self {
            source: RwLock::new(HashMap::new()),
            target: RwLock::new(HashMap::new()),
            batch_size: batch_size.max(1),
            point_lookups: false,
            scans: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Offer [`DataQueryer`] point lookups
    pub fn with_point_lookups(mut self) -> Self {
        self.point_lookups = true;
        self
    }

    /// Replace the source rows of `table`
    pub async fn load(&self, table: &Table, rows: Vec<Row>) {
        self.source.write().await.insert(table_key(table), rows);
    }

    /// Rows written to `table` so far
    pub async fn written(&self, table: &Table) -> Vec<Row> {
        self.target
            .read()
            .await
            .get(&table_key(table))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of source scans started
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Number of point lookups answered
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn stream<'a>(
        &'a self,
        store: &'a RwLock<HashMap<String, Vec<Row>>>,
        table: &'a Table,
        filtered: bool,
    ) -> BatchStream<'a> {
        let batch_size = self.batch_size;
        Box::pin(stream! {
            let rows: Vec<Row> = store
                .read()
                .await
                .get(&table_key(table))
                .cloned()
                .unwrap_or_default();
            let kept: Batch = rows
                .into_iter()
                .filter(|r| !filtered || !table.excludes_row(r))
                .collect();
            for chunk in kept.chunks(batch_size) {
                yield Ok::<Batch, Error>(chunk.to_vec());
            }
        })
    }
}

impl DataRepository for MemoryRepository {
    fn data_get_from_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.stream(&self.source, table, true)
    }

    fn data_get_for_target_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a> {
        self.stream(&self.target, table, false)
    }

    fn data_queryer(&self) -> Option<&dyn DataQueryer> {
        if self.point_lookups {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl DataQueryer for MemoryRepository {
    async fn count_matching_key(
        &self,
        table: &Table,
        key: &Key,
        extra: &[Criteria],
        value: &str,
    ) -> Result<i64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let source = self.source.read().await;
        let mut count = 0;
        for row in source.get(&table_key(table)).into_iter().flatten() {
            if extra.iter().any(|c| c.exclude(row.value(c.field().ordinal()))) {
                continue;
            }
            if key.value_of(row)?.as_deref() == Some(value) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl BatchSink for MemoryRepository {
    async fn write_batch(&self, table: &Table, batch: &[Row]) -> Result<u64> {
        self.target
            .write()
            .await
            .entry(table_key(table))
            .or_default()
            .extend(batch.iter().cloned());
        Ok(batch.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::collect_rows;
    use arkmig_common::{DataType, Field, Value};
    use futures::TryStreamExt;

    fn table() -> Table {
        let mut table = Table::new("emp", "EMPLOYEE");
        table
            .add_field(Field::new("id", "EmployeeID", DataType::Int32))
            .unwrap();
        table
    }

    #[tokio::test]
    async fn test_batches_follow_batch_size() {
        let repo = MemoryRepository::new(2);
        let table = table();
        let rows = (1..=5).map(|i| Row::from_values(vec![Value::Int32(i)])).collect();
        repo.load(&table, rows).await;

        let batches: Vec<Batch> = repo.data_get_from_table(&table).try_collect().await.unwrap();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(repo.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_written_rows_readable_as_target() {
        let repo = MemoryRepository::new(10);
        let table = table();
        let written = repo
            .write_batch(&table, &[Row::from_values(vec![Value::Int32(7)])])
            .await
            .unwrap();
        assert_eq!(written, 1);

        let rows = collect_rows(repo.data_get_for_target_table(&table)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(collect_rows(repo.data_get_from_table(&table))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_point_lookups_opt_in() {
        assert!(MemoryRepository::new(1).data_queryer().is_none());
        assert!(MemoryRepository::new(1)
            .with_point_lookups()
            .data_queryer()
            .is_some());
    }
}
