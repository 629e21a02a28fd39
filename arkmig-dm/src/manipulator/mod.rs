//! Data manipulators
//!
//! A manipulator transforms the batches of one table. For every batch the
//! runner calls [`DataManipulator::manipulate_data`]; after the last batch it
//! also calls [`DataManipulator::finalize_data_manipulation`], which may
//! append rows. When a table's processing fails, the runner calls
//! [`DataManipulator::abort`] instead so that shared resources are released.
//! Manipulators are no-ops for tables they do not target.

use arkmig_common::{Batch, Result, Table};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

mod builder;
mod data_setter;
mod record_filter;
mod regex_replacer;
mod row_duplicator;
mod value_mapper;

pub use builder::build_chain;
pub use data_setter::DataSetter;
pub use record_filter::RecordFilter;
pub use regex_replacer::RegexReplacer;
pub use row_duplicator::RowDuplicator;
pub use value_mapper::ValueMapper;

#[async_trait]
pub trait DataManipulator: Send + Sync {
    /// Short kind name used in logs
    fn kind(&self) -> &'static str;

    /// Table this manipulator targets (source or target name)
    fn table_name(&self) -> &str;

    /// Whether this manipulator writes the named field
    fn is_manipulating_field(&self, name: &str) -> bool;

    /// Transform one batch of a matching table
    async fn manipulate(&self, table: &Table, batch: Batch) -> Result<Batch>;

    /// Completion hook for a matching table, run on the last batch
    async fn finalize(&self, _table: &Table, batch: Batch) -> Result<Batch> {
        Ok(batch)
    }

    /// Processing of a matching table failed; finalize will not run
    async fn abort(&self, _table: &Table) {}

    fn applies_to(&self, table: &Table) -> bool {
        table.matches_name(self.table_name())
    }

    /// Transform `batch`; passes it through unchanged for other tables
    async fn manipulate_data(&self, table: &Table, batch: Batch) -> Result<Batch> {
        if !self.applies_to(table) {
            return Ok(batch);
        }
        self.manipulate(table, batch).await
    }

    /// Finish the table; passes the batch through unchanged for other tables
    async fn finalize_data_manipulation(&self, table: &Table, batch: Batch) -> Result<Batch> {
        if !self.applies_to(table) {
            return Ok(batch);
        }
        self.finalize(table, batch).await
    }

    async fn abort_data_manipulation(&self, table: &Table) {
        if self.applies_to(table) {
            self.abort(table).await;
        }
    }
}

/// Ordered list of manipulators applied to every batch
#[derive(Clone, Default)]
pub struct ManipulatorChain {
    manipulators: Vec<Arc<dyn DataManipulator>>,
}

impl ManipulatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a manipulator; registration order is application order
    pub fn register(&mut self, manipulator: Arc<dyn DataManipulator>) {
        self.manipulators.push(manipulator);
    }

    pub fn len(&self) -> usize {
        self.manipulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manipulators.is_empty()
    }

    pub fn manipulators(&self) -> &[Arc<dyn DataManipulator>] {
        &self.manipulators
    }

    /// Run every manipulator over `batch`; on the last batch also finalize each,
    /// in registration order
    pub async fn process_batch(&self, table: &Table, mut batch: Batch, is_last: bool) -> Result<Batch> {
        for manipulator in &self.manipulators {
            batch = manipulator.manipulate_data(table, batch).await?;
        }
        if is_last {
            for manipulator in &self.manipulators {
                if manipulator.applies_to(table) {
                    debug!("Finalizing {} on {}", manipulator.kind(), table.target_name());
                }
                batch = manipulator.finalize_data_manipulation(table, batch).await?;
            }
        }
        Ok(batch)
    }

    /// Let every manipulator targeting `table` clean up after a failure
    pub async fn abort(&self, table: &Table) {
        for manipulator in &self.manipulators {
            manipulator.abort_data_manipulation(table).await;
        }
    }

    /// Whether any manipulator targeting `table` writes the named field
    pub fn is_manipulating_field(&self, table: &Table, name: &str) -> bool {
        self.manipulators
            .iter()
            .any(|m| m.applies_to(table) && m.is_manipulating_field(name))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use arkmig_common::{MetadataProvider, Value};

    struct Tagger {
        table: String,
        tag: &'static str,
    }

    #[async_trait]
    impl DataManipulator for Tagger {
        fn kind(&self) -> &'static str {
            "tagger"
        }

        fn table_name(&self) -> &str {
            &self.table
        }

        fn is_manipulating_field(&self, name: &str) -> bool {
            name.eq_ignore_ascii_case("Status")
        }

        async fn manipulate(&self, _table: &Table, mut batch: Batch) -> Result<Batch> {
            for row in &mut batch {
                let status = format!("{}{}", row.value(2), self.tag);
                row.set_value(2, Value::from(status));
            }
            Ok(batch)
        }

        async fn finalize(&self, _table: &Table, mut batch: Batch) -> Result<Batch> {
            batch.push(case(99, None, self.tag));
            Ok(batch)
        }
    }

    fn tagger(table: &str, tag: &'static str) -> Arc<dyn DataManipulator> {
        Arc::new(Tagger {
            table: table.to_string(),
            tag,
        })
    }

    #[tokio::test]
    async fn test_chain_applies_in_registration_order() {
        let source = case_source();
        let cases = source.require_table("CASES").unwrap();
        let mut chain = ManipulatorChain::new();
        chain.register(tagger("CASES", "-a"));
        chain.register(tagger("cases", "-b"));

        let batch = chain
            .process_batch(&cases, vec![case(1, Some(1), "open")], false)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value(2), &Value::from("open-a-b"));
    }

    #[tokio::test]
    async fn test_finalize_only_on_last_batch() {
        let source = case_source();
        let cases = source.require_table("CASES").unwrap();
        let mut chain = ManipulatorChain::new();
        chain.register(tagger("CASES", "-a"));

        let batch = chain.process_batch(&cases, vec![], true).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value(0), &Value::Int32(99));
    }

    struct Aborts {
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DataManipulator for Aborts {
        fn kind(&self) -> &'static str {
            "aborts"
        }

        fn table_name(&self) -> &str {
            "CASES"
        }

        fn is_manipulating_field(&self, _name: &str) -> bool {
            false
        }

        async fn manipulate(&self, _table: &Table, batch: Batch) -> Result<Batch> {
            Ok(batch)
        }

        async fn abort(&self, table: &Table) {
            self.seen.lock().unwrap().push(table.target_name().to_string());
        }
    }

    #[tokio::test]
    async fn test_abort_reaches_only_matching_manipulators() {
        let source = case_source();
        let aborts = Arc::new(Aborts {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let mut chain = ManipulatorChain::new();
        chain.register(Arc::clone(&aborts) as Arc<dyn DataManipulator>);

        chain.abort(&source.require_table("EMPLOYEE").unwrap()).await;
        chain.abort(&source.require_table("CASES").unwrap()).await;
        assert_eq!(*aborts.seen.lock().unwrap(), vec!["CASES".to_string()]);
    }

    #[tokio::test]
    async fn test_other_tables_pass_through() {
        let source = case_source();
        let employees = source.data_source().require_table("EMPLOYEE").unwrap();
        let mut chain = ManipulatorChain::new();
        chain.register(tagger("CASES", "-a"));

        let rows = vec![employee(1, "active")];
        let batch = chain.process_batch(&employees, rows.clone(), true).await.unwrap();
        assert_eq!(batch, rows);
        assert!(!chain.is_manipulating_field(&employees, "Status"));
        assert!(chain.is_manipulating_field(&source.require_table("CASES").unwrap(), "status"));
    }
}
