use arkmig_common::{Batch, Result, Table};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::lookup::{key_string, ForeignKeyLookup};
use super::ReconcileContext;
use crate::logger::rows;
use crate::manipulator::DataManipulator;

/// Removes rows whose referenced key is missing
pub struct ForeignKeyDeleter {
    table: String,
    lookup: ForeignKeyLookup,
}

impl ForeignKeyDeleter {
    pub fn new(
        ctx: ReconcileContext,
        table: &str,
        foreign_table: &str,
        fields: &[String],
        extra_criteria: &BTreeMap<String, String>,
    ) -> Result<Self> {
        Ok(Self {
            table: table.to_string(),
            lookup: ForeignKeyLookup::new(ctx, table, foreign_table, fields, extra_criteria)?,
        })
    }
}

#[async_trait]
impl DataManipulator for ForeignKeyDeleter {
    fn kind(&self) -> &'static str {
        "foreign_key_deleter"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, _name: &str) -> bool {
        false
    }

    async fn manipulate(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        let fields = self.lookup.fields_on(table)?;
        let missing = self.lookup.missing_values(&fields, &batch).await?;
        if missing.is_empty() {
            return Ok(batch);
        }

        let before = batch.len();
        batch.retain(|row| !key_string(&fields, row).is_some_and(|k| missing.contains(&k)));
        let deleted = before - batch.len();

        self.lookup.log(&format!(
            "{} deleted from {}: {} not found in {}",
            rows(deleted),
            table.target_name(),
            self.lookup.field_names().join(", "),
            self.lookup.foreign_table().target_name()
        ));
        Ok(batch)
    }

    async fn finalize(&self, _table: &Table, batch: Batch) -> Result<Batch> {
        self.lookup.release().await;
        Ok(batch)
    }

    async fn abort(&self, _table: &Table) {
        self.lookup.release().await;
    }
}
