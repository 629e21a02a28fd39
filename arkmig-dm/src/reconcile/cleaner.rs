use arkmig_common::{Batch, Result, Table, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::lookup::{key_string, ForeignKeyLookup};
use super::ReconcileContext;
use crate::logger::rows;
use crate::manipulator::DataManipulator;

/// Nulls the last foreign-key field of rows whose referenced key is missing
///
/// Rows that already have a null key member are skipped, so running the
/// cleaner twice changes nothing the second time.
pub struct ForeignKeyCleaner {
    table: String,
    lookup: ForeignKeyLookup,
}

impl ForeignKeyCleaner {
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
impl DataManipulator for ForeignKeyCleaner {
    fn kind(&self) -> &'static str {
        "foreign_key_cleaner"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.lookup
            .field_names()
            .last()
            .is_some_and(|f| f.eq_ignore_ascii_case(name))
    }

    async fn manipulate(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        let fields = self.lookup.fields_on(table)?;
        let missing = self.lookup.missing_values(&fields, &batch).await?;
        let Some(last) = fields.last() else {
            return Ok(batch);
        };

        let mut cleaned = 0;
        for row in &mut batch {
            let dangling = key_string(&fields, row).is_some_and(|k| missing.contains(&k));
            if dangling {
                row.set_value(last.ordinal(), Value::Null);
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            self.lookup.log(&format!(
                "{} cleaned in {}: {} not found in {}",
                rows(cleaned),
                table.target_name(),
                self.lookup.field_names().join(", "),
                self.lookup.foreign_table().target_name()
            ));
        }
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
