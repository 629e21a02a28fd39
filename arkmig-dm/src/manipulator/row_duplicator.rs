use arkmig_common::config::FieldValue;
use arkmig_common::{Batch, CriteriaSpec, Field, Filter, MetadataProvider, Result, Table, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::data_setter::{keeps, row_filter};
use super::DataManipulator;

/// Appends a modified copy of every row kept by an optional filter
#[derive(Debug)]
pub struct RowDuplicator {
    table: String,
    filter: Option<Filter>,
    updates: Vec<(Arc<Field>, Value)>,
}

impl RowDuplicator {
    pub fn new(
        metadata: &dyn MetadataProvider,
        table: &str,
        criteria: &[CriteriaSpec],
        updates: &[FieldValue],
    ) -> Result<Self> {
        let resolved = metadata.data_source().require_table(table)?;
        let filter = row_filter("row_duplicator", &resolved, criteria)?;
        let updates = updates
            .iter()
            .map(|update| {
                let field = Arc::clone(resolved.require_field(&update.field)?);
                let value = field
                    .datatype()
                    .parse_value(field.target_name(), &update.value)?;
                Ok((field, value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            table: table.to_string(),
            filter,
            updates,
        })
    }
}

#[async_trait]
impl DataManipulator for RowDuplicator {
    fn kind(&self) -> &'static str {
        "row_duplicator"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.updates.iter().any(|(field, _)| field.matches(name))
    }

    async fn manipulate(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        let copies: Batch = batch
            .iter()
            .filter(|row| keeps(self.filter.as_ref(), row))
            .map(|row| {
                let mut copy = row.clone();
                for (field, value) in &self.updates {
                    copy.set_value(field.ordinal(), value.clone());
                }
                copy
            })
            .collect();

        debug!("Duplicated {} rows of {}", copies.len(), table.target_name());
        batch.extend(copies);
        Ok(batch)
    }
}
