use arkmig_common::{Batch, CriteriaSpec, Field, Filter, MetadataProvider, Result, Row, Table, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::DataManipulator;

/// Sets one field to a fixed value on every row kept by an optional filter
#[derive(Debug)]
pub struct DataSetter {
    table: String,
    field: Arc<Field>,
    value: Value,
    filter: Option<Filter>,
}

impl DataSetter {
    /// `value` is parsed with the field's datatype; a value that does not
    /// parse is rejected here rather than per row
    pub fn new(
        metadata: &dyn MetadataProvider,
        table: &str,
        field: &str,
        value: &str,
        criteria: &[CriteriaSpec],
    ) -> Result<Self> {
        let resolved = metadata.data_source().require_table(table)?;
        let field = Arc::clone(resolved.require_field(field)?);
        let value = field.datatype().parse_value(field.target_name(), value)?;
        let filter = row_filter("data_setter", &resolved, criteria)?;

        Ok(Self {
            table: table.to_string(),
            field,
            value,
            filter,
        })
    }
}

/// Filter from criteria specs; `None` keeps every row
pub(super) fn row_filter(
    name: &str,
    table: &Table,
    criteria: &[CriteriaSpec],
) -> Result<Option<Filter>> {
    if criteria.is_empty() {
        return Ok(None);
    }
    Filter::from_specs(name, table, criteria).map(Some)
}

pub(super) fn keeps(filter: Option<&Filter>, row: &Row) -> bool {
    filter.map_or(true, |f| !f.exclude_row(row))
}

#[async_trait]
impl DataManipulator for DataSetter {
    fn kind(&self) -> &'static str {
        "data_setter"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.field.matches(name)
    }

    async fn manipulate(&self, _table: &Table, mut batch: Batch) -> Result<Batch> {
        let mut updated = 0;
        for row in batch.iter_mut().filter(|row| keeps(self.filter.as_ref(), row)) {
            row.set_value(self.field.ordinal(), self.value.clone());
            updated += 1;
        }
        debug!(
            "Set {} on {} of {} rows",
            self.field.target_name(),
            updated,
            batch.len()
        );
        Ok(batch)
    }
}
