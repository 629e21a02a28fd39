use arkmig_common::{Batch, Error, MetadataProvider, Result, Table};
use async_trait::async_trait;
use std::sync::Arc;

use super::DataManipulator;

/// Sets every field's target value from its source value
///
/// Fields with a value map go through the map; the others are converted to
/// their target datatype.
#[derive(Debug)]
pub struct ValueMapper {
    table: String,
    resolved: Arc<Table>,
}

impl ValueMapper {
    pub fn new(metadata: &dyn MetadataProvider, table: &str) -> Result<Self> {
        let resolved = metadata.data_source().require_table(table)?;
        Ok(Self {
            table: table.to_string(),
            resolved,
        })
    }
}

#[async_trait]
impl DataManipulator for ValueMapper {
    fn kind(&self) -> &'static str {
        "value_mapper"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.resolved.field(name).is_some()
    }

    async fn manipulate(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        for row in &mut batch {
            for field in table.fields() {
                let source = row.get(field.ordinal()).map(|o| o.source().clone());
                let Some(source) = source else {
                    continue;
                };
                let mapped = field.map_value(&source).map_err(|reason| Error::Conversion {
                    field: field.target_name().to_string(),
                    value: source.to_string(),
                    datatype: field.target_datatype().name().to_string(),
                    reason,
                })?;
                row.set_value(field.ordinal(), mapped);
            }
        }
        Ok(batch)
    }
}
