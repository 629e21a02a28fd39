use arkmig_common::{Batch, MetadataProvider, Result, Table, Value};
use async_trait::async_trait;
use tracing::debug;

use super::DataManipulator;

/// Drops rows excluded by the table's record filters and blanks fields
/// excluded by its field filters
///
/// Uses the filters of the table being processed, so repositories that
/// already pushed the record filters into their query see no change.
#[derive(Debug)]
pub struct RecordFilter {
    table: String,
    excluded_fields: Vec<String>,
}

impl RecordFilter {
    pub fn new(metadata: &dyn MetadataProvider, table: &str) -> Result<Self> {
        let resolved = metadata.data_source().require_table(table)?;
        let excluded_fields = resolved
            .fields()
            .iter()
            .filter(|f| resolved.excludes_field(f))
            .map(|f| f.target_name().to_string())
            .collect();

        Ok(Self {
            table: table.to_string(),
            excluded_fields,
        })
    }
}

#[async_trait]
impl DataManipulator for RecordFilter {
    fn kind(&self) -> &'static str {
        "record_filter"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.excluded_fields.iter().any(|f| f.eq_ignore_ascii_case(name))
    }

    async fn manipulate(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        let before = batch.len();
        batch.retain(|row| !table.excludes_row(row));

        let excluded: Vec<usize> = table
            .fields()
            .iter()
            .filter(|f| table.excludes_field(f))
            .map(|f| f.ordinal())
            .collect();
        for row in &mut batch {
            for ordinal in &excluded {
                row.set_value(*ordinal, Value::Null);
            }
        }

        if before != batch.len() {
            debug!(
                "Record filters dropped {} of {} rows from {}",
                before - batch.len(),
                before,
                table.target_name()
            );
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arkmig_common::metadata::MetadataDocument;
    use arkmig_common::{DataSource, Row};

    fn filtered_source() -> DataSource {
        MetadataDocument::from_toml(
            r#"
            [[tables]]
            source_name = "legacy_cases"
            target_name = "CASES"
            fields = [
                { source_name = "case_id", target_name = "CaseID", source_type = "int32" },
                { source_name = "notes", target_name = "Notes", source_type = "string" },
                { source_name = "year", target_name = "Year", source_type = "int32" },
            ]
            record_filters = [{ name = "recent", criteria = [{ type = "interval", field = "Year", low = "2000", high = "2030" }] }]
            field_filters = [{ name = "no_notes", criteria = [{ type = "exclude_field", field = "Notes" }] }]
            "#,
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn row(id: i32, notes: &str, year: i32) -> Row {
        Row::from_values(vec![Value::Int32(id), Value::from(notes), Value::Int32(year)])
    }

    #[tokio::test]
    async fn test_drops_rows_and_blanks_fields() {
        let source = filtered_source();
        let cases = source.require_table("CASES").unwrap();
        let filter = RecordFilter::new(&source, "CASES").unwrap();

        let batch = filter
            .manipulate_data(&cases, vec![row(1, "a", 1999), row(2, "b", 2005)])
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value(0), &Value::Int32(2));
        assert!(batch[0].value(1).is_null());
        assert!(filter.is_manipulating_field("notes"));
        assert!(!filter.is_manipulating_field("Year"));
    }
}
