//! Data source: the table/view graph supplied by the metadata collaborator

use std::sync::Arc;

use super::table::Table;
use crate::{Error, Result};

/// Complete metadata object graph for one delivery
#[derive(Debug, Default)]
pub struct DataSource {
    name: String,
    tables: Vec<Arc<Table>>,
    views: Vec<Arc<Table>>,
}

impl DataSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            views: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_table(&mut self, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        self.tables.push(Arc::clone(&table));
        table
    }

    pub fn add_view(&mut self, view: Table) -> Arc<Table> {
        let view = Arc::new(view);
        self.views.push(Arc::clone(&view));
        view
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }

    pub fn views(&self) -> &[Arc<Table>] {
        &self.views
    }

    /// Find a table (then a view) by source or target name, case-insensitive
    pub fn table(&self, name: &str) -> Option<&Arc<Table>> {
        self.tables
            .iter()
            .chain(self.views.iter())
            .find(|t| t.matches_name(name))
    }

    /// Like [`DataSource::table`] but fails with [`Error::NotFound`]
    pub fn require_table(&self, name: &str) -> Result<Arc<Table>> {
        self.table(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Table '{}' not found in data source", name)))
    }
}

/// Metadata collaborator: supplies the table graph, read-only
pub trait MetadataProvider: Send + Sync {
    fn data_source(&self) -> &DataSource;
}

impl MetadataProvider for DataSource {
    fn data_source(&self) -> &DataSource {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup_case_insensitive() {
        let mut source = DataSource::new("archive");
        source.add_table(Table::new("emp", "EMPLOYEE"));
        source.add_view(Table::new("v_emp", "EMPLOYEE_VIEW"));

        assert!(source.table("employee").is_some());
        assert!(source.table("EMP").is_some());
        assert!(source.table("employee_view").is_some());
        assert!(matches!(source.require_table("nope"), Err(Error::NotFound(_))));
    }
}
