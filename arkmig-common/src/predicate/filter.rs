//! Ordered sets of criteria

use std::fmt;

use super::criteria::{Criteria, CriteriaSpec};
use crate::model::{Field, NameSide, Row, Table};
use crate::{Error, Result};

/// Ordered criteria over the fields of one table
///
/// A row is excluded when any criteria excludes its field's value (first
/// match wins). The SQL form is the AND of every criteria's keep-condition,
/// so a row survives the SQL predicate exactly when it is not excluded.
#[derive(Debug, Clone)]
pub struct Filter {
    name: String,
    table: String,
    criteria: Vec<Criteria>,
}

impl Filter {
    pub fn new(name: impl Into<String>, table: &Table) -> Self {
        Self {
            name: name.into(),
            table: table.target_name().to_string(),
            criteria: Vec::new(),
        }
    }

    /// Build from configuration; every criteria is resolved against `table`
    pub fn from_specs(name: impl Into<String>, table: &Table, specs: &[CriteriaSpec]) -> Result<Self> {
        let mut filter = Filter::new(name, table);
        for spec in specs {
            filter.add_criteria(Criteria::from_spec(table, spec)?)?;
        }
        Ok(filter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target name of the table this filter applies to
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn criteria(&self) -> &[Criteria] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn add_criteria(&mut self, criteria: Criteria) -> Result<()> {
        if criteria.field().table() != self.table {
            return Err(Error::Metadata(format!(
                "Filter '{}' on table '{}' cannot use field '{}' of table '{}'",
                self.name,
                self.table,
                criteria.field().target_name(),
                criteria.field().table()
            )));
        }
        self.criteria.push(criteria);
        Ok(())
    }

    /// True if any criteria excludes the row's value for its field
    pub fn exclude_row(&self, row: &Row) -> bool {
        self.criteria
            .iter()
            .any(|c| c.exclude(row.value(c.field().ordinal())))
    }

    /// True if a field-level criteria on `field` excludes it
    pub fn exclude_field(&self, field: &Field) -> bool {
        field.table() == self.table
            && self.criteria.iter().any(|c| {
                c.excludes_field() && c.field().target_name() == field.target_name()
            })
    }

    pub fn as_string(&self) -> String {
        self.criteria
            .iter()
            .map(Criteria::as_string)
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// SQL predicate using target column names; empty when the filter is empty
    pub fn as_sql(&self) -> String {
        self.as_sql_for(NameSide::Target)
    }

    pub fn as_sql_for(&self, side: NameSide) -> String {
        self.criteria
            .iter()
            .map(|c| format!("({})", c.as_sql_for(side)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Same filter against the equally named fields of `table`
    pub(crate) fn rebind(&self, table: &Table) -> Result<Filter> {
        let mut filter = Filter::new(self.name.clone(), table);
        for criteria in &self.criteria {
            filter.add_criteria(criteria.rebind(table)?)?;
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.as_string())
    }
}
