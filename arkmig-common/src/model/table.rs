//! Table definitions

use std::sync::Arc;

use super::field::Field;
use super::key::{ForeignKey, Key};
use super::row::Row;
use crate::predicate::Filter;
use crate::{Error, Result};

/// Named collection of fields with keys and filters
///
/// Constructed once by the metadata loader and shared read-only (`Arc<Table>`)
/// during processing. Code that needs a privately filtered view works on a
/// [`Table::deep_clone`] instead of mutating the shared table.
#[derive(Debug)]
pub struct Table {
    source_name: String,
    target_name: String,
    description: Option<String>,
    fields: Vec<Arc<Field>>,
    candidate_keys: Vec<Key>,
    foreign_keys: Vec<ForeignKey>,
    record_filters: Vec<Filter>,
    field_filters: Vec<Filter>,
}

impl Table {
    pub fn new(source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            description: None,
            fields: Vec::new(),
            candidate_keys: Vec::new(),
            foreign_keys: Vec::new(),
            record_filters: Vec::new(),
            field_filters: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Case-insensitive match against source or target name
    pub fn matches_name(&self, name: &str) -> bool {
        self.source_name.eq_ignore_ascii_case(name) || self.target_name.eq_ignore_ascii_case(name)
    }

    /// Attach a field; returns the shared handle used by keys and criteria
    pub fn add_field(&mut self, mut field: Field) -> Result<Arc<Field>> {
        if self.fields.iter().any(|f| {
            f.source_name().eq_ignore_ascii_case(field.source_name())
                || f.target_name().eq_ignore_ascii_case(field.target_name())
        }) {
            return Err(Error::Metadata(format!(
                "Duplicate field '{}' in table '{}'",
                field.target_name(),
                self.target_name
            )));
        }
        field.attach(&self.target_name, self.fields.len());
        let field = Arc::new(field);
        self.fields.push(Arc::clone(&field));
        Ok(field)
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Find a field by source or target name (case-insensitive)
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.matches(name))
    }

    /// Like [`Table::field`] but fails with [`Error::NotFound`]
    pub fn require_field(&self, name: &str) -> Result<&Arc<Field>> {
        self.field(name).ok_or_else(|| {
            Error::NotFound(format!(
                "Field '{}' not found in table '{}'",
                name, self.target_name
            ))
        })
    }

    /// Resolve several field names, preserving order
    pub fn require_fields<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<Field>>> {
        names
            .iter()
            .map(|name| self.require_field(name.as_ref()).cloned())
            .collect()
    }

    fn check_owned(&self, what: &str, name: &str, table: &str) -> Result<()> {
        if table != self.target_name {
            return Err(Error::Metadata(format!(
                "{} '{}' belongs to table '{}', not '{}'",
                what, name, table, self.target_name
            )));
        }
        Ok(())
    }

    /// Add a candidate key; the first one added is the primary key
    pub fn add_candidate_key(&mut self, key: Key) -> Result<()> {
        self.check_owned("Key", key.name(), key.table())?;
        self.candidate_keys.push(key);
        Ok(())
    }

    pub fn candidate_keys(&self) -> &[Key] {
        &self.candidate_keys
    }

    pub fn candidate_key(&self, name: &str) -> Option<&Key> {
        self.candidate_keys
            .iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&Key> {
        self.candidate_keys.first()
    }

    pub fn require_primary_key(&self) -> Result<&Key> {
        self.primary_key().ok_or_else(|| {
            Error::Metadata(format!("Table '{}' has no primary key", self.target_name))
        })
    }

    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> Result<()> {
        self.check_owned("Foreign key", foreign_key.name(), foreign_key.key().table())?;
        self.foreign_keys.push(foreign_key);
        Ok(())
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    pub fn add_record_filter(&mut self, filter: Filter) -> Result<()> {
        self.check_owned("Filter", filter.name(), filter.table())?;
        self.record_filters.push(filter);
        Ok(())
    }

    pub fn record_filters(&self) -> &[Filter] {
        &self.record_filters
    }

    pub fn add_field_filter(&mut self, filter: Filter) -> Result<()> {
        self.check_owned("Filter", filter.name(), filter.table())?;
        self.field_filters.push(filter);
        Ok(())
    }

    pub fn field_filters(&self) -> &[Filter] {
        &self.field_filters
    }

    /// True if any record-level filter excludes `row`
    pub fn excludes_row(&self, row: &Row) -> bool {
        self.record_filters.iter().any(|f| f.exclude_row(row))
    }

    /// True if any field-level filter excludes `field`
    pub fn excludes_field(&self, field: &Field) -> bool {
        self.field_filters.iter().any(|f| f.exclude_field(field))
    }

    /// Row with one null value per field
    pub fn empty_row(&self) -> Row {
        Row::nulls(self.fields.len())
    }

    /// Rebuild this table as a new, independent instance
    ///
    /// Fields are copied and re-attached; keys and filters are re-resolved by
    /// field name against the copy, so filters added to the clone never reach
    /// `self`.
    pub fn deep_clone(&self) -> Result<Table> {
        let mut clone = Table::new(self.source_name.clone(), self.target_name.clone());
        clone.description = self.description.clone();

        for field in &self.fields {
            clone.add_field(Field::clone(field))?;
        }
        for key in &self.candidate_keys {
            let key = clone.rebind_key(key)?;
            clone.candidate_keys.push(key);
        }
        for foreign_key in &self.foreign_keys {
            let key = clone.rebind_key(foreign_key.key())?;
            clone.foreign_keys.push(ForeignKey::new(
                key,
                foreign_key.referenced_table(),
                foreign_key.referenced_key(),
                foreign_key.cardinality(),
            ));
        }
        for filter in &self.record_filters {
            let filter = filter.rebind(&clone)?;
            clone.record_filters.push(filter);
        }
        for filter in &self.field_filters {
            let filter = filter.rebind(&clone)?;
            clone.field_filters.push(filter);
        }
        Ok(clone)
    }

    fn rebind_key(&self, key: &Key) -> Result<Key> {
        let mut rebound = Key::new(key.name(), &self.target_name);
        for kf in key.fields() {
            let field = self.require_field(kf.field().target_name())?;
            rebound.add_field(Arc::clone(field), kf.map().cloned())?;
        }
        Ok(rebound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, Value};
    use crate::predicate::Criteria;

    fn cases() -> Table {
        let mut table = Table::new("cases", "CASES");
        let case_id = table.add_field(Field::new("case_id", "CaseID", DataType::Int32)).unwrap();
        table.add_field(Field::new("emp_id", "EmployeeID", DataType::Int32)).unwrap();
        let key = Key::new("PK_CASES", "CASES").with_field(case_id).unwrap();
        table.add_candidate_key(key).unwrap();
        table
    }

    #[test]
    fn test_field_lookup_and_ordinals() {
        let table = cases();
        let field = table.require_field("emp_id").unwrap();
        assert_eq!(field.ordinal(), 1);
        assert_eq!(field.table(), "CASES");
        assert!(table.matches_name("cases"));
        assert!(matches!(table.require_field("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut table = cases();
        let err = table
            .add_field(Field::new("x", "caseid", DataType::Int32))
            .unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
    }

    #[test]
    fn test_primary_key_is_first_candidate() {
        let mut table = cases();
        let emp = table.field("EmployeeID").unwrap().clone();
        table
            .add_candidate_key(Key::new("AK_CASES", "CASES").with_field(emp).unwrap())
            .unwrap();
        assert_eq!(table.primary_key().unwrap().name(), "PK_CASES");
        assert_eq!(table.candidate_keys().len(), 2);
    }

    #[test]
    fn test_deep_clone_isolates_filters() {
        let table = cases();
        let mut clone = table.deep_clone().unwrap();

        let field = clone.require_field("EmployeeID").unwrap().clone();
        let mut filter = Filter::new("not_null", &clone);
        filter.add_criteria(Criteria::not_null(field)).unwrap();
        clone.add_record_filter(filter).unwrap();

        assert_eq!(clone.record_filters().len(), 1);
        assert!(table.record_filters().is_empty());
        assert_eq!(clone.primary_key().unwrap().field_names(), vec!["CaseID"]);

        let row = Row::from_values(vec![Value::Int32(1), Value::Null]);
        assert!(clone.excludes_row(&row));
        assert!(!table.excludes_row(&row));
    }

    #[test]
    fn test_filter_from_other_table_rejected() {
        let mut table = cases();
        let other = Table::new("emp", "EMPLOYEE");
        let err = table.add_record_filter(Filter::new("f", &other)).unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
    }
}
