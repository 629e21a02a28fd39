//! Candidate and foreign keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::field::Field;
use super::map::ValueMap;
use super::row::Row;
use super::value::Value;
use crate::{Error, Result};

/// Separator between field values in a key string
pub const KEY_SEPARATOR: char = '|';

const KEY_ESCAPE: char = '\\';

/// Join key values into a key string
///
/// Separators and escapes inside a value are escaped with a backslash, so
/// [`split_key_value`] returns exactly the joined values.
pub fn join_key_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    let mut key = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        for c in value.to_string().chars() {
            if c == KEY_SEPARATOR || c == KEY_ESCAPE {
                key.push(KEY_ESCAPE);
            }
            key.push(c);
        }
    }
    key
}

/// Split a key string back into its per-field parts
pub fn split_key_value(key: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        match c {
            KEY_ESCAPE => current.extend(chars.next()),
            KEY_SEPARATOR => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// One key member: a field plus an optional per-field map
#[derive(Debug, Clone)]
pub struct KeyField {
    field: Arc<Field>,
    map: Option<Arc<dyn ValueMap>>,
}

impl KeyField {
    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    pub fn map(&self) -> Option<&Arc<dyn ValueMap>> {
        self.map.as_ref()
    }
}

/// Ordered set of fields belonging to one table
///
/// Every member field must be owned by the key's table; `add_field` rejects
/// foreign fields with [`Error::Metadata`].
#[derive(Debug, Clone)]
pub struct Key {
    name: String,
    table: String,
    fields: Vec<KeyField>,
}

impl Key {
    /// Create an empty key owned by the table with target name `table`
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field
    pub fn add_field(&mut self, field: Arc<Field>, map: Option<Arc<dyn ValueMap>>) -> Result<()> {
        if field.table() != self.table {
            return Err(Error::Metadata(format!(
                "Key '{}' belongs to table '{}' but field '{}' belongs to table '{}'",
                self.name,
                self.table,
                field.target_name(),
                field.table()
            )));
        }
        self.fields.push(KeyField { field, map });
        Ok(())
    }

    /// Builder form of [`Key::add_field`] without a map
    pub fn with_field(mut self, field: Arc<Field>) -> Result<Self> {
        self.add_field(field, None)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Target names of the member fields, in key order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|kf| kf.field.target_name()).collect()
    }

    /// Key string of `row`, or `None` when any member value is null
    ///
    /// Per-field maps are applied before joining.
    pub fn value_of(&self, row: &Row) -> Result<Option<String>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for kf in &self.fields {
            let raw = row.value(kf.field.ordinal());
            let value = match &kf.map {
                Some(map) => map.map(raw).map_err(|reason| Error::Conversion {
                    field: kf.field.target_name().to_string(),
                    value: raw.to_string(),
                    datatype: map.describe(),
                    reason,
                })?,
                None => raw.clone(),
            };
            if value.is_null() {
                return Ok(None);
            }
            values.push(value);
        }
        Ok(Some(join_key_values(&values)))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.field_names().join(", "))
    }
}

/// Relationship cardinality of a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    #[default]
    ManyToOne,
    ManyToMany,
}

/// Reference from a table's fields to another table's candidate key
#[derive(Debug, Clone)]
pub struct ForeignKey {
    key: Key,
    referenced_table: String,
    referenced_key: String,
    cardinality: Cardinality,
}

impl ForeignKey {
    pub fn new(
        key: Key,
        referenced_table: impl Into<String>,
        referenced_key: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            key,
            referenced_table: referenced_table.into(),
            referenced_key: referenced_key.into(),
            cardinality,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn referenced_table(&self) -> &str {
        &self.referenced_table
    }

    pub fn referenced_key(&self) -> &str {
        &self.referenced_key
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
}
