//! Field (column) definitions

use std::sync::Arc;

use super::map::ValueMap;
use super::value::{quote_identifier, DataType, Value};

/// Which side of the migration a name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSide {
    /// Legacy delivery (source) names
    Source,
    /// Normalized (target) names
    Target,
}

/// Column definition with source/target naming and typing
///
/// Built with the builder methods below and then attached to exactly one
/// table via `Table::add_field`, which assigns the owning table and the
/// field's position within rows of that table.
#[derive(Debug, Clone)]
pub struct Field {
    table: String,
    ordinal: usize,
    source_name: String,
    target_name: String,
    source_type: DataType,
    target_type: DataType,
    source_length: Option<u32>,
    target_length: Option<u32>,
    nullable: bool,
    map: Option<Arc<dyn ValueMap>>,
}

impl Field {
    /// Create a field with identical source and target datatypes
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        datatype: DataType,
    ) -> Self {
        Self {
            table: String::new(),
            ordinal: 0,
            source_name: source_name.into(),
            target_name: target_name.into(),
            source_type: datatype,
            target_type: datatype,
            source_length: None,
            target_length: None,
            nullable: true,
            map: None,
        }
    }

    /// Set the source datatype
    pub fn source_type(mut self, datatype: DataType) -> Self {
        self.source_type = datatype;
        self
    }

    /// Set the target datatype
    pub fn target_type(mut self, datatype: DataType) -> Self {
        self.target_type = datatype;
        self
    }

    /// Set source and target lengths
    pub fn lengths(mut self, source: Option<u32>, target: Option<u32>) -> Self {
        self.source_length = source;
        self.target_length = target;
        self
    }

    /// Mark field as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Attach a value map
    pub fn with_map(mut self, map: Arc<dyn ValueMap>) -> Self {
        self.map = Some(map);
        self
    }

    pub(crate) fn attach(&mut self, table: &str, ordinal: usize) {
        self.table = table.to_string();
        self.ordinal = ordinal;
    }

    /// Target name of the owning table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Position of this field's value within a row
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn name(&self, side: NameSide) -> &str {
        match side {
            NameSide::Source => &self.source_name,
            NameSide::Target => &self.target_name,
        }
    }

    /// Quoted column name for SQL
    pub fn column(&self, side: NameSide) -> String {
        quote_identifier(self.name(side))
    }

    pub fn source_datatype(&self) -> DataType {
        self.source_type
    }

    pub fn target_datatype(&self) -> DataType {
        self.target_type
    }

    /// Declared datatype used for criteria and key values (the target datatype)
    pub fn datatype(&self) -> DataType {
        self.target_type
    }

    pub fn datatype_for(&self, side: NameSide) -> DataType {
        match side {
            NameSide::Source => self.source_type,
            NameSide::Target => self.target_type,
        }
    }

    pub fn source_length(&self) -> Option<u32> {
        self.source_length
    }

    pub fn target_length(&self) -> Option<u32> {
        self.target_length
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn map(&self) -> Option<&Arc<dyn ValueMap>> {
        self.map.as_ref()
    }

    /// Case-insensitive match against source or target name
    pub fn matches(&self, name: &str) -> bool {
        self.source_name.eq_ignore_ascii_case(name) || self.target_name.eq_ignore_ascii_case(name)
    }

    /// Produce the target value for a source value
    ///
    /// Applies the field's map when present, otherwise converts to the target
    /// datatype. The error is a human-readable reason.
    pub fn map_value(&self, value: &Value) -> std::result::Result<Value, String> {
        match &self.map {
            Some(map) => map.map(value),
            None => value.convert_to(self.target_type),
        }
    }
}
