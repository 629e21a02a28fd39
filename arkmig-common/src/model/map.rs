//! Pluggable source → target value transforms

use std::collections::HashMap;
use std::fmt;

use super::value::{DataType, Value};
use crate::Result;

/// Transforms a source value into its target representation
pub trait ValueMap: fmt::Debug + Send + Sync {
    /// Map one value; the error is a human-readable reason
    fn map(&self, value: &Value) -> std::result::Result<Value, String>;

    /// Short description for logs and filter text
    fn describe(&self) -> String;
}

/// Text-keyed lookup table
///
/// Source values are looked up by their key-string form. Values without an
/// entry map to the fallback if one is configured, otherwise they are
/// converted to the target datatype unchanged.
#[derive(Debug, Clone)]
pub struct LookupMap {
    target_type: DataType,
    entries: HashMap<String, Value>,
    fallback: Option<Value>,
}

impl LookupMap {
    pub fn new(target_type: DataType) -> Self {
        Self {
            target_type,
            entries: HashMap::new(),
            fallback: None,
        }
    }

    /// Add a mapping; `to` is parsed as the target datatype
    pub fn entry(mut self, from: impl Into<String>, to: &str) -> Result<Self> {
        let from = from.into();
        let value = self.target_type.parse_value(&from, to)?;
        self.entries.insert(from, value);
        Ok(self)
    }

    /// Value used for unmapped source values
    pub fn fallback(mut self, to: &str) -> Result<Self> {
        self.fallback = Some(self.target_type.parse_value("fallback", to)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ValueMap for LookupMap {
    fn map(&self, value: &Value) -> std::result::Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(mapped) = self.entries.get(&value.to_string()) {
            return Ok(mapped.clone());
        }
        match &self.fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => value.convert_to(self.target_type),
        }
    }

    fn describe(&self) -> String {
        format!("lookup({} entries -> {})", self.entries.len(), self.target_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_map() {
        let map = LookupMap::new(DataType::String)
            .entry("A", "Active")
            .unwrap()
            .entry("I", "Inactive")
            .unwrap();

        assert_eq!(map.map(&Value::from("A")).unwrap(), Value::from("Active"));
        assert_eq!(map.map(&Value::from("X")).unwrap(), Value::from("X"));
        assert_eq!(map.map(&Value::Null).unwrap(), Value::Null);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_lookup_map_fallback_and_typed_target() {
        let map = LookupMap::new(DataType::Int32)
            .entry("yes", "1")
            .unwrap()
            .fallback("0")
            .unwrap();

        assert_eq!(map.map(&Value::from("yes")).unwrap(), Value::Int32(1));
        assert_eq!(map.map(&Value::from("maybe")).unwrap(), Value::Int32(0));
        assert!(LookupMap::new(DataType::Int32).entry("yes", "one").is_err());
    }
}
