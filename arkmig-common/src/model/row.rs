//! Rows and per-field data objects

use super::value::Value;

static NULL_VALUE: Value = Value::Null;

/// Holder for one field's value within a row
///
/// Carries the value as delivered (source) and, once mapped or manipulated,
/// the target value. Readers use [`DataObject::value`], which prefers the
/// target value when one has been set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataObject {
    source: Value,
    target: Option<Value>,
}

impl DataObject {
    pub fn new(source: Value) -> Self {
        Self {
            source,
            target: None,
        }
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn target(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    /// Current value: target if set, otherwise source
    pub fn value(&self) -> &Value {
        self.target.as_ref().unwrap_or(&self.source)
    }

    pub fn set_target(&mut self, value: Value) {
        self.target = Some(value);
    }

    /// Set the value to null
    pub fn clear(&mut self) {
        self.target = Some(Value::Null);
    }
}

/// One record: a data object per field of its table, in field order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    objects: Vec<DataObject>,
}

/// A batch of rows for one table
pub type Batch = Vec<Row>;

impl Row {
    pub fn new(objects: Vec<DataObject>) -> Self {
        Self { objects }
    }

    /// Row of source values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            objects: values.into_iter().map(DataObject::new).collect(),
        }
    }

    /// Row of `len` null values
    pub fn nulls(len: usize) -> Self {
        Self {
            objects: vec![DataObject::default(); len],
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DataObject> {
        self.objects.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DataObject> {
        self.objects.get_mut(index)
    }

    /// Current value at `index`; null when out of range
    pub fn value(&self, index: usize) -> &Value {
        self.objects.get(index).map_or(&NULL_VALUE, DataObject::value)
    }

    /// Set the target value at `index`, growing the row with nulls if needed
    pub fn set_value(&mut self, index: usize, value: Value) {
        if index >= self.objects.len() {
            self.objects.resize(index + 1, DataObject::default());
        }
        self.objects[index].set_target(value);
    }

    pub fn objects(&self) -> &[DataObject] {
        &self.objects
    }

    /// Current values in field order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.objects.iter().map(DataObject::value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_object_prefers_target() {
        let mut object = DataObject::new(Value::from("a"));
        assert_eq!(object.value(), &Value::from("a"));
        object.set_target(Value::from("b"));
        assert_eq!(object.value(), &Value::from("b"));
        assert_eq!(object.source(), &Value::from("a"));
        object.clear();
        assert!(object.value().is_null());
    }

    #[test]
    fn test_row_values_and_growth() {
        let mut row = Row::from_values(vec![Value::Int32(1), Value::from("x")]);
        assert_eq!(row.value(0), &Value::Int32(1));
        assert!(row.value(5).is_null());

        row.set_value(3, Value::from("y"));
        assert_eq!(row.len(), 4);
        assert!(row.value(2).is_null());
        assert_eq!(row.value(3), &Value::from("y"));
    }
}
