//! Single-field predicates
//!
//! A criteria describes which values of one field are *kept*. It has two
//! representations that must agree: [`Criteria::exclude`] tests a value in
//! memory, and [`Criteria::as_sql`] renders the keep-condition as SQL. A value
//! is excluded in memory exactly when a row holding it would not satisfy the
//! SQL predicate (nulls never satisfy a comparison).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::model::{DataType, Field, NameSide, Table, Value};
use crate::{Error, Result};

/// Extension point for predicates outside the built-in variants
pub trait ValuePredicate: fmt::Debug + Send + Sync {
    /// Human-readable form, given the field's target name
    fn as_string(&self, field: &str) -> String;

    /// SQL keep-condition, given the quoted column operand
    fn as_sql(&self, column: &str) -> String;

    /// True when `value` must be excluded
    fn exclude(&self, value: &Value) -> bool;
}

/// Predicate variant
#[derive(Debug, Clone)]
pub enum CriteriaKind {
    /// Keep values equal to the operand
    Equal(Value),
    /// Keep values within `[low, high]`
    Interval { low: Value, high: Value },
    /// Keep values that are members of the pool
    Pool(Vec<Value>),
    /// Keep values that are neither null nor the type's default (empty/zero)
    NotNull,
    /// Exclude unconditionally (field-level exclusion)
    ExcludeField,
    /// Caller-supplied predicate
    Custom(Arc<dyn ValuePredicate>),
}

/// Configuration form of a criteria; values are text and are converted to the
/// field's declared datatype when the criteria is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CriteriaSpec {
    Equal { field: String, value: String },
    Interval { field: String, low: String, high: String },
    Pool { field: String, values: Vec<String> },
    NotNull { field: String },
    ExcludeField { field: String },
}

impl CriteriaSpec {
    pub fn field(&self) -> &str {
        match self {
            CriteriaSpec::Equal { field, .. }
            | CriteriaSpec::Interval { field, .. }
            | CriteriaSpec::Pool { field, .. }
            | CriteriaSpec::NotNull { field }
            | CriteriaSpec::ExcludeField { field } => field,
        }
    }
}

/// Predicate over one field's value
#[derive(Debug, Clone)]
pub struct Criteria {
    field: Arc<Field>,
    kind: CriteriaKind,
}

fn typed_operand(field: &Field, value: Value) -> Result<Value> {
    if value.is_null() {
        return Err(Error::Config(format!(
            "Criteria operand for field '{}' cannot be null",
            field.target_name()
        )));
    }
    value
        .convert_to(field.datatype())
        .map_err(|reason| Error::Conversion {
            field: field.target_name().to_string(),
            value: value.to_string(),
            datatype: field.datatype().to_string(),
            reason,
        })
}

impl Criteria {
    /// Keep values equal to `value` (converted to the field's datatype)
    pub fn equal(field: Arc<Field>, value: impl Into<Value>) -> Result<Self> {
        let value = typed_operand(&field, value.into())?;
        Ok(Self {
            field,
            kind: CriteriaKind::Equal(value),
        })
    }

    /// Keep values within the inclusive range `[low, high]`
    pub fn interval(
        field: Arc<Field>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Result<Self> {
        let low = typed_operand(&field, low.into())?;
        let high = typed_operand(&field, high.into())?;
        if low.compare(&high) == Some(Ordering::Greater) {
            return Err(Error::Config(format!(
                "Interval for field '{}' has low bound {} above high bound {}",
                field.target_name(),
                low,
                high
            )));
        }
        Ok(Self {
            field,
            kind: CriteriaKind::Interval { low, high },
        })
    }

    /// Keep values that are members of `values`
    pub fn pool<V: Into<Value>>(
        field: Arc<Field>,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let values = values
            .into_iter()
            .map(|v| typed_operand(&field, v.into()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            field,
            kind: CriteriaKind::Pool(values),
        })
    }

    /// Keep values that are neither null nor the datatype default
    pub fn not_null(field: Arc<Field>) -> Self {
        Self {
            field,
            kind: CriteriaKind::NotNull,
        }
    }

    /// Exclude the field unconditionally
    pub fn exclude_field(field: Arc<Field>) -> Self {
        Self {
            field,
            kind: CriteriaKind::ExcludeField,
        }
    }

    pub fn custom(field: Arc<Field>, predicate: Arc<dyn ValuePredicate>) -> Self {
        Self {
            field,
            kind: CriteriaKind::Custom(predicate),
        }
    }

    /// Build from configuration, resolving the field on `table`
    ///
    /// Fails with [`Error::NotFound`] when the field is absent and with
    /// [`Error::Conversion`] when a value does not parse as the field's datatype.
    pub fn from_spec(table: &Table, spec: &CriteriaSpec) -> Result<Self> {
        let field = Arc::clone(table.require_field(spec.field())?);
        let datatype = field.datatype();
        let parse = |text: &str| datatype.parse_value(field.target_name(), text);

        match spec {
            CriteriaSpec::Equal { value, .. } => {
                let value = parse(value)?;
                Criteria::equal(field, value)
            }
            CriteriaSpec::Interval { low, high, .. } => {
                let low = parse(low)?;
                let high = parse(high)?;
                Criteria::interval(field, low, high)
            }
            CriteriaSpec::Pool { values, .. } => {
                let values = values
                    .iter()
                    .map(|v| parse(v))
                    .collect::<Result<Vec<_>>>()?;
                Criteria::pool(field, values)
            }
            CriteriaSpec::NotNull { .. } => Ok(Criteria::not_null(field)),
            CriteriaSpec::ExcludeField { .. } => Ok(Criteria::exclude_field(field)),
        }
    }

    pub fn field(&self) -> &Arc<Field> {
        &self.field
    }

    pub fn kind(&self) -> &CriteriaKind {
        &self.kind
    }

    /// True when `value` does not satisfy this criteria
    pub fn exclude(&self, value: &Value) -> bool {
        match &self.kind {
            CriteriaKind::Equal(operand) => !value.matches(operand),
            CriteriaKind::Interval { low, high } => {
                let above_low = matches!(
                    value.compare(low),
                    Some(Ordering::Greater | Ordering::Equal)
                );
                let below_high = matches!(
                    value.compare(high),
                    Some(Ordering::Less | Ordering::Equal)
                );
                !(above_low && below_high)
            }
            CriteriaKind::Pool(values) => !values.iter().any(|v| value.matches(v)),
            CriteriaKind::NotNull => value.is_null() || value.is_default(),
            CriteriaKind::ExcludeField => true,
            CriteriaKind::Custom(predicate) => predicate.exclude(value),
        }
    }

    /// True for criteria that drop the whole field rather than test its value
    pub fn excludes_field(&self) -> bool {
        matches!(self.kind, CriteriaKind::ExcludeField)
    }

    /// Human-readable form
    pub fn as_string(&self) -> String {
        let name = self.field.target_name();
        match &self.kind {
            CriteriaKind::Equal(v) => format!("{} = {}", name, v),
            CriteriaKind::Interval { low, high } => {
                format!("{} between {} and {}", name, low, high)
            }
            CriteriaKind::Pool(values) => format!(
                "{} in ({})",
                name,
                values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
            ),
            CriteriaKind::NotNull => format!("{} is not null", name),
            CriteriaKind::ExcludeField => format!("{} excluded", name),
            CriteriaKind::Custom(predicate) => predicate.as_string(name),
        }
    }

    /// SQL keep-condition using target column names
    pub fn as_sql(&self) -> String {
        self.as_sql_for(NameSide::Target)
    }

    /// SQL keep-condition using the column names of `side`
    pub fn as_sql_for(&self, side: NameSide) -> String {
        let column = self.field.column(side);
        let operand = sql_operand(&self.field, side);

        match &self.kind {
            CriteriaKind::Equal(v) => format!("{} = {}", operand, v.to_sql_literal()),
            CriteriaKind::Interval { low, high } => format!(
                "{} BETWEEN {} AND {}",
                operand,
                low.to_sql_literal(),
                high.to_sql_literal()
            ),
            CriteriaKind::Pool(values) if values.is_empty() => "1 = 0".to_string(),
            CriteriaKind::Pool(values) => format!(
                "{} IN ({})",
                operand,
                values
                    .iter()
                    .map(Value::to_sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            CriteriaKind::NotNull => match self.field.datatype() {
                DataType::String => format!("{} IS NOT NULL AND {} <> ''", column, column),
                DataType::DateTime => format!("{} IS NOT NULL", operand),
                _ => format!("{} IS NOT NULL AND {} <> 0", column, operand),
            },
            CriteriaKind::ExcludeField => "1 = 0".to_string(),
            CriteriaKind::Custom(predicate) => predicate.as_sql(&operand),
        }
    }

    /// Same criteria against the equally named field of `table`
    pub(crate) fn rebind(&self, table: &Table) -> Result<Criteria> {
        let field = Arc::clone(table.require_field(self.field.target_name())?);
        Ok(Criteria {
            field,
            kind: self.kind.clone(),
        })
    }
}

/// Column expression criteria compare against
///
/// Decimals and datetimes are stored as text, so they are compared through
/// their numeric and canonical datetime forms rather than as raw text.
pub fn sql_operand(field: &Field, side: NameSide) -> String {
    let column = field.column(side);
    match field.datatype() {
        DataType::Decimal => format!("CAST({} AS REAL)", column),
        DataType::DateTime => format!("datetime({})", column),
        _ => column,
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn table() -> Table {
        let mut table = Table::new("cases", "CASES");
        table.add_field(Field::new("emp", "EmployeeID", DataType::Int32)).unwrap();
        table.add_field(Field::new("status", "Status", DataType::String)).unwrap();
        table.add_field(Field::new("opened", "Opened", DataType::DateTime)).unwrap();
        table.add_field(Field::new("amount", "Amount", DataType::Decimal)).unwrap();
        table
    }

    fn field(table: &Table, name: &str) -> Arc<Field> {
        table.field(name).unwrap().clone()
    }

    #[test]
    fn test_equal() {
        let t = table();
        let c = Criteria::equal(field(&t, "EmployeeID"), 4).unwrap();
        assert!(!c.exclude(&Value::Int32(4)));
        assert!(!c.exclude(&Value::Int64(4)));
        assert!(c.exclude(&Value::Int32(5)));
        assert!(c.exclude(&Value::Null));
        assert_eq!(c.as_string(), "EmployeeID = 4");
        assert_eq!(c.as_sql(), "\"EmployeeID\" = 4");
        assert_eq!(c.as_sql_for(NameSide::Source), "\"emp\" = 4");
    }

    #[test]
    fn test_operand_converted_to_declared_type() {
        let t = table();
        let c = Criteria::equal(field(&t, "EmployeeID"), "4").unwrap();
        assert!(matches!(c.kind(), CriteriaKind::Equal(Value::Int32(4))));

        let err = Criteria::equal(field(&t, "EmployeeID"), "four").unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert!(Criteria::equal(field(&t, "EmployeeID"), Value::Null).is_err());
    }

    #[test]
    fn test_interval_inclusive() {
        let t = table();
        let c = Criteria::from_spec(
            &t,
            &CriteriaSpec::Interval {
                field: "Opened".into(),
                low: "2020-01-01".into(),
                high: "2020-12-31 23:59:59".into(),
            },
        )
        .unwrap();

        let parse = |s: &str| DataType::DateTime.parse(s).unwrap();
        assert!(!c.exclude(&parse("2020-01-01 00:00:00")));
        assert!(!c.exclude(&parse("2020-12-31 23:59:59")));
        assert!(c.exclude(&parse("2021-01-01 00:00:00")));
        assert!(c.exclude(&Value::Null));
        assert_eq!(
            c.as_sql(),
            "datetime(\"Opened\") BETWEEN '2020-01-01 00:00:00' AND '2020-12-31 23:59:59'"
        );
    }

    #[test]
    fn test_interval_bounds_validated() {
        let t = table();
        let err = Criteria::interval(field(&t, "EmployeeID"), 10, 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_pool() {
        let t = table();
        let c = Criteria::pool(field(&t, "Status"), ["A", "B"]).unwrap();
        assert!(!c.exclude(&Value::from("A")));
        assert!(c.exclude(&Value::from("C")));
        assert_eq!(c.as_sql(), "\"Status\" IN ('A', 'B')");
        assert_eq!(c.as_string(), "Status in (A, B)");

        let empty = Criteria::pool(field(&t, "Status"), Vec::<Value>::new()).unwrap();
        assert!(empty.exclude(&Value::from("A")));
        assert_eq!(empty.as_sql(), "1 = 0");
    }

    #[test]
    fn test_decimal_pool_from_spec() {
        let t = table();
        let c = Criteria::from_spec(
            &t,
            &CriteriaSpec::Pool {
                field: "Amount".into(),
                values: vec!["1.50".into(), "2".into()],
            },
        )
        .unwrap();
        assert!(!c.exclude(&Value::Decimal(Decimal::new(15, 1))));
        assert!(c.exclude(&Value::Decimal(Decimal::new(3, 0))));
        assert_eq!(c.as_sql(), "CAST(\"Amount\" AS REAL) IN (1.50, 2)");

        let err = Criteria::from_spec(
            &t,
            &CriteriaSpec::Pool {
                field: "Amount".into(),
                values: vec!["abc".into()],
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn test_not_null_excludes_defaults() {
        let t = table();
        let s = Criteria::not_null(field(&t, "Status"));
        assert!(s.exclude(&Value::Null));
        assert!(s.exclude(&Value::from("")));
        assert!(!s.exclude(&Value::from("A")));
        assert_eq!(s.as_sql(), "\"Status\" IS NOT NULL AND \"Status\" <> ''");

        let n = Criteria::not_null(field(&t, "EmployeeID"));
        assert!(n.exclude(&Value::Int32(0)));
        assert!(!n.exclude(&Value::Int32(3)));
        assert_eq!(n.as_sql(), "\"EmployeeID\" IS NOT NULL AND \"EmployeeID\" <> 0");
    }

    #[test]
    fn test_datetime_compared_in_canonical_form() {
        let t = table();
        let opened = field(&t, "Opened");
        let at = DataType::DateTime.parse("2020-03-01T08:30:00").unwrap();

        let c = Criteria::equal(Arc::clone(&opened), at.clone()).unwrap();
        assert_eq!(c.as_sql(), "datetime(\"Opened\") = '2020-03-01 08:30:00'");

        let c = Criteria::pool(Arc::clone(&opened), [at]).unwrap();
        assert_eq!(c.as_sql(), "datetime(\"Opened\") IN ('2020-03-01 08:30:00')");

        let c = Criteria::not_null(opened);
        assert!(c.exclude(&Value::Null));
        assert_eq!(c.as_sql(), "datetime(\"Opened\") IS NOT NULL");
    }

    #[test]
    fn test_exclude_field() {
        let t = table();
        let c = Criteria::exclude_field(field(&t, "Status"));
        assert!(c.exclude(&Value::from("anything")));
        assert!(c.excludes_field());
        assert_eq!(c.as_sql(), "1 = 0");
    }

    #[test]
    fn test_from_spec_missing_field() {
        let t = table();
        let err = Criteria::from_spec(&t, &CriteriaSpec::NotNull { field: "Nope".into() })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[derive(Debug)]
    struct Even;

    impl ValuePredicate for Even {
        fn as_string(&self, field: &str) -> String {
            format!("{} is even", field)
        }

        fn as_sql(&self, column: &str) -> String {
            format!("{} % 2 = 0", column)
        }

        fn exclude(&self, value: &Value) -> bool {
            !matches!(value, Value::Int32(v) if v % 2 == 0)
        }
    }

    #[test]
    fn test_custom_predicate() {
        let t = table();
        let c = Criteria::custom(field(&t, "EmployeeID"), Arc::new(Even));
        assert!(!c.exclude(&Value::Int32(2)));
        assert!(c.exclude(&Value::Int32(3)));
        assert_eq!(c.as_sql(), "\"EmployeeID\" % 2 = 0");
        assert_eq!(c.to_string(), "EmployeeID is even");
    }

    #[test]
    fn test_spec_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            criteria: Vec<CriteriaSpec>,
        }
        let doc: Doc = toml::from_str(
            r#"
            criteria = [
                { type = "equal", field = "Status", value = "A" },
                { type = "not_null", field = "EmployeeID" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(doc.criteria.len(), 2);
        assert_eq!(doc.criteria[1].field(), "EmployeeID");
    }
}
