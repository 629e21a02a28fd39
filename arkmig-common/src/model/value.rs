//! Typed field values
//!
//! A closed set of datatype tags and the matching value union. Criteria, maps
//! and repositories dispatch on [`DataType`] instead of inspecting runtime
//! values, so textual configuration is converted exactly once, up front.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Canonical datetime text form (also used for SQL literals)
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_INPUT_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Declared datatype of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataType {
    String,
    Int32,
    Int64,
    Decimal,
    DateTime,
    Duration,
}

impl DataType {
    /// Configuration tag for this datatype
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Decimal => "decimal",
            DataType::DateTime => "datetime",
            DataType::Duration => "duration",
        }
    }

    /// SQLite column type used when storing values of this datatype
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::String | DataType::Decimal | DataType::DateTime => "TEXT",
            DataType::Int32 | DataType::Int64 | DataType::Duration => "INTEGER",
        }
    }

    /// Whether values of this type are numeric (default value is zero)
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int32 | DataType::Int64 | DataType::Decimal | DataType::Duration
        )
    }

    /// Parse configuration text into a typed value, reporting failures against `field`
    pub fn parse_value(&self, field: &str, text: &str) -> Result<Value> {
        self.parse(text).map_err(|reason| Error::Conversion {
            field: field.to_string(),
            value: text.to_string(),
            datatype: self.name().to_string(),
            reason,
        })
    }

    /// Parse text into a typed value; the error is a human-readable reason
    pub fn parse(&self, text: &str) -> std::result::Result<Value, String> {
        match self {
            DataType::String => Ok(Value::String(text.to_string())),
            DataType::Int32 => text
                .trim()
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|e| e.to_string()),
            DataType::Int64 => text
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| e.to_string()),
            DataType::Decimal => Decimal::from_str(text.trim())
                .map(Value::Decimal)
                .map_err(|e| e.to_string()),
            DataType::DateTime => parse_datetime(text.trim()).map(Value::DateTime),
            DataType::Duration => text
                .trim()
                .parse::<i64>()
                .map(|ms| Value::Duration(Duration::milliseconds(ms)))
                .map_err(|e| format!("expected milliseconds: {}", e)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "varchar" | "char" => Ok(DataType::String),
            "int32" | "int" | "integer" => Ok(DataType::Int32),
            "int64" | "bigint" | "long" => Ok(DataType::Int64),
            "decimal" | "numeric" => Ok(DataType::Decimal),
            "datetime" | "timestamp" | "date" => Ok(DataType::DateTime),
            "duration" | "interval" => Ok(DataType::Duration),
            other => Err(Error::Config(format!("Unmapped datatype '{}'", other))),
        }
    }
}

impl TryFrom<String> for DataType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.name().to_string()
    }
}

fn parse_datetime(text: &str) -> std::result::Result<NaiveDateTime, String> {
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| "expected YYYY-MM-DD[ HH:MM:SS]".to_string())
}

/// A single field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Int32(i32),
    Int64(i64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Duration(Duration),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for the "empty" value of each type: empty string, zero, zero duration
    pub fn is_default(&self) -> bool {
        match self {
            Value::Null | Value::DateTime(_) => false,
            Value::String(s) => s.is_empty(),
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::Decimal(v) => v.is_zero(),
            Value::Duration(d) => d.num_milliseconds() == 0,
        }
    }

    /// Datatype of this value, `None` for null
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(DataType::String),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::DateTime(_) => Some(DataType::DateTime),
            Value::Duration(_) => Some(DataType::Duration),
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int32(v) => Some(Decimal::from(*v)),
            Value::Int64(v) => Some(Decimal::from(*v)),
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values with SQL-like semantics
    ///
    /// Null compares with nothing. Integers and decimals are widened before
    /// comparing; a string compared against a typed value is parsed as that type.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::String(s), typed) => {
                let parsed = typed.datatype()?.parse(s).ok()?;
                parsed.compare(typed)
            }
            (typed, Value::String(s)) => {
                let parsed = typed.datatype()?.parse(s).ok()?;
                typed.compare(&parsed)
            }
            (a, b) => Some(a.as_decimal()?.cmp(&b.as_decimal()?)),
        }
    }

    /// Semantic equality (see [`Value::compare`]); null never equals anything
    pub fn matches(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Convert to another datatype; the error is a human-readable reason
    pub fn convert_to(&self, datatype: DataType) -> std::result::Result<Value, String> {
        if self.is_null() || self.datatype() == Some(datatype) {
            return Ok(self.clone());
        }
        match (self, datatype) {
            (Value::String(s), dt) => dt.parse(s),
            (v, DataType::String) => Ok(Value::String(v.to_string())),
            (Value::Duration(d), DataType::Int64) => Ok(Value::Int64(d.num_milliseconds())),
            (Value::Int32(ms), DataType::Duration) => {
                Ok(Value::Duration(Duration::milliseconds(i64::from(*ms))))
            }
            (Value::Int64(ms), DataType::Duration) => Ok(Value::Duration(Duration::milliseconds(*ms))),
            (v, DataType::Decimal) => v
                .as_decimal()
                .map(Value::Decimal)
                .ok_or_else(|| format!("cannot convert {:?} to decimal", v)),
            (v, DataType::Int64) => whole_number(v).map(Value::Int64),
            (v, DataType::Int32) => whole_number(v).and_then(|n| {
                i32::try_from(n)
                    .map(Value::Int32)
                    .map_err(|_| format!("{} is out of range for int32", n))
            }),
            (v, dt) => Err(format!("cannot convert {:?} to {}", v, dt)),
        }
    }

    /// Render as a SQL literal
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::String(s) => quote_literal(s),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Decimal(v) => v.to_string(),
            Value::DateTime(v) => quote_literal(&v.format(DATETIME_FORMAT).to_string()),
            Value::Duration(d) => d.num_milliseconds().to_string(),
        }
    }

    /// Build a decimal value from a float (used when decoding REAL columns)
    pub fn decimal_from_f64(value: f64) -> Value {
        Decimal::from_f64(value).map_or(Value::Null, Value::Decimal)
    }
}

fn whole_number(value: &Value) -> std::result::Result<i64, String> {
    let decimal = value
        .as_decimal()
        .ok_or_else(|| format!("{:?} is not numeric", value))?;
    if !decimal.fract().is_zero() {
        return Err(format!("{} is not a whole number", decimal));
    }
    decimal
        .to_i64()
        .ok_or_else(|| format!("{} is out of range for int64", decimal))
}

/// Quote a string as a SQL text literal
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Quote a SQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl fmt::Display for Value {
    /// Key-string form: null renders empty, datetimes use [`DATETIME_FORMAT`],
    /// durations render as milliseconds. Parsing this text with the value's
    /// datatype yields the same value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => f.write_str(s),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::Duration(d) => write!(f, "{}", d.num_milliseconds()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_tags() {
        assert_eq!("int32".parse::<DataType>().unwrap(), DataType::Int32);
        assert_eq!("DateTime".parse::<DataType>().unwrap(), DataType::DateTime);
        assert_eq!("bigint".parse::<DataType>().unwrap(), DataType::Int64);
        assert!(matches!("blob".parse::<DataType>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_value_reports_field() {
        let err = DataType::Int32.parse_value("EmployeeID", "four").unwrap_err();
        match err {
            Error::Conversion { field, value, datatype, .. } => {
                assert_eq!(field, "EmployeeID");
                assert_eq!(value, "four");
                assert_eq!(datatype, "int32");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_datetime_formats() {
        let a = DataType::DateTime.parse("2021-03-04 05:06:07").unwrap();
        let b = DataType::DateTime.parse("2021-03-04T05:06:07").unwrap();
        assert_eq!(a, b);
        let day = DataType::DateTime.parse("2021-03-04").unwrap();
        assert_eq!(day.to_string(), "2021-03-04 00:00:00");
        assert!(DataType::DateTime.parse("04/03/2021").is_err());
    }

    #[test]
    fn test_numeric_widening_compare() {
        assert!(Value::Int32(4).matches(&Value::Int64(4)));
        assert!(Value::Int64(4).matches(&Value::Decimal(Decimal::new(400, 2))));
        assert_eq!(
            Value::Int32(3).compare(&Value::Int64(4)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert!(!Value::Null.matches(&Value::Null));
    }

    #[test]
    fn test_string_compared_as_typed() {
        assert!(Value::from("4").matches(&Value::Int32(4)));
        assert!(Value::Int32(4).matches(&Value::from(" 4 ")));
        assert_eq!(Value::from("x").compare(&Value::Int32(4)), None);
    }

    #[test]
    fn test_is_default() {
        assert!(Value::from("").is_default());
        assert!(Value::Int32(0).is_default());
        assert!(Value::Decimal(Decimal::ZERO).is_default());
        assert!(Value::Duration(Duration::zero()).is_default());
        assert!(!Value::Null.is_default());
        assert!(!Value::from("a").is_default());
    }

    #[test]
    fn test_convert_to() {
        assert_eq!(Value::from("12").convert_to(DataType::Int64).unwrap(), Value::Int64(12));
        assert_eq!(Value::Int64(12).convert_to(DataType::Int32).unwrap(), Value::Int32(12));
        assert!(Value::Int64(i64::MAX).convert_to(DataType::Int32).is_err());
        assert!(Value::Decimal(Decimal::new(15, 1)).convert_to(DataType::Int32).is_err());
        assert_eq!(Value::Int32(7).convert_to(DataType::String).unwrap(), Value::from("7"));
        assert_eq!(Value::Null.convert_to(DataType::Int32).unwrap(), Value::Null);
    }

    #[test]
    fn test_sql_literals() {
        assert_eq!(Value::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(Value::Int32(5).to_sql_literal(), "5");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(
            Value::Duration(Duration::milliseconds(1500)).to_sql_literal(),
            "1500"
        );
        assert_eq!(quote_identifier("Employee\"ID"), "\"Employee\"\"ID\"");
    }

    #[test]
    fn test_display_parses_back() {
        let values = [
            (DataType::Int32, Value::Int32(-3)),
            (DataType::Decimal, Value::Decimal(Decimal::new(1205, 2))),
            (DataType::DateTime, DataType::DateTime.parse("1999-12-31 23:59:59").unwrap()),
            (DataType::Duration, Value::Duration(Duration::milliseconds(90_000))),
        ];
        for (datatype, value) in values {
            assert_eq!(datatype.parse(&value.to_string()).unwrap(), value);
        }
    }
}
