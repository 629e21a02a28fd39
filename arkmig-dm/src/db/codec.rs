//! Conversion between SQLite cells and typed values
//!
//! Decimals and datetimes are stored as TEXT, durations as INTEGER
//! milliseconds. Decoding tolerates the loosely typed cells SQLite allows
//! (e.g. an integer in a TEXT column).

use arkmig_common::model::DATETIME_FORMAT;
use arkmig_common::{DataType, Value};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Row as _, ValueRef};

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Decode column `index` of `row` as `datatype`
pub(crate) fn decode_value(
    row: &SqliteRow,
    index: usize,
    datatype: DataType,
) -> std::result::Result<Value, String> {
    let raw = row.try_get_raw(index).map_err(|e| e.to_string())?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match datatype {
        DataType::String => row
            .try_get::<String, _>(index)
            .or_else(|_| row.try_get::<i64, _>(index).map(|v| v.to_string()))
            .or_else(|_| row.try_get::<f64, _>(index).map(|v| v.to_string()))
            .map(Value::String)
            .map_err(|e| e.to_string()),
        DataType::Int32 => row
            .try_get::<i32, _>(index)
            .map(Value::Int32)
            .or_else(|_| text_cell(row, index, datatype)),
        DataType::Int64 => row
            .try_get::<i64, _>(index)
            .map(Value::Int64)
            .or_else(|_| text_cell(row, index, datatype)),
        DataType::Decimal => match row.try_get::<String, _>(index) {
            Ok(text) => datatype.parse(&text),
            Err(_) => row
                .try_get::<i64, _>(index)
                .map(|v| Value::Decimal(v.into()))
                .or_else(|_| row.try_get::<f64, _>(index).map(Value::decimal_from_f64))
                .map_err(|e| e.to_string()),
        },
        DataType::DateTime => text_cell(row, index, datatype),
        DataType::Duration => row
            .try_get::<i64, _>(index)
            .map(|ms| Value::Duration(chrono::Duration::milliseconds(ms)))
            .or_else(|_| text_cell(row, index, datatype)),
    }
}

fn text_cell(
    row: &SqliteRow,
    index: usize,
    datatype: DataType,
) -> std::result::Result<Value, String> {
    let text = row.try_get::<String, _>(index).map_err(|e| e.to_string())?;
    datatype.parse(&text)
}

/// Bind `value` in its storage form
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::String(s) => query.bind(s.clone()),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::DateTime(v) => query.bind(v.format(DATETIME_FORMAT).to_string()),
        Value::Duration(d) => query.bind(d.num_milliseconds()),
    }
}
