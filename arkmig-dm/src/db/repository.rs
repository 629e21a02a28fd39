//! [`SqliteRepository`]: paged batch reads, point counts and batch inserts

use arkmig_common::model::{quote_identifier, split_key_value};
use arkmig_common::{Batch, Criteria, DataType, Error, Key, NameSide, Result, Row, Table};
use async_stream::stream;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row as _, SqlitePool};
use tracing::debug;

use super::codec::{bind_value, decode_value};
use crate::repository::{BatchSink, BatchStream, DataQueryer, DataRepository};

/// Repository over one SQLite database holding both source and target tables
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
    batch_size: usize,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the table named after `side` of `table` when it does not exist
    pub async fn ensure_table(&self, table: &Table, side: NameSide) -> Result<()> {
        let name = table_name(table, side);
        let columns = table
            .fields()
            .iter()
            .map(|f| {
                let mut column = format!("{} {}", f.column(side), f.datatype_for(side).sql_type());
                if !f.is_nullable() {
                    column.push_str(" NOT NULL");
                }
                column
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(name),
            columns
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::query(name, "Create table", e))?;
        debug!("Ensured table {}", name);
        Ok(())
    }

    /// Batches of `table` read by the names of `side`
    ///
    /// Pages by rowid so no connection is held between batches.
    fn stream<'a>(&'a self, table: &'a Table, side: NameSide, filtered: bool) -> BatchStream<'a> {
        let batch_size = self.batch_size;
        let sql = select_sql(table, side, filtered);
        let name = table_name(table, side).to_string();

        Box::pin(stream! {
            let mut offset: i64 = 0;
            loop {
                let page = sqlx::query(&sql)
                    .bind(batch_size as i64)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| Error::query(&name, "Read batch", e))
                    .and_then(|rows| decode_rows(table, side, &rows));

                match page {
                    Ok(batch) => {
                        let fetched = batch.len();
                        if fetched > 0 {
                            offset += fetched as i64;
                            yield Ok(batch);
                        }
                        if fetched < batch_size {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        })
    }
}

fn table_name(table: &Table, side: NameSide) -> &str {
    match side {
        NameSide::Source => table.source_name(),
        NameSide::Target => table.target_name(),
    }
}

fn select_sql(table: &Table, side: NameSide, filtered: bool) -> String {
    let columns = table
        .fields()
        .iter()
        .map(|f| f.column(side))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "SELECT {} FROM {}",
        columns,
        quote_identifier(table_name(table, side))
    );

    if filtered {
        let conditions: Vec<String> = table
            .record_filters()
            .iter()
            .map(|f| f.as_sql_for(side))
            .filter(|s| !s.is_empty())
            .map(|s| format!("({})", s))
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
    }

    sql.push_str(" ORDER BY rowid LIMIT ? OFFSET ?");
    sql
}

fn decode_rows(table: &Table, side: NameSide, rows: &[SqliteRow]) -> Result<Batch> {
    rows.iter()
        .map(|row| {
            let mut values = Vec::with_capacity(table.fields().len());
            for (index, field) in table.fields().iter().enumerate() {
                let datatype = field.datatype_for(side);
                let value =
                    decode_value(row, index, datatype).map_err(|reason| Error::Conversion {
                        field: field.name(side).to_string(),
                        value: format!("column {}", index),
                        datatype: datatype.name().to_string(),
                        reason,
                    })?;
                values.push(value);
            }
            Ok(Row::from_values(values))
        })
        .collect()
}

impl DataRepository for SqliteRepository {
    fn data_get_from_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a> {
        self.stream(table, NameSide::Source, true)
    }

    fn data_get_for_target_table<'a>(&'a self, table: &'a Table) -> BatchStream<'a> {
        self.stream(table, NameSide::Target, false)
    }

    fn data_queryer(&self) -> Option<&dyn DataQueryer> {
        Some(self)
    }
}

#[async_trait]
impl DataQueryer for SqliteRepository {
    async fn count_matching_key(
        &self,
        table: &Table,
        key: &Key,
        extra: &[Criteria],
        value: &str,
    ) -> Result<i64> {
        let parts = split_key_value(value);
        if parts.len() != key.len() {
            return Err(Error::InvalidInput(format!(
                "Key value '{}' has {} parts, {} expects {}",
                value,
                parts.len(),
                key,
                key.len()
            )));
        }

        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for (kf, part) in key.fields().iter().zip(parts) {
            let field = kf.field();
            values.push(
                field
                    .source_datatype()
                    .parse_value(field.target_name(), &part)?,
            );
            // Key values are bound in storage form; only datetimes need normalizing
            let column = match field.source_datatype() {
                DataType::DateTime => format!("datetime({})", field.column(NameSide::Source)),
                _ => field.column(NameSide::Source),
            };
            conditions.push(format!("{} = ?", column));
        }
        for criteria in extra {
            let sql = criteria.as_sql_for(NameSide::Source);
            if !sql.is_empty() {
                conditions.push(format!("({})", sql));
            }
        }

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote_identifier(table.source_name()),
            conditions.join(" AND ")
        );
        let mut query = sqlx::query(&sql);
        for value in &values {
            query = bind_value(query, value);
        }

        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::query(table.source_name(), "Count matching key", e))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| Error::query(table.source_name(), "Count matching key", e))
    }
}

#[async_trait]
impl BatchSink for SqliteRepository {
    async fn write_batch(&self, table: &Table, batch: &[Row]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let name = table.target_name();
        let columns = table
            .fields()
            .iter()
            .map(|f| f.column(NameSide::Target))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; table.fields().len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(name),
            columns,
            placeholders
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::query(name, "Begin write", e))?;

        for row in batch {
            let mut query = sqlx::query(&sql);
            for field in table.fields() {
                let raw = row.value(field.ordinal());
                let value =
                    raw.convert_to(field.target_datatype())
                        .map_err(|reason| Error::Conversion {
                            field: field.target_name().to_string(),
                            value: raw.to_string(),
                            datatype: field.target_datatype().name().to_string(),
                            reason,
                        })?;
                query = bind_value(query, &value);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::query(name, "Write batch", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::query(name, "Commit batch", e))?;
        debug!("Wrote {} rows to {}", batch.len(), name);
        Ok(batch.len() as u64)
    }
}
