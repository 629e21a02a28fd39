use arkmig_common::model::split_key_value;
use arkmig_common::{Batch, Criteria, Error, Field, Filter, Result, Row, Table, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::key_cache::{new_worker_id, CacheIdentity, WorkerId};
use super::lookup::{key_string, scan_keys};
use super::ReconcileContext;
use crate::logger::rows;
use crate::manipulator::DataManipulator;

/// Adds rows for primary keys that another table references but that were
/// never delivered
///
/// While batches stream through, the delivered primary keys are collected in
/// a cache entry private to this worker. On the last batch the non-null
/// foreign-key values of the referencing table are compared against them and
/// one row is appended per missing key, filled with the configured defaults.
pub struct PrimaryKeyAdder {
    ctx: ReconcileContext,
    worker: WorkerId,
    table: String,
    defaults: Vec<(Arc<Field>, Value)>,
    /// Referencing table restricted to rows with a non-null foreign key
    referencing: Arc<Table>,
    fk_fields: Vec<Arc<Field>>,
    delivered_identity: CacheIdentity,
    referenced_identity: CacheIdentity,
}

impl PrimaryKeyAdder {
    /// `table` is the table receiving rows; `fields` name the foreign-key
    /// fields of `foreign_table` that reference its primary key
    pub fn new(
        ctx: ReconcileContext,
        table: &str,
        foreign_table: &str,
        fields: &[String],
        defaults: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let source = ctx.metadata.data_source();
        let working = source.require_table(table)?;
        let primary_key = working.require_primary_key()?;
        if primary_key.len() != fields.len() {
            return Err(Error::Config(format!(
                "{} lists {} fields but {} has {}",
                foreign_table,
                fields.len(),
                primary_key,
                primary_key.len()
            )));
        }
        let pk_fields: Vec<Arc<Field>> =
            primary_key.fields().iter().map(|kf| Arc::clone(kf.field())).collect();

        let defaults = defaults
            .iter()
            .map(|(name, text)| {
                let field = Arc::clone(working.require_field(name)?);
                let value = field.datatype().parse_value(field.target_name(), text)?;
                Ok((field, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut referencing = source.require_table(foreign_table)?.deep_clone()?;
        let fk_fields = referencing.require_fields(fields)?;
        let mut not_null = Filter::new("referenced_keys", &referencing);
        for field in &fk_fields {
            not_null.add_criteria(Criteria::not_null(Arc::clone(field)))?;
        }
        referencing.add_record_filter(not_null)?;

        let worker = new_worker_id();
        let delivered_identity = CacheIdentity::for_fields(&working, &pk_fields)
            .with_suffix(&format!("delivered to {}", worker));
        let referenced_identity =
            CacheIdentity::for_fields(&referencing, &fk_fields).with_suffix("not null");

        Ok(Self {
            ctx,
            worker,
            table: table.to_string(),
            defaults,
            referencing: Arc::new(referencing),
            fk_fields,
            delivered_identity,
            referenced_identity,
        })
    }

    async fn remember_delivered(&self, table: &Table, batch: &[Row]) -> Result<()> {
        let primary_key = table.require_primary_key()?;
        let mut keys = Vec::with_capacity(batch.len());
        for row in batch {
            if let Some(key) = primary_key.value_of(row)? {
                keys.push(key);
            }
        }
        self.ctx
            .cache
            .accumulate(&self.delivered_identity, self.worker, keys)
            .await;
        Ok(())
    }

    async fn add_missing(&self, table: &Table, mut batch: Batch) -> Result<Batch> {
        self.remember_delivered(table, &batch).await?;
        let delivered = self
            .ctx
            .cache
            .snapshot(&self.delivered_identity)
            .await
            .unwrap_or_default();

        let repository = Arc::clone(&self.ctx.repository);
        let referencing = Arc::clone(&self.referencing);
        let fk_fields = self.fk_fields.clone();
        let referenced = self
            .ctx
            .cache
            .get_or_populate(&self.referenced_identity, self.worker, || async move {
                scan_keys(repository.as_ref(), &referencing, |row| {
                    Ok(key_string(&fk_fields, row))
                })
                .await
            })
            .await?;

        let mut missing: Vec<&String> = referenced
            .iter()
            .filter(|k| !delivered.contains(*k))
            .collect();
        missing.sort();

        let primary_key = table.require_primary_key()?;
        for key in &missing {
            let mut row = table.empty_row();
            for (field, value) in &self.defaults {
                row.set_value(field.ordinal(), value.clone());
            }
            for (kf, part) in primary_key.fields().iter().zip(split_key_value(key)) {
                let field = kf.field();
                row.set_value(
                    field.ordinal(),
                    field.datatype().parse_value(field.target_name(), &part)?,
                );
            }
            batch.push(row);
        }

        if !missing.is_empty() {
            self.ctx.logger.log_information(&format!(
                "{} added to {}: keys referenced from {} but not delivered",
                rows(missing.len()),
                table.target_name(),
                self.referencing.target_name()
            ));
        }
        Ok(batch)
    }

    async fn release(&self) {
        self.ctx
            .cache
            .release(&self.delivered_identity, self.worker)
            .await;
        self.ctx
            .cache
            .release(&self.referenced_identity, self.worker)
            .await;
    }
}

#[async_trait]
impl DataManipulator for PrimaryKeyAdder {
    fn kind(&self) -> &'static str {
        "primary_key_adder"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.defaults.iter().any(|(f, _)| f.matches(name))
    }

    async fn manipulate(&self, table: &Table, batch: Batch) -> Result<Batch> {
        if let Err(e) = self.remember_delivered(table, &batch).await {
            self.release().await;
            return Err(e);
        }
        Ok(batch)
    }

    async fn finalize(&self, table: &Table, batch: Batch) -> Result<Batch> {
        let result = self.add_missing(table, batch).await;
        self.release().await;
        result
    }

    async fn abort(&self, _table: &Table) {
        self.release().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::test_support::fixture;
    use crate::repository::{collect_rows, DataRepository};
    use arkmig_common::MetadataProvider;

    fn adder(fx: &crate::reconcile::test_support::Fixture) -> PrimaryKeyAdder {
        PrimaryKeyAdder::new(
            fx.ctx.clone(),
            "EMPLOYEE",
            "CASES",
            &["EmployeeID".to_string()],
            &BTreeMap::from([("Status".to_string(), "inferred".to_string())]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_referenced_keys_added_once() {
        let fx = fixture(false).await;
        let employees = fx.ctx.metadata.data_source().require_table("EMPLOYEE").unwrap();
        let adder = adder(&fx);

        let mut output = Vec::new();
        let mut batches = fx.repository.data_get_from_table(&employees);
        let mut pending = None;
        while let Some(batch) = futures::TryStreamExt::try_next(&mut batches).await.unwrap() {
            if let Some(previous) = pending.replace(batch) {
                output.extend(adder.manipulate_data(&employees, previous).await.unwrap());
            }
        }
        let last = adder
            .manipulate_data(&employees, pending.unwrap_or_default())
            .await
            .unwrap();
        output.extend(adder.finalize_data_manipulation(&employees, last).await.unwrap());

        assert_eq!(output.len(), 4);
        let added = &output[3];
        assert_eq!(added.value(0), &Value::Int32(4));
        assert_eq!(added.value(1), &Value::from("inferred"));
        assert!(fx.logger.contains("1 row added"));
    }

    #[tokio::test]
    async fn test_nothing_added_when_all_delivered() {
        let fx = fixture(false).await;
        let employees = fx.ctx.metadata.data_source().require_table("EMPLOYEE").unwrap();
        let adder = adder(&fx);

        let mut delivered = collect_rows(fx.repository.data_get_from_table(&employees))
            .await
            .unwrap();
        delivered.push(Row::from_values(vec![Value::Int32(4), Value::from("active")]));

        let batch = adder.manipulate_data(&employees, delivered).await.unwrap();
        let output = adder.finalize_data_manipulation(&employees, batch).await.unwrap();
        assert_eq!(output.len(), 4);
        assert!(fx.logger.messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_table_receives_every_referenced_key() {
        let fx = fixture(false).await;
        let employees = fx.ctx.metadata.data_source().require_table("EMPLOYEE").unwrap();
        let adder = adder(&fx);

        let output = adder
            .finalize_data_manipulation(&employees, Vec::new())
            .await
            .unwrap();
        let ids: Vec<_> = output.iter().map(|r| r.value(0).clone()).collect();
        assert_eq!(ids, vec![Value::Int32(1), Value::Int32(2), Value::Int32(4)]);
        assert!(fx.logger.contains("3 rows added"));
    }

    #[tokio::test]
    async fn test_claims_released_after_finalize() {
        let fx = fixture(false).await;
        let employees = fx.ctx.metadata.data_source().require_table("EMPLOYEE").unwrap();
        let adder = adder(&fx);

        adder
            .finalize_data_manipulation(&employees, Vec::new())
            .await
            .unwrap();
        assert_eq!(fx.ctx.cache.active_workers(&adder.referenced_identity).await, 0);
        assert_eq!(fx.ctx.cache.active_workers(&adder.delivered_identity).await, 0);
    }

    #[tokio::test]
    async fn test_bad_default_rejected() {
        let fx = fixture(false).await;
        let result = PrimaryKeyAdder::new(
            fx.ctx.clone(),
            "EMPLOYEE",
            "CASES",
            &["EmployeeID".to_string()],
            &BTreeMap::from([("EmployeeID".to_string(), "abc".to_string())]),
        );
        assert!(matches!(result, Err(Error::Conversion { .. })));
    }
}
