//! Foreign key value resolution shared by the cleaner and the deleter
//!
//! Given the foreign-key values seen in a batch, finds the ones with no
//! matching primary key in the referenced table. Uses point lookups when the
//! repository offers them, otherwise one scan of the referenced table's keys
//! shared through the key cache.

use arkmig_common::model::join_key_values;
use arkmig_common::{Criteria, Error, Field, Filter, Key, Result, Row, Table};
use futures::TryStreamExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::key_cache::{new_worker_id, CacheIdentity, KeySet, WorkerId};
use super::ReconcileContext;
use crate::repository::DataRepository;

pub(crate) struct ForeignKeyLookup {
    ctx: ReconcileContext,
    worker: WorkerId,
    fk_fields: Vec<String>,
    /// Referenced table, carrying any extra criteria as a record filter
    foreign_table: Arc<Table>,
    primary_key: Key,
    /// Every record filter criteria of `foreign_table`, for point lookups
    restrictions: Vec<Criteria>,
    identity: CacheIdentity,
    verified_identity: CacheIdentity,
    claims: Mutex<Claims>,
}

#[derive(Default)]
struct Claims {
    keys: Option<Arc<KeySet>>,
    verified: bool,
}

impl ForeignKeyLookup {
    /// Resolve the referenced table and validate the field lists
    ///
    /// `fk_fields` name fields of the working table, in primary key order.
    /// `extra_criteria` are equality criteria on referenced-table fields.
    pub(crate) fn new(
        ctx: ReconcileContext,
        table: &str,
        foreign_table: &str,
        fk_fields: &[String],
        extra_criteria: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let source = ctx.metadata.data_source();
        let working = source.require_table(table)?;
        working.require_fields(fk_fields)?;
        let referenced = source.require_table(foreign_table)?;
        let primary_key = referenced.require_primary_key()?;
        if primary_key.len() != fk_fields.len() || fk_fields.is_empty() {
            return Err(Error::Config(format!(
                "{} lists {} fields but {} has {}",
                table,
                fk_fields.len(),
                primary_key,
                primary_key.len()
            )));
        }

        let pk_fields: Vec<Arc<Field>> =
            primary_key.fields().iter().map(|kf| Arc::clone(kf.field())).collect();
        let identity = CacheIdentity::for_fields(&referenced, &pk_fields);

        let (foreign_table, identity) = if extra_criteria.is_empty() {
            (referenced, identity)
        } else {
            let mut restricted = referenced.deep_clone()?;
            let mut filter = Filter::new("extra_criteria", &restricted);
            for (name, text) in extra_criteria {
                let field = Arc::clone(restricted.require_field(name)?);
                let value = field.datatype().parse_value(field.target_name(), text)?;
                filter.add_criteria(Criteria::equal(field, value)?)?;
            }
            let identity = identity.with_suffix(&filter.as_string());
            restricted.add_record_filter(filter)?;
            (Arc::new(restricted), identity)
        };

        // A row kept by the scan is a row every record filter keeps
        let restrictions = foreign_table
            .record_filters()
            .iter()
            .flat_map(|f| f.criteria().iter().cloned())
            .collect();
        let primary_key = foreign_table.require_primary_key()?.clone();
        let verified_identity = identity.with_suffix("verified");

        Ok(Self {
            ctx,
            worker: new_worker_id(),
            fk_fields: fk_fields.to_vec(),
            foreign_table,
            primary_key,
            restrictions,
            identity,
            verified_identity,
            claims: Mutex::new(Claims::default()),
        })
    }

    pub(crate) fn foreign_table(&self) -> &Table {
        &self.foreign_table
    }

    /// Foreign-key fields on `table`, in key order
    pub(crate) fn fields_on(&self, table: &Table) -> Result<Vec<Arc<Field>>> {
        table.require_fields(&self.fk_fields)
    }

    /// Field names on the working table
    pub(crate) fn field_names(&self) -> &[String] {
        &self.fk_fields
    }

    /// Key values of `batch` whose referenced row does not exist
    pub(crate) async fn missing_values(
        &self,
        fields: &[Arc<Field>],
        batch: &[Row],
    ) -> Result<HashSet<String>> {
        let values: HashSet<String> = batch
            .iter()
            .filter_map(|row| key_string(fields, row))
            .collect();
        if values.is_empty() {
            return Ok(HashSet::new());
        }

        let result = match self.ctx.repository.data_queryer() {
            Some(_) => self.missing_by_query(values).await,
            None => self.missing_by_scan(values).await,
        };
        if result.is_err() {
            self.release().await;
        }
        result
    }

    async fn missing_by_query(&self, values: HashSet<String>) -> Result<HashSet<String>> {
        let queryer = self.ctx.repository.data_queryer().ok_or_else(|| {
            Error::InvalidInput("Repository does not offer point lookups".to_string())
        })?;
        let known = self
            .ctx
            .cache
            .snapshot(&self.verified_identity)
            .await
            .unwrap_or_default();

        let mut missing = HashSet::new();
        let mut found = Vec::new();
        for value in values.into_iter().filter(|v| !known.contains(v)) {
            let count = queryer
                .count_matching_key(
                    &self.foreign_table,
                    &self.primary_key,
                    &self.restrictions,
                    &value,
                )
                .await?;
            if count > 0 {
                found.push(value);
            } else {
                missing.insert(value);
            }
        }

        self.ctx
            .cache
            .accumulate(&self.verified_identity, self.worker, found)
            .await;
        self.claims.lock().await.verified = true;
        Ok(missing)
    }

    async fn missing_by_scan(&self, values: HashSet<String>) -> Result<HashSet<String>> {
        let keys = self.prefetch().await?;
        Ok(values.into_iter().filter(|v| !keys.contains(v)).collect())
    }

    /// Every primary key of the referenced table, shared through the cache
    async fn prefetch(&self) -> Result<Arc<KeySet>> {
        let mut claims = self.claims.lock().await;
        if let Some(keys) = &claims.keys {
            return Ok(Arc::clone(keys));
        }

        let repository = Arc::clone(&self.ctx.repository);
        let table = Arc::clone(&self.foreign_table);
        let key = self.primary_key.clone();
        let keys = self
            .ctx
            .cache
            .get_or_populate(&self.identity, self.worker, || async move {
                scan_keys(repository.as_ref(), &table, |row| key.value_of(row)).await
            })
            .await?;
        claims.keys = Some(Arc::clone(&keys));
        Ok(keys)
    }

    pub(crate) fn log(&self, message: &str) {
        self.ctx.logger.log_information(message);
    }

    /// Drop every cache claim this lookup holds
    pub(crate) async fn release(&self) {
        let mut claims = self.claims.lock().await;
        if claims.keys.take().is_some() {
            self.ctx.cache.release(&self.identity, self.worker).await;
        }
        if std::mem::take(&mut claims.verified) {
            self.ctx
                .cache
                .release(&self.verified_identity, self.worker)
                .await;
        }
    }
}

/// Key string of `fields` in `row`; `None` when any member is null
pub(crate) fn key_string(fields: &[Arc<Field>], row: &Row) -> Option<String> {
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        let value = row.value(field.ordinal());
        if value.is_null() {
            return None;
        }
        values.push(value);
    }
    Some(join_key_values(values))
}

/// Scan `table` and collect the key string `key_of` yields for each row
pub(crate) async fn scan_keys<F>(
    repository: &dyn DataRepository,
    table: &Table,
    key_of: F,
) -> Result<KeySet>
where
    F: Fn(&Row) -> Result<Option<String>>,
{
    let mut keys = KeySet::new();
    let mut batches = repository.data_get_from_table(table);
    while let Some(batch) = batches.try_next().await? {
        for row in batch.iter().filter(|r| !table.excludes_row(r)) {
            if let Some(key) = key_of(row)? {
                keys.insert(key);
            }
        }
    }
    debug!("Scanned {} keys from {}", keys.len(), table.target_name());
    Ok(keys)
}
