use arkmig_common::config::RegexMode;
use arkmig_common::{Batch, Field, MetadataProvider, Result, Table, Value};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use super::DataManipulator;

/// Overwrites a field with a fixed value depending on whether its current
/// text matches a pattern
///
/// Rows whose delivered value is null are left alone.
#[derive(Debug)]
pub struct RegexReplacer {
    table: String,
    field: Arc<Field>,
    pattern: Regex,
    value: Value,
    mode: RegexMode,
}

impl RegexReplacer {
    pub fn new(
        metadata: &dyn MetadataProvider,
        table: &str,
        field: &str,
        pattern: &str,
        value: &str,
        mode: RegexMode,
    ) -> Result<Self> {
        let resolved = metadata.data_source().require_table(table)?;
        let field = Arc::clone(resolved.require_field(field)?);
        let value = field.datatype().parse_value(field.target_name(), value)?;

        Ok(Self {
            table: table.to_string(),
            field,
            pattern: Regex::new(pattern)?,
            value,
            mode,
        })
    }

    fn replaces(&self, text: &str) -> bool {
        let matched = self.pattern.is_match(text);
        match self.mode {
            RegexMode::Match => matched,
            RegexMode::NoMatch => !matched,
        }
    }
}

#[async_trait]
impl DataManipulator for RegexReplacer {
    fn kind(&self) -> &'static str {
        "regex_replacer"
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn is_manipulating_field(&self, name: &str) -> bool {
        self.field.matches(name)
    }

    async fn manipulate(&self, _table: &Table, mut batch: Batch) -> Result<Batch> {
        let ordinal = self.field.ordinal();
        let mut replaced = 0;
        for row in &mut batch {
            let Some(object) = row.get(ordinal) else {
                continue;
            };
            if object.source().is_null() {
                continue;
            }
            if self.replaces(&object.value().to_string()) {
                row.set_value(ordinal, self.value.clone());
                replaced += 1;
            }
        }
        debug!(
            "Replaced {} values of {} matching /{}/",
            replaced,
            self.field.target_name(),
            self.pattern
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manipulator::test_support::*;
    use arkmig_common::Error;

    #[tokio::test]
    async fn test_replace_on_match() {
        let source = case_source();
        let cases = source.require_table("CASES").unwrap();
        let replacer = RegexReplacer::new(
            &source,
            "CASES",
            "Status",
            r"^\s*$",
            "unknown",
            RegexMode::Match,
        )
        .unwrap();

        let batch = replacer
            .manipulate_data(&cases, vec![case(1, None, "  "), case(2, None, "open")])
            .await
            .unwrap();
        assert_eq!(batch[0].value(2), &Value::from("unknown"));
        assert_eq!(batch[1].value(2), &Value::from("open"));
    }

    #[tokio::test]
    async fn test_replace_on_no_match_skips_nulls() {
        let source = case_source();
        let cases = source.require_table("CASES").unwrap();
        let replacer = RegexReplacer::new(
            &source,
            "CASES",
            "EmployeeID",
            r"^[0-9]{1,3}$",
            "0",
            RegexMode::NoMatch,
        )
        .unwrap();

        let batch = replacer
            .manipulate_data(
                &cases,
                vec![case(1, Some(12), "a"), case(2, Some(12345), "b"), case(3, None, "c")],
            )
            .await
            .unwrap();
        assert_eq!(batch[0].value(1), &Value::Int32(12));
        assert_eq!(batch[1].value(1), &Value::Int32(0));
        assert!(batch[2].value(1).is_null());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let source = case_source();
        let err = RegexReplacer::new(&source, "CASES", "Status", "(", "x", RegexMode::Match)
            .unwrap_err();
        assert!(matches!(err, Error::Regex(_)));
    }
}
