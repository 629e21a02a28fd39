//! TOML metadata document
//!
//! Describes tables, fields, keys and filters and builds the [`DataSource`]
//! object graph from them. Foreign keys are resolved in a second pass so that
//! tables may reference tables declared later in the document.
//!
//! ```toml
//! name = "archive"
//!
//! [[tables]]
//! source_name = "emp"
//! target_name = "EMPLOYEE"
//! fields = [
//!     { source_name = "id", target_name = "EmployeeID", source_type = "int32", nullable = false },
//!     { source_name = "status", target_name = "Status", source_type = "string" },
//! ]
//! candidate_keys = [{ name = "PK_EMPLOYEE", fields = ["EmployeeID"] }]
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::model::{
    Cardinality, DataSource, DataType, Field, ForeignKey, Key, LookupMap, Table,
};
use crate::predicate::{CriteriaSpec, Filter};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tables: Vec<TableDoc>,
    #[serde(default)]
    pub views: Vec<TableDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDoc {
    pub source_name: String,
    pub target_name: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<FieldDoc>,
    #[serde(default)]
    pub candidate_keys: Vec<KeyDoc>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDoc>,
    #[serde(default)]
    pub record_filters: Vec<FilterDoc>,
    #[serde(default)]
    pub field_filters: Vec<FilterDoc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDoc {
    pub source_name: String,
    pub target_name: Option<String>,
    pub source_type: DataType,
    pub target_type: Option<DataType>,
    pub source_length: Option<u32>,
    pub target_length: Option<u32>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    pub map: Option<MapDoc>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapDoc {
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyDoc {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeyDoc {
    pub name: String,
    pub fields: Vec<String>,
    pub references_table: String,
    /// Candidate key name on the referenced table; primary key when omitted
    pub references_key: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterDoc {
    pub name: String,
    pub criteria: Vec<CriteriaSpec>,
}

impl MetadataDocument {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read metadata {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Build the object graph
    pub fn build(&self) -> Result<DataSource> {
        let mut built: Vec<(Table, &TableDoc)> = Vec::new();
        for doc in &self.tables {
            let table = build_table(doc)?;
            // Source and target tables share one database whose names ignore case
            if table.source_name().eq_ignore_ascii_case(table.target_name()) {
                return Err(Error::Config(format!(
                    "Table '{}' needs a target_name distinct from its source name",
                    doc.source_name
                )));
            }
            built.push((table, doc));
        }
        for doc in &self.views {
            built.push((build_table(doc)?, doc));
        }

        // Second pass: foreign keys, validated against the referenced tables
        let mut resolved = Vec::with_capacity(built.len());
        for (table, doc) in &built {
            let mut foreign_keys = Vec::new();
            for fk in &doc.foreign_keys {
                let referenced = built
                    .iter()
                    .map(|(t, _)| t)
                    .find(|t| t.matches_name(&fk.references_table))
                    .ok_or_else(|| {
                        Error::Metadata(format!(
                            "Foreign key '{}' on '{}' references unknown table '{}'",
                            fk.name,
                            table.target_name(),
                            fk.references_table
                        ))
                    })?;
                let referenced_key = match &fk.references_key {
                    Some(name) => referenced.candidate_key(name),
                    None => referenced.primary_key(),
                }
                .ok_or_else(|| {
                    Error::Metadata(format!(
                        "Foreign key '{}' references a missing key on '{}'",
                        fk.name,
                        referenced.target_name()
                    ))
                })?;
                if referenced_key.len() != fk.fields.len() {
                    return Err(Error::Metadata(format!(
                        "Foreign key '{}' has {} fields but '{}' has {}",
                        fk.name,
                        fk.fields.len(),
                        referenced_key.name(),
                        referenced_key.len()
                    )));
                }
                foreign_keys.push(ForeignKey::new(
                    build_key(table, &fk.name, &fk.fields)?,
                    referenced.target_name(),
                    referenced_key.name(),
                    fk.cardinality,
                ));
            }
            resolved.push(foreign_keys);
        }

        let view_start = self.tables.len();
        let mut source = DataSource::new(self.name.clone());
        for (index, ((mut table, _), foreign_keys)) in
            built.into_iter().zip(resolved).enumerate()
        {
            for fk in foreign_keys {
                table.add_foreign_key(fk)?;
            }
            if index < view_start {
                source.add_table(table);
            } else {
                source.add_view(table);
            }
        }

        info!(
            "Built metadata '{}': {} tables, {} views",
            source.name(),
            source.tables().len(),
            source.views().len()
        );
        Ok(source)
    }
}

fn build_table(doc: &TableDoc) -> Result<Table> {
    let target_name = doc.target_name.as_deref().unwrap_or(&doc.source_name);
    let mut table = Table::new(doc.source_name.clone(), target_name);
    if let Some(description) = &doc.description {
        table = table.with_description(description.clone());
    }

    for field in &doc.fields {
        table.add_field(build_field(field)?)?;
    }
    for key in &doc.candidate_keys {
        let key = build_key(&table, &key.name, &key.fields)?;
        table.add_candidate_key(key)?;
    }
    for filter in &doc.record_filters {
        let filter = Filter::from_specs(filter.name.clone(), &table, &filter.criteria)?;
        table.add_record_filter(filter)?;
    }
    for filter in &doc.field_filters {
        let filter = Filter::from_specs(filter.name.clone(), &table, &filter.criteria)?;
        table.add_field_filter(filter)?;
    }
    Ok(table)
}

fn build_field(doc: &FieldDoc) -> Result<Field> {
    let target_name = doc.target_name.as_deref().unwrap_or(&doc.source_name);
    let target_type = doc.target_type.unwrap_or(doc.source_type);
    let mut field = Field::new(doc.source_name.clone(), target_name, doc.source_type)
        .target_type(target_type)
        .lengths(doc.source_length, doc.target_length);
    if !doc.nullable {
        field = field.not_null();
    }
    if let Some(map_doc) = &doc.map {
        let mut map = LookupMap::new(target_type);
        for (from, to) in &map_doc.entries {
            map = map.entry(from.clone(), to)?;
        }
        if let Some(fallback) = &map_doc.fallback {
            map = map.fallback(fallback)?;
        }
        field = field.with_map(Arc::new(map));
    }
    Ok(field)
}

fn build_key(table: &Table, name: &str, fields: &[String]) -> Result<Key> {
    let mut key = Key::new(name, table.target_name());
    for field in table.require_fields(fields)? {
        key.add_field(field, None)?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        name = "archive"

        [[tables]]
        source_name = "legacy_cases"
        target_name = "CASES"
        fields = [
            { source_name = "case_id", target_name = "CaseID", source_type = "int32", nullable = false },
            { source_name = "emp_id", target_name = "EmployeeID", source_type = "int32" },
            { source_name = "state", target_name = "State", source_type = "string", map = { entries = { o = "open", c = "closed" } } },
        ]
        candidate_keys = [{ name = "PK_CASES", fields = ["CaseID"] }]
        foreign_keys = [{ name = "FK_CASES_EMPLOYEE", fields = ["EmployeeID"], references_table = "EMPLOYEE" }]
        record_filters = [{ name = "has_case_id", criteria = [{ type = "not_null", field = "CaseID" }] }]

        [[tables]]
        source_name = "emp"
        target_name = "EMPLOYEE"
        fields = [
            { source_name = "id", target_name = "EmployeeID", source_type = "int32" },
            { source_name = "status", target_name = "Status", source_type = "string" },
        ]
        candidate_keys = [{ name = "PK_EMPLOYEE", fields = ["EmployeeID"] }]
    "#;

    #[test]
    fn test_build_data_source() {
        let source = MetadataDocument::from_toml(DOC).unwrap().build().unwrap();
        assert_eq!(source.name(), "archive");
        assert_eq!(source.tables().len(), 2);

        let cases = source.require_table("legacy_cases").unwrap();
        assert_eq!(cases.fields().len(), 3);
        assert!(!cases.field("CaseID").unwrap().is_nullable());
        assert!(cases.field("State").unwrap().map().is_some());
        assert_eq!(cases.record_filters().len(), 1);

        let fk = &cases.foreign_keys()[0];
        assert_eq!(fk.referenced_table(), "EMPLOYEE");
        assert_eq!(fk.referenced_key(), "PK_EMPLOYEE");
        assert_eq!(fk.cardinality(), Cardinality::ManyToOne);
    }

    #[test]
    fn test_unresolved_foreign_table_is_metadata_error() {
        let doc = DOC.replace("references_table = \"EMPLOYEE\"", "references_table = \"NOPE\"");
        let err = MetadataDocument::from_toml(&doc).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::Metadata(_)));
    }

    #[test]
    fn test_unknown_key_field_is_not_found() {
        let doc = DOC.replace("fields = [\"CaseID\"]", "fields = [\"Missing\"]");
        let err = MetadataDocument::from_toml(&doc).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_target_name_must_differ_from_source() {
        let doc = DOC.replace("target_name = \"EMPLOYEE\"", "target_name = \"EMP\"");
        let err = MetadataDocument::from_toml(&doc).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let doc = DOC.replace("target_name = \"EMPLOYEE\"\n", "");
        let err = MetadataDocument::from_toml(&doc).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unmapped_datatype_rejected() {
        let doc = DOC.replace("source_type = \"string\" }", "source_type = \"blob\" }");
        assert!(MetadataDocument::from_toml(&doc).is_err());
    }
}
