//! # arkmig Common Library
//!
//! Shared code for the arkmig crates including:
//! - Metadata object model (fields, keys, tables, rows, typed values)
//! - Predicate model (criteria and filters, in-memory and SQL forms)
//! - TOML metadata document loading
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod predicate;

pub use error::{Error, Result};
pub use model::{
    Batch, DataObject, DataSource, DataType, Field, ForeignKey, Key, MetadataProvider, NameSide,
    Row, Table, Value,
};
pub use predicate::{Criteria, CriteriaKind, CriteriaSpec, Filter};
