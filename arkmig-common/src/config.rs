//! Configuration loading and config file resolution

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::predicate::CriteriaSpec;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "ARKMIG_CONFIG";

/// Top-level migration configuration (TOML)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub database: DatabaseConfig,
    pub metadata: MetadataConfig,
    pub processing: ProcessingConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    /// Manipulators in registration order
    pub manipulators: Vec<ManipulatorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database holding source and target tables
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("arkmig.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// TOML metadata document describing tables, keys and filters
    pub path: PathBuf,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metadata.toml"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Rows per batch streamed from the repository
    pub batch_size: usize,
    /// Tables processed concurrently
    pub max_concurrent_tables: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_tables: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Delay before an unclaimed key cache entry is freed
    pub grace_period_ms: u64,
    /// Sleep between checks while another worker populates an entry
    pub poll_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 500,
            poll_interval_ms: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `field = value` pair in configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldValue {
    pub field: String,
    pub value: String,
}

/// Match mode of the regular expression replacer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegexMode {
    /// Replace when the pattern matches
    #[default]
    Match,
    /// Replace when the pattern does not match
    NoMatch,
}

/// One manipulator definition; order in the file is registration order
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManipulatorConfig {
    DataSetter {
        table: String,
        field: String,
        value: String,
        #[serde(default)]
        criteria: Vec<CriteriaSpec>,
    },
    RegexReplacer {
        table: String,
        field: String,
        pattern: String,
        value: String,
        #[serde(default)]
        mode: RegexMode,
    },
    RowDuplicator {
        table: String,
        #[serde(default)]
        criteria: Vec<CriteriaSpec>,
        updates: Vec<FieldValue>,
    },
    ValueMapper {
        table: String,
    },
    RecordFilter {
        table: String,
    },
    ForeignKeyCleaner {
        table: String,
        foreign_table: String,
        fields: Vec<String>,
        #[serde(default)]
        extra_criteria: BTreeMap<String, String>,
    },
    ForeignKeyDeleter {
        table: String,
        foreign_table: String,
        fields: Vec<String>,
        #[serde(default)]
        extra_criteria: BTreeMap<String, String>,
    },
    PrimaryKeyAdder {
        table: String,
        foreign_table: String,
        fields: Vec<String>,
        #[serde(default)]
        defaults: BTreeMap<String, String>,
    },
}

impl ManipulatorConfig {
    /// Table the manipulator operates on
    pub fn table(&self) -> &str {
        match self {
            ManipulatorConfig::DataSetter { table, .. }
            | ManipulatorConfig::RegexReplacer { table, .. }
            | ManipulatorConfig::RowDuplicator { table, .. }
            | ManipulatorConfig::ValueMapper { table }
            | ManipulatorConfig::RecordFilter { table }
            | ManipulatorConfig::ForeignKeyCleaner { table, .. }
            | ManipulatorConfig::ForeignKeyDeleter { table, .. }
            | ManipulatorConfig::PrimaryKeyAdder { table, .. } => table,
        }
    }
}

impl MigrationConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: MigrationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)?;
        info!(
            "Loaded configuration from {} ({} manipulators)",
            path.display(),
            config.manipulators.len()
        );
        Ok(config)
    }

    /// Resolve and load configuration
    ///
    /// Falls back to compiled defaults when no config file is found. A config
    /// file that exists but fails to parse is an error.
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) => Self::load(&path),
            None => {
                warn!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values that would stall or disable processing
    pub fn validate(&self) -> Result<()> {
        if self.processing.batch_size == 0 {
            return Err(Error::Config("processing.batch_size must be > 0".to_string()));
        }
        if self.processing.max_concurrent_tables == 0 {
            return Err(Error::Config(
                "processing.max_concurrent_tables must be > 0".to_string(),
            ));
        }
        if self.cache.grace_period_ms == 0 {
            return Err(Error::Config("cache.grace_period_ms must be > 0".to_string()));
        }
        if self.cache.poll_interval_ms == 0 {
            return Err(Error::Config("cache.poll_interval_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Config file resolution, highest priority first:
/// 1. Command-line argument
/// 2. `ARKMIG_CONFIG` environment variable
/// 3. `<user config dir>/arkmig/config.toml` if it exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("arkmig").join("config.toml"))
        .filter(|p| p.exists())
}
