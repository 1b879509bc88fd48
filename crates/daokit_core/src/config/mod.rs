//! Persistence unit configuration.
//!
//! # Responsibility
//! - Parse named persistence units from a JSON document.
//! - Resolve one unit by name and validate it before any connection opens.
//!
//! # Invariants
//! - Unit names are unique within one document.
//! - `driver` is always `sqlite`; anything else is rejected at load time.
//! - Unknown keys are rejected instead of silently ignored.

use crate::db::DbError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// The only driver this crate ships with.
pub const SQLITE_DRIVER: &str = "sqlite";
/// `url` value selecting a private in-memory database.
pub const IN_MEMORY_URL: &str = ":memory:";

/// Result type for configuration and factory bootstrap.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failure to read, resolve or open a persistence unit.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    /// No unit with the requested name exists in the document.
    UnknownUnit(String),
    DuplicateUnit(String),
    UnsupportedDriver {
        unit: String,
        driver: String,
    },
    InvalidUnit {
        unit: String,
        message: String,
    },
    /// The unit lists an entity whose mapping was never registered.
    UnmappedEntity {
        unit: String,
        entity: String,
    },
    /// The connection pool could not open its connections.
    Pool(r2d2::Error),
    Db(DbError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read persistence config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid persistence config: {err}"),
            Self::UnknownUnit(name) => write!(f, "persistence unit `{name}` not found"),
            Self::DuplicateUnit(name) => write!(f, "persistence unit `{name}` declared twice"),
            Self::UnsupportedDriver { unit, driver } => write!(
                f,
                "persistence unit `{unit}` uses unsupported driver `{driver}`; expected `{SQLITE_DRIVER}`"
            ),
            Self::InvalidUnit { unit, message } => {
                write!(f, "invalid persistence unit `{unit}`: {message}")
            }
            Self::UnmappedEntity { unit, entity } => write!(
                f,
                "persistence unit `{unit}` lists entity `{entity}` but no mapping was registered"
            ),
            Self::Pool(err) => write!(f, "failed to open connection pool: {err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::UnknownUnit(_)
            | Self::DuplicateUnit(_)
            | Self::UnsupportedDriver { .. }
            | Self::InvalidUnit { .. }
            | Self::UnmappedEntity { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<r2d2::Error> for ConfigError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ConfigError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// What the factory does to entity tables when it opens a unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaGeneration {
    /// Leave the database untouched.
    None,
    /// Create tables that do not exist yet.
    #[default]
    Create,
    /// Drop every mapped table, then create it again.
    DropAndCreate,
}

/// Connection pool tunables for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum pooled connections. Forced to 1 for in-memory units.
    pub max_size: u32,
    /// SQLite busy timeout applied to every connection.
    pub busy_timeout_ms: u64,
    /// How long `session_manager` waits for a free connection.
    pub connection_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 4,
            busy_timeout_ms: 5_000,
            connection_timeout_ms: 5_000,
        }
    }
}

/// One named persistence unit: connection parameters plus mapped entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceUnit {
    pub name: String,
    #[serde(default = "default_driver")]
    pub driver: String,
    /// File path, or `:memory:`.
    pub url: String,
    /// Entity names managed by this unit. Empty means every registered mapping.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub schema_generation: SchemaGeneration,
    #[serde(default)]
    pub pool: PoolSettings,
}

fn default_driver() -> String {
    SQLITE_DRIVER.to_string()
}

impl PersistenceUnit {
    /// Creates a unit backed by a file database.
    pub fn file(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            driver: default_driver(),
            url: path.as_ref().to_string_lossy().into_owned(),
            entities: Vec::new(),
            schema_generation: SchemaGeneration::default(),
            pool: PoolSettings::default(),
        }
    }

    /// Creates a unit backed by a private in-memory database.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: default_driver(),
            url: IN_MEMORY_URL.to_string(),
            entities: Vec::new(),
            schema_generation: SchemaGeneration::default(),
            pool: PoolSettings::default(),
        }
    }

    /// Restricts the unit to the listed entity names.
    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema_generation(mut self, action: SchemaGeneration) -> Self {
        self.schema_generation = action;
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.trim() == IN_MEMORY_URL
    }

    /// Validates the unit without touching the database.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidUnit {
                unit: self.name.clone(),
                message: "name cannot be empty".to_string(),
            });
        }
        if self.driver.trim() != SQLITE_DRIVER {
            return Err(ConfigError::UnsupportedDriver {
                unit: self.name.clone(),
                driver: self.driver.clone(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidUnit {
                unit: self.name.clone(),
                message: "url cannot be empty".to_string(),
            });
        }
        if self.pool.max_size == 0 {
            return Err(ConfigError::InvalidUnit {
                unit: self.name.clone(),
                message: "pool.max_size must be at least 1".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.as_str()) {
                return Err(ConfigError::InvalidUnit {
                    unit: self.name.clone(),
                    message: format!("entity `{entity}` listed twice"),
                });
            }
        }
        Ok(())
    }
}

/// A document of persistence units, resolved by name at factory build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    pub units: Vec<PersistenceUnit>,
}

impl PersistenceConfig {
    /// Wraps a single unit into a document.
    pub fn single(unit: PersistenceUnit) -> Self {
        Self { units: vec![unit] }
    }

    /// Reads and validates a JSON document from disk.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every unit and rejects duplicate names.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = BTreeSet::new();
        for unit in &self.units {
            unit.validate()?;
            if !names.insert(unit.name.as_str()) {
                return Err(ConfigError::DuplicateUnit(unit.name.clone()));
            }
        }
        Ok(())
    }

    /// Returns the unit with the given name.
    pub fn resolve(&self, name: &str) -> ConfigResult<&PersistenceUnit> {
        self.units
            .iter()
            .find(|unit| unit.name == name)
            .ok_or_else(|| ConfigError::UnknownUnit(name.to_string()))
    }
}
