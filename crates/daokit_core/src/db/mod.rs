//! SQLite pool bootstrap and schema generation entry points.
//!
//! # Responsibility
//! - Open and configure pooled SQLite connections for one persistence unit.
//! - Create (or recreate) entity tables from registered mappings.
//!
//! # Invariants
//! - Every pooled connection has `foreign_keys=ON` and the unit busy timeout.
//! - File-backed units run in WAL journal mode.
//! - In-memory units hold exactly one connection that never expires.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{open_pool, DbPool, PooledSession};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A table or column name cannot be used as a bare SQL identifier.
    InvalidIdentifier(String),
    /// Mapping metadata is internally inconsistent.
    InvalidMapping {
        entity: &'static str,
        message: String,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::InvalidMapping { entity, message } => {
                write!(f, "invalid mapping for entity `{entity}`: {message}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::InvalidIdentifier(_) => None,
            Self::InvalidMapping { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
