//! Repository error taxonomy.
//!
//! # Invariants
//! - Every repository operation fails with exactly one `PersistenceError`.
//! - The underlying cause is kept as `source()`, never flattened to text.

use crate::db::DbError;
use crate::mapping::criteria::QueryError;
use crate::session::{SessionError, TransactionError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Cause of a failed session-level entity operation.
#[derive(Debug)]
pub enum RepoError {
    Session(SessionError),
    Transaction(TransactionError),
    Query(QueryError),
    Db(DbError),
    /// The operation needs a key but the entity carries none.
    MissingKey(&'static str),
    /// The row backing an entity no longer exists.
    NotFound(String),
    /// The entity type is not managed by the session's persistence unit.
    UnmappedEntity(&'static str),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(err) => write!(f, "{err}"),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingKey(entity) => write!(f, "{entity} has no key set"),
            Self::NotFound(object) => write!(f, "entity not found: {object}"),
            Self::UnmappedEntity(entity) => {
                write!(f, "entity `{entity}` is not mapped by this persistence unit")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::MissingKey(_) => None,
            Self::NotFound(_) => None,
            Self::UnmappedEntity(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<SessionError> for RepoError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<TransactionError> for RepoError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository action recorded in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Find,
    FindAll,
    FindByAttribute,
    FindByAttributeLike,
    Persist,
    Merge,
    Remove,
    Detach,
    Refresh,
    /// Entity-specific query added by a concrete repository.
    Custom(&'static str),
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "Find",
            Self::FindAll => "FindAll",
            Self::FindByAttribute => "FindByAttribute",
            Self::FindByAttributeLike => "FindByAttributeLike",
            Self::Persist => "Persist",
            Self::Merge => "Merge",
            Self::Remove => "Remove",
            Self::Detach => "Detach",
            Self::Refresh => "Refresh",
            Self::Custom(name) => name,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error returned by every repository operation.
#[derive(Debug)]
pub struct PersistenceError {
    entity: &'static str,
    action: Action,
    object: String,
    cause: RepoError,
}

impl PersistenceError {
    pub fn new(
        entity: &'static str,
        action: Action,
        object: impl Into<String>,
        cause: RepoError,
    ) -> Self {
        Self {
            entity,
            action,
            object: object.into(),
            cause,
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Stringified argument of the failed call.
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn cause(&self) -> &RepoError {
        &self.cause
    }

    pub fn into_cause(self) -> RepoError {
        self.cause
    }
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[ERROR] EntityClass: {} | Action: {} | Object: {}",
            self.entity, self.action, self.object
        )
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}
