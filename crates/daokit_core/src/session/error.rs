use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure to obtain a session from a factory.
#[derive(Debug)]
pub enum SessionError {
    /// `close()` was already called on the factory.
    FactoryClosed,
    /// No pooled connection became available in time, or it failed to open.
    Pool(r2d2::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FactoryClosed => write!(f, "session factory is closed"),
            Self::Pool(err) => write!(f, "failed to acquire connection: {err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::FactoryClosed => None,
            Self::Pool(err) => Some(err),
        }
    }
}

impl From<r2d2::Error> for SessionError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}

/// Failure to begin, commit or roll back a session transaction.
#[derive(Debug)]
pub enum TransactionError {
    AlreadyActive,
    NotActive,
    /// SQLite refused the statement (busy database, lost connection, conflict).
    Db(rusqlite::Error),
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyActive => write!(f, "a transaction is already active on this session"),
            Self::NotActive => write!(f, "no transaction is active on this session"),
            Self::Db(err) => write!(f, "transaction failed: {err}"),
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyActive | Self::NotActive => None,
            Self::Db(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for TransactionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(value)
    }
}
