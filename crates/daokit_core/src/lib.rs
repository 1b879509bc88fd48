//! Generic data-access layer over SQLite.
//!
//! A `SessionFactory` is opened once per persistence unit; repositories
//! acquire one `SessionManager` per call, bracket writes in a transaction,
//! and report every failure as a `PersistenceError`.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod repo;
pub mod session;

pub use config::{
    ConfigError, PersistenceConfig, PersistenceUnit, PoolSettings, SchemaGeneration,
};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use mapping::criteria::{Criteria, QueryError};
pub use mapping::{Column, ColumnKind, Entity, EntityMapping, FieldValue, KeyColumn};
pub use model::car::{Car, CarId};
pub use repo::car_repo::CarRepository;
pub use repo::error::{Action, PersistenceError, PersistenceResult, RepoError, RepoResult};
pub use repo::generic_repo::{GenericRepository, Repository};
pub use session::{
    SessionError, SessionFactory, SessionFactoryBuilder, SessionManager, TransactionError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
