//! Generic repository over any mapped entity type.
//!
//! # Responsibility
//! - Implement `Repository<E>` for every `E: Entity` on top of sessions.
//! - Expose the acquire/run/release/wrap pattern to concrete repositories.
//!
//! # Invariants
//! - One fresh session per call, released before the call returns.
//! - Mutating calls commit exactly once or roll back.

use crate::mapping::criteria::Criteria;
use crate::mapping::{Entity, FieldValue};
use crate::repo::error::{Action, PersistenceError, PersistenceResult, RepoError, RepoResult};
use crate::session::{SessionFactory, SessionManager};
use log::{debug, error};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Data-access contract shared by all repositories.
///
/// `E::Key` is the key type; every method fails with a `PersistenceError`
/// naming the entity, the action and the argument.
pub trait Repository<E: Entity> {
    /// Looks up one entity by key; `Ok(None)` when no row has that key.
    fn find(&self, key: &E::Key) -> PersistenceResult<Option<E>>;

    /// Returns every stored entity, ordered by key.
    fn find_all(&self) -> PersistenceResult<Vec<E>>;

    /// Returns entities whose `field` equals `value` exactly.
    fn find_by_attribute(&self, field: &str, value: FieldValue) -> PersistenceResult<Vec<E>>;

    /// Returns entities whose text `field` contains `needle`.
    ///
    /// `%` and `_` in `needle` match literally. Matching follows SQLite
    /// `LIKE`, so ASCII letters compare case-insensitively.
    fn find_by_attribute_like(&self, field: &str, needle: &str) -> PersistenceResult<Vec<E>>;

    /// Inserts `entity`; a generated key is written back into it.
    fn persist(&self, entity: &mut E) -> PersistenceResult<()>;

    /// Inserts or updates `entity` by key and returns the stored copy.
    fn merge(&self, entity: &E) -> PersistenceResult<E>;

    /// Deletes the row stored under the entity's key.
    fn remove(&self, entity: &E) -> PersistenceResult<()>;

    /// Stops tracking `entity` in the session, without a transaction.
    ///
    /// Each repository call runs on a fresh session, so nothing is tracked
    /// yet and the call only checks that the entity type is mapped. Stored
    /// rows are never touched.
    fn detach(&self, entity: &E) -> PersistenceResult<()>;

    /// Reloads `entity` from the row stored under its key.
    fn refresh(&self, entity: &mut E) -> PersistenceResult<()>;
}

/// Repository for entity type `E` backed by a shared `SessionFactory`.
pub struct GenericRepository<E: Entity> {
    factory: Arc<SessionFactory>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for GenericRepository<E> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> GenericRepository<E> {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self {
            factory,
            _entity: PhantomData,
        }
    }

    pub fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    /// Runs `op` on a fresh session and releases the session afterwards.
    ///
    /// Failures, including failure to open the session, are logged and
    /// wrapped in a `PersistenceError` carrying `action` and `object`.
    pub fn execute<T, F>(&self, action: Action, object: String, op: F) -> PersistenceResult<T>
    where
        F: FnOnce(&mut SessionManager) -> RepoResult<T>,
    {
        let started_at = Instant::now();
        let entity = E::mapping().name;

        let result = self
            .factory
            .session_manager()
            .map_err(RepoError::from)
            .and_then(|mut session| {
                let outcome = op(&mut session);
                session.close();
                outcome
            });

        match result {
            Ok(value) => {
                debug!(
                    "event=repo_call module=repo status=ok entity={} action={} duration_ms={}",
                    entity,
                    action,
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(cause) => {
                let err = PersistenceError::new(entity, action, object, cause);
                error!(
                    "event=repo_call module=repo status=error entity={} action={} object={} duration_ms={} error={}",
                    entity,
                    action,
                    err.object(),
                    started_at.elapsed().as_millis(),
                    err.cause()
                );
                Err(err)
            }
        }
    }
}

impl<E: Entity> Repository<E> for GenericRepository<E> {
    fn find(&self, key: &E::Key) -> PersistenceResult<Option<E>> {
        self.execute(Action::Find, key.to_string(), |session| {
            session.find::<E>(key)
        })
    }

    fn find_all(&self) -> PersistenceResult<Vec<E>> {
        self.execute(Action::FindAll, E::mapping().name.to_string(), |session| {
            session.find_all::<E>()
        })
    }

    fn find_by_attribute(&self, field: &str, value: FieldValue) -> PersistenceResult<Vec<E>> {
        let object = format!("{field}={value}");
        let criteria = Criteria::new().and_equals(field, value);
        self.execute(Action::FindByAttribute, object, |session| {
            session.find_by_criteria::<E>(&criteria)
        })
    }

    fn find_by_attribute_like(&self, field: &str, needle: &str) -> PersistenceResult<Vec<E>> {
        let object = format!("{field}~{needle}");
        let criteria = Criteria::new().and_string_like(field, needle);
        self.execute(Action::FindByAttributeLike, object, |session| {
            session.find_by_criteria::<E>(&criteria)
        })
    }

    fn persist(&self, entity: &mut E) -> PersistenceResult<()> {
        self.execute(Action::Persist, entity.describe(), |session| {
            session.in_transaction(|session| session.persist(entity))
        })
    }

    fn merge(&self, entity: &E) -> PersistenceResult<E> {
        self.execute(Action::Merge, entity.describe(), |session| {
            session.in_transaction(|session| session.merge(entity))
        })
    }

    fn remove(&self, entity: &E) -> PersistenceResult<()> {
        let deleted = self.execute(Action::Remove, entity.describe(), |session| {
            session.in_transaction(|session| session.remove(entity))
        })?;
        if !deleted {
            debug!(
                "event=repo_call module=repo status=noop entity={} action={} object={}",
                E::mapping().name,
                Action::Remove,
                entity.describe()
            );
        }
        Ok(())
    }

    fn detach(&self, entity: &E) -> PersistenceResult<()> {
        self.execute(Action::Detach, entity.describe(), |session| {
            session.detach(entity).map(|_| ())
        })
    }

    fn refresh(&self, entity: &mut E) -> PersistenceResult<()> {
        self.execute(Action::Refresh, entity.describe(), |session| {
            session.refresh(entity)
        })
    }
}
