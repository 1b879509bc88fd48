//! One database session: a pooled connection, its transaction and the
//! entity keys it currently manages.
//!
//! # Responsibility
//! - Begin, commit and roll back a single transaction.
//! - Execute entity-level operations rendered from mappings.
//! - Release the connection on every exit path.
//!
//! # Invariants
//! - At most one transaction is active per session.
//! - Writes (`persist`, `merge`, `remove`) require an active transaction.
//! - Releasing a session with an active transaction rolls it back.

use super::error::TransactionError;
use crate::db::PooledSession;
use crate::mapping::criteria::Criteria;
use crate::mapping::{Entity, EntityMapping, FieldValue};
use crate::repo::error::{RepoError, RepoResult};
use log::{debug, warn};
use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Scoped database session handed out by a `SessionFactory`.
///
/// Dropping the session releases it; `close` does the same explicitly and
/// consumes the value so it cannot be closed twice.
pub struct SessionManager {
    id: Uuid,
    unit: Arc<str>,
    conn: PooledSession,
    mapped: Arc<BTreeSet<&'static str>>,
    open_sessions: Arc<AtomicUsize>,
    transaction_active: bool,
    managed: HashSet<(&'static str, String)>,
    opened_at: Instant,
    released: bool,
}

impl SessionManager {
    pub(crate) fn new(
        unit: Arc<str>,
        conn: PooledSession,
        mapped: Arc<BTreeSet<&'static str>>,
        open_sessions: Arc<AtomicUsize>,
    ) -> Self {
        open_sessions.fetch_add(1, Ordering::SeqCst);
        let session = Self {
            id: Uuid::new_v4(),
            unit,
            conn,
            mapped,
            open_sessions,
            transaction_active: false,
            managed: HashSet::new(),
            opened_at: Instant::now(),
            released: false,
        };
        debug!(
            "event=session_open module=session status=ok unit={} session_id={}",
            session.unit, session.id
        );
        session
    }

    /// Stable id used to correlate log lines of one session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Underlying connection, for queries the mapping layer does not cover.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    /// Starts the session's transaction with `BEGIN IMMEDIATE`.
    pub fn begin_transaction(&mut self) -> Result<(), TransactionError> {
        if self.transaction_active {
            return Err(TransactionError::AlreadyActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.transaction_active = true;
        debug!(
            "event=tx_begin module=session status=ok session_id={}",
            self.id
        );
        Ok(())
    }

    /// Commits the active transaction.
    ///
    /// A failed commit rolls the transaction back before returning.
    pub fn commit_transaction(&mut self) -> Result<(), TransactionError> {
        if !self.transaction_active {
            return Err(TransactionError::NotActive);
        }
        self.transaction_active = false;

        match self.conn.execute_batch("COMMIT;") {
            Ok(()) => {
                debug!(
                    "event=tx_commit module=session status=ok session_id={}",
                    self.id
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    "event=tx_commit module=session status=error session_id={} error={}",
                    self.id, err
                );
                self.discard_open_transaction();
                Err(err.into())
            }
        }
    }

    /// Rolls back the active transaction and forgets entities it managed.
    pub fn rollback_transaction(&mut self) -> Result<(), TransactionError> {
        if !self.transaction_active {
            return Err(TransactionError::NotActive);
        }
        self.transaction_active = false;
        self.managed.clear();

        // SQLite already rolled back on some errors (e.g. SQLITE_FULL).
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK;")?;
        debug!(
            "event=tx_rollback module=session status=ok session_id={}",
            self.id
        );
        Ok(())
    }

    /// Runs `op` inside one transaction: commit on `Ok`, roll back on `Err`.
    pub fn in_transaction<T, F>(&mut self, op: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Self) -> RepoResult<T>,
    {
        self.begin_transaction()?;
        match op(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction() {
                    warn!(
                        "event=tx_rollback module=session status=error session_id={} error={}",
                        self.id, rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    /// Looks up one entity by key. A missing row is `Ok(None)`.
    pub fn find<E: Entity>(&mut self, key: &E::Key) -> RepoResult<Option<E>> {
        let mapping = self.ensure_mapped::<E>()?;
        let found = self
            .conn
            .query_row(&mapping.select_by_key_sql(), [key], E::from_row)
            .optional()?;
        if found.is_some() {
            self.manage(mapping, key.to_string());
        }
        Ok(found)
    }

    /// Loads every row of the entity's table, ordered by key.
    pub fn find_all<E: Entity>(&mut self) -> RepoResult<Vec<E>> {
        self.find_by_criteria(&Criteria::new())
    }

    /// Loads rows matching every predicate of `criteria`, ordered by key.
    pub fn find_by_criteria<E: Entity>(&mut self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        let mapping = self.ensure_mapped::<E>()?;
        let filter = criteria.compile(mapping)?;
        let sql = format!(
            "{} {} ORDER BY {} ASC;",
            mapping.select_sql(),
            filter.clause,
            mapping.key.field
        );

        let entities = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(filter.values.iter()), E::from_row)?;
            rows.collect::<Result<Vec<E>, _>>()?
        };

        for entity in &entities {
            if let Some(key) = entity.key() {
                self.manage(mapping, key.to_string());
            }
        }
        Ok(entities)
    }

    /// Inserts a new entity and writes a generated key back into it.
    pub fn persist<E: Entity>(&mut self, entity: &mut E) -> RepoResult<()> {
        let mapping = self.ensure_mapped::<E>()?;
        self.ensure_transaction()?;

        let key = self.insert(mapping, entity)?;
        self.manage(mapping, key.to_string());
        entity.set_key(key);
        Ok(())
    }

    /// Inserts or updates by key and returns the stored state.
    ///
    /// Entities without a key are inserted as by `persist`.
    pub fn merge<E: Entity>(&mut self, entity: &E) -> RepoResult<E> {
        let mapping = self.ensure_mapped::<E>()?;
        self.ensure_transaction()?;

        let key = match entity.key() {
            Some(key) => {
                let values = entity.values();
                let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
                bound.push(&key);
                bound.extend(values.iter().map(|value| value as &dyn ToSql));
                self.conn
                    .execute(&mapping.upsert_sql(), params_from_iter(bound))?;
                key
            }
            None => self.insert(mapping, entity)?,
        };

        let stored = self
            .conn
            .query_row(&mapping.select_by_key_sql(), [&key], E::from_row)
            .optional()?
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "{} - [{key}] vanished after merge",
                    mapping.name
                ))
            })?;
        self.manage(mapping, key.to_string());
        Ok(stored)
    }

    /// Deletes the entity's row. Returns whether a row was deleted.
    pub fn remove<E: Entity>(&mut self, entity: &E) -> RepoResult<bool> {
        let mapping = self.ensure_mapped::<E>()?;
        self.ensure_transaction()?;

        let key = entity.key().ok_or(RepoError::MissingKey(mapping.name))?;
        let deleted = self.conn.execute(&mapping.delete_sql(), [&key])?;
        self.managed.remove(&(mapping.name, key.to_string()));
        Ok(deleted > 0)
    }

    /// Stops tracking the entity. Returns whether it was managed.
    pub fn detach<E: Entity>(&mut self, entity: &E) -> RepoResult<bool> {
        let mapping = self.ensure_mapped::<E>()?;
        Ok(match entity.key() {
            Some(key) => self.managed.remove(&(mapping.name, key.to_string())),
            None => false,
        })
    }

    /// Overwrites `entity` with the row currently stored under its key.
    pub fn refresh<E: Entity>(&mut self, entity: &mut E) -> RepoResult<()> {
        let mapping = self.ensure_mapped::<E>()?;
        let key = entity.key().ok_or(RepoError::MissingKey(mapping.name))?;

        let stored = self
            .conn
            .query_row(&mapping.select_by_key_sql(), [&key], E::from_row)
            .optional()?
            .ok_or_else(|| RepoError::NotFound(entity.describe()))?;
        *entity = stored;
        self.manage(mapping, key.to_string());
        Ok(())
    }

    /// Whether the entity's key is tracked by this session.
    pub fn is_managed<E: Entity>(&self, entity: &E) -> bool {
        entity.key().is_some_and(|key| {
            self.managed
                .contains(&(E::mapping().name, key.to_string()))
        })
    }

    /// Releases the session. Equivalent to dropping it.
    pub fn close(mut self) {
        self.release();
    }

    fn insert<E: Entity>(&self, mapping: &EntityMapping, entity: &E) -> RepoResult<E::Key> {
        let values: Vec<FieldValue> = entity.values();
        let key = match entity.key() {
            Some(key) => {
                let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 1);
                bound.push(&key);
                bound.extend(values.iter().map(|value| value as &dyn ToSql));
                self.conn.query_row(
                    &mapping.insert_sql(true),
                    params_from_iter(bound),
                    |row| row.get::<_, E::Key>(0),
                )?
            }
            None if mapping.key.generated => self.conn.query_row(
                &mapping.insert_sql(false),
                params_from_iter(values.iter()),
                |row| row.get::<_, E::Key>(0),
            )?,
            None => return Err(RepoError::MissingKey(mapping.name)),
        };
        Ok(key)
    }

    fn ensure_mapped<E: Entity>(&self) -> RepoResult<&'static EntityMapping> {
        let mapping = E::mapping();
        if self.mapped.contains(mapping.name) {
            Ok(mapping)
        } else {
            Err(RepoError::UnmappedEntity(mapping.name))
        }
    }

    fn ensure_transaction(&self) -> RepoResult<()> {
        if self.transaction_active {
            Ok(())
        } else {
            Err(TransactionError::NotActive.into())
        }
    }

    fn manage(&mut self, mapping: &EntityMapping, key: String) {
        self.managed.insert((mapping.name, key));
    }

    fn discard_open_transaction(&mut self) {
        self.managed.clear();
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!(
                "event=tx_rollback module=session status=error session_id={} error={}",
                self.id, err
            );
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.transaction_active {
            self.transaction_active = false;
            warn!(
                "event=session_close module=session status=rollback session_id={} reason=transaction_still_active",
                self.id
            );
            self.discard_open_transaction();
        }
        self.managed.clear();
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!(
            "event=session_close module=session status=ok unit={} session_id={} duration_ms={}",
            self.unit,
            self.id,
            self.opened_at.elapsed().as_millis()
        );
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.release();
    }
}
