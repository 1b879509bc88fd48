//! Connection pool bootstrap for one persistence unit.
//!
//! # Responsibility
//! - Build the `r2d2` pool for file or in-memory SQLite units.
//! - Configure connection pragmas required by session behavior.
//!
//! # Invariants
//! - Pool construction fails when its first connection cannot be opened.
//! - In-memory pools hold one connection with no idle/lifetime expiry, so
//!   the database survives for the whole pool lifetime.

use crate::config::PersistenceUnit;
use log::{error, info, warn};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::time::{Duration, Instant};

/// Connection pool owned by a session factory.
pub type DbPool = Pool<SqliteConnectionManager>;

/// One pooled connection, returned to the pool on drop.
pub type PooledSession = PooledConnection<SqliteConnectionManager>;

/// Opens the connection pool described by `unit`.
///
/// # Side effects
/// - Opens at least one connection eagerly.
/// - Emits `db_open` logging events with duration and status.
pub fn open_pool(unit: &PersistenceUnit) -> Result<DbPool, r2d2::Error> {
    let started_at = Instant::now();
    let mode = if unit.is_in_memory() { "memory" } else { "file" };
    info!(
        "event=db_open module=db status=start mode={} unit={}",
        mode, unit.name
    );

    let busy_timeout = Duration::from_millis(unit.pool.busy_timeout_ms);
    let builder = Pool::builder()
        .connection_timeout(Duration::from_millis(unit.pool.connection_timeout_ms));

    let result = if unit.is_in_memory() {
        if unit.pool.max_size > 1 {
            warn!(
                "event=db_open module=db status=adjusted unit={} requested_max_size={} max_size=1 reason=in_memory",
                unit.name, unit.pool.max_size
            );
        }
        let manager = SqliteConnectionManager::memory()
            .with_init(move |conn| configure_connection(conn, busy_timeout));
        builder
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
    } else {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let manager = SqliteConnectionManager::file(unit.url.trim())
            .with_flags(flags)
            .with_init(move |conn| {
                enable_wal(conn)?;
                configure_connection(conn, busy_timeout)
            });
        builder.max_size(unit.pool.max_size).build(manager)
    };

    match result {
        Ok(pool) => {
            info!(
                "event=db_open module=db status=ok mode={} unit={} max_size={} duration_ms={}",
                mode,
                unit.name,
                pool.max_size(),
                started_at.elapsed().as_millis()
            );
            Ok(pool)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} unit={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                unit.name,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

fn enable_wal(conn: &mut Connection) -> rusqlite::Result<()> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!(
                "failed to set WAL journal mode, got: {journal_mode}"
            )),
        ));
    }
    Ok(())
}
