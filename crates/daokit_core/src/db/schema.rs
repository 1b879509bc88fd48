//! Table generation from entity mappings.
//!
//! # Responsibility
//! - Create (or drop and recreate) one table per managed mapping.
//!
//! # Invariants
//! - All statements for one unit run in a single transaction.
//! - `SchemaGeneration::None` never touches the database.

use crate::config::SchemaGeneration;
use crate::db::DbResult;
use crate::mapping::EntityMapping;
use log::info;
use rusqlite::{Connection, TransactionBehavior};

/// Applies `action` for every mapping on the provided connection.
pub fn apply_schema(
    conn: &mut Connection,
    mappings: &[&'static EntityMapping],
    action: SchemaGeneration,
) -> DbResult<()> {
    if action == SchemaGeneration::None || mappings.is_empty() {
        return Ok(());
    }

    for mapping in mappings {
        mapping.validate()?;
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    for mapping in mappings {
        if action == SchemaGeneration::DropAndCreate {
            tx.execute_batch(&mapping.drop_table_sql())?;
        }
        tx.execute_batch(&mapping.create_table_sql())?;
    }
    tx.commit()?;

    info!(
        "event=schema_apply module=db status=ok action={:?} tables={}",
        action,
        mappings.len()
    );
    Ok(())
}

/// Returns whether `table` exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
