//! Versioned base schema for the room event database.
//!
//! Each migration is a SQL file compiled in with [`include_str!`] and applied
//! in its own transaction; its version is then recorded in `schema_version`.
//! Versions at or below the recorded maximum are never re-run. Secondary
//! indexes live in [`IndexPlan`](crate::indexes::IndexPlan), not here.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{EventStoreError, Result};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// Ascending by version.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Room events table, addressing and version indexes",
        sql: include_str!("v001_schema.sql"),
    },
    Migration {
        version: 2,
        description: "Per-context version high-water mark",
        sql: include_str!("v002_context_versions.sql"),
    },
];

/// Bring the schema up to the latest version and return how many
/// migrations were applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(version = current, "schema is current");
        return Ok(0);
    }
    for migration in &pending {
        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(conn, migration)?;
    }

    let applied = u32::try_from(pending.len()).unwrap_or(u32::MAX);
    info!(applied, version = latest_version(), "schema migrated");
    Ok(applied)
}

/// Highest applied version, 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| migration_error("reading schema_version", &e))
}

/// Version the schema ends at once every embedded migration is applied.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn migration_error(step: &str, error: &rusqlite::Error) -> EventStoreError {
    EventStoreError::Migration {
        message: format!("{step}: {error}"),
    }
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| migration_error("creating schema_version", &e))
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let step = format!("v{} ({})", migration.version, migration.description);
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| migration_error(&step, &e))?;
    tx.execute_batch(migration.sql)
        .map_err(|e| migration_error(&step, &e))?;
    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description)
             VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| migration_error(&step, &e))?;
    tx.commit().map_err(|e| migration_error(&step, &e))
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1")
            .unwrap()
            .query_map([kind], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn run_migrations_creates_room_events() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 2);

        let tables = names(&conn, "table");
        assert!(tables.contains(&"room_events".to_string()));
        assert!(tables.contains(&"context_versions".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 2);
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn current_version_starts_at_zero() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_version_table(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn base_indexes_are_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let indexes = names(&conn, "index");
        for idx in [
            "idx_room_events_address",
            "idx_room_events_context_version",
            "idx_room_events_genesis",
            "idx_room_events_timestamp",
        ] {
            assert!(indexes.contains(&idx.to_string()), "missing index: {idx}");
        }
    }

    #[test]
    fn room_events_has_envelope_columns() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(room_events)")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for col in [
            "client_id",
            "parent_ids",
            "version",
            "timestamp",
            "source",
            "context_type",
            "context_id",
            "event_type",
            "data",
            "data_hash",
            "updated_at",
            "deleted_at",
            "expire_at",
        ] {
            assert!(columns.contains(&col.to_string()), "missing column: {col}");
        }
    }

    #[test]
    fn version_marks_are_backfilled_from_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_version_table(&conn).unwrap();
        apply_migration(&conn, &MIGRATIONS[0]).unwrap();
        let insert = "INSERT INTO room_events (version, timestamp, source, context_type, context_id, event_type)
                      VALUES (?1, '2024-01-01T00:00:00.000Z', 'local', 'room', ?2, 'msg')";
        conn.execute(insert, rusqlite::params![1, "r1"]).unwrap();
        conn.execute(insert, rusqlite::params![4, "r1"]).unwrap();
        conn.execute(insert, rusqlite::params![2, "r2"]).unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), 1);
        let mark = |room: &str| -> i64 {
            conn.query_row(
                "SELECT version FROM context_versions WHERE context_type = 'room' AND context_id = ?1",
                [room],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(mark("r1"), 4);
        assert_eq!(mark("r2"), 2);
    }

    #[test]
    fn second_genesis_in_context_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let insert = "INSERT INTO room_events (version, timestamp, source, context_type, context_id, event_type)
                      VALUES (?1, '2024-01-01T00:00:00.000Z', 'local', 'room', 'r1', 'genesis')";
        conn.execute(insert, [1]).unwrap();
        assert!(conn.execute(insert, [2]).is_err());
    }
}
