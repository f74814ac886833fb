//! `SQLite` connection pool with WAL mode and the `payload_hash` function.
//!
//! Uses `r2d2` connection pooling with `r2d2_sqlite` backend.
//! The [`PragmaCustomizer`] runs on each new connection to set WAL mode and
//! performance pragmas and to register the SQL functions the schema uses.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use sha2::{Digest, Sha256};

use roomlog_settings::StoreSettings;

use crate::errors::{EventStoreError, Result};

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool and per-connection tuning, usually taken from [`StoreSettings`].
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Connections kept by the pool.
    pub pool_size: u32,
    /// How long a writer waits on a locked database.
    pub busy_timeout_ms: u32,
    /// Page cache per connection, in KiB.
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

impl From<&StoreSettings> for ConnectionConfig {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            pool_size: settings.pool_size,
            busy_timeout_ms: settings.busy_timeout_ms,
            cache_size_kib: settings.cache_size_kib,
        }
    }
}

/// SHA-256 hex digest of a serialized payload.
///
/// Registered as the SQL scalar function `payload_hash(text)` so bulk
/// updates can keep `data_hash` in step with `data`.
pub fn payload_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Applied to every connection the pool opens.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        register_functions(conn)
    }
}

/// Register the scalar functions used by the schema and repositories.
pub fn register_functions(conn: &Connection) -> std::result::Result<(), rusqlite::Error> {
    conn.create_scalar_function(
        "payload_hash",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: String = ctx.get(0)?;
            Ok(payload_hash(&text))
        },
    )
}

fn build_pool(manager: SqliteConnectionManager, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Create an in-memory connection pool (for testing).
///
/// Every in-memory connection is its own database, so the pool is capped at
/// one connection regardless of `config.pool_size`.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let config = ConnectionConfig {
        pool_size: 1,
        ..config.clone()
    };
    build_pool(SqliteConnectionManager::memory(), &config)
}

/// Create a file-backed connection pool.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build_pool(SqliteConnectionManager::file(path), config)
}

/// Read back the pragmas the customizer sets.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .map_err(EventStoreError::Sqlite)?;
    let busy_timeout_ms: u32 = conn
        .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
        .map_err(EventStoreError::Sqlite)?;
    Ok(PragmaState {
        journal_mode,
        busy_timeout_ms,
    })
}

/// Pragmas in effect on a connection.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode (should be "wal").
    pub journal_mode: String,
    /// Busy timeout in effect.
    pub busy_timeout_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_creates_successfully() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert!(
            pragmas.journal_mode == "wal" || pragmas.journal_mode == "memory",
            "journal_mode should be wal or memory, got: {}",
            pragmas.journal_mode
        );
        assert_eq!(pragmas.busy_timeout_ms, 30_000);
    }

    #[test]
    fn in_memory_pool_is_single_connection() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn file_pool_creates_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = new_file(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        assert_eq!(verify_pragmas(&conn).unwrap().journal_mode, "wal");
    }

    #[test]
    fn file_pool_hands_out_concurrent_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let config = ConnectionConfig {
            pool_size: 4,
            ..Default::default()
        };
        let pool = new_file(path.to_str().unwrap(), &config).unwrap();
        let conns: Vec<_> = (0..4).map(|_| pool.get().unwrap()).collect();
        assert_eq!(conns.len(), 4);
    }

    #[test]
    fn config_from_store_settings() {
        let settings = StoreSettings {
            pool_size: 3,
            busy_timeout_ms: 1000,
            ..StoreSettings::default()
        };
        let config = ConnectionConfig::from(&settings);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.busy_timeout_ms, 1000);
        assert_eq!(config.cache_size_kib, 8192);
    }

    #[test]
    fn payload_hash_function_matches_rust_helper() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let from_sql: String = conn
            .query_row("SELECT payload_hash('{\"msg\":\"hi\"}')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(from_sql, payload_hash(r#"{"msg":"hi"}"#));
        assert_eq!(from_sql.len(), 64);
    }

    #[test]
    fn payload_hash_known_vector() {
        assert_eq!(
            payload_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
