//! `SQLite` backend for the room event log.
//!
//! # Architecture
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode, performance pragmas, and
//!   the `payload_hash` SQL function registered on every connection.
//! - **[`migrations`]**: version-tracked base schema, embedded at compile time.
//! - **[`row_types`]**: raw row struct and its decoding into [`RoomEvent`](crate::types::RoomEvent).
//! - **[`repositories`]**: stateless repository; each method takes
//!   `&Connection` and executes SQL.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    payload_hash, verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
