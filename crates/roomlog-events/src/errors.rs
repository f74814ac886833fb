//! Error types for the room event log.
//!
//! [`EventStoreError`] is returned by every store and façade operation. The
//! variants split into three kinds (see [`ErrorKind`]): a request that cannot
//! be addressed to a context, a write that targets a missing row, and opaque
//! failures from the storage layer, which are passed through unchanged.

use thiserror::Error;

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The request could not be addressed to a context, or is malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// No row matches the `(context, event type, client id)` address.
    #[error("event not found: {context_id}/{event_type}/{}", .client_id.as_deref().unwrap_or("-"))]
    EventNotFound {
        /// Context (room) id of the address.
        context_id: String,
        /// Event type wire string of the address.
        event_type: String,
        /// Client id of the address, if any.
        client_id: Option<String>,
    },

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Internal error (e.g. a stored row that cannot be decoded).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`EventStoreError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Context cannot be derived or the request is malformed.
    Validation,
    /// Update/flag target does not exist.
    NotFound,
    /// Opaque failure from the underlying store.
    Store,
}

impl EventStoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::EventNotFound { .. } => ErrorKind::NotFound,
            Self::Sqlite(_)
            | Self::Pool(_)
            | Self::Serde(_)
            | Self::Migration { .. }
            | Self::Internal(_) => ErrorKind::Store,
        }
    }
}

/// Convenience type alias for event log results.
pub type Result<T> = std::result::Result<T, EventStoreError>;
