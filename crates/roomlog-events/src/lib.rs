//! # roomlog-events
//!
//! Context-partitioned event log for chat rooms, backed by `SQLite`.
//!
//! - **Room events**: flat [`RoomEvent`] envelope with `genesis`, `msg`, `emsg`, `dmsg`, `drm` types
//! - **Façade**: [`RoomEvents`] derives the room context and builds each event type
//! - **Event store**: the [`EventStore`] contract and its [`SqliteEventStore`] implementation
//! - **Index plan**: declarative secondary indexes rendered to `SQLite` DDL
//! - **Version bridge**: [`compat`] converts between legacy v1 messages and v2 envelopes
//! - **TTL sweeper**: background purge of messages past their `expireAt`
//! - **Bootstrap**: [`RoomLog`] starts logging, store and sweeper from settings

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod compat;
pub mod context;
pub mod errors;
pub mod indexes;
pub mod sqlite;
pub mod store;
pub mod sweeper;
pub mod types;

pub use bootstrap::RoomLog;
pub use compat::{belongs_to_v2_envelope, event_to_v1, from_v1, to_v1};
pub use context::{ContextSource, resolve_context};
pub use errors::{ErrorKind, EventStoreError, Result};
pub use indexes::{IndexKind, IndexPlan, IndexSpec};
pub use store::{EventStore, PruneFilter, RoomEvents, SqliteEventStore};
pub use sweeper::{spawn_ttl_sweeper, spawn_ttl_sweeper_from_settings};
pub use types::{
    AppendResult, Context, ContextType, EventStub, EventType, PruneResult, RoomEvent,
    RoomEventPayload,
};
