//! Event store contract, its `SQLite` implementation, and the room façade.

mod event_store;
mod room_events;
mod sqlite_store;

pub use event_store::{EventStore, PruneFilter};
pub use room_events::RoomEvents;
pub use sqlite_store::SqliteEventStore;
