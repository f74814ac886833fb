//! Stateless repositories over the `room_events` table.

pub mod room_event;

pub use room_event::{GeoBox, RoomEventRepo, fts_query};
