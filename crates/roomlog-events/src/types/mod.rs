//! Event type definitions for the room event log.
//!
//! - [`EventType`] / [`ContextType`]: closed wire-string discriminators.
//! - [`RoomEvent`]: flat envelope with an opaque `d` payload.
//! - [`RoomEventPayload`]: typed payload access via [`RoomEvent::typed_payload()`].
//! - [`payloads`]: payload structs per event type.

pub mod base;
pub mod event_type;
pub mod payloads;

pub use base::{AppendResult, Context, EventStub, PruneResult, RoomEvent, RoomEventPayload};
pub use event_type::{ALL_EVENT_TYPES, ContextType, EventType};
