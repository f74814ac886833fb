//! Typed payload definitions for each [`EventType`](super::EventType) variant.
//!
//! Field names follow the legacy message document (`u`, `msg`, `tmid`, ...)
//! so payloads round-trip through the version bridge untouched.

pub mod empty;
pub mod message;
pub mod room;

pub use empty::EmptyPayload;
pub use message::{FileRef, GeoPoint, MessagePatch, MessagePayload, Navigation, UserRef};
pub use room::{Room, RoomPayload};
