//! The [`RoomEvent`] envelope, the core persisted event type.
//!
//! Events are stored as a flat record with envelope fields at the top level
//! and a payload `d` kept as opaque [`serde_json::Value`]. Field names are the
//! short keys of the legacy document format.
//!
//! Typed access to the payload is opt-in via [`RoomEvent::typed_payload()`],
//! which dispatches on [`EventType`] and deserializes into the matching
//! payload struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event_type::{ContextType, EventType};
use super::payloads;

/// A persisted room event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Client-generated id. Absent for `drm` events.
    #[serde(rename = "_cid", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Causal parent client ids, set once at append.
    #[serde(rename = "_pids", default)]
    pub parent_ids: Vec<String>,
    /// Version within the context, assigned by the store.
    #[serde(rename = "v")]
    pub version: i64,
    /// Creation instant.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Producing node.
    #[serde(rename = "src")]
    pub source: String,
    /// Context type.
    #[serde(rename = "ct")]
    pub context_type: ContextType,
    /// Context id (room id).
    #[serde(rename = "cid")]
    pub context_id: String,
    /// Event type discriminator.
    #[serde(rename = "t")]
    pub event_type: EventType,
    /// Event-specific data (opaque JSON).
    #[serde(rename = "d")]
    pub data: Value,
    /// SHA-256 of the persisted payload text.
    #[serde(rename = "dHash", skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
    /// Last explicit payload update.
    #[serde(rename = "_updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(rename = "_deletedAt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Typed payload enum for compile-time-safe access.
///
/// Obtained via [`RoomEvent::typed_payload()`].
#[derive(Clone, Debug, PartialEq)]
pub enum RoomEventPayload {
    /// `genesis`
    Genesis(payloads::RoomPayload),
    /// `msg`
    Message(Box<payloads::MessagePayload>),
    /// `emsg`
    EditMessage(Box<payloads::MessagePatch>),
    /// `dmsg`
    DeleteMessage(payloads::EmptyPayload),
    /// `drm`
    DeleteRoom(payloads::EmptyPayload),
}

impl RoomEvent {
    /// Deserialize the payload into the variant matching [`event_type`](Self::event_type).
    ///
    /// Returns `Err` if the payload JSON doesn't match the expected shape.
    pub fn typed_payload(&self) -> std::result::Result<RoomEventPayload, serde_json::Error> {
        let data = self.data.clone();
        Ok(match self.event_type {
            EventType::Genesis => RoomEventPayload::Genesis(serde_json::from_value(data)?),
            EventType::Message => RoomEventPayload::Message(serde_json::from_value(data)?),
            EventType::EditMessage => RoomEventPayload::EditMessage(serde_json::from_value(data)?),
            EventType::DeleteMessage => {
                RoomEventPayload::DeleteMessage(serde_json::from_value(data)?)
            }
            EventType::DeleteRoom => RoomEventPayload::DeleteRoom(serde_json::from_value(data)?),
        })
    }

    /// Context this event belongs to.
    pub fn context(&self) -> Context {
        Context {
            context_type: self.context_type,
            context_id: self.context_id.clone(),
        }
    }

    /// Whether the soft-delete marker is set.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Partition key of an event stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Context type.
    #[serde(rename = "ct")]
    pub context_type: ContextType,
    /// Context id.
    #[serde(rename = "cid")]
    pub context_id: String,
}

impl Context {
    /// Room context for `room_id`.
    pub fn room(room_id: impl Into<String>) -> Self {
        Self {
            context_type: ContextType::Room,
            context_id: room_id.into(),
        }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.context_type, self.context_id)
    }
}

/// Caller-supplied part of a new event; the store fills in the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct EventStub {
    /// Client id, if the event addresses one.
    pub client_id: Option<String>,
    /// Event type.
    pub event_type: EventType,
    /// Payload.
    pub data: Value,
}

/// Outcome of an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendResult {
    /// `false` when an event with the same address already existed.
    pub acknowledged: bool,
    /// Version of the stored event.
    pub sequence: i64,
}

/// Outcome of a prune.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneResult {
    /// Rows scrubbed.
    pub count: u64,
}
