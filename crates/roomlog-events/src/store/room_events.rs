//! [`RoomEvents`]: the room-scoped façade over an [`EventStore`].
//!
//! Every operation derives the room context, builds the event for its type,
//! and makes one store call (edit and keyed delete make two). Store errors
//! are returned as-is.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use roomlog_core::ClientId;
use roomlog_settings::RoomLogSettings;

use crate::context::resolve_context;
use crate::errors::{EventStoreError, Result};
use crate::types::payloads::{EmptyPayload, MessagePatch, MessagePayload, Room, RoomPayload};
use crate::types::{AppendResult, EventStub, EventType, PruneResult, RoomEvent};

use super::event_store::{EventStore, PruneFilter};

/// Room event operations over an injected store.
pub struct RoomEvents<S: EventStore> {
    store: S,
    local_source: String,
}

impl<S: EventStore> RoomEvents<S> {
    /// Façade over `store`, stamping `local_source` on locally created events.
    pub fn new(store: S, local_source: impl Into<String>) -> Self {
        Self {
            store,
            local_source: local_source.into(),
        }
    }

    /// Façade over `store` using the configured local source.
    pub fn from_settings(store: S, settings: &RoomLogSettings) -> Self {
        Self::new(store, settings.local_source.clone())
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// `source`, or the local source when it is empty.
    pub fn ensure_source(&self, source: &str) -> String {
        if source.is_empty() {
            self.local_source.clone()
        } else {
            source.to_string()
        }
    }

    /// Append a fully-formed event to its own room.
    pub async fn append_room_event(&self, event: &RoomEvent) -> Result<AppendResult> {
        let context = resolve_context(event)?;
        debug!(%context, event_type = %event.event_type, client_id = event.client_id.as_deref(), "append room event");
        self.store.append_event(&context, event).await
    }

    /// Merge `patch` into the payload of the row `event` addresses.
    pub async fn update_room_event_data(
        &self,
        event: &RoomEvent,
        patch: &Map<String, Value>,
    ) -> Result<()> {
        let context = resolve_context(event)?;
        debug!(%context, event_type = %event.event_type, client_id = event.client_id.as_deref(), "update room event data");
        self.store
            .update_event_data(&context, event.event_type, patch, event.client_id.as_deref())
            .await
    }

    /// Tombstone the row `event` addresses. A row already flagged keeps its marker.
    pub async fn flag_room_event_as_deleted(&self, event: &RoomEvent) -> Result<()> {
        let context = resolve_context(event)?;
        debug!(%context, event_type = %event.event_type, client_id = event.client_id.as_deref(), "flag room event as deleted");
        self.store
            .flag_event_as_deleted(
                &context,
                event.event_type,
                Utc::now(),
                event.client_id.as_deref(),
            )
            .await
    }

    /// Start the event stream of `room` with its genesis event.
    pub async fn create_room_genesis_event(&self, source: &str, room: &Room) -> Result<RoomEvent> {
        let context = resolve_context(room.id.as_str())?;
        debug!(%context, "create room genesis event");
        let payload = serde_json::to_value(RoomPayload { room: room.clone() })?;
        self.store
            .create_genesis_event(&self.ensure_source(source), &context, payload)
            .await
    }

    /// Record a new message.
    pub async fn create_message_event(
        &self,
        source: &str,
        room_id: &str,
        client_id: &ClientId,
        data: &MessagePayload,
    ) -> Result<RoomEvent> {
        let context = resolve_context(room_id)?;
        debug!(%context, client_id = client_id.as_str(), "create message event");
        let stub = EventStub {
            client_id: Some(client_id.to_string()),
            event_type: EventType::Message,
            data: serde_json::to_value(data)?,
        };
        self.store
            .create_event(&self.ensure_source(source), &context, stub)
            .await
    }

    /// Apply `patch` to the message `client_id` and record the edit.
    ///
    /// Every edit is recorded, including one that restores an earlier body.
    /// A patch that sets nothing is a validation error.
    pub async fn create_edit_message_event(
        &self,
        source: &str,
        room_id: &str,
        client_id: &ClientId,
        patch: &MessagePatch,
    ) -> Result<RoomEvent> {
        let context = resolve_context(room_id)?;
        debug!(%context, client_id = client_id.as_str(), "create edit message event");
        let patch = patch.to_map()?;
        if patch.is_empty() {
            return Err(EventStoreError::Validation(
                "edit must change at least one field".to_string(),
            ));
        }
        self.store
            .update_event_data(&context, EventType::Message, &patch, Some(client_id.as_str()))
            .await?;
        let stub = EventStub {
            client_id: Some(client_id.to_string()),
            event_type: EventType::EditMessage,
            data: Value::Object(patch),
        };
        self.store
            .create_event(&self.ensure_source(source), &context, stub)
            .await
    }

    /// Record a message deletion.
    ///
    /// With a client id the message row is tombstoned first and must exist.
    /// Without one the deletion is only recorded.
    pub async fn create_delete_message_event(
        &self,
        source: &str,
        room_id: &str,
        client_id: Option<&ClientId>,
    ) -> Result<RoomEvent> {
        let context = resolve_context(room_id)?;
        let client_id = client_id.map(ClientId::as_str);
        debug!(%context, client_id, "create delete message event");
        if let Some(client_id) = client_id {
            self.store
                .flag_event_as_deleted(&context, EventType::Message, Utc::now(), Some(client_id))
                .await?;
        }
        let stub = EventStub {
            client_id: client_id.map(String::from),
            event_type: EventType::DeleteMessage,
            data: serde_json::to_value(EmptyPayload::default())?,
        };
        self.store
            .create_event(&self.ensure_source(source), &context, stub)
            .await
    }

    /// Record the deletion of a whole room. Message rows are left as they are.
    pub async fn create_delete_room_event(&self, source: &str, room_id: &str) -> Result<RoomEvent> {
        let context = resolve_context(room_id)?;
        debug!(%context, "create delete room event");
        let stub = EventStub {
            client_id: None,
            event_type: EventType::DeleteRoom,
            data: serde_json::to_value(EmptyPayload::default())?,
        };
        self.store
            .create_event(&self.ensure_source(source), &context, stub)
            .await
    }

    /// Scrub the body of every message `filter` selects.
    ///
    /// Rows without a body or linked to a discussion are never touched.
    pub async fn create_prune_messages_event(&self, filter: &PruneFilter) -> Result<PruneResult> {
        if let Some(context) = &filter.context {
            let _ = resolve_context(context.context_id.as_str())?;
        }
        debug!(context = filter.context.as_ref().map(ToString::to_string), "prune messages");
        let count = self.store.prune_messages(filter).await?;
        Ok(PruneResult { count })
    }

    /// First event of `room_id` at `(event_type, client_id)`.
    pub async fn find_room_event(
        &self,
        room_id: &str,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEvent>> {
        let context = resolve_context(room_id)?;
        self.store.find_event(&context, event_type, client_id).await
    }

    /// Every event of `room_id`, by version.
    pub async fn list_room_events(&self, room_id: &str) -> Result<Vec<RoomEvent>> {
        let context = resolve_context(room_id)?;
        self.store.list_context_events(&context).await
    }

    /// Live messages of `room_id` matching every word of `query`.
    pub async fn search_messages(
        &self,
        room_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RoomEvent>> {
        let context = resolve_context(room_id)?;
        self.store.search_messages(&context, query, limit).await
    }

    /// Physically delete the whole event stream of `room_id`.
    pub async fn remove_room_events(&self, room_id: &str) -> Result<u64> {
        let context = resolve_context(room_id)?;
        debug!(%context, "remove room events");
        self.store.remove_context_events(&context).await
    }
}
