//! The generic [`EventStore`] contract the room façade is written against.
//!
//! Implementations own persistence, version assignment, and single-row
//! atomicity. Every method is scoped to one [`Context`] except
//! [`prune_messages`](EventStore::prune_messages) and
//! [`purge_expired`](EventStore::purge_expired), which are bulk writes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::types::{AppendResult, Context, EventStub, EventType, RoomEvent};

/// Selection for a bulk message prune.
///
/// Rows without a body or with a discussion link are never selected,
/// whatever the filter says.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PruneFilter {
    /// Restrict to one context.
    pub context: Option<Context>,
    /// Only rows created after this instant.
    pub oldest: Option<DateTime<Utc>>,
    /// Only rows created before this instant.
    pub latest: Option<DateTime<Utc>>,
    /// Make `oldest`/`latest` bounds inclusive.
    pub inclusive: bool,
    /// Only rows authored by these usernames (empty: any author).
    pub authors: Vec<String>,
    /// Skip pinned messages.
    pub exclude_pinned: bool,
    /// Skip thread replies and thread roots.
    pub ignore_threads: bool,
    /// Only rows with an attached file.
    pub files_only: bool,
}

impl PruneFilter {
    /// Filter selecting every prunable row of one room.
    pub fn room(room_id: impl Into<String>) -> Self {
        Self {
            context: Some(Context::room(room_id)),
            ..Self::default()
        }
    }
}

/// Context-partitioned event store.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a fully-formed event to `context`.
    ///
    /// The store assigns the version. An event whose address already exists
    /// is not stored again; the result is then not acknowledged and carries
    /// the existing version. Edits share an address, so an edit is skipped
    /// only when the identical event (same `ts` and payload) is stored.
    async fn append_event(&self, context: &Context, event: &RoomEvent) -> Result<AppendResult>;

    /// Replace top-level payload keys of the addressed row.
    async fn update_event_data(
        &self,
        context: &Context,
        event_type: EventType,
        patch: &Map<String, Value>,
        client_id: Option<&str>,
    ) -> Result<()>;

    /// Set the delete marker of the addressed row. A marker already set is kept.
    async fn flag_event_as_deleted(
        &self,
        context: &Context,
        event_type: EventType,
        at: DateTime<Utc>,
        client_id: Option<&str>,
    ) -> Result<()>;

    /// Create the one genesis event of `context`.
    async fn create_genesis_event(
        &self,
        source: &str,
        context: &Context,
        payload: Value,
    ) -> Result<RoomEvent>;

    /// Create and append an event from a stub.
    async fn create_event(&self, source: &str, context: &Context, stub: EventStub)
    -> Result<RoomEvent>;

    /// Physically delete every event of `context`.
    async fn remove_context_events(&self, context: &Context) -> Result<u64>;

    /// Scrub bodies and stamp delete markers on every selected message row.
    async fn prune_messages(&self, filter: &PruneFilter) -> Result<u64>;

    /// First event at the address, if any.
    async fn find_event(
        &self,
        context: &Context,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEvent>>;

    /// Every event of `context`, by version.
    async fn list_context_events(&self, context: &Context) -> Result<Vec<RoomEvent>>;

    /// Live events of `context` whose body matches `query`, best match first.
    async fn search_messages(
        &self,
        context: &Context,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RoomEvent>>;

    /// Delete every row whose expiry has passed at `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn append_event(&self, context: &Context, event: &RoomEvent) -> Result<AppendResult> {
        (**self).append_event(context, event).await
    }

    async fn update_event_data(
        &self,
        context: &Context,
        event_type: EventType,
        patch: &Map<String, Value>,
        client_id: Option<&str>,
    ) -> Result<()> {
        (**self)
            .update_event_data(context, event_type, patch, client_id)
            .await
    }

    async fn flag_event_as_deleted(
        &self,
        context: &Context,
        event_type: EventType,
        at: DateTime<Utc>,
        client_id: Option<&str>,
    ) -> Result<()> {
        (**self)
            .flag_event_as_deleted(context, event_type, at, client_id)
            .await
    }

    async fn create_genesis_event(
        &self,
        source: &str,
        context: &Context,
        payload: Value,
    ) -> Result<RoomEvent> {
        (**self).create_genesis_event(source, context, payload).await
    }

    async fn create_event(
        &self,
        source: &str,
        context: &Context,
        stub: EventStub,
    ) -> Result<RoomEvent> {
        (**self).create_event(source, context, stub).await
    }

    async fn remove_context_events(&self, context: &Context) -> Result<u64> {
        (**self).remove_context_events(context).await
    }

    async fn prune_messages(&self, filter: &PruneFilter) -> Result<u64> {
        (**self).prune_messages(filter).await
    }

    async fn find_event(
        &self,
        context: &Context,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEvent>> {
        (**self).find_event(context, event_type, client_id).await
    }

    async fn list_context_events(&self, context: &Context) -> Result<Vec<RoomEvent>> {
        (**self).list_context_events(context).await
    }

    async fn search_messages(
        &self,
        context: &Context,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RoomEvent>> {
        (**self).search_messages(context, query, limit).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        (**self).purge_expired(now).await
    }
}
