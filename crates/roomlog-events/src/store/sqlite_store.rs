//! [`SqliteEventStore`]: the `SQLite` implementation of [`EventStore`].
//!
//! Wraps a connection pool and the repository layer. Every write runs in one
//! `IMMEDIATE` transaction, so version assignment and the duplicate check
//! see a stable view of the context. The async trait methods call the
//! synchronous inherent methods directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use roomlog_core::{ClientId, format_timestamp, now_timestamp};
use roomlog_settings::{RoomLogSettings, resolve_db_path};

use crate::errors::{EventStoreError, Result};
use crate::indexes::IndexPlan;
use crate::sqlite::connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory,
};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::{GeoBox, RoomEventRepo, fts_query};
use crate::sqlite::row_types::RoomEventRow;
use crate::types::{AppendResult, Context, EventStub, EventType, RoomEvent};

use super::event_store::{EventStore, PruneFilter};

/// `SQLite`-backed event store.
pub struct SqliteEventStore {
    pool: ConnectionPool,
    plan: IndexPlan,
}

impl SqliteEventStore {
    /// Wrap a pool, bringing its schema and index plan up to date.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        let plan = IndexPlan::room_events();
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
            plan.ensure(&conn)?;
        }
        Ok(Self { pool, plan })
    }

    /// Open the file-backed store configured in `settings`.
    pub fn open(settings: &RoomLogSettings) -> Result<Self> {
        let path = resolve_db_path(settings);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EventStoreError::Internal(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let path = path.to_str().ok_or_else(|| {
            EventStoreError::Internal(format!("database path is not UTF-8: {}", path.display()))
        })?;
        info!(path, "opening room event store");
        Self::new(new_file(path, &ConnectionConfig::from(&settings.store))?)
    }

    /// Fresh in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::new(new_in_memory(&ConnectionConfig::default())?)
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Append a fully-formed event.
    ///
    /// The event must belong to `context`. Its version is reassigned; its
    /// parent ids are kept when set and derived from the context otherwise.
    #[instrument(skip_all, fields(context = %context, event_type = %event.event_type))]
    pub fn append(&self, context: &Context, event: &RoomEvent) -> Result<AppendResult> {
        if event.context() != *context {
            return Err(EventStoreError::Validation(format!(
                "event belongs to {} but was appended to {context}",
                event.context()
            )));
        }
        if event.client_id.as_deref().is_some_and(str::is_empty) {
            return Err(EventStoreError::Validation(
                "client id must not be empty".to_string(),
            ));
        }
        let (result, _) = self.write(context, event.clone(), Origin::Replicated)?;
        Ok(result)
    }

    /// Build and append an event from a stub.
    pub fn create(&self, source: &str, context: &Context, stub: EventStub) -> Result<RoomEvent> {
        let event = RoomEvent {
            client_id: stub.client_id,
            parent_ids: Vec::new(),
            version: 0,
            timestamp: Utc::now(),
            source: source.to_string(),
            context_type: context.context_type,
            context_id: context.context_id.clone(),
            event_type: stub.event_type,
            data: stub.data,
            data_hash: None,
            updated_at: None,
            deleted_at: None,
        };
        let (_, stored) = self.write(context, event, Origin::Local)?;
        Ok(stored)
    }

    /// Build and append the genesis event of `context`.
    ///
    /// A context that already has a genesis keeps it and gets it back.
    pub fn create_genesis(&self, source: &str, context: &Context, payload: Value) -> Result<RoomEvent> {
        self.create(
            source,
            context,
            EventStub {
                client_id: Some(ClientId::new().into_inner()),
                event_type: EventType::Genesis,
                data: payload,
            },
        )
    }

    /// Replace top-level payload keys of the addressed row.
    pub fn update_data(
        &self,
        context: &Context,
        event_type: EventType,
        patch: &Map<String, Value>,
        client_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let row = RoomEventRepo::find_by_address(&tx, context, event_type, client_id)?
            .ok_or_else(|| not_found(context, event_type, client_id))?;

        let mut data: Value = serde_json::from_str(&row.data)?;
        if let Value::Object(map) = &mut data {
            for (key, value) in patch {
                let _ = map.insert(key.clone(), value.clone());
            }
        } else {
            data = Value::Object(patch.clone());
        }
        let _ = RoomEventRepo::update_data(&tx, row.seq, &data, &now_timestamp())?;
        tx.commit()?;

        debug!(%context, %event_type, client_id, keys = patch.len(), "event data updated");
        Ok(())
    }

    /// Set the delete marker of the addressed row unless already set.
    pub fn flag_deleted(
        &self,
        context: &Context,
        event_type: EventType,
        at: DateTime<Utc>,
        client_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let row = RoomEventRepo::find_by_address(&conn, context, event_type, client_id)?
            .ok_or_else(|| not_found(context, event_type, client_id))?;
        if row.deleted_at.is_some() {
            debug!(%context, %event_type, client_id, "event already flagged as deleted");
            return Ok(());
        }
        let _ = RoomEventRepo::flag_deleted(&conn, row.seq, &format_timestamp(&at))?;
        debug!(%context, %event_type, client_id, "event flagged as deleted");
        Ok(())
    }

    /// Physically delete every event of a context.
    pub fn remove_context(&self, context: &Context) -> Result<u64> {
        let conn = self.conn()?;
        let removed = to_count(RoomEventRepo::delete_by_context(&conn, context)?);
        info!(%context, removed, "context events removed");
        Ok(removed)
    }

    /// Scrub bodies of every selected message row.
    pub fn prune(&self, filter: &PruneFilter) -> Result<u64> {
        let conn = self.conn()?;
        let pruned = to_count(RoomEventRepo::prune(&conn, filter, &now_timestamp())?);
        info!(
            context = filter.context.as_ref().map(ToString::to_string),
            pruned,
            "messages pruned"
        );
        Ok(pruned)
    }

    /// First event at the address.
    pub fn find(
        &self,
        context: &Context,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEvent>> {
        let conn = self.conn()?;
        RoomEventRepo::find_by_address(&conn, context, event_type, client_id)?
            .map(RoomEventRow::into_event)
            .transpose()
    }

    /// Every event of a context, by version.
    pub fn list(&self, context: &Context) -> Result<Vec<RoomEvent>> {
        let conn = self.conn()?;
        decode_all(RoomEventRepo::list_by_context(&conn, context)?)
    }

    /// Live message events whose body contains every word of `query`.
    pub fn search(&self, context: &Context, query: &str, limit: usize) -> Result<Vec<RoomEvent>> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        decode_all(RoomEventRepo::search_body(&conn, context, &fts, limit)?)
    }

    /// Message events of a context whose location falls inside `bbox`.
    pub fn find_in_box(&self, context: &Context, bbox: &GeoBox) -> Result<Vec<RoomEvent>> {
        let conn = self.conn()?;
        decode_all(RoomEventRepo::find_in_box(&conn, context, bbox)?)
    }

    /// Message events of a context that mention `username`.
    pub fn find_mentioning(&self, context: &Context, username: &str) -> Result<Vec<RoomEvent>> {
        let conn = self.conn()?;
        decode_all(RoomEventRepo::find_mentioning(&conn, context, username)?)
    }

    /// Delete every row whose expiry plus the TTL grace has passed at `now`.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now.timestamp_millis() - self.plan.ttl_grace_ms().unwrap_or(0);
        let conn = self.conn()?;
        let purged = to_count(RoomEventRepo::delete_expired(&conn, cutoff)?);
        if purged > 0 {
            info!(purged, "expired events purged");
        }
        Ok(purged)
    }

    /// Insert `event` unless the context already holds it.
    fn write(
        &self,
        context: &Context,
        mut event: RoomEvent,
        origin: Origin,
    ) -> Result<(AppendResult, RoomEvent)> {
        let conn = self.conn()?;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;

        if let Some(existing) = find_duplicate(&tx, context, &event, origin)? {
            let existing = existing.into_event()?;
            debug!(
                %context,
                event_type = %existing.event_type,
                client_id = existing.client_id.as_deref(),
                version = existing.version,
                "duplicate event not appended"
            );
            return Ok((
                AppendResult {
                    acknowledged: false,
                    sequence: existing.version,
                },
                existing,
            ));
        }

        event.version = RoomEventRepo::next_version(&tx, context)?;
        if event.parent_ids.is_empty() {
            event.parent_ids = RoomEventRepo::latest_client_id(&tx, context)?
                .into_iter()
                .collect();
        }
        let seq = RoomEventRepo::insert(&tx, &event)?;
        let stored = RoomEventRepo::get_by_seq(&tx, seq)?
            .ok_or_else(|| EventStoreError::Internal(format!("row {seq} vanished after insert")))?
            .into_event()?;
        tx.commit()?;

        debug!(
            %context,
            event_type = %stored.event_type,
            client_id = stored.client_id.as_deref(),
            version = stored.version,
            "event appended"
        );
        Ok((
            AppendResult {
                acknowledged: true,
                sequence: stored.version,
            },
            stored,
        ))
    }
}

/// Where an event being written comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// Built here from a stub; every call is a new state change.
    Local,
    /// Handed over whole, possibly more than once.
    Replicated,
}

/// The row a write of `event` would duplicate.
///
/// A context has one genesis. One message can be edited many times, even
/// back to an earlier body, so a local edit is never a duplicate and a
/// replicated one only when the identical event is already stored. Other
/// events are duplicates when their client id is already used for that type.
fn find_duplicate(
    conn: &Connection,
    context: &Context,
    event: &RoomEvent,
    origin: Origin,
) -> Result<Option<RoomEventRow>> {
    match (event.event_type, event.client_id.as_deref()) {
        (EventType::Genesis, _) => RoomEventRepo::first_of_type(conn, context, EventType::Genesis),
        (_, None) => Ok(None),
        (EventType::EditMessage, Some(_)) => match origin {
            Origin::Local => Ok(None),
            Origin::Replicated => RoomEventRepo::find_identical(conn, context, event),
        },
        (event_type, Some(client_id)) => {
            RoomEventRepo::find_by_address(conn, context, event_type, Some(client_id))
        }
    }
}

fn not_found(context: &Context, event_type: EventType, client_id: Option<&str>) -> EventStoreError {
    EventStoreError::EventNotFound {
        context_id: context.context_id.clone(),
        event_type: event_type.as_str().to_string(),
        client_id: client_id.map(String::from),
    }
}

fn decode_all(rows: Vec<RoomEventRow>) -> Result<Vec<RoomEvent>> {
    rows.into_iter().map(RoomEventRow::into_event).collect()
}

fn to_count(rows: usize) -> u64 {
    u64::try_from(rows).unwrap_or(u64::MAX)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append_event(&self, context: &Context, event: &RoomEvent) -> Result<AppendResult> {
        self.append(context, event)
    }

    async fn update_event_data(
        &self,
        context: &Context,
        event_type: EventType,
        patch: &Map<String, Value>,
        client_id: Option<&str>,
    ) -> Result<()> {
        self.update_data(context, event_type, patch, client_id)
    }

    async fn flag_event_as_deleted(
        &self,
        context: &Context,
        event_type: EventType,
        at: DateTime<Utc>,
        client_id: Option<&str>,
    ) -> Result<()> {
        self.flag_deleted(context, event_type, at, client_id)
    }

    async fn create_genesis_event(
        &self,
        source: &str,
        context: &Context,
        payload: Value,
    ) -> Result<RoomEvent> {
        self.create_genesis(source, context, payload)
    }

    async fn create_event(
        &self,
        source: &str,
        context: &Context,
        stub: EventStub,
    ) -> Result<RoomEvent> {
        self.create(source, context, stub)
    }

    async fn remove_context_events(&self, context: &Context) -> Result<u64> {
        self.remove_context(context)
    }

    async fn prune_messages(&self, filter: &PruneFilter) -> Result<u64> {
        self.prune(filter)
    }

    async fn find_event(
        &self,
        context: &Context,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEvent>> {
        self.find(context, event_type, client_id)
    }

    async fn list_context_events(&self, context: &Context) -> Result<Vec<RoomEvent>> {
        self.list(context)
    }

    async fn search_messages(
        &self,
        context: &Context,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RoomEvent>> {
        self.search(context, query, limit)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.purge_expired_at(now)
    }
}
