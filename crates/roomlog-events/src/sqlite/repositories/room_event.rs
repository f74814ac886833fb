//! Room event repository: row-level reads and writes on `room_events`.
//!
//! Stateless; every method takes `&Connection` so callers decide the
//! transaction boundary. Denormalized columns (`data_hash`, `expire_at`) are
//! derived from the payload whenever it is written.

use std::fmt::Write as _;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::Value;

use roomlog_core::{format_timestamp, parse_timestamp};

use crate::errors::Result;
use crate::indexes::{BODY_TEXT_TABLE, LOCATION_TABLE, MENTIONS_TABLE};
use crate::sqlite::connection::payload_hash;
use crate::sqlite::row_types::{ROOM_EVENT_COLUMNS, RoomEventRow};
use crate::store::PruneFilter;
use crate::types::{Context, EventType, RoomEvent};

/// Longitude/latitude bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBox {
    /// Western edge.
    pub min_lng: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lng: f64,
    /// Northern edge.
    pub max_lat: f64,
}

/// Room event repository.
pub struct RoomEventRepo;

impl RoomEventRepo {
    /// Insert an event and return its row id.
    pub fn insert(conn: &Connection, event: &RoomEvent) -> Result<i64> {
        let data = serde_json::to_string(&event.data)?;
        let data_hash = payload_hash(&data);
        let parent_ids = serde_json::to_string(&event.parent_ids)?;

        let _ = conn.execute(
            "INSERT INTO room_events (client_id, parent_ids, version, timestamp, source, context_type,
             context_id, event_type, data, data_hash, updated_at, deleted_at, expire_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                event.client_id,
                parent_ids,
                event.version,
                format_timestamp(&event.timestamp),
                event.source,
                event.context_type.as_str(),
                event.context_id,
                event.event_type.as_str(),
                data,
                data_hash,
                event.updated_at.as_ref().map(format_timestamp),
                event.deleted_at.as_ref().map(format_timestamp),
                extract_expire_at(&event.data),
            ],
        )?;
        let seq = conn.last_insert_rowid();
        let _ = conn.execute(
            "INSERT INTO context_versions (context_type, context_id, version) VALUES (?1, ?2, ?3)
             ON CONFLICT(context_type, context_id) DO UPDATE SET version = MAX(version, excluded.version)",
            params![event.context_type.as_str(), event.context_id, event.version],
        )?;
        Ok(seq)
    }

    /// Next version number for a context.
    ///
    /// Read from the context's high-water mark, so versions freed by a purge
    /// or a context removal are never handed out again.
    pub fn next_version(conn: &Connection, context: &Context) -> Result<i64> {
        let next = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM context_versions
             WHERE context_type = ?1 AND context_id = ?2",
            params![context.context_type.as_str(), context.context_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Client id of the most recent event in the context that has one.
    pub fn latest_client_id(conn: &Connection, context: &Context) -> Result<Option<String>> {
        let id = conn
            .query_row(
                "SELECT client_id FROM room_events
                 WHERE context_type = ?1 AND context_id = ?2 AND client_id IS NOT NULL
                 ORDER BY version DESC LIMIT 1",
                params![context.context_type.as_str(), context.context_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Get a row by id.
    pub fn get_by_seq(conn: &Connection, seq: i64) -> Result<Option<RoomEventRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {ROOM_EVENT_COLUMNS} FROM room_events WHERE seq = ?1"),
                params![seq],
                RoomEventRow::map,
            )
            .optional()?;
        Ok(row)
    }

    /// First row at `(context, event type, client id)`. A `None` client id
    /// matches rows without one.
    pub fn find_by_address(
        conn: &Connection,
        context: &Context,
        event_type: EventType,
        client_id: Option<&str>,
    ) -> Result<Option<RoomEventRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
                     WHERE context_type = ?1 AND context_id = ?2 AND event_type = ?3 AND client_id IS ?4
                     ORDER BY seq ASC LIMIT 1"
                ),
                params![
                    context.context_type.as_str(),
                    context.context_id,
                    event_type.as_str(),
                    client_id
                ],
                RoomEventRow::map,
            )
            .optional()?;
        Ok(row)
    }

    /// First row of a given type in a context, whatever its client id.
    pub fn first_of_type(
        conn: &Connection,
        context: &Context,
        event_type: EventType,
    ) -> Result<Option<RoomEventRow>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
                     WHERE context_type = ?1 AND context_id = ?2 AND event_type = ?3
                     ORDER BY seq ASC LIMIT 1"
                ),
                params![
                    context.context_type.as_str(),
                    context.context_id,
                    event_type.as_str()
                ],
                RoomEventRow::map,
            )
            .optional()?;
        Ok(row)
    }

    /// Row holding this exact event: same address, creation time and payload.
    pub fn find_identical(
        conn: &Connection,
        context: &Context,
        event: &RoomEvent,
    ) -> Result<Option<RoomEventRow>> {
        let data_hash = payload_hash(&serde_json::to_string(&event.data)?);
        let row = conn
            .query_row(
                &format!(
                    "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
                     WHERE context_type = ?1 AND context_id = ?2 AND event_type = ?3 AND client_id IS ?4
                       AND timestamp = ?5 AND data_hash = ?6
                     ORDER BY seq ASC LIMIT 1"
                ),
                params![
                    context.context_type.as_str(),
                    context.context_id,
                    event.event_type.as_str(),
                    event.client_id,
                    format_timestamp(&event.timestamp),
                    data_hash
                ],
                RoomEventRow::map,
            )
            .optional()?;
        Ok(row)
    }

    /// Every row of a context, by version.
    pub fn list_by_context(conn: &Connection, context: &Context) -> Result<Vec<RoomEventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
             WHERE context_type = ?1 AND context_id = ?2 ORDER BY version ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![context.context_type.as_str(), context.context_id],
                RoomEventRow::map,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Replace a row's payload and stamp `updated_at`.
    pub fn update_data(
        conn: &Connection,
        seq: i64,
        data: &Value,
        updated_at: &str,
    ) -> Result<usize> {
        let text = serde_json::to_string(data)?;
        let changed = conn.execute(
            "UPDATE room_events SET data = ?2, data_hash = ?3, updated_at = ?4, expire_at = ?5
             WHERE seq = ?1",
            params![
                seq,
                text,
                payload_hash(&text),
                updated_at,
                extract_expire_at(data)
            ],
        )?;
        Ok(changed)
    }

    /// Set the delete marker unless one is already set.
    pub fn flag_deleted(conn: &Connection, seq: i64, deleted_at: &str) -> Result<usize> {
        let changed = conn.execute(
            "UPDATE room_events SET deleted_at = ?2 WHERE seq = ?1 AND deleted_at IS NULL",
            params![seq, deleted_at],
        )?;
        Ok(changed)
    }

    /// Physically delete every row of a context.
    pub fn delete_by_context(conn: &Connection, context: &Context) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM room_events WHERE context_type = ?1 AND context_id = ?2",
            params![context.context_type.as_str(), context.context_id],
        )?;
        Ok(deleted)
    }

    /// Blank the body and stamp the delete marker of every selected row.
    ///
    /// Only rows with a body and without a discussion link are selected;
    /// the filter narrows that further.
    pub fn prune(conn: &Connection, filter: &PruneFilter, deleted_at: &str) -> Result<usize> {
        let mut sql = String::from(
            "UPDATE room_events
             SET data = json_set(data, '$.msg', ''),
                 data_hash = payload_hash(json_set(data, '$.msg', '')),
                 deleted_at = ?1
             WHERE json_type(data, '$.msg') IS NOT NULL AND json_type(data, '$.drid') IS NULL",
        );
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(deleted_at.to_string())];

        if let Some(context) = &filter.context {
            args.push(SqlValue::Text(context.context_type.as_str().to_string()));
            let ct = args.len();
            args.push(SqlValue::Text(context.context_id.clone()));
            let _ = write!(sql, " AND context_type = ?{ct} AND context_id = ?{}", ct + 1);
        }
        if let Some(oldest) = &filter.oldest {
            args.push(SqlValue::Text(format_timestamp(oldest)));
            let op = if filter.inclusive { ">=" } else { ">" };
            let _ = write!(sql, " AND timestamp {op} ?{}", args.len());
        }
        if let Some(latest) = &filter.latest {
            args.push(SqlValue::Text(format_timestamp(latest)));
            let op = if filter.inclusive { "<=" } else { "<" };
            let _ = write!(sql, " AND timestamp {op} ?{}", args.len());
        }
        if !filter.authors.is_empty() {
            let mut placeholders = Vec::with_capacity(filter.authors.len());
            for author in &filter.authors {
                args.push(SqlValue::Text(author.clone()));
                placeholders.push(format!("?{}", args.len()));
            }
            let _ = write!(
                sql,
                " AND json_extract(data, '$.u.username') IN ({})",
                placeholders.join(", ")
            );
        }
        if filter.exclude_pinned {
            sql.push_str(" AND COALESCE(json_extract(data, '$.pinned'), 0) = 0");
        }
        if filter.ignore_threads {
            sql.push_str(" AND json_type(data, '$.tmid') IS NULL AND json_type(data, '$.tcount') IS NULL");
        }
        if filter.files_only {
            sql.push_str(" AND json_type(data, '$.file') IS NOT NULL");
        }

        let changed = conn.execute(&sql, params_from_iter(args.iter()))?;
        Ok(changed)
    }

    /// Live message rows of a context whose body matches an FTS5 query, best first.
    pub fn search_body(
        conn: &Connection,
        context: &Context,
        fts_query: &str,
        limit: i64,
    ) -> Result<Vec<RoomEventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
             JOIN {BODY_TEXT_TABLE} ON {BODY_TEXT_TABLE}.rowid = room_events.seq
             WHERE {BODY_TEXT_TABLE} MATCH ?1
               AND room_events.context_type = ?2 AND room_events.context_id = ?3
               AND room_events.event_type = 'msg' AND room_events.deleted_at IS NULL
             ORDER BY {BODY_TEXT_TABLE}.rank
             LIMIT ?4"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    fts_query,
                    context.context_type.as_str(),
                    context.context_id,
                    limit
                ],
                RoomEventRow::map,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Message rows of a context whose location falls inside `bbox`, by version.
    pub fn find_in_box(
        conn: &Connection,
        context: &Context,
        bbox: &GeoBox,
    ) -> Result<Vec<RoomEventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
             JOIN {LOCATION_TABLE} ON {LOCATION_TABLE}.id = room_events.seq
             WHERE room_events.context_type = ?1 AND room_events.context_id = ?2
               AND room_events.event_type = 'msg'
               AND max_lng >= ?3 AND min_lng <= ?4 AND max_lat >= ?5 AND min_lat <= ?6
             ORDER BY room_events.version ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    context.context_type.as_str(),
                    context.context_id,
                    bbox.min_lng,
                    bbox.max_lng,
                    bbox.min_lat,
                    bbox.max_lat
                ],
                RoomEventRow::map,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Message rows of a context that mention `username`, by version.
    pub fn find_mentioning(
        conn: &Connection,
        context: &Context,
        username: &str,
    ) -> Result<Vec<RoomEventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ROOM_EVENT_COLUMNS} FROM room_events
             WHERE context_type = ?1 AND context_id = ?2 AND event_type = 'msg'
               AND seq IN (SELECT event_seq FROM {MENTIONS_TABLE} WHERE value = ?3)
             ORDER BY version ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![context.context_type.as_str(), context.context_id, username],
                RoomEventRow::map,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete rows whose `expire_at` is at or before `cutoff_ms`.
    pub fn delete_expired(conn: &Connection, cutoff_ms: i64) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM room_events WHERE expire_at IS NOT NULL AND expire_at <= ?1",
            params![cutoff_ms],
        )?;
        Ok(deleted)
    }
}

/// Turn free text into an FTS5 query matching every word literally.
///
/// Returns `None` when the text has no words.
pub fn fts_query(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// `d.expireAt` as unix millis, when it is a parseable instant.
fn extract_expire_at(data: &Value) -> Option<i64> {
    data.get("expireAt")?
        .as_str()
        .and_then(parse_timestamp)
        .map(|ts| ts.timestamp_millis())
}
