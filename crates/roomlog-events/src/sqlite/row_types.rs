//! Database row type for mapping between `SQLite` rows and [`RoomEvent`].
//!
//! [`RoomEventRow`] is the raw shape of a `room_events` row: timestamps,
//! discriminators and JSON columns are still text. Conversion to the public
//! envelope happens in [`RoomEventRow::into_event`].

use roomlog_core::parse_timestamp;
use serde_json::Value;

use crate::errors::{EventStoreError, Result};
use crate::types::{ContextType, EventType, RoomEvent};

/// Column list shared by every `SELECT` that maps through [`RoomEventRow::map`].
pub const ROOM_EVENT_COLUMNS: &str = "seq, client_id, parent_ids, version, timestamp, source, \
     context_type, context_id, event_type, data, data_hash, updated_at, deleted_at";

/// Raw row from the `room_events` table.
#[derive(Clone, Debug)]
pub struct RoomEventRow {
    /// Insertion order, unique across contexts.
    pub seq: i64,
    /// Client id.
    pub client_id: Option<String>,
    /// Parent client ids as a JSON array.
    pub parent_ids: String,
    /// Version within the context.
    pub version: i64,
    /// Creation timestamp.
    pub timestamp: String,
    /// Producing node.
    pub source: String,
    /// Context type string.
    pub context_type: String,
    /// Context id.
    pub context_id: String,
    /// Event type string.
    pub event_type: String,
    /// Payload JSON.
    pub data: String,
    /// Payload hash.
    pub data_hash: Option<String>,
    /// Last payload update.
    pub updated_at: Option<String>,
    /// Soft-delete marker.
    pub deleted_at: Option<String>,
}

impl RoomEventRow {
    /// Map a row selected with [`ROOM_EVENT_COLUMNS`].
    pub fn map(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            client_id: row.get(1)?,
            parent_ids: row.get(2)?,
            version: row.get(3)?,
            timestamp: row.get(4)?,
            source: row.get(5)?,
            context_type: row.get(6)?,
            context_id: row.get(7)?,
            event_type: row.get(8)?,
            data: row.get(9)?,
            data_hash: row.get(10)?,
            updated_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }

    /// Decode into the public envelope.
    ///
    /// A row that cannot be decoded is reported as an internal error naming
    /// the row, since only this crate writes the table.
    pub fn into_event(self) -> Result<RoomEvent> {
        let seq = self.seq;
        let corrupt = |what: &str| EventStoreError::Internal(format!("row {seq}: invalid {what}"));

        let event_type: EventType = self.event_type.parse().map_err(|_| corrupt("event_type"))?;
        let context_type: ContextType = self
            .context_type
            .parse()
            .map_err(|_| corrupt("context_type"))?;
        let timestamp = parse_timestamp(&self.timestamp).ok_or_else(|| corrupt("timestamp"))?;
        let updated_at = self
            .updated_at
            .as_deref()
            .map(|s| parse_timestamp(s).ok_or_else(|| corrupt("updated_at")))
            .transpose()?;
        let deleted_at = self
            .deleted_at
            .as_deref()
            .map(|s| parse_timestamp(s).ok_or_else(|| corrupt("deleted_at")))
            .transpose()?;
        let parent_ids: Vec<String> = serde_json::from_str(&self.parent_ids)?;
        let data: Value = serde_json::from_str(&self.data)?;

        Ok(RoomEvent {
            client_id: self.client_id,
            parent_ids,
            version: self.version,
            timestamp,
            source: self.source,
            context_type,
            context_id: self.context_id,
            event_type,
            data,
            data_hash: self.data_hash,
            updated_at,
            deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn row() -> RoomEventRow {
        RoomEventRow {
            seq: 7,
            client_id: Some("c1".into()),
            parent_ids: r#"["c0"]"#.into(),
            version: 2,
            timestamp: "2024-03-01T10:00:00.000Z".into(),
            source: "local".into(),
            context_type: "room".into(),
            context_id: "room1".into(),
            event_type: "msg".into(),
            data: r#"{"msg":"hi"}"#.into(),
            data_hash: Some("abc".into()),
            updated_at: None,
            deleted_at: Some("2024-03-02T10:00:00.000Z".into()),
        }
    }

    #[test]
    fn decodes_full_row() {
        let event = row().into_event().unwrap();
        assert_eq!(event.event_type, EventType::Message);
        assert_eq!(event.parent_ids, vec!["c0".to_string()]);
        assert_eq!(event.data["msg"], "hi");
        assert!(event.is_deleted());
        assert!(event.updated_at.is_none());
    }

    #[test]
    fn unknown_event_type_is_internal_error() {
        let bad = RoomEventRow {
            event_type: "message".into(),
            ..row()
        };
        assert_matches!(bad.into_event(), Err(EventStoreError::Internal(msg)) if msg.contains("row 7"));
    }

    #[test]
    fn malformed_payload_is_serde_error() {
        let bad = RoomEventRow {
            data: "{not json".into(),
            ..row()
        };
        assert_matches!(bad.into_event(), Err(EventStoreError::Serde(_)));
    }
}
