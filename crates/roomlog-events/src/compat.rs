//! Bridge between legacy v1 message documents and v2 room event envelopes.
//!
//! A v1 message is a flat document with the message fields at the root and
//! the room id under `rid`. A v2 event keeps its envelope fields at the root
//! and the message under `d`. Both conversions are total and lossy: client
//! id, source and version do not survive a trip through v1.

use serde_json::{Map, Value};

use crate::types::RoomEvent;

/// Root keys owned by the v2 envelope.
pub const V2_ENVELOPE_FIELDS: [&str; 10] = [
    "_cid",
    "_pids",
    "v",
    "ts",
    "src",
    "cid",
    "t",
    "d",
    "_updatedAt",
    "_deletedAt",
];

/// Keys dropped from an event before its payload is spliced onto the root.
const V1_DROPPED_FIELDS: [&str; 8] = ["_pids", "_cid", "v", "dHash", "src", "ct", "cid", "d"];

/// Whether `field` is a v2 envelope key.
pub fn belongs_to_v2_envelope(field: &str) -> bool {
    V2_ENVELOPE_FIELDS.contains(&field)
}

/// Turn a legacy message document into a v2 message payload.
///
/// Envelope keys are dropped. `t` becomes the legacy `t` when it is a
/// non-empty string and `msg` otherwise.
pub fn from_v1(legacy: &Map<String, Value>) -> Map<String, Value> {
    let mut payload: Map<String, Value> = legacy
        .iter()
        .filter(|(key, _)| !belongs_to_v2_envelope(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let subtype = legacy
        .get("t")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or("msg");
    let _ = payload.insert("t".to_string(), Value::String(subtype.to_string()));
    payload
}

/// Flatten a v2 event document into a legacy message document.
///
/// Payload fields override root fields of the same name. `t` comes from the
/// payload and `rid` from the context id; each is absent when its source is.
pub fn to_v1(event: &Map<String, Value>) -> Map<String, Value> {
    let mut legacy: Map<String, Value> = event
        .iter()
        .filter(|(key, _)| !V1_DROPPED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let payload = event.get("d").and_then(Value::as_object);
    if let Some(payload) = payload {
        for (key, value) in payload {
            let _ = legacy.insert(key.clone(), value.clone());
        }
    }

    match payload.and_then(|d| d.get("t")) {
        Some(t) => {
            let _ = legacy.insert("t".to_string(), t.clone());
        }
        None => {
            let _ = legacy.remove("t");
        }
    }
    match event.get("cid") {
        Some(cid) => {
            let _ = legacy.insert("rid".to_string(), cid.clone());
        }
        None => {
            let _ = legacy.remove("rid");
        }
    }
    legacy
}

/// [`to_v1`] over a typed event.
pub fn event_to_v1(event: &RoomEvent) -> Map<String, Value> {
    match serde_json::to_value(event) {
        Ok(Value::Object(map)) => to_v1(&map),
        _ => Map::new(),
    }
}
