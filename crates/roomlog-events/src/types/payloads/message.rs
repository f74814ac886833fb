//! Message payloads: the v2 message body and its edit envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to a user (author or mention).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserRef {
    /// User reference with id and username.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: Some(username.into()),
            name: None,
        }
    }
}

/// Attached file metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Upload id.
    #[serde(rename = "_id")]
    pub id: String,
    /// File name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// GeoJSON point, `[longitude, latitude]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Always `"Point"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `[longitude, latitude]`.
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    /// Point at the given longitude and latitude.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [longitude, latitude],
        }
    }
}

/// Livechat visitor navigation info.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    /// Visitor token.
    pub token: String,
    /// Page info and anything else the widget sends.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload for `msg` events (v2 message body).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Message subtype (`msg` for a plain message, system subtypes otherwise).
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Author.
    #[serde(rename = "u", skip_serializing_if = "Option::is_none")]
    pub author: Option<UserRef>,
    /// Body text.
    #[serde(rename = "msg", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Parent thread message id.
    #[serde(rename = "tmid", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Discussion room spawned from this message.
    #[serde(rename = "drid", skip_serializing_if = "Option::is_none")]
    pub discussion_id: Option<String>,
    /// Attached file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    /// Shared location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Mentioned users.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<UserRef>,
    /// Pinned flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Snippeted flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippeted: Option<bool>,
    /// Unread flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
    /// Livechat navigation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    /// Slack bridge bot id.
    #[serde(rename = "slackBotId", skip_serializing_if = "Option::is_none")]
    pub slack_bot_id: Option<String>,
    /// Slack bridge message timestamp.
    #[serde(rename = "slackTs", skip_serializing_if = "Option::is_none")]
    pub slack_ts: Option<String>,
    /// Number of replies in the thread rooted here.
    #[serde(rename = "tcount", skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<i64>,
    /// Last reply in the thread rooted here.
    #[serde(rename = "tlm", skip_serializing_if = "Option::is_none")]
    pub thread_last_message: Option<DateTime<Utc>>,
    /// Instant after which the row is deleted by the TTL sweeper.
    #[serde(rename = "expireAt", skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    /// Any other message field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagePayload {
    /// Plain message with author and body.
    pub fn text(author: UserRef, body: impl Into<String>) -> Self {
        Self {
            subtype: Some("msg".to_string()),
            author: Some(author),
            body: Some(body.into()),
            ..Self::default()
        }
    }
}

/// Edit envelope over a [`MessagePayload`]: only present fields are applied.
///
/// Used as the `emsg` payload and as the patch merged into the target `msg`
/// row. Each present key replaces the whole top-level value in the target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    /// New body.
    #[serde(rename = "msg", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// New attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
    /// New location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// New mention list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentions: Option<Vec<UserRef>>,
    /// Pin or unpin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Snippet flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippeted: Option<bool>,
    /// Unread flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
    /// Thread reply count.
    #[serde(rename = "tcount", skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<i64>,
    /// Last thread reply.
    #[serde(rename = "tlm", skip_serializing_if = "Option::is_none")]
    pub thread_last_message: Option<DateTime<Utc>>,
    /// New expiry.
    #[serde(rename = "expireAt", skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    /// Any other field to set.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagePatch {
    /// Patch that only replaces the body.
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// Render as the key/value map handed to the store.
    pub fn to_map(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_message_wire_shape() {
        let payload = MessagePayload::text(UserRef::new("u1", "alice"), "hello");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            json!({"t": "msg", "u": {"_id": "u1", "username": "alice"}, "msg": "hello"})
        );
    }

    #[test]
    fn legacy_fields_parse_into_typed_slots() {
        let raw = json!({
            "t": "msg",
            "msg": "see thread",
            "tmid": "m0",
            "mentions": [{"_id": "u2", "username": "bob"}],
            "location": {"type": "Point", "coordinates": [13.4, 52.5]},
            "tcount": 3,
            "expireAt": "2030-01-01T00:00:00Z",
            "reactions": {":+1:": {"usernames": ["bob"]}}
        });
        let payload: MessagePayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.thread_id.as_deref(), Some("m0"));
        assert_eq!(payload.mentions[0].username.as_deref(), Some("bob"));
        assert_eq!(payload.location, Some(GeoPoint::new(13.4, 52.5)));
        assert_eq!(payload.thread_count, Some(3));
        assert!(payload.expire_at.is_some());
        assert!(payload.extra.contains_key("reactions"));
    }

    #[test]
    fn patch_map_only_has_present_fields() {
        let patch = MessagePatch {
            pinned: Some(true),
            ..MessagePatch::body("edited")
        };
        let map = patch.to_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["msg"], "edited");
        assert_eq!(map["pinned"], true);
    }

    #[test]
    fn empty_patch_renders_empty_map() {
        assert!(MessagePatch::default().to_map().unwrap().is_empty());
        assert_eq!(MessagePatch::body("x").to_map().unwrap().len(), 1);
    }
}
