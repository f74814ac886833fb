//! Genesis payload: the room definition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::UserRef;

/// Room definition embedded in the genesis event.
///
/// Only the fields the event log itself reads are typed; everything else a
/// room carries is kept verbatim in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room id; becomes the context id of the room's event stream.
    #[serde(rename = "_id")]
    pub id: String,
    /// Room type (`c` channel, `p` private group, `d` direct, `l` livechat).
    #[serde(rename = "t")]
    pub room_type: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creator.
    #[serde(rename = "u", skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserRef>,
    /// Remaining room fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Room {
    /// Minimal room with an id and type.
    pub fn new(id: impl Into<String>, room_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            room_type: room_type.into(),
            name: None,
            creator: None,
            extra: Map::new(),
        }
    }
}

/// Payload for `genesis` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    /// Full room definition at creation time.
    pub room: Room,
}
