//! The [`EventType`] and [`ContextType`] discriminators.
//!
//! Every variant serializes to the short wire string stored in the `t` and
//! `ct` fields of a persisted event. Parsing is strict: an unknown string is
//! an error, never a silent fallback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// All room event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// First event of a room context; carries the room definition.
    #[serde(rename = "genesis")]
    Genesis,
    /// New message posted.
    #[serde(rename = "msg")]
    Message,
    /// Message edited in place.
    #[serde(rename = "emsg")]
    EditMessage,
    /// Message deleted (soft delete).
    #[serde(rename = "dmsg")]
    DeleteMessage,
    /// Whole room deleted.
    #[serde(rename = "drm")]
    DeleteRoom,
}

/// All event type variants, for exhaustive iteration.
pub const ALL_EVENT_TYPES: [EventType; 5] = [
    EventType::Genesis,
    EventType::Message,
    EventType::EditMessage,
    EventType::DeleteMessage,
    EventType::DeleteRoom,
];

impl EventType {
    /// Wire string for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::Message => "msg",
            Self::EditMessage => "emsg",
            Self::DeleteMessage => "dmsg",
            Self::DeleteRoom => "drm",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_EVENT_TYPES
            .iter()
            .copied()
            .find(|et| et.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {s}"))
    }
}

/// Kind of entity an event stream belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextType {
    /// A chat room; the context id is the room id.
    #[default]
    #[serde(rename = "room")]
    Room,
}

impl ContextType {
    /// Wire string for this context type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Room => "room",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "room" => Ok(Self::Room),
            other => Err(format!("unknown context type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: [(EventType, &str); 5] = [
        (EventType::Genesis, "genesis"),
        (EventType::Message, "msg"),
        (EventType::EditMessage, "emsg"),
        (EventType::DeleteMessage, "dmsg"),
        (EventType::DeleteRoom, "drm"),
    ];

    #[test]
    fn no_duplicate_wire_strings() {
        let mut seen = std::collections::HashSet::new();
        for et in &ALL_EVENT_TYPES {
            assert!(seen.insert(et.as_str()), "duplicate event type: {et}");
        }
    }

    #[test]
    fn serde_matches_as_str() {
        for (variant, expected) in &EXPECTED {
            let json = serde_json::to_value(variant).unwrap();
            assert_eq!(json, serde_json::Value::String((*expected).to_string()));
            let back: EventType = serde_json::from_value(json).unwrap();
            assert_eq!(*variant, back);
        }
    }

    #[test]
    fn from_str_all_variants() {
        for (variant, expected) in &EXPECTED {
            assert_eq!(expected.parse::<EventType>().unwrap(), *variant);
            assert_eq!(format!("{variant}"), *expected);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "message".parse::<EventType>().unwrap_err();
        assert!(err.contains("unknown event type"));
        assert!("".parse::<EventType>().is_err());
    }

    #[test]
    fn context_type_wire_format() {
        assert_eq!(serde_json::to_value(ContextType::Room).unwrap(), "room");
        assert_eq!("room".parse::<ContextType>().unwrap(), ContextType::Room);
        assert!("user".parse::<ContextType>().is_err());
    }
}
