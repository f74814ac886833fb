//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

/// Root settings for the room event log.
///
/// ```json
/// {
///   "localSource": "chat.example.org",
///   "store": { "dbPath": "/var/lib/roomlog/events.db" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomLogSettings {
    /// Source identifier stamped on events created by this node when the
    /// caller passes an empty source.
    pub local_source: String,
    /// Event store persistence.
    pub store: StoreSettings,
    /// Expiry and pruning behavior.
    pub retention: RetentionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for RoomLogSettings {
    fn default() -> Self {
        Self {
            local_source: "local".to_string(),
            store: StoreSettings::default(),
            retention: RetentionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// `SQLite` event store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Database file (relative to `~/.roomlog`, or absolute).
    pub db_path: String,
    /// Maximum connection pool size.
    pub pool_size: u32,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB.
    pub cache_size_kib: i64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "room_events.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

/// Retention settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionSettings {
    /// Interval between sweeps that delete rows past their `expireAt`.
    pub ttl_sweep_interval_ms: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            ttl_sweep_interval_ms: 60_000,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RoomLogSettings =
            serde_json::from_str(r#"{"store": {"poolSize": 4}}"#).unwrap();
        assert_eq!(settings.store.pool_size, 4);
        assert_eq!(settings.store.busy_timeout_ms, 30_000);
        assert_eq!(settings.local_source, "local");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RoomLogSettings::default()).unwrap();
        assert_eq!(json["localSource"], "local");
        assert_eq!(json["store"]["dbPath"], "room_events.db");
        assert_eq!(json["retention"]["ttlSweepIntervalMs"], 60_000);
        assert_eq!(json["logging"]["json"], false);
        assert!(json.get("version").is_none());
    }
}
