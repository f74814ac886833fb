//! Process wiring: logging, the file-backed store, the façade and the TTL
//! sweeper, all taken from one [`RoomLogSettings`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use roomlog_core::logging::init_logging;
use roomlog_settings::RoomLogSettings;

use crate::errors::Result;
use crate::store::{RoomEvents, SqliteEventStore};
use crate::sweeper::spawn_ttl_sweeper_from_settings;

/// A running room event log. Dropping it stops the sweeper.
pub struct RoomLog {
    events: RoomEvents<Arc<SqliteEventStore>>,
    sweeper: JoinHandle<()>,
}

impl RoomLog {
    /// Install the subscriber, open the store and start sweeping.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(settings: &RoomLogSettings) -> Result<Self> {
        init_logging(&settings.logging.level, settings.logging.json);
        let store = Arc::new(SqliteEventStore::open(settings)?);
        let sweeper = spawn_ttl_sweeper_from_settings(Arc::clone(&store), &settings.retention);
        info!(
            local_source = %settings.local_source,
            sweep_interval_ms = settings.retention.ttl_sweep_interval_ms,
            "room event log started"
        );
        Ok(Self {
            events: RoomEvents::from_settings(store, settings),
            sweeper,
        })
    }

    /// The room operations.
    pub fn events(&self) -> &RoomEvents<Arc<SqliteEventStore>> {
        &self.events
    }
}

impl Drop for RoomLog {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use crate::types::payloads::{MessagePayload, UserRef};
    use chrono::{Duration as ChronoDuration, Utc};
    use roomlog_core::ClientId;
    use std::time::Duration;

    fn settings(dir: &tempfile::TempDir) -> RoomLogSettings {
        let mut settings = RoomLogSettings::default();
        settings.local_source = "node-a".into();
        settings.store.db_path = dir.path().join("events.db").to_string_lossy().into_owned();
        settings.retention.ttl_sweep_interval_ms = 1_000;
        settings
    }

    #[tokio::test]
    async fn start_opens_store_with_configured_source() {
        let dir = tempfile::tempdir().unwrap();
        let log = RoomLog::start(&settings(&dir)).unwrap();
        let msg = log
            .events()
            .create_message_event(
                "",
                "room1",
                &ClientId::from("c1"),
                &MessagePayload::text(UserRef::new("u1", "alice"), "hi"),
            )
            .await
            .unwrap();
        assert_eq!(msg.source, "node-a");
        assert!(dir.path().join("events.db").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn started_log_sweeps_expired_messages() {
        let dir = tempfile::tempdir().unwrap();
        let log = RoomLog::start(&settings(&dir)).unwrap();
        let payload = MessagePayload {
            expire_at: Some(Utc::now() - ChronoDuration::seconds(5)),
            ..MessagePayload::text(UserRef::new("u1", "alice"), "short-lived")
        };
        log.events()
            .create_message_event("", "room1", &ClientId::from("c1"), &payload)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let left = log
            .events()
            .find_room_event("room1", EventType::Message, Some("c1"))
            .await
            .unwrap();
        assert!(left.is_none());
    }
}
