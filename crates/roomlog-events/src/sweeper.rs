//! Background TTL sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roomlog_settings::RetentionSettings;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::EventStore;

/// Spawn a task that purges expired events every `interval`.
///
/// The first sweep runs immediately. Failures are logged and the task keeps
/// going; abort the returned handle on shutdown.
pub fn spawn_ttl_sweeper<S>(store: Arc<S>, interval: Duration) -> JoinHandle<()>
where
    S: EventStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            let _ = ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(purged) => debug!(purged, "ttl sweep finished"),
                Err(error) => warn!(%error, "ttl sweep failed"),
            }
        }
    })
}

/// [`spawn_ttl_sweeper`] at the configured `ttlSweepIntervalMs`.
pub fn spawn_ttl_sweeper_from_settings<S>(
    store: Arc<S>,
    settings: &RetentionSettings,
) -> JoinHandle<()>
where
    S: EventStore + ?Sized + 'static,
{
    spawn_ttl_sweeper(store, Duration::from_millis(settings.ttl_sweep_interval_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteEventStore;
    use crate::types::{Context, EventStub, EventType};
    use chrono::Duration as ChronoDuration;
    use roomlog_core::format_timestamp;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_expired_rows() {
        let store = Arc::new(SqliteEventStore::in_memory().unwrap());
        let ctx = Context::room("room1");
        let expired = format_timestamp(&(Utc::now() - ChronoDuration::seconds(5)));
        let _ = store
            .create(
                "local",
                &ctx,
                EventStub {
                    client_id: Some("c1".into()),
                    event_type: EventType::Message,
                    data: json!({"msg": "gone", "expireAt": expired}),
                },
            )
            .unwrap();
        let _ = store
            .create(
                "local",
                &ctx,
                EventStub {
                    client_id: Some("c2".into()),
                    event_type: EventType::Message,
                    data: json!({"msg": "kept"}),
                },
            )
            .unwrap();

        let handle = spawn_ttl_sweeper(Arc::clone(&store), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        let left = store.list(&ctx).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].client_id.as_deref(), Some("c2"));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_interval_drives_later_sweeps() {
        let store = Arc::new(SqliteEventStore::in_memory().unwrap());
        let ctx = Context::room("room1");
        let settings = RetentionSettings {
            ttl_sweep_interval_ms: 5_000,
        };
        let handle = spawn_ttl_sweeper_from_settings(Arc::clone(&store), &settings);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let expired = format_timestamp(&(Utc::now() - ChronoDuration::seconds(5)));
        let _ = store
            .create(
                "local",
                &ctx,
                EventStub {
                    client_id: Some("c1".into()),
                    event_type: EventType::Message,
                    data: json!({"msg": "gone", "expireAt": expired}),
                },
            )
            .unwrap();
        assert_eq!(store.list(&ctx).unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        handle.abort();
        assert!(store.list(&ctx).unwrap().is_empty());
    }
}
