//! Background scheduled tasks for the application.
//!
//! Currently a single recurring job: drawing winners for giveaways whose end
//! time has passed. Call `spawn_all` once during startup.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::services::GiveawayService;

/// Spawn all background tasks.
///
/// Notes
/// - The sweep runs again only after the previous pass finished, so passes never overlap.
/// - A failing pass is logged and retried on the next tick.
/// - This function detaches tasks via `tokio::spawn`; it does not block.
pub fn spawn_all(giveaway_service: GiveawayService, sweep_interval: Duration) -> JoinHandle<()> {
    // 到期抽奖检查（默认每 15 秒）
    tokio::spawn(async move {
        loop {
            let report = giveaway_service.sweep_expired(Utc::now()).await;
            if report.resolved > 0 || report.purged > 0 || report.failed > 0 {
                log::info!(
                    "Giveaway sweep: scanned={} resolved={} pending={} purged={} skipped={} failed={}",
                    report.scanned,
                    report.resolved,
                    report.pending,
                    report.purged,
                    report.skipped,
                    report.failed
                );
            } else {
                log::debug!("Giveaway sweep: {} pending", report.pending);
            }
            tokio::time::sleep(sweep_interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::GiveawayConfig;
    use crate::database::{DrawingStore, MemoryKeyValueStore};
    use crate::models::DrawingRecord;
    use crate::testing::{RecordingAnnouncer, participant};

    #[tokio::test]
    async fn test_sweep_loop_resolves_expired_giveaways() {
        let store = DrawingStore::new(Arc::new(MemoryKeyValueStore::new()));
        let announcer = Arc::new(RecordingAnnouncer::new());
        let service =
            GiveawayService::new(store.clone(), announcer.clone(), GiveawayConfig::default());

        let record = DrawingRecord {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            end_time: Utc::now() + chrono::Duration::milliseconds(400),
            winners: 1,
            prize: "Nitro".into(),
            required_role_id: None,
            creator_id: 4,
            creator_name: "host".into(),
        };
        store.put(&record).await.unwrap();
        announcer.set_reactors(3, vec![participant(9, &[])]);

        let handle = spawn_all(service, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get(3).await.unwrap().is_some());

        let mut remaining = 100;
        while store.get(3).await.unwrap().is_some() && remaining > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remaining -= 1;
        }
        handle.abort();

        assert!(store.get(3).await.unwrap().is_none());
        let results = announcer.results();
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("<@9>"));
    }
}
