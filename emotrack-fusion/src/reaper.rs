//! Idle-session reaper
//!
//! Sessions whose client disappeared without calling stop are discarded
//! after the idle timeout. They are not finalized.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::FusionEngine;

/// Spawn the periodic sweep; runs until `cancel_token` fires
pub fn spawn_idle_reaper(
    engine: Arc<FusionEngine>,
    idle_timeout: Duration,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    info!(
        "Starting idle-session reaper (timeout: {}s, interval: {}s)",
        idle_timeout.as_secs(),
        sweep_interval.as_secs()
    );

    tokio::spawn(async move {
        let mut timer = interval(sweep_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Idle-session reaper stopped");
                    break;
                }
                _ = timer.tick() => {
                    for session in engine.sweep_idle(idle_timeout).await {
                        warn!(
                            session_id = %session.id,
                            frames = session.frame_count,
                            probability_frames = session.probability_frames,
                            action_unit_frames = session.action_unit_frames,
                            last_activity = %session.last_activity,
                            "Discarding idle session"
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionMetadata;

    #[tokio::test]
    async fn test_reaper_discards_idle_sessions_and_stops() {
        let engine = Arc::new(FusionEngine::new());
        engine.start_session(SessionMetadata::default()).await;
        engine.start_session(SessionMetadata::default()).await;

        let token = CancellationToken::new();
        let handle = spawn_idle_reaper(
            Arc::clone(&engine),
            Duration::from_millis(20),
            Duration::from_millis(10),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.active_sessions().await, 0);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reaper_keeps_recent_sessions() {
        let engine = Arc::new(FusionEngine::new());
        let id = engine.start_session(SessionMetadata::default()).await;

        let token = CancellationToken::new();
        let handle = spawn_idle_reaper(
            Arc::clone(&engine),
            Duration::from_secs(3600),
            Duration::from_millis(10),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.session_snapshot(id).await.is_ok());

        token.cancel();
        handle.await.unwrap();
    }
}
