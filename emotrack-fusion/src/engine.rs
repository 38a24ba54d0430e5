//! Fusion engine: the start / ingest / stop surface over the registry
//!
//! Rule inference runs before the session lock is taken; only the
//! resulting score sets are merged under the lock.

use std::time::Duration;

use emotrack_common::{ActionUnitSet, EmotionLabel, EmotionScoreSet};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::FusionError;
use crate::finalizer::{self, FinalResult};
use crate::registry::{Session, SessionId, SessionMetadata, SessionRegistry, SessionSnapshot};
use crate::rules;

/// Acknowledgement for one ingested frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameAck {
    pub session_id: SessionId,
    /// 1-based raw frame number within the session
    pub frame: u64,
    /// Per-frame rule summary; absent when no action units were supplied
    pub rule_label: Option<EmotionLabel>,
}

#[derive(Debug, Default)]
pub struct FusionEngine {
    registry: SessionRegistry,
}

impl FusionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_session(&self, metadata: SessionMetadata) -> SessionId {
        let id = self.registry.create(metadata).await;
        info!(session_id = %id, "Session started");
        id
    }

    /// Merge one frame's outputs into the session
    ///
    /// `None` for either source means that collaborator produced nothing
    /// for this frame; the frame still counts.
    pub async fn ingest_frame(
        &self,
        id: SessionId,
        scores: Option<EmotionScoreSet>,
        action_units: Option<ActionUnitSet>,
    ) -> Result<FrameAck, FusionError> {
        let inference = action_units.as_ref().map(rules::infer);

        let frame = self
            .registry
            .with_session(id, |session| {
                session.record_frame(scores.as_ref(), inference.as_ref().map(|i| &i.scores))
            })
            .await?;

        let rule_label = inference.as_ref().map(|i| i.dominant());
        debug!(
            session_id = %id,
            frame,
            scored = scores.as_ref().is_some_and(|s| !s.is_empty()),
            rule_label = ?rule_label,
            "Frame ingested"
        );

        Ok(FrameAck {
            session_id: id,
            frame,
            rule_label,
        })
    }

    /// Remove the session and compute its result
    ///
    /// The session is gone after this call even when it fails with `NoData`.
    pub async fn stop_session(&self, id: SessionId) -> Result<FinalResult, FusionError> {
        let session = self.registry.finalize(id).await?;
        let frames = session.frame_count;
        let result = finalizer::finalize(session)?;

        info!(
            session_id = %id,
            frames,
            label = %result.probability.label,
            confidence = result.probability.confidence,
            rule_label = %result.action_units.label,
            "Session finalized"
        );
        Ok(result)
    }

    pub async fn session_snapshot(&self, id: SessionId) -> Result<SessionSnapshot, FusionError> {
        self.registry.get(id).await
    }

    pub async fn list_sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.list().await
    }

    pub async fn active_sessions(&self) -> usize {
        self.registry.len().await
    }

    /// Discard sessions idle for longer than `max_idle`
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<Session> {
        self.registry.sweep_idle(max_idle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probability(pairs: &[(&str, f64)]) -> Option<EmotionScoreSet> {
        Some(EmotionScoreSet::from_raw(pairs.iter().copied()).unwrap())
    }

    fn action_units(pairs: &[(&str, f64)]) -> Option<ActionUnitSet> {
        Some(ActionUnitSet::from_raw(pairs.iter().copied()).unwrap())
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let engine = FusionEngine::new();
        let id = engine
            .start_session(SessionMetadata {
                name: Some("sam".to_string()),
                key: Some("sad".to_string()),
            })
            .await;

        let ack = engine
            .ingest_frame(
                id,
                probability(&[("sad", 0.6), ("neutral", 0.9), ("happy", 0.1)]),
                action_units(&[("AU01", 0.4), ("AU04", 0.6), ("AU15", 0.8)]),
            )
            .await
            .unwrap();
        assert_eq!(ack.frame, 1);
        assert_eq!(ack.rule_label, Some(EmotionLabel::Sad));

        let ack = engine
            .ingest_frame(id, probability(&[("sad", 0.3), ("angry", 0.2)]), None)
            .await
            .unwrap();
        assert_eq!(ack.frame, 2);
        assert_eq!(ack.rule_label, None);

        let result = engine.stop_session(id).await.unwrap();
        assert_eq!(result.name.as_deref(), Some("sam"));
        assert_eq!(result.frame_count, 2);
        assert_eq!(result.probability_frames, 2);
        assert_eq!(result.action_unit_frames, 1);
        assert_eq!(result.probability.label, EmotionLabel::Sad);
        assert!((result.probability.confidence - 0.6 / 0.9).abs() < 1e-9);
        assert_eq!(result.action_units.label, EmotionLabel::Sad);
        assert!((result.action_units.confidence - 1.0).abs() < 1e-9);
        assert!(result.sources_agree);
    }

    #[tokio::test]
    async fn test_ungated_action_units_report_neutral_but_add_nothing() {
        let engine = FusionEngine::new();
        let id = engine.start_session(SessionMetadata::default()).await;

        let ack = engine
            .ingest_frame(id, probability(&[("fear", 0.5)]), action_units(&[("AU45", 1.0)]))
            .await
            .unwrap();
        assert_eq!(ack.rule_label, Some(EmotionLabel::Neutral));

        let result = engine.stop_session(id).await.unwrap();
        assert!(!result.action_units.available);
        assert_eq!(result.action_units.label, EmotionLabel::Unknown);
        assert!(!result.sources_agree);
    }

    #[tokio::test]
    async fn test_stop_twice_is_not_found() {
        let engine = FusionEngine::new();
        let id = engine.start_session(SessionMetadata::default()).await;
        engine.ingest_frame(id, probability(&[("happy", 1.0)]), None).await.unwrap();

        assert!(engine.stop_session(id).await.is_ok());
        assert!(matches!(engine.stop_session(id).await, Err(FusionError::NotFound(_))));
        assert!(matches!(
            engine.ingest_frame(id, probability(&[("happy", 1.0)]), None).await,
            Err(FusionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_without_frames_is_no_data_and_consumes_session() {
        let engine = FusionEngine::new();
        let id = engine.start_session(SessionMetadata::default()).await;
        engine.ingest_frame(id, None, None).await.unwrap();

        assert!(matches!(engine.stop_session(id).await, Err(FusionError::NoData(_))));
        assert_eq!(engine.active_sessions().await, 0);
        assert!(matches!(engine.stop_session(id).await, Err(FusionError::NotFound(_))));
    }
}
