//! Session finalization: reduce each source aggregate to one decision
//!
//! Confidence is `selected / sum(remaining maxima)`. Because the aggregate
//! holds per-label running maxima rather than a distribution, this is a
//! confidence relative to the other observed labels' best evidence, not a
//! probability. The approximation is intentional and applied identically
//! to both sources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use emotrack_common::EmotionLabel;
use serde::{Deserialize, Serialize};

use crate::aggregator::SessionAggregate;
use crate::error::FusionError;
use crate::registry::{Session, SessionId};

/// Decision for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub label: EmotionLabel,
    /// Relative confidence in [0, 1]
    pub confidence: f64,
    /// Aggregate the decision was computed from
    pub aggregate: BTreeMap<EmotionLabel, f64>,
    /// False when the source produced no evidence for the whole session
    pub available: bool,
}

impl SourceResult {
    fn unavailable() -> Self {
        Self {
            label: EmotionLabel::Unknown,
            confidence: 0.0,
            aggregate: BTreeMap::new(),
            available: false,
        }
    }

    fn decide(aggregate: &SessionAggregate) -> Option<Self> {
        let (label, score) = aggregate.best()?;
        // score / sum, with every term scaled by the maximum first so the
        // sum cannot overflow
        let confidence = if score > 0.0 {
            let relative_total: f64 = aggregate.iter().map(|(_, s)| s / score).sum();
            (1.0 / relative_total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(Self {
            label,
            confidence,
            aggregate: aggregate.iter().collect(),
            available: true,
        })
    }
}

/// Session outcome reported at stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub session_id: SessionId,
    pub name: Option<String>,
    pub key: Option<String>,
    pub frame_count: u64,
    pub probability_frames: u64,
    pub action_unit_frames: u64,
    /// Probability classifier decision (neutral excluded)
    pub probability: SourceResult,
    /// Action-unit rule engine decision; best effort
    pub action_units: SourceResult,
    /// Both sources available and in agreement
    pub sources_agree: bool,
    pub started_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
}

/// Probability-source decision
///
/// `neutral` is never reported; it is dropped before selection whether or
/// not it was observed.
pub fn decide_probability(
    id: SessionId,
    aggregate: &SessionAggregate,
) -> Result<SourceResult, FusionError> {
    let mut candidates = aggregate.clone();
    candidates.remove(EmotionLabel::Neutral);
    SourceResult::decide(&candidates).ok_or(FusionError::NoData(id))
}

/// Action-unit-source decision; an empty aggregate degrades to `unknown`
pub fn decide_action_units(aggregate: &SessionAggregate) -> SourceResult {
    SourceResult::decide(aggregate).unwrap_or_else(SourceResult::unavailable)
}

/// Reduce a session already removed from the registry
pub fn finalize(session: Session) -> Result<FinalResult, FusionError> {
    let probability = decide_probability(session.id, &session.probability)?;
    let action_units = decide_action_units(&session.action_units);
    let sources_agree = action_units.available && action_units.label == probability.label;

    Ok(FinalResult {
        session_id: session.id,
        name: session.metadata.name,
        key: session.metadata.key,
        frame_count: session.frame_count,
        probability_frames: session.probability_frames,
        action_unit_frames: session.action_unit_frames,
        probability,
        action_units,
        sources_agree,
        started_at: session.created_at,
        finalized_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use emotrack_common::EmotionScoreSet;
    use uuid::Uuid;

    fn aggregate(pairs: &[(EmotionLabel, f64)]) -> SessionAggregate {
        let mut aggregate = SessionAggregate::new();
        aggregate.merge(&pairs.iter().copied().collect::<EmotionScoreSet>());
        aggregate
    }

    #[test]
    fn test_probability_excludes_neutral() {
        let agg = aggregate(&[
            (EmotionLabel::Happy, 0.9),
            (EmotionLabel::Neutral, 0.95),
            (EmotionLabel::Sad, 0.1),
        ]);

        let result = decide_probability(Uuid::new_v4(), &agg).unwrap();
        assert_eq!(result.label, EmotionLabel::Happy);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(!result.aggregate.contains_key(&EmotionLabel::Neutral));
        assert!(result.available);
    }

    #[test]
    fn test_probability_without_neutral_is_fine() {
        let agg = aggregate(&[(EmotionLabel::Angry, 3.0), (EmotionLabel::Fear, 1.0)]);
        let result = decide_probability(Uuid::new_v4(), &agg).unwrap();
        assert_eq!(result.label, EmotionLabel::Angry);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_probability_only_neutral_is_no_data() {
        let id = Uuid::new_v4();
        let agg = aggregate(&[(EmotionLabel::Neutral, 0.99)]);
        assert!(matches!(decide_probability(id, &agg), Err(FusionError::NoData(got)) if got == id));
        assert!(matches!(
            decide_probability(id, &SessionAggregate::new()),
            Err(FusionError::NoData(_))
        ));
    }

    #[test]
    fn test_all_zero_scores_give_zero_confidence() {
        let agg = aggregate(&[(EmotionLabel::Sad, 0.0), (EmotionLabel::Happy, 0.0)]);
        let result = decide_probability(Uuid::new_v4(), &agg).unwrap();
        assert_eq!(result.label, EmotionLabel::Happy);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_extreme_scores_keep_relative_confidence() {
        let agg = aggregate(&[(EmotionLabel::Happy, 1.5e308), (EmotionLabel::Sad, 1.0e308)]);
        let result = decide_probability(Uuid::new_v4(), &agg).unwrap();
        assert_eq!(result.label, EmotionLabel::Happy);
        assert!((result.confidence - 0.6).abs() < 1e-9);

        let agg = aggregate(&[(EmotionLabel::Fear, f64::MAX), (EmotionLabel::Angry, f64::MAX)]);
        let result = decide_action_units(&agg);
        assert_eq!(result.label, EmotionLabel::Angry);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_action_units_empty_degrades() {
        let result = decide_action_units(&SessionAggregate::new());
        assert_eq!(result.label, EmotionLabel::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.available);
    }

    #[test]
    fn test_action_units_keep_every_label() {
        let agg = aggregate(&[(EmotionLabel::Contempt, 0.9), (EmotionLabel::Happy, 0.3)]);
        let result = decide_action_units(&agg);
        assert_eq!(result.label, EmotionLabel::Contempt);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        for _ in 0..50 {
            let agg = aggregate(&[
                (EmotionLabel::Surprise, 0.4),
                (EmotionLabel::Angry, 0.4),
                (EmotionLabel::Happy, 0.2),
            ]);
            let result = decide_probability(Uuid::new_v4(), &agg).unwrap();
            assert_eq!(result.label, EmotionLabel::Angry);
            assert_eq!(decide_action_units(&agg).label, EmotionLabel::Angry);
        }
    }
}
