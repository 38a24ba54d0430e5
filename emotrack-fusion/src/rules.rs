//! Action-unit to emotion rule engine
//!
//! Each rule gates one label on a set of required action units. Once every
//! required unit is present, the label scores the mean intensity of the
//! required units plus whichever optional units are also present. Labels
//! whose gate fails are left out of the result entirely; a zero would be
//! read as evidence by the aggregator.
//!
//! | Label    | Required            | Optional            |
//! |----------|---------------------|---------------------|
//! | happy    | AU06 AU12           |                     |
//! | sad      | AU01 AU04 AU15      |                     |
//! | angry    | AU04 AU07           | AU05 AU23           |
//! | fear     | AU01 AU02 AU04      | AU05 AU20 AU26      |
//! | disgust  | AU09                | AU15 AU17           |
//! | surprise | AU01 AU02           | AU05 AU26           |
//! | contempt | AU14                |                     |

use emotrack_common::{ActionUnit, ActionUnitSet, EmotionLabel, EmotionScoreSet};

use tracing::warn;

use crate::aggregator::select_best;

/// One gated, equal-weight rule
#[derive(Debug)]
pub struct EmotionRule {
    pub label: EmotionLabel,
    pub required: &'static [ActionUnit],
    pub optional: &'static [ActionUnit],
}

impl EmotionRule {
    /// Mean intensity over present units, or `None` if the gate fails
    ///
    /// The mean is accumulated incrementally so intensities near
    /// `f64::MAX` cannot overflow an intermediate sum.
    pub fn evaluate(&self, aus: &ActionUnitSet) -> Option<f64> {
        let required = self
            .required
            .iter()
            .map(|unit| aus.get(*unit))
            .collect::<Option<Vec<f64>>>()?;
        let optional = self.optional.iter().filter_map(|unit| aus.get(*unit));

        let mut mean = 0.0;
        for (n, value) in required.into_iter().chain(optional).enumerate() {
            mean += (value - mean) / (n + 1) as f64;
        }
        Some(mean)
    }
}

/// Fixed rule table
pub const RULES: &[EmotionRule] = &[
    EmotionRule {
        label: EmotionLabel::Happy,
        required: &[ActionUnit::AU06, ActionUnit::AU12],
        optional: &[],
    },
    EmotionRule {
        label: EmotionLabel::Sad,
        required: &[ActionUnit::AU01, ActionUnit::AU04, ActionUnit::AU15],
        optional: &[],
    },
    EmotionRule {
        label: EmotionLabel::Angry,
        required: &[ActionUnit::AU04, ActionUnit::AU07],
        optional: &[ActionUnit::AU05, ActionUnit::AU23],
    },
    EmotionRule {
        label: EmotionLabel::Fear,
        required: &[ActionUnit::AU01, ActionUnit::AU02, ActionUnit::AU04],
        optional: &[ActionUnit::AU05, ActionUnit::AU20, ActionUnit::AU26],
    },
    EmotionRule {
        label: EmotionLabel::Disgust,
        required: &[ActionUnit::AU09],
        optional: &[ActionUnit::AU15, ActionUnit::AU17],
    },
    EmotionRule {
        label: EmotionLabel::Surprise,
        required: &[ActionUnit::AU01, ActionUnit::AU02],
        optional: &[ActionUnit::AU05, ActionUnit::AU26],
    },
    EmotionRule {
        label: EmotionLabel::Contempt,
        required: &[ActionUnit::AU14],
        optional: &[],
    },
];

/// Rule engine output for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleInference {
    /// Gated labels only; empty means "no inference"
    pub scores: EmotionScoreSet,
}

impl RuleInference {
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Per-frame summary label: best gated label, `neutral` if none gated
    ///
    /// Informational only; the session aggregate is built from `scores`.
    pub fn dominant(&self) -> EmotionLabel {
        select_best(self.scores.iter())
            .map(|(label, _)| label)
            .unwrap_or(EmotionLabel::Neutral)
    }
}

/// Apply the rule table to one frame's action units
pub fn infer(aus: &ActionUnitSet) -> RuleInference {
    let mut scores = EmotionScoreSet::new();
    for rule in RULES {
        let Some(score) = rule.evaluate(aus) else {
            continue;
        };
        // Means of validated intensities are always accepted
        if let Err(e) = scores.insert(rule.label, score) {
            warn!(label = %rule.label, error = %e, "Gated rule score rejected");
        }
    }
    RuleInference { scores }
}
