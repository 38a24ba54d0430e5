//! Running-maximum aggregation of per-frame scores
//!
//! Each session keeps one [`SessionAggregate`] per source. Merging keeps,
//! for every label ever observed, the best score seen in any frame. The
//! result is "best evidence per label", not a distribution: after the
//! first merge the values need not sum to 1.

use std::collections::BTreeMap;

use emotrack_common::{EmotionLabel, EmotionScoreSet};
use serde::{Deserialize, Serialize};

/// Per-label running maximum for one source of one session
///
/// A label absent from the map has never been observed in this session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionAggregate {
    maxima: BTreeMap<EmotionLabel, f64>,
}

impl SessionAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the aggregate
    ///
    /// Labels missing from `incoming` are left untouched, so a label that
    /// was not gated in this frame never regresses an earlier maximum.
    pub fn merge(&mut self, incoming: &EmotionScoreSet) {
        for (label, score) in incoming.iter() {
            self.maxima
                .entry(label)
                .and_modify(|best| *best = best.max(score))
                .or_insert(score);
        }
    }

    pub fn get(&self, label: EmotionLabel) -> Option<f64> {
        self.maxima.get(&label).copied()
    }

    /// Drop a label; no-op if it was never observed
    pub fn remove(&mut self, label: EmotionLabel) -> Option<f64> {
        self.maxima.remove(&label)
    }

    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }

    /// Labels in ascending label order
    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        self.maxima.iter().map(|(label, score)| (*label, *score))
    }

    /// Highest-scoring label; ties go to the smallest label
    pub fn best(&self) -> Option<(EmotionLabel, f64)> {
        select_best(self.iter())
    }
}

/// Maximum of `(label, score)` pairs given in ascending label order
///
/// Only a strictly greater score displaces the current pick, so ties
/// resolve to the smallest label.
pub(crate) fn select_best(
    scores: impl Iterator<Item = (EmotionLabel, f64)>,
) -> Option<(EmotionLabel, f64)> {
    scores.fold(None, |best, (label, score)| match best {
        Some((_, best_score)) if best_score >= score => best,
        _ => Some((label, score)),
    })
}
