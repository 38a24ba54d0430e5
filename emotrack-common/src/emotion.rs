//! Emotion vocabulary shared by all emotrack components
//!
//! Two classifier families feed the fusion service:
//! - a probabilistic classifier emitting a score per [`EmotionLabel`]
//! - an action-unit extractor emitting FACS intensities per [`ActionUnit`]
//!
//! Wire payloads arrive as string-keyed maps. `from_raw` is the validation
//! boundary: unknown labels, malformed action-unit codes, and negative or
//! non-finite values are rejected there with [`Error::InvalidInput`].

use std::collections::{btree_map, BTreeMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fixed emotion label set
///
/// Variants are declared in lexicographic order of their names, so the
/// derived `Ord` matches string order. Tie-breaks rely on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Contempt,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
    /// Output-only sentinel for "no decision"
    Unknown,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 9] = [
        EmotionLabel::Angry,
        EmotionLabel::Contempt,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Neutral,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
        EmotionLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Contempt => "contempt",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        EmotionLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == needle)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown emotion label: {:?}", s)))
    }
}

/// FACS action unit, identified by its number (1..=99)
///
/// Accepts `AU6`, `AU06`, `au06` and the OpenFace intensity column form
/// `AU06_r`. Always displayed as `AU06`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ActionUnit(u8);

impl ActionUnit {
    /// Inner brow raiser
    pub const AU01: ActionUnit = ActionUnit(1);
    /// Outer brow raiser
    pub const AU02: ActionUnit = ActionUnit(2);
    /// Brow lowerer
    pub const AU04: ActionUnit = ActionUnit(4);
    /// Upper lid raiser
    pub const AU05: ActionUnit = ActionUnit(5);
    /// Cheek raiser
    pub const AU06: ActionUnit = ActionUnit(6);
    /// Lid tightener
    pub const AU07: ActionUnit = ActionUnit(7);
    /// Nose wrinkler
    pub const AU09: ActionUnit = ActionUnit(9);
    /// Lip corner puller
    pub const AU12: ActionUnit = ActionUnit(12);
    /// Dimpler
    pub const AU14: ActionUnit = ActionUnit(14);
    /// Lip corner depressor
    pub const AU15: ActionUnit = ActionUnit(15);
    /// Chin raiser
    pub const AU17: ActionUnit = ActionUnit(17);
    /// Lip stretcher
    pub const AU20: ActionUnit = ActionUnit(20);
    /// Lip tightener
    pub const AU23: ActionUnit = ActionUnit(23);
    /// Jaw drop
    pub const AU26: ActionUnit = ActionUnit(26);

    /// Build from a FACS number, rejecting 0 and anything above 99
    pub fn new(number: u8) -> Result<Self> {
        if (1..=99).contains(&number) {
            Ok(ActionUnit(number))
        } else {
            Err(Error::InvalidInput(format!(
                "Action unit number out of range (1-99): {}",
                number
            )))
        }
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ActionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AU{:02}", self.0)
    }
}

impl FromStr for ActionUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("Invalid action unit code: {:?}", s));

        let code = s.trim();
        let code = code
            .strip_suffix("_r")
            .or_else(|| code.strip_suffix("_R"))
            .unwrap_or(code);

        let digits = match code.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("au") => &code[2..],
            _ => return Err(invalid()),
        };
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let number: u8 = digits.parse().map_err(|_| invalid())?;
        ActionUnit::new(number)
    }
}

impl From<ActionUnit> for String {
    fn from(unit: ActionUnit) -> Self {
        unit.to_string()
    }
}

impl TryFrom<String> for ActionUnit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

fn validate_value(key: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "Value for {} must be finite and non-negative, got {}",
            key, value
        )))
    }
}

/// Per-frame emotion scores, keyed by label
///
/// Scores are non-negative and finite but need not sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>")]
pub struct EmotionScoreSet(BTreeMap<EmotionLabel, f64>);

impl EmotionScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a wire-form map
    ///
    /// Rejects unrecognized labels, the `unknown` sentinel, duplicate labels
    /// after normalization, and negative or non-finite scores.
    pub fn from_raw<K, I>(raw: I) -> Result<Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut scores = BTreeMap::new();
        for (key, value) in raw {
            let key = key.as_ref();
            let label: EmotionLabel = key.parse()?;
            if label == EmotionLabel::Unknown {
                return Err(Error::InvalidInput(
                    "\"unknown\" is not accepted as an input label".to_string(),
                ));
            }
            let value = validate_value(key, value)?;
            if scores.insert(label, value).is_some() {
                return Err(Error::InvalidInput(format!("Duplicate emotion label: {}", label)));
            }
        }
        Ok(Self(scores))
    }

    /// Set one label's score, validated like [`EmotionScoreSet::from_raw`]
    ///
    /// Returns the previous score for the label, if any.
    pub fn insert(&mut self, label: EmotionLabel, score: f64) -> Result<Option<f64>> {
        if label == EmotionLabel::Unknown {
            return Err(Error::InvalidInput(
                "\"unknown\" is not accepted as an input label".to_string(),
            ));
        }
        let score = validate_value(label.as_str(), score)?;
        Ok(self.0.insert(label, score))
    }

    pub fn get(&self, label: EmotionLabel) -> Option<f64> {
        self.0.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f64)> + '_ {
        self.0.iter().map(|(label, score)| (*label, *score))
    }
}

/// Collects scores, skipping entries whose score is negative or non-finite
impl FromIterator<(EmotionLabel, f64)> for EmotionScoreSet {
    fn from_iter<I: IntoIterator<Item = (EmotionLabel, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .filter(|(_, score)| score.is_finite() && *score >= 0.0)
                .collect(),
        )
    }
}

impl TryFrom<BTreeMap<String, f64>> for EmotionScoreSet {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl<'a> IntoIterator for &'a EmotionScoreSet {
    type Item = (&'a EmotionLabel, &'a f64);
    type IntoIter = btree_map::Iter<'a, EmotionLabel, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Per-frame action-unit intensities; sparse, only detected units present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>")]
pub struct ActionUnitSet(BTreeMap<ActionUnit, f64>);

impl ActionUnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a wire-form map (see [`ActionUnit`] for accepted codes)
    pub fn from_raw<K, I>(raw: I) -> Result<Self>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let mut intensities = BTreeMap::new();
        for (key, value) in raw {
            let key = key.as_ref();
            let unit: ActionUnit = key.parse()?;
            let value = validate_value(key, value)?;
            if intensities.insert(unit, value).is_some() {
                return Err(Error::InvalidInput(format!("Duplicate action unit: {}", unit)));
            }
        }
        Ok(Self(intensities))
    }

    pub fn get(&self, unit: ActionUnit) -> Option<f64> {
        self.0.get(&unit).copied()
    }

    pub fn contains(&self, unit: ActionUnit) -> bool {
        self.0.contains_key(&unit)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionUnit, f64)> + '_ {
        self.0.iter().map(|(unit, value)| (*unit, *value))
    }
}

/// Collects intensities, skipping entries whose value is negative or non-finite
impl FromIterator<(ActionUnit, f64)> for ActionUnitSet {
    fn from_iter<I: IntoIterator<Item = (ActionUnit, f64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .filter(|(_, value)| value.is_finite() && *value >= 0.0)
                .collect(),
        )
    }
}

impl TryFrom<BTreeMap<String, f64>> for ActionUnitSet {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_raw(raw)
    }
}
