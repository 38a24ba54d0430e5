//! # emotrack common library
//!
//! Shared code for the emotrack services:
//! - Error type
//! - Configuration loading and resolution
//! - Emotion labels, action units, and validated score maps

pub mod config;
pub mod emotion;
pub mod error;

pub use emotion::{ActionUnit, ActionUnitSet, EmotionLabel, EmotionScoreSet};
pub use error::{Error, Result};
