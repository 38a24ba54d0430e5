//! Finalized session result persistence

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use emotrack_common::{EmotionLabel, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::finalizer::{FinalResult, SourceResult};

fn internal(what: &str, e: impl std::fmt::Display) -> emotrack_common::Error {
    emotrack_common::Error::Internal(format!("Failed to {}: {}", what, e))
}

/// Save a finalized session result
///
/// A session id is finalized at most once, so a second save for the same
/// id replaces the first.
pub async fn save_result(pool: &SqlitePool, result: &FinalResult) -> Result<()> {
    // Prepare all data before touching the pool
    let session_id = result.session_id.to_string();
    let probability_aggregate = serde_json::to_string(&result.probability.aggregate)
        .map_err(|e| internal("serialize probability aggregate", e))?;
    let action_unit_aggregate = serde_json::to_string(&result.action_units.aggregate)
        .map_err(|e| internal("serialize action-unit aggregate", e))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO session_results (
            session_id, name, session_key,
            frame_count, probability_frames, action_unit_frames,
            probability_label, probability_confidence, probability_aggregate,
            action_unit_label, action_unit_confidence, action_unit_aggregate,
            action_units_available, sources_agree, started_at, finalized_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session_id)
    .bind(&result.name)
    .bind(&result.key)
    .bind(result.frame_count as i64)
    .bind(result.probability_frames as i64)
    .bind(result.action_unit_frames as i64)
    .bind(result.probability.label.as_str())
    .bind(result.probability.confidence)
    .bind(&probability_aggregate)
    .bind(result.action_units.label.as_str())
    .bind(result.action_units.confidence)
    .bind(&action_unit_aggregate)
    .bind(result.action_units.available)
    .bind(result.sources_agree)
    .bind(result.started_at.to_rfc3339())
    .bind(result.finalized_at.to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!(session_id = %session_id, "Session result saved");
    Ok(())
}

/// Load a finalized session result
pub async fn load_result(pool: &SqlitePool, session_id: Uuid) -> Result<Option<FinalResult>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, name, session_key,
               frame_count, probability_frames, action_unit_frames,
               probability_label, probability_confidence, probability_aggregate,
               action_unit_label, action_unit_confidence, action_unit_aggregate,
               action_units_available, sources_agree, started_at, finalized_at
        FROM session_results
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| result_from_row(session_id, &row)).transpose()
}

fn result_from_row(session_id: Uuid, row: &SqliteRow) -> Result<FinalResult> {
    let probability = SourceResult {
        label: parse_label(row.get("probability_label"))?,
        confidence: row.get("probability_confidence"),
        aggregate: parse_aggregate(row.get("probability_aggregate"))?,
        available: true,
    };
    let action_units = SourceResult {
        label: parse_label(row.get("action_unit_label"))?,
        confidence: row.get("action_unit_confidence"),
        aggregate: parse_aggregate(row.get("action_unit_aggregate"))?,
        available: row.get("action_units_available"),
    };

    Ok(FinalResult {
        session_id,
        name: row.get("name"),
        key: row.get("session_key"),
        frame_count: row.get::<i64, _>("frame_count") as u64,
        probability_frames: row.get::<i64, _>("probability_frames") as u64,
        action_unit_frames: row.get::<i64, _>("action_unit_frames") as u64,
        probability,
        action_units,
        sources_agree: row.get("sources_agree"),
        started_at: parse_timestamp(row.get("started_at"))?,
        finalized_at: parse_timestamp(row.get("finalized_at"))?,
    })
}

fn parse_label(value: String) -> Result<EmotionLabel> {
    value.parse().map_err(|e| internal("parse stored label", e))
}

fn parse_aggregate(value: String) -> Result<BTreeMap<EmotionLabel, f64>> {
    serde_json::from_str(&value).map_err(|e| internal("deserialize aggregate", e))
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| internal("parse timestamp", e))
}
