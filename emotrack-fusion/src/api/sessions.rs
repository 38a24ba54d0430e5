//! Session lifecycle endpoints
//!
//! The session travels in the `SessionId` header on every call after
//! `/start`.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use emotrack_common::{ActionUnitSet, EmotionLabel, EmotionScoreSet};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::aggregator::select_best;
use crate::collaborators::decode_image_data;
use crate::db;
use crate::engine::FrameAck;
use crate::error::{ApiError, ApiResult};
use crate::finalizer::FinalResult;
use crate::registry::{SessionId, SessionMetadata, SessionSnapshot};
use crate::AppState;

/// Header carrying the session identifier
pub const SESSION_ID_HEADER: &str = "sessionid";

fn session_id_from_headers(headers: &HeaderMap) -> ApiResult<SessionId> {
    let value = headers
        .get(SESSION_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest("Missing SessionId header".to_string()))?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("SessionId header is not valid text".to_string()))?;
    Uuid::parse_str(value.trim())
        .map_err(|_| ApiError::BadRequest(format!("Invalid SessionId header: {:?}", value)))
}

/// Start response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: SessionId,
}

/// PUT /start
///
/// Body is optional; when present it carries `{name?, key?}`.
pub async fn start_session(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StartResponse>> {
    let metadata: SessionMetadata = if body.iter().all(u8::is_ascii_whitespace) {
        SessionMetadata::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid session metadata: {}", e)))?
    };

    let session_id = state.engine.start_session(metadata).await;
    Ok(Json(StartResponse { session_id }))
}

/// Precomputed per-frame outputs
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Probability classifier output, label -> score
    #[serde(default)]
    pub scores: Option<BTreeMap<String, f64>>,
    /// Action-unit intensities, code -> intensity
    #[serde(default)]
    pub action_units: Option<BTreeMap<String, f64>>,
}

/// POST /ingest
pub async fn ingest_frame(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<FrameAck>> {
    let session_id = session_id_from_headers(&headers)?;
    let scores = request.scores.map(EmotionScoreSet::from_raw).transpose()?;
    let action_units = request.action_units.map(ActionUnitSet::from_raw).transpose()?;

    let ack = state
        .engine
        .ingest_frame(session_id, scores, action_units)
        .await?;
    Ok(Json(ack))
}

/// Raw frame upload
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    /// `data:image/<type>;base64,<payload>`
    #[serde(rename = "imageData")]
    pub image_data: String,
}

/// Per-frame process response
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub ack: FrameAck,
    /// Highest-scoring label of this frame, when the analyzer produced one
    pub emotion: Option<EmotionLabel>,
    pub action_units_extracted: bool,
}

/// POST /process
///
/// Runs the collaborators on the image, then ingests whatever they
/// produced. A frame nobody could score still counts.
pub async fn process_frame(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    let session_id = session_id_from_headers(&headers)?;
    let image = decode_image_data(&request.image_data)?;

    // Fail fast before paying for inference
    state.engine.session_snapshot(session_id).await?;

    let outputs = state.collaborators.analyze_frame(&image).await;
    let emotion = outputs
        .scores
        .as_ref()
        .and_then(|scores| select_best(scores.iter()))
        .map(|(label, _)| label);
    let action_units_extracted = outputs.action_units.is_some();

    let ack = state
        .engine
        .ingest_frame(session_id, outputs.scores, outputs.action_units)
        .await?;

    Ok(Json(ProcessResponse {
        ack,
        emotion,
        action_units_extracted,
    }))
}

/// DELETE /stop
///
/// Returns the final result and records it. A storage failure is logged
/// and does not withhold the result.
pub async fn stop_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<FinalResult>> {
    let session_id = session_id_from_headers(&headers)?;
    let result = state.engine.stop_session(session_id).await?;

    if let Err(e) = db::results::save_result(&state.db, &result).await {
        error!(session_id = %session_id, error = %e, "Failed to persist session result");
    }

    Ok(Json(result))
}

/// Live session listing
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<SessionSnapshot>,
}

/// GET /sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.engine.list_sessions().await;
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /results/:session_id
///
/// Previously finalized result, read back from storage.
pub async fn get_result(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<FinalResult>> {
    let result = db::results::load_result(&state.db, session_id)
        .await?
        .ok_or_else(|| {
            emotrack_common::Error::NotFound(format!("No stored result for session {}", session_id))
        })?;

    info!(session_id = %session_id, "Stored result served");
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_session_id_header_is_case_insensitive() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(b"SessionId").unwrap(),
            HeaderValue::from_str(&id.to_string()).unwrap(),
        );
        assert_eq!(session_id_from_headers(&headers).unwrap(), id);
    }

    #[test]
    fn test_session_id_header_errors() {
        assert!(matches!(
            session_id_from_headers(&HeaderMap::new()),
            Err(ApiError::BadRequest(_))
        ));

        let mut headers = HeaderMap::new();
        headers.insert("sessionid", HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            session_id_from_headers(&headers),
            Err(ApiError::BadRequest(_))
        ));
    }
}
