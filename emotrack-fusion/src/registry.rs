//! Session registry
//!
//! Owns every live [`Session`]. The map lock is held only long enough to
//! insert, look up, or remove an entry; each session has its own mutex, so
//! ingests into one session serialize while other sessions proceed.
//!
//! Lifecycle: `Created -> Active -> Finalized`. Finalize removes the entry
//! under the map write lock and then marks the record terminal under the
//! session lock. An ingest that looked the entry up before removal but
//! locks it afterwards sees `Finalized` and fails with `NotFound`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use emotrack_common::EmotionScoreSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::aggregator::SessionAggregate;
use crate::error::FusionError;

/// Opaque session identity (random v4 UUID)
pub type SessionId = Uuid;

/// Caller-supplied session context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Subject name
    #[serde(default)]
    pub name: Option<String>,
    /// Stimulus text key the subject is reading
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Started, no frames yet
    Created,
    /// At least one frame ingested
    Active,
    /// Consumed by stop; terminal
    Finalized,
}

/// One session's accumulated state
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub metadata: SessionMetadata,
    pub state: SessionState,
    /// Running maxima from the probability classifier
    pub probability: SessionAggregate,
    /// Running maxima from the action-unit rule engine
    pub action_units: SessionAggregate,
    /// Raw frames submitted, scored or not
    pub frame_count: u64,
    /// Frames that contributed a non-empty probability score set
    pub probability_frames: u64,
    /// Frames whose action units gated at least one rule
    pub action_unit_frames: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(id: SessionId, metadata: SessionMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            metadata,
            state: SessionState::Created,
            probability: SessionAggregate::new(),
            action_units: SessionAggregate::new(),
            frame_count: 0,
            probability_frames: 0,
            action_unit_frames: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Count one frame and merge whatever score sets it produced
    ///
    /// Returns the 1-based frame number.
    pub fn record_frame(
        &mut self,
        probability: Option<&EmotionScoreSet>,
        action_units: Option<&EmotionScoreSet>,
    ) -> u64 {
        self.state = SessionState::Active;
        self.frame_count += 1;
        self.last_activity = Utc::now();

        if let Some(scores) = probability.filter(|scores| !scores.is_empty()) {
            self.probability.merge(scores);
            self.probability_frames += 1;
        }
        if let Some(scores) = action_units.filter(|scores| !scores.is_empty()) {
            self.action_units.merge(scores);
            self.action_unit_frames += 1;
        }

        self.frame_count
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            name: self.metadata.name.clone(),
            key: self.metadata.key.clone(),
            state: self.state,
            frame_count: self.frame_count,
            probability_frames: self.probability_frames,
            action_unit_frames: self.action_unit_frames,
            probability: self.probability.clone(),
            action_units: self.action_units.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }
}

/// Point-in-time copy of a session for reporting
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub name: Option<String>,
    pub key: Option<String>,
    pub state: SessionState,
    pub frame_count: u64,
    pub probability_frames: u64,
    pub action_unit_frames: u64,
    pub probability: SessionAggregate,
    pub action_units: SessionAggregate,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Concurrency-safe map of live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an empty session under a fresh identity
    pub async fn create(&self, metadata: SessionMetadata) -> SessionId {
        let mut sessions = self.sessions.write().await;
        loop {
            let id = Uuid::new_v4();
            if let Entry::Vacant(slot) = sessions.entry(id) {
                slot.insert(Arc::new(Mutex::new(Session::new(id, metadata))));
                return id;
            }
        }
    }

    async fn entry(&self, id: SessionId) -> Result<Arc<Mutex<Session>>, FusionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(FusionError::NotFound(id))
    }

    /// Run `f` on the live session under its lock
    pub async fn with_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, FusionError> {
        let entry = self.entry(id).await?;
        let mut session = entry.lock().await;
        if session.state == SessionState::Finalized {
            return Err(FusionError::NotFound(id));
        }
        Ok(f(&mut session))
    }

    pub async fn get(&self, id: SessionId) -> Result<SessionSnapshot, FusionError> {
        self.with_session(id, |session| session.snapshot()).await
    }

    /// Remove the session and hand back its final state
    ///
    /// Waits for any in-flight ingest on the same session to finish.
    pub async fn finalize(&self, id: SessionId) -> Result<Session, FusionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(FusionError::NotFound(id))?;

        let mut session = entry.lock().await;
        if session.state == SessionState::Finalized {
            return Err(FusionError::AlreadyFinalized(id));
        }
        session.state = SessionState::Finalized;
        Ok(session.clone())
    }

    /// Snapshots of every live session
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let entries: Vec<_> = self.sessions.read().await.values().cloned().collect();

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            let session = entry.lock().await;
            if session.state != SessionState::Finalized {
                snapshots.push(session.snapshot());
            }
        }
        snapshots.sort_by_key(|snapshot| snapshot.created_at);
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove sessions idle for longer than `max_idle`
    pub async fn sweep_idle(&self, max_idle: Duration) -> Vec<Session> {
        let cutoff = chrono::Duration::from_std(max_idle)
            .ok()
            .and_then(|max_idle| Utc::now().checked_sub_signed(max_idle));
        match cutoff {
            Some(cutoff) => self.sweep_inactive_since(cutoff).await,
            None => Vec::new(),
        }
    }

    /// Remove sessions whose last activity is before `cutoff`
    ///
    /// Sessions locked by an in-flight ingest are active by definition and
    /// are skipped.
    pub async fn sweep_inactive_since(&self, cutoff: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();

        sessions.retain(|_, entry| {
            let Ok(mut session) = entry.try_lock() else {
                return true;
            };
            if session.last_activity >= cutoff {
                return true;
            }
            session.state = SessionState::Finalized;
            expired.push(session.clone());
            false
        });

        expired
    }
}
