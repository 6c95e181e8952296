//! In-memory session store: user profiles, analysis results and feedback.
//!
//! Entries idle for longer than the TTL are dropped lazily on access and by
//! the periodic sweep spawned in `main`.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::models::{AnalysisResult, AnalysisSummary, Feedback, UserProfile};

/// Store-wide counts for the metrics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub stored_analyses: usize,
    pub feedback_count: usize,
    /// Mean of the feedback entries that carry a rating.
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone)]
struct Session {
    profile: UserProfile,
    analyses: Vec<Uuid>,
    last_active: Instant,
}

#[derive(Debug, Clone)]
struct StoredAnalysis {
    result: AnalysisResult,
    stored_at: Instant,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, Session>,
    analyses: HashMap<Uuid, StoredAnalysis>,
    feedback: Vec<Feedback>,
}

pub struct SessionStore {
    ttl: Duration,
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    fn expired(&self, since: Instant, now: Instant) -> bool {
        now.duration_since(since) > self.ttl
    }

    pub async fn create_session(&self, profile: UserProfile) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        inner.sessions.insert(
            id,
            Session {
                profile,
                analyses: Vec::new(),
                last_active: Instant::now(),
            },
        );
        debug!(session_id = %id, "Session created");
        id
    }

    /// Returns the profile and refreshes the session's idle timer.
    pub async fn get_profile(&self, session_id: Uuid) -> Option<UserProfile> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let last_active = inner.sessions.get(&session_id)?.last_active;
        if self.expired(last_active, now) {
            inner.sessions.remove(&session_id);
            return None;
        }
        let session = inner.sessions.get_mut(&session_id)?;
        session.last_active = now;
        Some(session.profile.clone())
    }

    /// Replaces the profile. `false` when the session is unknown or expired.
    pub async fn update_profile(&self, session_id: Uuid, profile: UserProfile) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&session_id) {
            Some(session) if !self.expired(session.last_active, now) => {
                session.profile = profile;
                session.last_active = now;
                true
            }
            _ => false,
        }
    }

    /// Stores a result and, when it belongs to a live session, appends it to that history.
    pub async fn record_analysis(&self, result: AnalysisResult) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        if let Some(session_id) = result.session_id {
            if let Some(session) = inner.sessions.get_mut(&session_id) {
                session.analyses.push(result.analysis_id);
                session.last_active = now;
            }
        }
        inner.analyses.insert(
            result.analysis_id,
            StoredAnalysis {
                result,
                stored_at: now,
            },
        );
    }

    pub async fn get_analysis(&self, analysis_id: Uuid) -> Option<AnalysisResult> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner
            .analyses
            .get(&analysis_id)
            .filter(|stored| !self.expired(stored.stored_at, now))
            .map(|stored| stored.result.clone())
    }

    /// Summaries of the session's analyses, oldest first. `None` for unknown sessions.
    pub async fn history(&self, session_id: Uuid) -> Option<Vec<AnalysisSummary>> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        let session = inner.sessions.get(&session_id)?;
        if self.expired(session.last_active, now) {
            return None;
        }
        Some(
            session
                .analyses
                .iter()
                .filter_map(|id| inner.analyses.get(id))
                .filter(|stored| !self.expired(stored.stored_at, now))
                .map(|stored| AnalysisSummary::from(&stored.result))
                .collect(),
        )
    }

    pub async fn add_feedback(&self, feedback: Feedback) {
        let mut inner = self.inner.write().await;
        info!(
            analysis_id = %feedback.analysis_id,
            feedback_type = ?feedback.feedback_type,
            rating = ?feedback.rating,
            "Feedback recorded"
        );
        inner.feedback.push(feedback);
    }

    pub async fn feedback_for(&self, analysis_id: Uuid) -> Vec<Feedback> {
        let inner = self.inner.read().await;
        inner
            .feedback
            .iter()
            .filter(|f| f.analysis_id == analysis_id)
            .cloned()
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        let ratings: Vec<f64> = inner
            .feedback
            .iter()
            .filter_map(|f| f.rating)
            .map(f64::from)
            .collect();
        StoreStats {
            active_sessions: inner.sessions.len(),
            stored_analyses: inner.analyses.len(),
            feedback_count: inner.feedback.len(),
            average_rating: (!ratings.is_empty())
                .then(|| ratings.iter().sum::<f64>() / ratings.len() as f64),
        }
    }

    /// Drops idle sessions and stale analyses (with their feedback). Returns how many entries went.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        let sessions_before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, s| now.duration_since(s.last_active) <= self.ttl);

        let analyses_before = inner.analyses.len();
        inner
            .analyses
            .retain(|_, a| now.duration_since(a.stored_at) <= self.ttl);

        let StoreInner {
            sessions,
            analyses,
            feedback,
        } = &mut *inner;
        feedback.retain(|f| analyses.contains_key(&f.analysis_id));
        for session in sessions.values_mut() {
            session.analyses.retain(|id| analyses.contains_key(id));
        }

        let removed = (sessions_before - inner.sessions.len())
            + (analyses_before - inner.analyses.len());
        if removed > 0 {
            debug!("Purged {removed} expired session entries");
        }
        removed
    }
}
