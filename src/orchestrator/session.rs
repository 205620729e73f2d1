//! Mining session records and crash/abandon recovery.
//!
//! A mining session is a long-running, multi-step background job tracked
//! independently of the rate limiter. The recovery manager repairs records
//! left inconsistent by a crash or navigation-away, cancels owned sessions,
//! and purges records past the retention window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::orchestrator::error::{NotFoundSnafu, OrchestratorError, PersistenceFailureSnafu};
use crate::orchestrator::internal_event::{InternalEvent, StaleSessionsPurged};
use crate::orchestrator::store::SessionStore;

/// Sessions older than this are eligible for deletion regardless of status.
pub const RETENTION_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl SessionStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Authoritative record of one long-running multi-step job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiningSession {
    pub session_id: String,
    pub user_id: String,
    pub status: SessionStatus,
    pub current_step: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl MiningSession {
    pub fn begin(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        current_step: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            status: SessionStatus::Running,
            current_step: current_step.into(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// Detects and repairs session state after crashes, cancellations, and
/// abandonment.
pub struct SessionRecoveryManager {
    store: Arc<dyn SessionStore>,
    retention_days: i64,
}

impl SessionRecoveryManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            retention_days: RETENTION_DAYS,
        }
    }

    pub fn with_retention_days(mut self, retention_days: i64) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Put the session record back into a consistent state after the caller
    /// detected its own job was interrupted.
    ///
    /// A `Running` record is marked `Failed` with `completed_at` set; records
    /// already in a terminal state are left alone. Best-effort: missing
    /// records and persistence failures come back as `false`, never an
    /// error, so recovery can never crash the caller.
    pub async fn recover_session(&self, session_id: &str) -> bool {
        let mut session = match self.store.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!(
                    message = "Nothing to recover; session record not found.",
                    session_id = %session_id,
                );
                return false;
            }
            Err(error) => {
                warn!(
                    message = "Session lookup failed during recovery.",
                    session_id = %session_id,
                    error = %error,
                );
                return false;
            }
        };

        if session.status.is_terminal() {
            return true;
        }

        session.status = SessionStatus::Failed;
        session.completed_at = Some(Utc::now());
        session.error_message = Some("interrupted".to_string());

        match self.store.put(session).await {
            Ok(()) => {
                info!(
                    message = "Recovered interrupted session.",
                    session_id = %session_id,
                );
                true
            }
            Err(error) => {
                warn!(
                    message = "Failed to persist recovered session.",
                    session_id = %session_id,
                    error = %error,
                );
                false
            }
        }
    }

    /// Cancel a running session owned by `subject`.
    ///
    /// Fails with `NotFound` unless a running session with this id belongs
    /// to the subject.
    pub async fn cancel_session(
        &self,
        subject: &str,
        session_id: &str,
    ) -> Result<MiningSession, OrchestratorError> {
        let found = self
            .store
            .get(session_id)
            .await
            .context(PersistenceFailureSnafu)?;

        let mut session = found
            .filter(|session| {
                session.user_id == subject && session.status == SessionStatus::Running
            })
            .ok_or_else(|| NotFoundSnafu { session_id }.build())?;

        session.status = SessionStatus::Cancelled;
        session.completed_at = Some(Utc::now());
        self.store
            .put(session.clone())
            .await
            .context(PersistenceFailureSnafu)?;

        info!(
            message = "Cancelled session.",
            session_id = %session_id,
            subject = %subject,
        );
        Ok(session)
    }

    /// Delete every session of `subject` started before the retention
    /// window, regardless of status. Returns the number deleted.
    ///
    /// Filters by age, not liveness, so it is safe to run concurrently with
    /// operations on unrelated sessions.
    pub async fn cleanup_stale_sessions(&self, subject: &str) -> Result<usize, OrchestratorError> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let sessions = self
            .store
            .list_for_user(subject)
            .await
            .context(PersistenceFailureSnafu)?;

        let mut deleted = 0;
        for session in sessions {
            if session.started_at < cutoff {
                self.store
                    .delete(&session.session_id)
                    .await
                    .context(PersistenceFailureSnafu)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!(
                message = "Purged stale sessions.",
                subject = %subject,
                deleted,
            );
        }
        StaleSessionsPurged { deleted }.emit();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::orchestrator::error::StoreError;
    use crate::orchestrator::store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, SessionRecoveryManager) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), SessionRecoveryManager::new(store))
    }

    fn session_started(id: &str, user: &str, days_ago: i64) -> MiningSession {
        let mut session = MiningSession::begin(id, user, "collect");
        session.started_at = Utc::now() - Duration::days(days_ago);
        session
    }

    #[tokio::test]
    async fn recover_marks_a_running_session_failed() {
        let (store, manager) = manager();
        store
            .put(MiningSession::begin("s1", "u1", "collect"))
            .await
            .unwrap();

        assert!(manager.recover_session("s1").await);

        let recovered = store.get("s1").await.unwrap().unwrap();
        assert_eq!(recovered.status, SessionStatus::Failed);
        assert!(recovered.completed_at.is_some());
        assert_eq!(recovered.error_message.as_deref(), Some("interrupted"));
    }

    #[tokio::test]
    async fn recover_leaves_terminal_sessions_alone() {
        let (store, manager) = manager();
        let mut done = MiningSession::begin("s1", "u1", "finish");
        done.status = SessionStatus::Completed;
        store.put(done.clone()).await.unwrap();

        assert!(manager.recover_session("s1").await);
        assert_eq!(store.get("s1").await.unwrap().unwrap(), done);
    }

    #[tokio::test]
    async fn recover_is_best_effort_on_missing_records_and_store_errors() {
        let (_, manager) = manager();
        assert!(!manager.recover_session("ghost").await);

        struct BrokenStore;

        #[async_trait]
        impl SessionStore for BrokenStore {
            async fn get(&self, _: &str) -> Result<Option<MiningSession>, StoreError> {
                Err(StoreError::new("store offline"))
            }
            async fn put(&self, _: MiningSession) -> Result<(), StoreError> {
                Err(StoreError::new("store offline"))
            }
            async fn delete(&self, _: &str) -> Result<(), StoreError> {
                Err(StoreError::new("store offline"))
            }
            async fn list_for_user(&self, _: &str) -> Result<Vec<MiningSession>, StoreError> {
                Err(StoreError::new("store offline"))
            }
        }

        let broken = SessionRecoveryManager::new(Arc::new(BrokenStore));
        assert!(!broken.recover_session("s1").await);
    }

    #[tokio::test]
    async fn cancel_requires_an_owned_running_session() {
        let (store, manager) = manager();
        store
            .put(MiningSession::begin("s1", "u1", "collect"))
            .await
            .unwrap();

        // Wrong owner.
        let err = manager.cancel_session("u2", "s1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));

        // Unknown id.
        let err = manager.cancel_session("u1", "nope").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));

        let cancelled = manager.cancel_session("u1", "s1").await.unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        // Already cancelled, so no longer a matching running session.
        let err = manager.cancel_session("u1", "s1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cleanup_deletes_by_age_not_status() {
        let (store, manager) = manager();
        store.put(session_started("old", "u1", 8)).await.unwrap();
        let mut old_done = session_started("old_done", "u1", 9);
        old_done.status = SessionStatus::Completed;
        store.put(old_done).await.unwrap();
        store.put(session_started("fresh", "u1", 6)).await.unwrap();
        store.put(session_started("other", "u2", 30)).await.unwrap();

        let deleted = manager.cleanup_stale_sessions("u1").await.unwrap();
        assert_eq!(deleted, 2);

        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("old_done").await.unwrap().is_none());
        // The six-day-old session survives, and other subjects are untouched.
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("other").await.unwrap().is_some());
    }
}
