//! Wire-level request/response shapes and thin handlers over the core
//! components. Transport (HTTP framework, routing, status codes) stays with
//! the embedding application; this module only fixes the payload contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::error::OrchestratorError;
use crate::orchestrator::policy::{ApiName, RateLimitPolicy};
use crate::orchestrator::quota::{QuotaDecision, QuotaTracker, RemainingQuota};
use crate::orchestrator::session::SessionRecoveryManager;

/// Caller identity resolved by the embedding application's auth layer.
#[derive(Clone, Debug, Default)]
pub struct CallerContext {
    subject: Option<String>,
}

impl CallerContext {
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The quota-charged identity, or `Unauthenticated` when the ambient
    /// context carried none.
    pub fn subject(&self) -> Result<&str, OrchestratorError> {
        self.subject
            .as_deref()
            .ok_or(OrchestratorError::Unauthenticated)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaCheckRequest {
    pub api_name: String,
    pub user_id: String,
    pub operation: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaCheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub limits: RateLimitPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<RemainingQuota>,
    /// ISO-8601, present on denials: when the exceeded window resets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<DateTime<Utc>>,
}

impl From<QuotaDecision> for QuotaCheckResponse {
    fn from(decision: QuotaDecision) -> Self {
        match decision {
            QuotaDecision::Allowed { remaining, limits } => Self {
                allowed: true,
                reason: None,
                limits,
                current_usage: None,
                remaining: Some(remaining),
                reset_time: None,
            },
            QuotaDecision::Denied {
                reason,
                current_usage,
                limits,
                reset_time,
            } => Self {
                allowed: false,
                reason: Some(reason.reason().to_string()),
                limits,
                current_usage: Some(current_usage),
                remaining: None,
                reset_time: Some(reset_time),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelSessionResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub success: bool,
}

impl From<&OrchestratorError> for ErrorResponse {
    fn from(error: &OrchestratorError) -> Self {
        Self {
            error: error.to_string(),
            success: false,
        }
    }
}

/// Decide a quota check request. Denials are decisions, not errors: the
/// response is `allowed: false` with reason, limits, and reset time.
pub async fn handle_quota_check(
    tracker: &QuotaTracker,
    request: &QuotaCheckRequest,
) -> Result<QuotaCheckResponse, OrchestratorError> {
    let api: ApiName = request.api_name.parse()?;
    let decision = tracker
        .check_and_consume(&request.user_id, api, &request.operation)
        .await?;
    Ok(decision.into())
}

pub async fn handle_cancel_session(
    manager: &SessionRecoveryManager,
    context: &CallerContext,
    session_id: &str,
) -> Result<CancelSessionResponse, OrchestratorError> {
    let subject = context.subject()?;
    let session = manager.cancel_session(subject, session_id).await?;
    Ok(CancelSessionResponse {
        success: true,
        message: "Session cancelled".to_string(),
        session_id: session.session_id,
    })
}

pub async fn handle_session_cleanup(
    manager: &SessionRecoveryManager,
    context: &CallerContext,
) -> Result<CleanupResponse, OrchestratorError> {
    let subject = context.subject()?;
    let deleted_count = manager.cleanup_stale_sessions(subject).await?;
    Ok(CleanupResponse {
        success: true,
        message: format!("Deleted {deleted_count} stale sessions"),
        deleted_count,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::orchestrator::policy::PolicyTable;
    use crate::orchestrator::session::MiningSession;
    use crate::orchestrator::store::{MemoryStore, SessionStore};

    fn tracker() -> QuotaTracker {
        QuotaTracker::new(Arc::new(MemoryStore::new()), PolicyTable::default())
    }

    #[tokio::test]
    async fn quota_check_round_trips_through_the_wire_shape() {
        let tracker = tracker();
        let request = QuotaCheckRequest {
            api_name: "apollo".to_string(),
            user_id: "u1".to_string(),
            operation: "enrich_contact".to_string(),
        };

        let response = handle_quota_check(&tracker, &request).await.unwrap();
        assert!(response.allowed);
        assert_eq!(response.limits.daily, 1000);
        assert_eq!(response.remaining.unwrap().per_minute, 9);

        let raw = serde_json::to_value(&response).unwrap();
        // Denial-only fields are omitted from admissions.
        assert!(raw.get("reason").is_none());
        assert!(raw.get("reset_time").is_none());
        assert_eq!(raw["allowed"], true);
    }

    #[tokio::test]
    async fn denials_serialize_with_reason_and_reset_time() {
        let mut policies = PolicyTable::default();
        policies.set(
            ApiName::Serper,
            RateLimitPolicy {
                daily: 0,
                hourly: 0,
                per_minute: 0,
            },
        );
        let tracker = QuotaTracker::new(Arc::new(MemoryStore::new()), policies);
        let request = QuotaCheckRequest {
            api_name: "serper".to_string(),
            user_id: "u1".to_string(),
            operation: "search".to_string(),
        };

        let response = handle_quota_check(&tracker, &request).await.unwrap();
        assert!(!response.allowed);
        assert_eq!(response.reason.as_deref(), Some("Daily limit exceeded"));
        assert_eq!(response.current_usage, Some(0));

        let raw = serde_json::to_value(&response).unwrap();
        assert!(raw["reset_time"].is_string());
        assert!(raw.get("remaining").is_none());
    }

    #[tokio::test]
    async fn unknown_api_names_error_before_touching_the_store() {
        let tracker = tracker();
        let request = QuotaCheckRequest {
            api_name: "linkedin".to_string(),
            user_id: "u1".to_string(),
            operation: "scrape".to_string(),
        };

        let err = handle_quota_check(&tracker, &request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownApi { .. }));
        let wire = ErrorResponse::from(&err);
        assert!(!wire.success);
        assert!(wire.error.contains("linkedin"));
    }

    #[tokio::test]
    async fn session_handlers_require_an_authenticated_subject() {
        let store = Arc::new(MemoryStore::new());
        let manager = SessionRecoveryManager::new(store.clone());

        let err = handle_session_cleanup(&manager, &CallerContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Unauthenticated));

        store
            .put(MiningSession::begin("s1", "u1", "collect"))
            .await
            .unwrap();
        let response =
            handle_cancel_session(&manager, &CallerContext::authenticated("u1"), "s1")
                .await
                .unwrap();
        assert!(response.success);
        assert_eq!(response.session_id, "s1");

        let cleaned = handle_session_cleanup(&manager, &CallerContext::authenticated("u1"))
            .await
            .unwrap();
        assert_eq!(cleaned.deleted_count, 0);
    }
}
