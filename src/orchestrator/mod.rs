//! Coordinate bounded, concurrent access to rate-limited external services.
//!
//! The pieces compose around two external store contracts: a caller asks the
//! [`quota::QuotaTracker`] for admission, wraps the admitted call with the
//! [`retries::RetryEngine`], falls back through the
//! [`fallback::FallbackSelector`] when a service stays down, and sizes bulk
//! work with [`batch::predict_batch_size`] against a caller-owned
//! [`quota::UsageCache`]. The [`session::SessionRecoveryManager`] runs
//! independently, on demand or on a timer.

pub mod api;
pub mod batch;
pub mod error;
pub mod fallback;
pub mod health;
pub mod internal_event;
pub mod policy;
pub mod quota;
pub mod retries;
pub mod session;
pub mod store;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;

pub use error::{OrchestratorError, StoreError};
pub use fallback::{FallbackSelector, HttpProbe};
pub use policy::{ApiName, PolicyTable, RateLimitPolicy};
pub use quota::{QuotaDecision, QuotaTracker, UsageCache};
pub use retries::{RetryConfig, RetryEngine, RetryOptions};
pub use session::SessionRecoveryManager;
pub use store::{CounterStore, SessionStore};

/// Deploy-time knobs for an embedded orchestrator.
///
/// The defaults match the deployed service table and windows; overriding
/// them is only expected in tests and staging environments.
#[derive(Clone, Debug, Builder)]
pub struct OrchestratorSettings {
    /// The authoritative per-service rate limit table.
    #[builder(default)]
    pub policies: PolicyTable,

    /// Backoff defaults for callers that don't bring their own
    /// [`RetryConfig`].
    #[builder(default)]
    pub retry: RetryConfig,

    /// Deadline for a single fallback liveness probe.
    #[builder(default = fallback::PROBE_TIMEOUT)]
    pub probe_timeout: Duration,

    /// Age past which mining sessions are purged regardless of status.
    #[builder(default = session::RETENTION_DAYS)]
    pub session_retention_days: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The components wired over a counter store and a session store.
///
/// Holds no long-lived locks and caches no admission decisions; it is safe
/// to share behind an `Arc` across any number of request handlers.
pub struct Orchestrator {
    pub tracker: QuotaTracker,
    pub retries: RetryEngine,
    pub fallback: FallbackSelector<HttpProbe>,
    pub sessions: SessionRecoveryManager,
    retry_defaults: RetryConfig,
}

impl Orchestrator {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        sessions: Arc<dyn SessionStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            tracker: QuotaTracker::new(counters, settings.policies),
            retries: RetryEngine::new(),
            fallback: FallbackSelector::default().with_probe_timeout(settings.probe_timeout),
            sessions: SessionRecoveryManager::new(sessions)
                .with_retention_days(settings.session_retention_days),
            retry_defaults: settings.retry,
        }
    }

    /// Backoff defaults configured for this deployment.
    pub fn retry_defaults(&self) -> RetryConfig {
        self.retry_defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::store::MemoryStore;

    #[tokio::test]
    async fn facade_wires_the_components_over_shared_stores() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            store.clone(),
            store,
            OrchestratorSettings::builder()
                .session_retention_days(14)
                .build(),
        );

        let decision = orchestrator
            .tracker
            .check_and_consume("u1", ApiName::Apollo, "enrich")
            .await
            .unwrap();
        assert!(decision.is_allowed());

        // Advisory state flows from the tracker into caller-owned caches.
        let snapshot = orchestrator
            .tracker
            .snapshot("u1", ApiName::Apollo)
            .await
            .unwrap()
            .unwrap();
        let policy = orchestrator.tracker.policy(ApiName::Apollo);
        assert_eq!(
            health::health_of(Some(&snapshot), &policy),
            health::HealthLevel::Good
        );
        assert_eq!(batch::predict_batch_size(Some(&snapshot), &policy), 4);

        assert_eq!(orchestrator.retry_defaults().max_retries, 3);
        assert_eq!(
            orchestrator
                .sessions
                .cleanup_stale_sessions("u1")
                .await
                .unwrap(),
            0
        );
    }
}
