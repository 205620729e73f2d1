//! Multi-window quota tracking: the admit/deny decision for a prospective
//! call, charged against daily, hourly, and per-minute ceilings.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::orchestrator::error::{OrchestratorError, PersistenceFailureSnafu};
use crate::orchestrator::internal_event::{InternalEvent, QuotaDecisionMade};
use crate::orchestrator::policy::{ApiName, LimitTier, PolicyTable, RateLimitPolicy};
use crate::orchestrator::store::{CounterStore, QuotaKey};
use crate::orchestrator::window::{self, BucketRing};

/// Hour buckets retained for audit alongside the live one.
pub const HOURLY_RETENTION: usize = 24;
/// Minute buckets retained for audit alongside the live one.
pub const MINUTE_RETENTION: usize = 60;

/// One subject's counters for one service on one UTC day.
///
/// Created lazily on the first call of the day; mutated only through the
/// store's atomic increment; never deleted by this subsystem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceQuotaRecord {
    pub daily_count: u32,
    pub hourly: BucketRing,
    pub minute: BucketRing,
    pub last_operation: String,
    pub updated_at: DateTime<Utc>,
}

impl ServiceQuotaRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            hourly: BucketRing::new(HOURLY_RETENTION),
            minute: BucketRing::new(MINUTE_RETENTION),
            last_operation: String::new(),
            updated_at: now,
        }
    }

    /// Apply one admitted call. Store implementations call this inside their
    /// per-key critical section.
    pub fn record_call(&mut self, operation: &str, now: DateTime<Utc>) {
        self.daily_count += 1;
        self.hourly.increment(window::hour_bucket(now));
        self.minute.increment(window::minute_bucket(now));
        self.last_operation = operation.to_string();
        self.updated_at = now;
    }

    fn count(&self, tier: LimitTier, now: DateTime<Utc>) -> u32 {
        match tier {
            LimitTier::Daily => self.daily_count,
            LimitTier::Hourly => self.hourly.count(window::hour_bucket(now)),
            LimitTier::PerMinute => self.minute.count(window::minute_bucket(now)),
        }
    }
}

/// Headroom left after an admitted call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingQuota {
    pub daily: u32,
    pub hourly: u32,
    pub per_minute: u32,
}

/// Outcome of a quota check. Denials are data, not errors: they carry enough
/// structure for the caller to wait, shrink its batch, or switch services.
#[derive(Clone, Debug, PartialEq)]
pub enum QuotaDecision {
    Allowed {
        remaining: RemainingQuota,
        limits: RateLimitPolicy,
    },
    Denied {
        reason: LimitTier,
        current_usage: u32,
        limits: RateLimitPolicy,
        reset_time: DateTime<Utc>,
    },
}

impl QuotaDecision {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }

    /// Treat a denial as an error, for call sites that cannot do anything
    /// useful with the structured denial (waiting, shrinking, switching).
    pub fn require_allowed(self, api: ApiName) -> Result<RemainingQuota, OrchestratorError> {
        match self {
            QuotaDecision::Allowed { remaining, .. } => Ok(remaining),
            QuotaDecision::Denied { reason, .. } => {
                Err(OrchestratorError::QuotaExceeded { api, tier: reason })
            }
        }
    }
}

/// Last-observed usage for one service, caller-local and advisory only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub daily_count: u32,
    pub hourly_count: u32,
    pub minute_count: u32,
    pub last_call_time: DateTime<Utc>,
}

/// Explicit usage cache owned by the calling context.
///
/// Refreshed from tracker decisions rather than accumulated independently,
/// so it can drift only until the next authoritative check; it never
/// invalidates the server-side decision.
#[derive(Clone, Debug, Default)]
pub struct UsageCache {
    snapshots: HashMap<ApiName, UsageSnapshot>,
}

impl UsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, api: ApiName) -> Option<&UsageSnapshot> {
        self.snapshots.get(&api)
    }

    pub fn observe(&mut self, api: ApiName, snapshot: UsageSnapshot) {
        self.snapshots.insert(api, snapshot);
    }

    /// Fold an admission decision into the cache. Denials are ignored; they
    /// report a single tier and the next check re-reads the store anyway.
    pub fn absorb(&mut self, api: ApiName, decision: &QuotaDecision, now: DateTime<Utc>) {
        if let QuotaDecision::Allowed { remaining, limits } = decision {
            self.observe(
                api,
                UsageSnapshot {
                    daily_count: limits.daily.saturating_sub(remaining.daily),
                    hourly_count: limits.hourly.saturating_sub(remaining.hourly),
                    minute_count: limits.per_minute.saturating_sub(remaining.per_minute),
                    last_call_time: now,
                },
            );
        }
    }

    /// Re-read the authoritative counters for `api`.
    pub async fn refresh(
        &mut self,
        tracker: &QuotaTracker,
        subject: &str,
        api: ApiName,
    ) -> Result<(), OrchestratorError> {
        if let Some(snapshot) = tracker.snapshot(subject, api).await? {
            self.observe(api, snapshot);
        }
        Ok(())
    }
}

/// Decides admit/deny for prospective calls and charges admitted ones.
///
/// Stateless apart from the store handle: every check re-reads current
/// counters, so a stale "allowed" is never served from memory.
pub struct QuotaTracker {
    store: Arc<dyn CounterStore>,
    policies: PolicyTable,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn CounterStore>, policies: PolicyTable) -> Self {
        Self { store, policies }
    }

    pub fn policy(&self, api: ApiName) -> RateLimitPolicy {
        self.policies.get(api)
    }

    /// May `subject` call `api` right now? Admission atomically charges one
    /// call to all three windows; the only side effect is that counter write.
    pub async fn check_and_consume(
        &self,
        subject: &str,
        api: ApiName,
        operation: &str,
    ) -> Result<QuotaDecision, OrchestratorError> {
        self.decide(subject, api, operation, Utc::now()).await
    }

    /// Advisory read of current counters, for caller-local caches.
    pub async fn snapshot(
        &self,
        subject: &str,
        api: ApiName,
    ) -> Result<Option<UsageSnapshot>, OrchestratorError> {
        let now = Utc::now();
        let key = QuotaKey::new(subject, api, now);
        let record = self.store.read(&key).await.context(PersistenceFailureSnafu)?;
        Ok(record.map(|record| UsageSnapshot {
            daily_count: record.daily_count,
            hourly_count: record.hourly.count(window::hour_bucket(now)),
            minute_count: record.minute.count(window::minute_bucket(now)),
            last_call_time: record.updated_at,
        }))
    }

    async fn decide(
        &self,
        subject: &str,
        api: ApiName,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, OrchestratorError> {
        let key = QuotaKey::new(subject, api, now);
        let limits = self.policies.get(api);
        let record = self
            .store
            .read(&key)
            .await
            .context(PersistenceFailureSnafu)?
            .unwrap_or_else(|| ServiceQuotaRecord::new(now));

        // Daily first: its reset is furthest away, so when several windows
        // are exhausted at once the caller must be told the daily one.
        for tier in LimitTier::ALL {
            let used = record.count(tier, now);
            if used >= limits.limit(tier) {
                let reset_time = match tier {
                    LimitTier::Daily => window::next_midnight(now),
                    LimitTier::Hourly => window::next_hour(now),
                    LimitTier::PerMinute => window::next_minute(now),
                };
                debug!(
                    message = "Quota check denied.",
                    api = %api,
                    subject = %subject,
                    tier = %tier,
                    used,
                    limit = limits.limit(tier),
                );
                QuotaDecisionMade {
                    api,
                    allowed: false,
                    denied_tier: Some(tier),
                }
                .emit();
                return Ok(QuotaDecision::Denied {
                    reason: tier,
                    current_usage: used,
                    limits,
                    reset_time,
                });
            }
        }

        let updated = self
            .store
            .increment(&key, operation, now)
            .await
            .context(PersistenceFailureSnafu)?;

        QuotaDecisionMade {
            api,
            allowed: true,
            denied_tier: None,
        }
        .emit();
        Ok(QuotaDecision::Allowed {
            remaining: RemainingQuota {
                daily: limits.daily.saturating_sub(updated.daily_count),
                hourly: limits
                    .hourly
                    .saturating_sub(updated.hourly.count(window::hour_bucket(now))),
                per_minute: limits
                    .per_minute
                    .saturating_sub(updated.minute.count(window::minute_bucket(now))),
            },
            limits,
        })
    }
}
