//! Contracts for the external durable stores, plus an in-process
//! implementation for tests and small single-node embeddings.
//!
//! The orchestrator never coordinates callers itself; serializing increments
//! per (subject, api, day) is the store's job. A durable backend typically
//! does this with a server-side upsert or compare-and-swap. `MemoryStore`
//! satisfies the same contract with a process-local lock.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orchestrator::error::StoreError;
use crate::orchestrator::policy::ApiName;
use crate::orchestrator::quota::ServiceQuotaRecord;
use crate::orchestrator::session::MiningSession;
use crate::orchestrator::window;

/// Addresses one subject's counter record for one service on one UTC day.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaKey {
    pub subject: String,
    pub api: ApiName,
    pub day: String,
}

impl QuotaKey {
    pub fn new(subject: &str, api: ApiName, now: DateTime<Utc>) -> Self {
        Self {
            subject: subject.to_string(),
            api,
            day: window::day_key(now),
        }
    }
}

/// Durable per-subject, per-window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current record for `key`, if any call was recorded today.
    async fn read(&self, key: &QuotaKey) -> Result<Option<ServiceQuotaRecord>, StoreError>;

    /// Atomically add one call to the daily counter and the current
    /// hour/minute buckets, creating the record on first use. Increments for
    /// the same key must be serialized by the implementation; two concurrent
    /// calls may both observe room at the boundary and overshoot by at most
    /// the number of racers.
    async fn increment(
        &self,
        key: &QuotaKey,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<ServiceQuotaRecord, StoreError>;
}

/// Durable mining session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<MiningSession>, StoreError>;

    async fn put(&self, session: MiningSession) -> Result<(), StoreError>;

    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MiningSession>, StoreError>;
}

/// In-process store backing both contracts with `Mutex<HashMap>` state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: Mutex<HashMap<QuotaKey, ServiceQuotaRecord>>,
    sessions: Mutex<HashMap<String, MiningSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn read(&self, key: &QuotaKey) -> Result<Option<ServiceQuotaRecord>, StoreError> {
        let counters = self.counters.lock().expect("counter state lock poisoned");
        Ok(counters.get(key).cloned())
    }

    async fn increment(
        &self,
        key: &QuotaKey,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<ServiceQuotaRecord, StoreError> {
        let mut counters = self.counters.lock().expect("counter state lock poisoned");
        let record = counters
            .entry(key.clone())
            .or_insert_with(|| ServiceQuotaRecord::new(now));
        record.record_call(operation, now);
        Ok(record.clone())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<MiningSession>, StoreError> {
        let sessions = self.sessions.lock().expect("session state lock poisoned");
        Ok(sessions.get(session_id).cloned())
    }

    async fn put(&self, session: MiningSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().expect("session state lock poisoned");
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().expect("session state lock poisoned");
        sessions.remove(session_id);
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MiningSession>, StoreError> {
        let sessions = self.sessions.lock().expect("session state lock poisoned");
        Ok(sessions
            .values()
            .filter(|session| session.user_id == user_id)
            .cloned()
            .collect())
    }
}
