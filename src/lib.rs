//! Quota-aware call orchestration for rate-limited external APIs.
//!
//! This crate coordinates bounded, concurrent access to a small set of
//! independently rate-limited services (a people/company-data API, a search
//! API, a language-model API) on behalf of many callers inside a larger
//! application. It provides:
//!
//! - a multi-window quota tracker (daily / hourly / per-minute counters
//!   against a static per-service policy),
//! - a health scorer deriving `good` / `warning` / `critical` levels from
//!   current utilization,
//! - an adaptive batch-size predictor for bulk callers,
//! - a retry engine with capped exponential backoff, jitter, per-attempt
//!   timeouts, and drop-based cancellation,
//! - a health-probed fallback endpoint selector,
//! - crash/abandon recovery for long-running mining sessions.
//!
//! The orchestrator holds no long-lived in-process lock; cross-caller
//! coordination is delegated to the atomicity guarantees of the external
//! counter store behind [`orchestrator::store::CounterStore`], so the
//! orchestrator itself stays stateless and horizontally scalable.
//!
//! # Basic usage
//! ```no_run
//! use std::sync::Arc;
//! use quota_orchestrator::orchestrator::{Orchestrator, OrchestratorSettings};
//! use quota_orchestrator::orchestrator::policy::ApiName;
//! use quota_orchestrator::orchestrator::store::MemoryStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let store = Arc::new(MemoryStore::new());
//! let orchestrator = Orchestrator::new(
//!     store.clone(),
//!     store,
//!     OrchestratorSettings::builder().build(),
//! );
//!
//! let decision = orchestrator
//!     .tracker
//!     .check_and_consume("user-42", ApiName::Apollo, "enrich_contact")
//!     .await?;
//! if decision.is_allowed() {
//!     // issue the downstream call
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Metrics
//! Emits counters and histograms via the `metrics` crate; see
//! [`orchestrator::internal_event`].

pub mod orchestrator;
#[cfg(test)]
pub mod test_util;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
