//! Error taxonomy for the orchestrator.
//!
//! Quota denials are decisions, not errors; they never appear here. The
//! variants below are the failures that propagate to callers.

use snafu::Snafu;

use crate::orchestrator::policy::{ApiName, LimitTier};

/// Failure reported by the external counter/session store.
///
/// The store behind [`crate::orchestrator::store::CounterStore`] owns
/// durability and per-key atomicity; whatever goes wrong inside it surfaces
/// through this single type.
#[derive(Debug, Snafu)]
#[snafu(display("store operation failed: {}", source))]
pub struct StoreError {
    source: crate::Error,
}

impl StoreError {
    pub fn new(source: impl Into<crate::Error>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OrchestratorError {
    /// A window ceiling was hit. Surfaced as an error only when a caller
    /// converts a denial; the tracker itself returns denials as data.
    #[snafu(display("{} quota exhausted on the {} window", api, tier))]
    QuotaExceeded { api: ApiName, tier: LimitTier },

    /// The retry budget is spent; carries the last attempt's error.
    #[snafu(display(
        "operation '{}' failed after {} attempts: {}",
        operation,
        attempts,
        source
    ))]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        source: crate::Error,
    },

    /// The final attempt lost its race against the per-attempt timer.
    #[snafu(display("operation '{}' timed out after {}ms", operation, timeout_ms))]
    OperationTimeout { operation: String, timeout_ms: u64 },

    #[snafu(display("no running session '{}' for this subject", session_id))]
    NotFound { session_id: String },

    #[snafu(display("caller identity missing from the request context"))]
    Unauthenticated,

    #[snafu(display("unknown api '{}': no rate limit policy configured", name))]
    UnknownApi { name: String },

    #[snafu(display("persistence failure: {}", source))]
    PersistenceFailure { source: StoreError },
}
