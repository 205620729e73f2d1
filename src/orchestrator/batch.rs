//! Safe batch sizing for bulk callers: how many calls to issue before
//! re-checking quota.

use crate::orchestrator::policy::RateLimitPolicy;
use crate::orchestrator::quota::UsageSnapshot;

/// Proposed batch size when no usage has been observed yet.
pub const DEFAULT_BATCH_SIZE: u32 = 5;
/// Hard ceiling bounding worst-case burstiness regardless of headroom.
pub const MAX_BATCH_SIZE: u32 = 10;

/// Propose a batch size from the remaining per-minute and hourly headroom.
///
/// The divisors are deliberate safety margins: a batch never claims more than
/// half the remaining per-minute quota, and the hourly window is weighted
/// more conservatively (a tenth) since a batch completes much faster than an
/// hour. The result is always in `[1, MAX_BATCH_SIZE]`.
pub fn predict_batch_size(snapshot: Option<&UsageSnapshot>, policy: &RateLimitPolicy) -> u32 {
    let Some(snapshot) = snapshot else {
        return DEFAULT_BATCH_SIZE;
    };

    // Saturating: boundary races can legitimately push observed counts past
    // the ceiling.
    let minute_remaining = policy.per_minute.saturating_sub(snapshot.minute_count);
    let hourly_remaining = policy.hourly.saturating_sub(snapshot.hourly_count);

    let minute_share = (minute_remaining / 2).max(1);
    let hourly_share = (hourly_remaining / 10).max(1);

    minute_share.min(hourly_share).min(MAX_BATCH_SIZE)
}
