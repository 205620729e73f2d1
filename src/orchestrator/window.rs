//! Calendar window math and the bucket ring that backs hourly/minute counts.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const HOUR_SECS: i64 = 3600;
const MINUTE_SECS: i64 = 60;
const DAY_SECS: i64 = 86_400;

/// Key for one calendar day, UTC: `"2024-05-01"`.
pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Hours since the Unix epoch; identifies one hour bucket.
pub fn hour_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(HOUR_SECS)
}

/// Minutes since the Unix epoch; identifies one minute bucket.
pub fn minute_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(MINUTE_SECS)
}

/// Start of the next UTC day.
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    boundary(now, DAY_SECS)
}

/// Start of the next hour.
pub fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    boundary(now, HOUR_SECS)
}

/// Start of the next minute.
pub fn next_minute(now: DateTime<Utc>) -> DateTime<Utc> {
    boundary(now, MINUTE_SECS)
}

fn boundary(now: DateTime<Utc>, period_secs: i64) -> DateTime<Utc> {
    let secs = (now.timestamp().div_euclid(period_secs) + 1) * period_secs;
    // In range for any representable DateTime<Utc>.
    DateTime::from_timestamp(secs, 0).unwrap_or(now)
}

/// Fixed-capacity ring of the most recent window buckets.
///
/// Counts are monotonically non-decreasing within a bucket's lifetime.
/// Writing to a new bucket evicts everything older than `retain` buckets, so
/// a counter record never grows without bound; the retained tail is audit
/// history only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRing {
    retain: usize,
    /// Oldest first, at most one slot per bucket key.
    slots: VecDeque<Bucket>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Bucket {
    key: i64,
    count: u32,
}

impl BucketRing {
    pub fn new(retain: usize) -> Self {
        Self {
            retain: retain.max(1),
            slots: VecDeque::with_capacity(retain.max(1)),
        }
    }

    /// Count recorded for `key`, zero if the bucket was never written or has
    /// been evicted.
    pub fn count(&self, key: i64) -> u32 {
        self.slots
            .iter()
            .find(|bucket| bucket.key == key)
            .map(|bucket| bucket.count)
            .unwrap_or(0)
    }

    /// Add one call to `key`'s bucket and return its new count.
    pub fn increment(&mut self, key: i64) -> u32 {
        self.evict_older_than(key - self.retain as i64 + 1);

        if let Some(bucket) = self.slots.iter_mut().find(|bucket| bucket.key == key) {
            bucket.count += 1;
            return bucket.count;
        }

        // Buckets arrive in wall-clock order under normal operation, but a
        // lagging writer may land behind the newest slot; keep the ring
        // sorted so eviction stays a front-pop.
        let position = self
            .slots
            .iter()
            .position(|bucket| bucket.key > key)
            .unwrap_or(self.slots.len());
        self.slots.insert(position, Bucket { key, count: 1 });
        if self.slots.len() > self.retain {
            self.slots.pop_front();
        }
        1
    }

    fn evict_older_than(&mut self, floor: i64) {
        while let Some(oldest) = self.slots.front() {
            if oldest.key < floor {
                self.slots.pop_front();
            } else {
                break;
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}
