//! Coarse health classification of a service from its latest usage snapshot.

use serde::{Deserialize, Serialize};

use crate::orchestrator::policy::RateLimitPolicy;
use crate::orchestrator::quota::UsageSnapshot;

const WARNING_PERCENT: f64 = 70.0;
const CRITICAL_PERCENT: f64 = 90.0;

/// How close a service's usage is to its ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Good,
    Warning,
    Critical,
    /// No snapshot observed yet for the service.
    Unknown,
}

/// Pure function of the snapshot and the static policy: any window at or
/// above 90% utilization is `Critical`, else 70% is `Warning`.
pub fn health_of(snapshot: Option<&UsageSnapshot>, policy: &RateLimitPolicy) -> HealthLevel {
    let Some(snapshot) = snapshot else {
        return HealthLevel::Unknown;
    };

    let worst = percent(snapshot.daily_count, policy.daily)
        .max(percent(snapshot.hourly_count, policy.hourly))
        .max(percent(snapshot.minute_count, policy.per_minute));

    if worst >= CRITICAL_PERCENT {
        HealthLevel::Critical
    } else if worst >= WARNING_PERCENT {
        HealthLevel::Warning
    } else {
        HealthLevel::Good
    }
}

fn percent(count: u32, limit: u32) -> f64 {
    if limit == 0 {
        // A zero ceiling means any usage is saturation.
        return 100.0;
    }
    f64::from(count) / f64::from(limit) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const POLICY: RateLimitPolicy = RateLimitPolicy {
        daily: 100,
        hourly: 100,
        per_minute: 100,
    };

    fn snapshot(daily: u32, hourly: u32, minute: u32) -> UsageSnapshot {
        UsageSnapshot {
            daily_count: daily,
            hourly_count: hourly,
            minute_count: minute,
            last_call_time: Utc::now(),
        }
    }

    #[test]
    fn one_window_crossing_ninety_percent_dominates() {
        let snap = snapshot(10, 10, 95);
        assert_eq!(health_of(Some(&snap), &POLICY), HealthLevel::Critical);
    }

    #[test]
    fn thresholds_partition_the_range() {
        assert_eq!(
            health_of(Some(&snapshot(0, 0, 0)), &POLICY),
            HealthLevel::Good
        );
        assert_eq!(
            health_of(Some(&snapshot(69, 0, 0)), &POLICY),
            HealthLevel::Good
        );
        assert_eq!(
            health_of(Some(&snapshot(70, 0, 0)), &POLICY),
            HealthLevel::Warning
        );
        assert_eq!(
            health_of(Some(&snapshot(0, 89, 0)), &POLICY),
            HealthLevel::Warning
        );
        assert_eq!(
            health_of(Some(&snapshot(0, 90, 0)), &POLICY),
            HealthLevel::Critical
        );
    }

    #[test]
    fn no_snapshot_is_unknown() {
        assert_eq!(health_of(None, &POLICY), HealthLevel::Unknown);
    }
}
