//! Internal events: each observable moment in the orchestrator is a small
//! struct whose `emit` records `metrics` series and a targeted tracing event.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::orchestrator::policy::{ApiName, LimitTier};

pub trait InternalEvent {
    fn emit(self);
}

#[derive(Clone, Copy, Debug)]
pub struct QuotaDecisionMade {
    pub api: ApiName,
    pub allowed: bool,
    pub denied_tier: Option<LimitTier>,
}

impl InternalEvent for QuotaDecisionMade {
    fn emit(self) {
        if self.allowed {
            counter!("quota_checks_admitted_total", "api" => self.api.as_str()).increment(1);
        } else {
            counter!("quota_checks_denied_total", "api" => self.api.as_str()).increment(1);
            trace!(
                target: "quota_orchestrator::quota",
                api = %self.api,
                tier = ?self.denied_tier,
                "Quota check denied"
            );
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryScheduled<'a> {
    pub operation: &'a str,
    pub attempt: u32,
    pub delay: Duration,
}

impl InternalEvent for RetryScheduled<'_> {
    fn emit(self) {
        counter!("retry_attempts_total", "operation" => self.operation.to_owned()).increment(1);
        histogram!("retry_delay_ms").record(self.delay.as_millis() as f64);
        trace!(
            target: "quota_orchestrator::retries",
            operation = %self.operation,
            attempt = self.attempt,
            delay_ms = %self.delay.as_millis(),
            "Retry scheduled"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryExhausted<'a> {
    pub operation: &'a str,
    pub attempts: u32,
}

impl InternalEvent for RetryExhausted<'_> {
    fn emit(self) {
        counter!("retry_exhausted_total", "operation" => self.operation.to_owned()).increment(1);
        histogram!("retry_attempts_until_exhaustion").record(f64::from(self.attempts));
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FallbackProbed<'a> {
    pub endpoint: &'a str,
    pub alive: bool,
}

impl InternalEvent for FallbackProbed<'_> {
    fn emit(self) {
        let outcome = if self.alive { "alive" } else { "dead" };
        counter!(
            "fallback_probes_total",
            "endpoint" => self.endpoint.to_owned(),
            "outcome" => outcome,
        )
        .increment(1);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StaleSessionsPurged {
    pub deleted: usize,
}

impl InternalEvent for StaleSessionsPurged {
    fn emit(self) {
        counter!("stale_sessions_purged_total").increment(self.deleted as u64);
    }
}
