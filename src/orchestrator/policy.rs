//! Static rate limit policy: one ceiling per (service, window) pair.
//!
//! The table here is the single authoritative source of limits. Callers that
//! want a local copy should deserialize one fetched from the deployment that
//! owns this table rather than hard-coding a second set of numbers.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::orchestrator::error::OrchestratorError;

/// The external services whose quota this orchestrator charges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiName {
    /// People/company-data API.
    Apollo,
    /// Search API.
    Serper,
    /// Language-model API.
    Openai,
}

impl ApiName {
    pub const ALL: [ApiName; 3] = [ApiName::Apollo, ApiName::Serper, ApiName::Openai];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ApiName::Apollo => "apollo",
            ApiName::Serper => "serper",
            ApiName::Openai => "openai",
        }
    }
}

impl fmt::Display for ApiName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiName {
    type Err = OrchestratorError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "apollo" => Ok(ApiName::Apollo),
            "serper" => Ok(ApiName::Serper),
            "openai" => Ok(ApiName::Openai),
            other => Err(OrchestratorError::UnknownApi {
                name: other.to_string(),
            }),
        }
    }
}

/// The quota window a counter accumulates over before resetting.
///
/// Tiers are evaluated in declaration order; an exceeded daily limit takes
/// precedence over hourly and per-minute even when those are also exceeded,
/// because reset times differ and the caller needs the nearest-but-correct
/// one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitTier {
    Daily,
    Hourly,
    PerMinute,
}

impl LimitTier {
    pub const ALL: [LimitTier; 3] = [LimitTier::Daily, LimitTier::Hourly, LimitTier::PerMinute];

    /// The denial reason surfaced to callers for this tier.
    pub const fn reason(&self) -> &'static str {
        match self {
            LimitTier::Daily => "Daily limit exceeded",
            LimitTier::Hourly => "Hourly limit exceeded",
            LimitTier::PerMinute => "Per-minute limit exceeded",
        }
    }
}

impl fmt::Display for LimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LimitTier::Daily => "daily",
            LimitTier::Hourly => "hourly",
            LimitTier::PerMinute => "per-minute",
        };
        f.write_str(name)
    }
}

/// Per-service call ceilings. Immutable at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub daily: u32,
    pub hourly: u32,
    pub per_minute: u32,
}

impl RateLimitPolicy {
    pub const fn limit(&self, tier: LimitTier) -> u32 {
        match tier {
            LimitTier::Daily => self.daily,
            LimitTier::Hourly => self.hourly,
            LimitTier::PerMinute => self.per_minute,
        }
    }
}

/// One `RateLimitPolicy` per known service.
///
/// `Default` carries the deploy-time table. A deserialized table may override
/// any subset of services; lookups fall back to the defaults for services the
/// override omits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyTable {
    policies: HashMap<ApiName, RateLimitPolicy>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(
            ApiName::Apollo,
            RateLimitPolicy {
                daily: 1000,
                hourly: 100,
                per_minute: 10,
            },
        );
        policies.insert(
            ApiName::Serper,
            RateLimitPolicy {
                daily: 500,
                hourly: 50,
                per_minute: 5,
            },
        );
        policies.insert(
            ApiName::Openai,
            RateLimitPolicy {
                daily: 2000,
                hourly: 200,
                per_minute: 20,
            },
        );
        Self { policies }
    }
}

impl PolicyTable {
    /// Parse a table fetched from the authoritative deployment.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn get(&self, api: ApiName) -> RateLimitPolicy {
        match self.policies.get(&api) {
            Some(policy) => *policy,
            // An override table may omit a service; the built-in ceiling
            // still applies.
            None => Self::default().policies[&api],
        }
    }

    pub fn set(&mut self, api: ApiName, policy: RateLimitPolicy) {
        self.policies.insert(api, policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_service() {
        let table = PolicyTable::default();
        for api in ApiName::ALL {
            assert!(table.get(api).daily > 0);
        }
        assert_eq!(
            table.get(ApiName::Apollo),
            RateLimitPolicy {
                daily: 1000,
                hourly: 100,
                per_minute: 10
            }
        );
        assert_eq!(table.get(ApiName::Serper).per_minute, 5);
        assert_eq!(table.get(ApiName::Openai).hourly, 200);
    }

    #[test]
    fn fetched_table_overrides_and_falls_back() {
        let raw = r#"{"policies":{"serper":{"daily":2500,"hourly":250,"per_minute":25}}}"#;
        let table = PolicyTable::from_json(raw).unwrap();
        assert_eq!(table.get(ApiName::Serper).daily, 2500);
        // Omitted services keep the built-in ceilings.
        assert_eq!(table.get(ApiName::Apollo).daily, 1000);
    }

    #[test]
    fn unknown_api_names_are_rejected() {
        let err = "linkedin".parse::<ApiName>().unwrap_err();
        assert!(err.to_string().contains("linkedin"));
        assert_eq!("openai".parse::<ApiName>().unwrap(), ApiName::Openai);
    }
}
