//! Fallback endpoint selection: probe candidates in priority order, take the
//! first live one.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::orchestrator::internal_event::{FallbackProbed, InternalEvent};

/// Deadline for a single liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A candidate service endpoint, in the caller's priority order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub url: String,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A read-only liveness check. Probes must not mutate remote state.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> bool;
}

/// Default probe: a HEAD request through `reqwest`.
///
/// Any delivered response that is not a server error proves the endpoint is
/// alive; a 4xx still means something answered. Transport failures count as
/// dead.
#[derive(Clone, Debug, Default)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, endpoint: &ServiceEndpoint) -> bool {
        match self.client.head(&endpoint.url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    warn!(
                        message = "Probe got a server error response.",
                        endpoint = %endpoint.name,
                        status = %status,
                    );
                    false
                } else {
                    true
                }
            }
            Err(error) => {
                warn!(
                    message = "Probe failed to reach the endpoint.",
                    endpoint = %endpoint.name,
                    error = %error,
                );
                false
            }
        }
    }
}

/// Picks the first viable endpoint from an ordered candidate list.
///
/// Candidates are tried strictly in the order given, never reordered by
/// observed latency: predictability over optimality.
pub struct FallbackSelector<P = HttpProbe> {
    probe: P,
    probe_timeout: Duration,
}

impl Default for FallbackSelector<HttpProbe> {
    fn default() -> Self {
        Self::new(HttpProbe::new())
    }
}

impl<P: LivenessProbe> FallbackSelector<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// First candidate whose probe succeeds within the probe timeout, or
    /// `None` when every candidate fails.
    pub async fn select<'a>(
        &self,
        candidates: &'a [ServiceEndpoint],
    ) -> Option<&'a ServiceEndpoint> {
        for endpoint in candidates {
            let alive = timeout(self.probe_timeout, self.probe.probe(endpoint))
                .await
                .unwrap_or(false);
            FallbackProbed {
                endpoint: &endpoint.name,
                alive,
            }
            .emit();

            if alive {
                debug!(
                    message = "Selected fallback endpoint.",
                    endpoint = %endpoint.name,
                );
                return Some(endpoint);
            }
            warn!(
                message = "Fallback candidate failed its probe.",
                endpoint = %endpoint.name,
            );
        }

        error!(
            message = "All fallback candidates failed their probes.",
            candidates = candidates.len(),
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Scripted probe that records the order in which endpoints are tried.
    struct ScriptedProbe {
        alive: Vec<&'static str>,
        probed: Mutex<Vec<String>>,
        hang: bool,
    }

    impl ScriptedProbe {
        fn new(alive: Vec<&'static str>) -> Self {
            Self {
                alive,
                probed: Mutex::new(Vec::new()),
                hang: false,
            }
        }

        fn probed(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self, endpoint: &ServiceEndpoint) -> bool {
            self.probed.lock().unwrap().push(endpoint.name.clone());
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.alive.contains(&endpoint.name.as_str())
        }
    }

    fn candidates() -> Vec<ServiceEndpoint> {
        vec![
            ServiceEndpoint::new("a", "https://a.example/health"),
            ServiceEndpoint::new("b", "https://b.example/health"),
            ServiceEndpoint::new("c", "https://c.example/health"),
        ]
    }

    #[tokio::test]
    async fn first_live_candidate_wins_and_later_ones_are_never_probed() {
        crate::test_util::trace_init();

        let probe = ScriptedProbe::new(vec!["b", "c"]);
        let selector = FallbackSelector::new(probe);

        let endpoints = candidates();
        let picked = selector.select(&endpoints).await.unwrap();
        assert_eq!(picked.name, "b");
        assert_eq!(selector.probe.probed(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn all_dead_yields_none() {
        let probe = ScriptedProbe::new(vec![]);
        let selector = FallbackSelector::new(probe);

        let endpoints = candidates();
        assert!(selector.select(&endpoints).await.is_none());
        assert_eq!(selector.probe.probed(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn a_hanging_probe_counts_as_dead_after_the_timeout() {
        let mut probe = ScriptedProbe::new(vec!["a", "b"]);
        probe.hang = true;
        let selector = FallbackSelector::new(probe);

        let endpoints = candidates();
        // Every probe hangs past the 5s deadline, so none is viable.
        assert!(selector.select(&endpoints).await.is_none());
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_none() {
        let selector = FallbackSelector::new(ScriptedProbe::new(vec!["a"]));
        assert!(selector.select(&[]).await.is_none());
    }
}
