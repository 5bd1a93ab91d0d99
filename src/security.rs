//! Destination screening
//!
//! Three blocked-domain rules (regex blacklist, known-phishing table,
//! `blocked_url` role grants), a redirect-following probe to catch
//! destinations that bounce into a blocked domain, and the third-party
//! reputation oracle. The oracle and the probe fail open: their
//! unavailability must never block link creation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::errors::CoreError;
use crate::errors::Result;
use crate::roles;
use crate::storage::Storage;
use crate::utils::env_var_or_else;

/// Default timeout for the oracle call and each probe hop
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;

/// Redirect hops the probe is willing to follow
const MAX_PROBE_HOPS: usize = 5;

/// Does `host` equal the domain, or live under it?
pub fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Third-party "is this URL dangerous" lookup
///
/// A boolean oracle with a fixed request/response contract; transport and
/// parse failures are the caller's to swallow.
#[async_trait]
pub trait ReputationOracle: Send + Sync {
    /// Does the third party consider this destination dangerous?
    async fn flagged(&self, destination: &str) -> anyhow::Result<bool>;
}

/// Oracle used when no reputation API is configured
pub struct NullOracle;

#[async_trait]
impl ReputationOracle for NullOracle {
    async fn flagged(&self, _destination: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// HTTP-backed reputation oracle
///
/// Posts the destination to a threat-matching API; a non-empty `matches`
/// array in the response means flagged.
pub struct HttpReputationOracle {
    /// Shared client, carries the timeout
    client: reqwest::Client,

    /// Full endpoint, API key included
    endpoint: String,
}

impl HttpReputationOracle {
    /// Create an oracle against an endpoint
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, endpoint })
    }
}

/// The part of the oracle response we care about
#[derive(Debug, Deserialize)]
struct OracleVerdict {
    /// Threat matches, empty or absent when the destination is clean
    #[serde(default)]
    matches: Vec<serde_json::Value>,
}

#[async_trait]
impl ReputationOracle for HttpReputationOracle {
    async fn flagged(&self, destination: &str) -> anyhow::Result<bool> {
        let verdict: OracleVerdict = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "threatInfo": {
                    "threatEntryTypes": ["URL"],
                    "threatEntries": [{ "url": destination }],
                },
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(!verdict.matches.is_empty())
    }
}

/// Redirect-following reachability probe
///
/// Walks `Location` headers manually so every intermediate hop can be
/// checked against the blocked rules.
pub struct RedirectProbe {
    /// Client with redirects disabled
    client: reqwest::Client,
}

impl RedirectProbe {
    /// Create a probe with a per-hop timeout
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    /// Every URL the destination redirects through
    ///
    /// Network errors and timeouts end the walk early; the hops seen so
    /// far still get checked.
    async fn hops(&self, start: &Url) -> Vec<Url> {
        let mut hops = Vec::new();
        let mut current = start.clone();

        for _ in 0..MAX_PROBE_HOPS {
            let response = match self.client.get(current.clone()).send().await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!("Reachability probe for {current} gave up: {err}");
                    break;
                }
            };

            if !response.status().is_redirection() {
                break;
            }

            let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                break;
            };

            // Location may be relative to the hop it came from
            let Ok(next) = current.join(location) else {
                break;
            };

            hops.push(next.clone());
            current = next;
        }

        hops
    }
}

/// The destination screening policy
///
/// Explicitly constructed and injected; components receive it through
/// their constructors instead of reaching for process-wide state.
#[derive(Clone)]
pub struct DestinationPolicy {
    /// Compiled regex blacklist
    banned_patterns: Arc<Vec<Regex>>,

    /// The reputation oracle
    oracle: Arc<dyn ReputationOracle>,

    /// The reachability probe, `None` when disabled
    probe: Option<Arc<RedirectProbe>>,
}

impl DestinationPolicy {
    /// Create a policy from its parts
    pub fn new(
        banned_patterns: Vec<Regex>,
        oracle: Arc<dyn ReputationOracle>,
        probe: Option<RedirectProbe>,
    ) -> Self {
        Self {
            banned_patterns: Arc::new(banned_patterns),
            oracle,
            probe: probe.map(Arc::new),
        }
    }

    /// Create a policy from the environment
    ///
    /// - `BANNED_DESTINATION_PATTERNS`: comma-separated regexes
    /// - `REPUTATION_API_URL` (+ optional `REPUTATION_API_KEY`): the oracle
    /// - `PROBE_TIMEOUT_SECS`: per-hop probe timeout, `0` disables probing
    pub fn from_environment() -> Self {
        let banned_patterns = std::env::var("BANNED_DESTINATION_PATTERNS")
            .unwrap_or_default()
            .split(',')
            .filter(|pattern| !pattern.is_empty())
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    tracing::warn!("Skipping invalid banned pattern {pattern:?}: {err}");
                    None
                }
            })
            .collect();

        let timeout = env_var_or_else("PROBE_TIMEOUT_SECS", || {
            DEFAULT_PROBE_TIMEOUT_SECS.to_string()
        })
        .parse::<u64>()
        .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);

        let oracle: Arc<dyn ReputationOracle> = match std::env::var("REPUTATION_API_URL") {
            Ok(url) if !url.is_empty() => {
                let endpoint = match std::env::var("REPUTATION_API_KEY") {
                    Ok(key) if !key.is_empty() => format!("{url}?key={key}"),
                    _ => url,
                };

                match HttpReputationOracle::new(endpoint, Duration::from_secs(timeout)) {
                    Ok(oracle) => Arc::new(oracle),
                    Err(err) => {
                        tracing::warn!("Could not set up reputation oracle: {err}");
                        Arc::new(NullOracle)
                    }
                }
            }
            _ => {
                tracing::info!("`REPUTATION_API_URL` not set, destinations are never flagged");
                Arc::new(NullOracle)
            }
        };

        let probe = if timeout == 0 {
            None
        } else {
            RedirectProbe::new(Duration::from_secs(timeout))
                .map_err(|err| tracing::warn!("Could not set up reachability probe: {err}"))
                .ok()
        };

        Self::new(banned_patterns, oracle, probe)
    }

    /// Screen a destination against all blocked-domain rules
    ///
    /// The reputation oracle is not part of this; flagged destinations go
    /// to review instead of failing.
    pub async fn screen<S: Storage>(&self, storage: &S, destination: &Url) -> Result<()> {
        if !matches!(destination.scheme(), "http" | "https") {
            return Err(CoreError::BadDestination(
                "only http and https destinations are supported".to_string(),
            ));
        }

        if self.is_blocked(storage, destination).await? {
            return Err(CoreError::BadDestination(
                "matches a blocked domain".to_string(),
            ));
        }

        if let Some(probe) = &self.probe {
            for hop in probe.hops(destination).await {
                if self.is_blocked(storage, &hop).await? {
                    return Err(CoreError::BadDestination(
                        "redirects to a blocked domain".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Does any blocked-domain rule match this destination?
    pub async fn is_blocked<S: Storage>(&self, storage: &S, destination: &Url) -> Result<bool> {
        let url = destination.as_str();

        if self.banned_patterns.iter().any(|regex| regex.is_match(url)) {
            return Ok(true);
        }

        let Some(host) = destination.host_str() else {
            return Ok(false);
        };

        if storage.is_banned_domain(host).await? {
            return Ok(true);
        }

        let blocked = storage.role_entities(roles::BLOCKED_URL).await?;

        Ok(blocked.iter().any(|domain| domain_matches(host, domain)))
    }

    /// Consult the reputation oracle, failing open
    pub async fn flagged(&self, destination: &Url) -> bool {
        match self.oracle.flagged(destination.as_str()).await {
            Ok(flagged) => flagged,
            Err(err) => {
                tracing::warn!("Reputation oracle failed for {destination}, treating as clean: {err}");
                false
            }
        }
    }
}
