//! Proxy candidates and the selector used in development mode.

use crate::config::{Environment, ProxyConfig};
use crate::errors::ProxyError;
use crate::metrics_defs::{PROXY_PROBE_FAILURE, PROXY_PROBE_SUCCESS};
use async_trait::async_trait;
use serde::Deserialize;
use shared::counter;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ProxyListError {
    #[error("could not read proxy list {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid proxy entry on line {line}: {reason}")]
    InvalidEntry { line: usize, reason: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub credentials: Option<ProxyCredentials>,
}

impl ProxyCandidate {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ProxyCandidate {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Parses `host:port` or `host:port:username:password`.
    pub fn parse(entry: &str) -> Result<Self, String> {
        let parts: Vec<&str> = entry.split(':').collect();
        let (host, port, credentials) = match parts.as_slice() {
            [host, port] => (host, port, None),
            [host, port, username, password] => (
                host,
                port,
                Some(ProxyCredentials {
                    username: username.to_string(),
                    password: password.to_string(),
                }),
            ),
            _ => return Err("expected host:port or host:port:username:password".to_string()),
        };

        if host.is_empty() {
            return Err("empty host".to_string());
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("invalid port '{port}'"))?;
        if port == 0 {
            return Err("port cannot be 0".to_string());
        }

        Ok(ProxyCandidate {
            host: host.to_string(),
            port,
            credentials,
        })
    }

    /// Builds the reqwest proxy routing all schemes through this candidate.
    pub fn to_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        let proxy = reqwest::Proxy::all(format!("http://{}:{}", self.host, self.port))?;
        Ok(match &self.credentials {
            Some(c) => proxy.basic_auth(&c.username, &c.password),
            None => proxy,
        })
    }

    /// Client whose requests all go through this candidate.
    pub fn client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder().proxy(self.to_proxy()?).build()
    }
}

// Never includes credentials
impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses a proxy list. Blank lines and `#` comments are skipped.
pub fn parse_proxy_list(contents: &str) -> Result<Vec<ProxyCandidate>, ProxyListError> {
    contents
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, entry)| {
            ProxyCandidate::parse(entry).map_err(|reason| ProxyListError::InvalidEntry { line, reason })
        })
        .collect()
}

fn read_proxy_file(path: &Path) -> Result<Vec<ProxyCandidate>, ProxyListError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ProxyListError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_proxy_list(&contents)
}

/// Collects the inline candidates followed by those from `candidates_file`.
pub fn load_candidates(config: &ProxyConfig) -> Result<Vec<ProxyCandidate>, ProxyListError> {
    let mut candidates = config.candidates.clone();
    if let Some(path) = &config.candidates_file {
        candidates.extend(read_proxy_file(path)?);
    }
    Ok(candidates)
}

/// Checks whether a candidate can currently carry traffic.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, candidate: &ProxyCandidate) -> bool;
}

/// Requests a known-good endpoint through the candidate; any 2xx counts as working.
pub struct HttpProbe {
    probe_url: Url,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(probe_url: Url, timeout: Duration) -> Self {
        Self { probe_url, timeout }
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, candidate: &ProxyCandidate) -> bool {
        let client = match candidate.to_proxy().and_then(|proxy| {
            reqwest::Client::builder()
                .proxy(proxy)
                .timeout(self.timeout)
                .build()
        }) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(proxy = %candidate, error = %e, "Failed to build probe client");
                return false;
            }
        };

        match client.get(self.probe_url.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(proxy = %candidate, status = %response.status(), "Probe rejected");
                false
            }
            Err(e) => {
                tracing::debug!(proxy = %candidate, error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Picks a working proxy for an outbound call.
///
/// The candidate list is read-only after startup and shared by all requests.
#[derive(Clone)]
pub struct ProxySelector {
    environment: Environment,
    candidates: Arc<[ProxyCandidate]>,
    probe: Arc<dyn ProxyProbe>,
}

impl ProxySelector {
    pub fn new(
        environment: Environment,
        candidates: Vec<ProxyCandidate>,
        probe: Arc<dyn ProxyProbe>,
    ) -> Self {
        Self {
            environment,
            candidates: candidates.into(),
            probe,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Probes up to `max_retries` uniformly random candidates and returns the first
    /// one that works. Picks are independent, so a candidate may be probed twice.
    pub async fn select_proxy(&self, max_retries: u32) -> Result<ProxyCandidate, ProxyError> {
        if self.environment == Environment::Production {
            return Err(ProxyError::DisabledInProduction);
        }
        if self.candidates.is_empty() {
            return Err(ProxyError::NoProxiesAvailable);
        }

        for attempt in 1..=max_retries {
            let candidate = &self.candidates[fastrand::usize(..self.candidates.len())];

            if self.probe.probe(candidate).await {
                counter!(PROXY_PROBE_SUCCESS).increment(1);
                tracing::debug!(proxy = %candidate, attempt, "Selected proxy");
                return Ok(candidate.clone());
            }

            counter!(PROXY_PROBE_FAILURE).increment(1);
            tracing::warn!(proxy = %candidate, attempt, max_retries, "Proxy probe failed");
        }

        Err(ProxyError::RetriesExhausted {
            attempts: max_retries,
        })
    }
}
