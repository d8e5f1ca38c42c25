use crate::config::{Environment, ValidationError};
use crate::proxy_pool::ProxyListError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Reasons a proxy could not be handed to the fetcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("no proxies available")]
    NoProxiesAvailable,

    #[error("no valid proxies after maximum retries ({attempts} attempts)")]
    RetriesExhausted { attempts: u32 },

    #[error("proxy rotation disabled in production")]
    DisabledInProduction,
}

/// Why a single upstream call did not produce a payload.
#[derive(Error, Debug)]
pub enum FetchFailure {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request error: {0}")]
    Request(String),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Body(String),
}

/// Errors surfaced by the egress primitive. Never retried by the fetcher itself.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("proxy unavailable: {0}")]
    ProxyUnavailable(#[from] ProxyError),

    #[error("fetch failed for {url} ({environment}): {reason}")]
    FetchFailed {
        url: String,
        environment: Environment,
        reason: FetchFailure,
    },
}

/// A single provider attempt failed; the chain moves on to the next provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("normalization failed: {0}")]
    NormalizationFailed(String),
}

impl ProviderError {
    pub fn normalization(reason: impl Into<String>) -> Self {
        ProviderError::NormalizationFailed(reason.into())
    }
}

/// Errors that can occur while serving gateway requests or starting the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("aggregation failed: {0}")]
    AggregationFailure(String),

    #[error("invalid city name")]
    InvalidCity,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("proxy list error: {0}")]
    ProxyList(#[from] ProxyListError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
