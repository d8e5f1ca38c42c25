//! The single egress path shared by every provider.

use crate::cache::{ResponseCache, cache_key};
use crate::config::Environment;
use crate::errors::{FetchError, FetchFailure};
use crate::identity::UserAgentRotator;
use crate::metrics_defs::{UPSTREAM_FETCH_DURATION, UPSTREAM_FETCH_FAILURES};
use crate::proxy_pool::ProxySelector;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value as JsonValue;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};
use url::Url;

/// Retrieves the JSON payload behind a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Arc<JsonValue>, FetchError>;
}

/// Cache-first fetcher with identity rotation.
///
/// Every miss goes out with a fresh user agent. In development mode it also goes
/// through a freshly validated proxy, and the fetch fails when none is usable.
/// Failures are classified and returned, never retried here.
pub struct ResilientFetcher {
    environment: Environment,
    cache: ResponseCache,
    user_agents: UserAgentRotator,
    proxies: ProxySelector,
    max_proxy_retries: u32,
    timeout: Duration,
    /// Direct client used in production
    client: reqwest::Client,
}

impl ResilientFetcher {
    pub fn new(
        environment: Environment,
        cache: ResponseCache,
        proxies: ProxySelector,
        max_proxy_retries: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // Production egress must not pick up proxies from the environment either
        let client = reqwest::Client::builder().no_proxy().build()?;

        Ok(Self {
            environment,
            cache,
            user_agents: UserAgentRotator::new(),
            proxies,
            max_proxy_retries,
            timeout,
            client,
        })
    }

    fn failed(&self, url: &str, reason: FetchFailure) -> FetchError {
        FetchError::FetchFailed {
            url: url.to_string(),
            environment: self.environment,
            reason,
        }
    }

    async fn client_for_call(&self, url: &str) -> Result<reqwest::Client, FetchError> {
        match self.environment {
            Environment::Production => Ok(self.client.clone()),
            Environment::Development => {
                let proxy = self.proxies.select_proxy(self.max_proxy_retries).await?;
                tracing::debug!(proxy = %proxy, "Routing through proxy");
                proxy.client().map_err(|e| {
                    self.failed(url, FetchFailure::Request(format!("proxy {proxy}: {e}")))
                })
            }
        }
    }

    /// Counts and logs a failed fetch on its way back to the chain.
    fn report(&self, url: &str, error: FetchError) -> FetchError {
        counter!(UPSTREAM_FETCH_FAILURES).increment(1);
        tracing::warn!(
            url = %url,
            environment = %self.environment,
            error = %error,
            "Upstream fetch failed"
        );
        error
    }

    async fn send(
        client: &reqwest::Client,
        url: Url,
        user_agent: &str,
    ) -> Result<JsonValue, FetchFailure> {
        let response = client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchFailure::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response
            .json::<JsonValue>()
            .await
            .map_err(|e| FetchFailure::Body(e.to_string()))
    }
}

#[async_trait]
impl Fetch for ResilientFetcher {
    async fn fetch(&self, url: &str) -> Result<Arc<JsonValue>, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| self.failed(url, FetchFailure::InvalidUrl(e.to_string())))?;
        let key = cache_key(&parsed);

        if let Some(payload) = self.cache.get(&key) {
            tracing::debug!(url = %key, "Cache hit");
            return Ok(payload);
        }

        let user_agent = self.user_agents.next_user_agent();
        let client = match self.client_for_call(url).await {
            Ok(client) => client,
            Err(e) => return Err(self.report(url, e)),
        };

        let started = Instant::now();
        // The deadline covers connecting, headers and reading the whole body
        let result = match timeout(self.timeout, Self::send(&client, parsed, &user_agent)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout(self.timeout)),
        };
        histogram!(UPSTREAM_FETCH_DURATION).record(started.elapsed().as_secs_f64());

        match result {
            Ok(payload) => {
                let payload = Arc::new(payload);
                self.cache.set(key, payload.clone());
                Ok(payload)
            }
            Err(reason) => Err(self.report(url, self.failed(url, reason))),
        }
    }
}
