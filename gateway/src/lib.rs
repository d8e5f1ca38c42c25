pub mod aggregator;
pub mod cache;
pub mod chains;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod identity;
pub mod metrics_defs;
pub mod proxy_pool;
pub mod service;
pub mod template;

#[cfg(test)]
mod testutils;

use crate::aggregator::Aggregator;
use crate::cache::ResponseCache;
use crate::chains::Chains;
use crate::config::{Config, Environment};
use crate::errors::GatewayError;
use crate::fetcher::ResilientFetcher;
use crate::proxy_pool::{HttpProbe, ProxySelector, load_candidates};
use crate::service::GatewayService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::time::Duration;

/// Wires the cache, proxy selector, fetcher and chains together.
///
/// The proxy list is only loaded in development mode.
pub fn build_aggregator(config: &Config) -> Result<Aggregator, GatewayError> {
    config.validate()?;

    let cache = ResponseCache::new(
        Duration::from_secs(config.cache.ttl_secs),
        config.cache.max_entries,
    );

    let candidates = match config.environment {
        Environment::Development => load_candidates(&config.proxies)?,
        Environment::Production => Vec::new(),
    };
    if config.environment == Environment::Development && candidates.is_empty() {
        tracing::warn!("Development mode without proxy candidates, every uncached fetch will fail");
    }
    let probe = HttpProbe::new(
        config.proxies.probe_url.clone(),
        Duration::from_secs(config.timeouts.probe_timeout_secs),
    );
    let proxies = ProxySelector::new(config.environment, candidates, Arc::new(probe));
    tracing::info!(
        environment = %config.environment,
        proxies = proxies.len(),
        "Initialized egress"
    );

    let fetcher = ResilientFetcher::new(
        config.environment,
        cache,
        proxies,
        config.proxies.max_retries,
        Duration::from_secs(config.timeouts.fetch_timeout_secs),
    )?;
    let chains = Chains::from_config(&config.providers, &config.secrets)?;

    Ok(Aggregator::new(chains, Arc::new(fetcher)))
}

pub async fn run(config: Config) -> Result<(), GatewayError> {
    let aggregator = build_aggregator(&config)?;

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(aggregator),
    );
    // build_aggregator has already succeeded, so nothing is left to become ready
    let admin_service = AdminService::<_, GatewayError>::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}
