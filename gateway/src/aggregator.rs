use crate::chains::{
    Category, CategoryPayload, CategoryResult, Chains, CityInfo, FallbackChain,
    GENERIC_UNAVAILABLE, TrafficReport,
};
use crate::errors::{GatewayError, Result};
use crate::fetcher::Fetch;
use crate::metrics_defs::CATEGORY_UNAVAILABLE;
use serde::Serialize;
use serde_json::Value as JsonValue;
use shared::counter;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};

/// The envelope returned for one city.
#[derive(Debug, Serialize)]
pub struct CompositeResponse {
    pub city: String,
    pub city_info: CategoryResult<CityInfo>,
    pub weather: CategoryResult<JsonValue>,
    pub news: CategoryResult<Vec<String>>,
    pub events: CategoryResult<Vec<String>>,
    pub traffic: CategoryResult<TrafficReport>,
}

/// Fans a city out to every category chain and assembles the envelope.
#[derive(Clone)]
pub struct Aggregator {
    chains: Arc<Chains>,
    fetcher: Arc<dyn Fetch>,
}

impl Aggregator {
    pub fn new(chains: Chains, fetcher: Arc<dyn Fetch>) -> Self {
        Aggregator {
            chains: Arc::new(chains),
            fetcher,
        }
    }

    /// Runs all five chains concurrently and waits for every one to settle.
    ///
    /// Chains are spawned onto the runtime, so dropping this future does not
    /// cancel upstream calls already in flight.
    pub async fn handle(&self, city: &str) -> Result<CompositeResponse> {
        let city = city.trim();
        if city.is_empty() {
            return Err(GatewayError::InvalidCity);
        }
        tracing::debug!(city = %city, "Aggregating");

        let city_info = self.spawn_chain(city, |chains| &chains.city_info);
        let weather = self.spawn_chain(city, |chains| &chains.weather);
        let news = self.spawn_chain(city, |chains| &chains.news);
        let events = self.spawn_chain(city, |chains| &chains.events);
        let traffic = self.spawn_chain(city, |chains| &chains.traffic);

        let (city_info, weather, news, events, traffic) =
            tokio::join!(city_info, weather, news, events, traffic);

        let response = CompositeResponse {
            city: city.to_string(),
            city_info: settle(Category::CityInfo, city_info),
            weather: settle(Category::Weather, weather),
            news: settle(Category::News, news),
            events: settle(Category::Events, events),
            traffic: settle(Category::Traffic, traffic),
        };
        Ok(response)
    }

    fn spawn_chain<T>(
        &self,
        city: &str,
        select: fn(&Chains) -> &FallbackChain<T>,
    ) -> JoinHandle<CategoryResult<T>>
    where
        T: Send + 'static,
    {
        let chains = self.chains.clone();
        let fetcher = self.fetcher.clone();
        let city = city.to_string();

        tokio::spawn(async move { select(&chains).run(fetcher.as_ref(), &city).await })
    }
}

/// Reads one slot of the fan-out. A chain task that died degrades to the
/// generic placeholder instead of failing the request.
fn settle<T: CategoryPayload>(
    category: Category,
    joined: std::result::Result<CategoryResult<T>, JoinError>,
) -> CategoryResult<T> {
    let result = match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(category = category.as_str(), error = %e, "Category task failed");
            CategoryResult::unavailable(GENERIC_UNAVAILABLE)
        }
    };

    if !result.is_available() {
        counter!(CATEGORY_UNAVAILABLE, "category" => category.as_str()).increment(1);
    }
    result
}
