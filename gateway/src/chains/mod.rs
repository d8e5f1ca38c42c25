//! Per-category fallback chains.
//!
//! Every category walks an ordered provider list and settles on the first
//! provider that both fetches and normalizes. When every provider fails the
//! chain resolves to the category's placeholder with source `none`; a chain
//! never returns an error.

pub mod city_info;
pub mod events;
pub mod news;
pub mod traffic;
pub mod weather;

use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use crate::fetcher::Fetch;
use crate::template::UrlTemplate;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

pub use city_info::CityInfo;
pub use traffic::TrafficReport;

/// Source reported when no provider produced the data.
pub const NO_SOURCE: &str = "none";

/// Placeholder for a category whose task died before producing a result.
pub const GENERIC_UNAVAILABLE: &str = "data unavailable";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    CityInfo,
    Weather,
    News,
    Events,
    Traffic,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CityInfo => "city_info",
            Category::Weather => "weather",
            Category::News => "news",
            Category::Events => "events",
            Category::Traffic => "traffic",
        }
    }

    /// The placeholder used when every provider failed.
    pub fn unavailable(&self) -> &'static str {
        match self {
            Category::CityInfo => "city info unavailable",
            Category::Weather => "weather data unavailable",
            Category::News => "news unavailable",
            Category::Events => "events unavailable",
            Category::Traffic => "traffic data unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryData<T> {
    Available(T),
    Unavailable(&'static str),
}

/// Normalized output of one chain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryResult<T> {
    pub data: CategoryData<T>,
    pub source: String,
}

impl<T> CategoryResult<T> {
    pub fn available(data: T, source: String) -> Self {
        CategoryResult {
            data: CategoryData::Available(data),
            source,
        }
    }

    pub fn unavailable(placeholder: &'static str) -> Self {
        CategoryResult {
            data: CategoryData::Unavailable(placeholder),
            source: NO_SOURCE.to_string(),
        }
    }

}

impl<T: CategoryPayload> CategoryResult<T> {
    /// False for placeholders, including a provider answer that carried no data.
    pub fn is_available(&self) -> bool {
        matches!(&self.data, CategoryData::Available(data) if data.has_data())
    }
}

/// Normalized category data.
pub trait CategoryPayload {
    fn has_data(&self) -> bool {
        true
    }
}

impl CategoryPayload for CityInfo {}
impl CategoryPayload for JsonValue {}
impl CategoryPayload for Vec<String> {}

/// One entry of a fallback chain.
///
/// `resolve` returns the normalized data together with the redacted URL that
/// produced it.
#[async_trait]
pub trait Provider<T>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, fetcher: &dyn Fetch, city: &str)
    -> Result<(T, String), ProviderError>;
}

pub type Normalizer<T> = fn(&JsonValue) -> Result<T, ProviderError>;

/// A provider that is a single GET followed by a normalizer.
pub struct JsonProvider<T> {
    name: &'static str,
    template: UrlTemplate,
    normalize: Normalizer<T>,
}

impl<T> JsonProvider<T> {
    pub fn new(name: &'static str, template: UrlTemplate, normalize: Normalizer<T>) -> Self {
        JsonProvider {
            name,
            template,
            normalize,
        }
    }

    /// Compiles the city template and boxes the provider for a chain.
    pub(crate) fn boxed(
        name: &'static str,
        raw: &str,
        secrets: &HashMap<String, String>,
        normalize: Normalizer<T>,
    ) -> Result<Box<dyn Provider<T>>, ValidationError>
    where
        T: Send + 'static,
    {
        let template = ProviderUrls::city_template(name, raw, secrets)?;
        Ok(Box::new(JsonProvider::new(name, template, normalize)))
    }
}

#[async_trait]
impl<T: Send + 'static> Provider<T> for JsonProvider<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn resolve(
        &self,
        fetcher: &dyn Fetch,
        city: &str,
    ) -> Result<(T, String), ProviderError> {
        let rendered = self.template.render_city(city);
        let payload = fetcher.fetch(&rendered.url).await?;
        let data = (self.normalize)(&payload)?;
        Ok((data, rendered.label))
    }
}

/// Tries `providers` in order and returns the first success. Later providers
/// are never invoked once one succeeds.
pub async fn first_success<T>(
    category: Category,
    providers: &[Box<dyn Provider<T>>],
    fetcher: &dyn Fetch,
    city: &str,
) -> Option<(T, String)> {
    for provider in providers {
        match provider.resolve(fetcher, city).await {
            Ok(found) => return Some(found),
            Err(e) => {
                tracing::warn!(
                    category = category.as_str(),
                    provider = provider.name(),
                    city = %city,
                    error = %e,
                    "Provider failed, falling back"
                );
            }
        }
    }
    None
}

pub struct FallbackChain<T> {
    category: Category,
    providers: Vec<Box<dyn Provider<T>>>,
}

impl<T> FallbackChain<T> {
    pub fn new(category: Category, providers: Vec<Box<dyn Provider<T>>>) -> Self {
        FallbackChain {
            category,
            providers,
        }
    }

    pub async fn run(&self, fetcher: &dyn Fetch, city: &str) -> CategoryResult<T> {
        match first_success(self.category, &self.providers, fetcher, city).await {
            Some((data, source)) => CategoryResult::available(data, source),
            None => {
                tracing::info!(
                    category = self.category.as_str(),
                    city = %city,
                    "All providers failed"
                );
                CategoryResult::unavailable(self.category.unavailable())
            }
        }
    }
}

/// The five chains, compiled once at startup.
pub struct Chains {
    pub city_info: FallbackChain<CityInfo>,
    pub weather: FallbackChain<JsonValue>,
    pub news: FallbackChain<Vec<String>>,
    pub events: FallbackChain<Vec<String>>,
    pub traffic: FallbackChain<TrafficReport>,
}

impl Chains {
    pub fn from_config(
        urls: &ProviderUrls,
        secrets: &HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        Ok(Chains {
            city_info: city_info::chain(urls, secrets)?,
            weather: weather::chain(urls, secrets)?,
            news: news::chain(urls, secrets)?,
            events: events::chain(urls, secrets)?,
            traffic: traffic::chain(urls, secrets)?,
        })
    }
}

/// Reads a string field, treating an empty string as missing.
pub(crate) fn non_empty_str<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
}

/// Reads a number that some APIs send as a JSON string.
pub(crate) fn lenient_f64(value: &JsonValue, key: &str) -> Option<f64> {
    match value.get(key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
