use super::{Category, FallbackChain, JsonProvider};
use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Maximum number of headlines returned.
pub const MAX_HEADLINES: usize = 10;

pub fn chain(
    urls: &ProviderUrls,
    secrets: &HashMap<String, String>,
) -> Result<FallbackChain<Vec<String>>, ValidationError> {
    Ok(FallbackChain::new(
        Category::News,
        vec![
            JsonProvider::boxed("newsapi", &urls.newsapi, secrets, headlines)?,
            JsonProvider::boxed("gnews", &urls.gnews, secrets, headlines)?,
        ],
    ))
}

/// First ten `articles[].title`. NewsAPI and GNews share this shape.
///
/// An empty `articles` array is a valid empty result, a missing one is not.
pub fn headlines(payload: &JsonValue) -> Result<Vec<String>, ProviderError> {
    let articles = payload
        .get("articles")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| ProviderError::normalization("news payload has no articles array"))?;

    Ok(articles
        .iter()
        .filter_map(|article| article.get("title").and_then(JsonValue::as_str))
        .take(MAX_HEADLINES)
        .map(String::from)
        .collect())
}
