use super::{Category, FallbackChain, JsonProvider};
use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

pub fn chain(
    urls: &ProviderUrls,
    secrets: &HashMap<String, String>,
) -> Result<FallbackChain<JsonValue>, ValidationError> {
    Ok(FallbackChain::new(
        Category::Weather,
        vec![
            JsonProvider::boxed("openweathermap", &urls.openweathermap, secrets, verbatim)?,
            JsonProvider::boxed("weatherapi", &urls.weatherapi, secrets, verbatim)?,
        ],
    ))
}

/// Weather payloads are passed through untouched, as long as they are objects.
pub fn verbatim(payload: &JsonValue) -> Result<JsonValue, ProviderError> {
    if payload.is_object() {
        Ok(payload.clone())
    } else {
        Err(ProviderError::normalization(
            "weather payload is not a JSON object",
        ))
    }
}
