use super::{Category, FallbackChain, JsonProvider, non_empty_str};
use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

pub const MAX_EVENTS: usize = 10;

const UNTITLED: &str = "Untitled event";
const UNKNOWN_VENUE: &str = "Unknown venue";

pub fn chain(
    urls: &ProviderUrls,
    secrets: &HashMap<String, String>,
) -> Result<FallbackChain<Vec<String>>, ValidationError> {
    Ok(FallbackChain::new(
        Category::Events,
        vec![
            JsonProvider::boxed("ticketmaster", &urls.ticketmaster, secrets, from_ticketmaster)?,
            JsonProvider::boxed("seatgeek", &urls.seatgeek, secrets, from_seatgeek)?,
        ],
    ))
}

fn describe(title: Option<&str>, venue: Option<&str>) -> String {
    format!(
        "{} at {}",
        title.unwrap_or(UNTITLED),
        venue.unwrap_or(UNKNOWN_VENUE)
    )
}

/// Ticketmaster discovery search. The API omits `_embedded` entirely when
/// nothing matches, which is an empty listing.
pub fn from_ticketmaster(payload: &JsonValue) -> Result<Vec<String>, ProviderError> {
    if !payload.is_object() {
        return Err(ProviderError::normalization(
            "ticketmaster payload is not a JSON object",
        ));
    }

    let Some(events) = payload
        .pointer("/_embedded/events")
        .and_then(JsonValue::as_array)
    else {
        return Ok(Vec::new());
    };

    Ok(events
        .iter()
        .take(MAX_EVENTS)
        .map(|event| {
            let venue = event
                .pointer("/_embedded/venues/0")
                .and_then(|venue| non_empty_str(venue, "name"));
            describe(non_empty_str(event, "name"), venue)
        })
        .collect())
}

/// SeatGeek events search.
pub fn from_seatgeek(payload: &JsonValue) -> Result<Vec<String>, ProviderError> {
    if !payload.is_object() {
        return Err(ProviderError::normalization(
            "seatgeek payload is not a JSON object",
        ));
    }

    let Some(events) = payload.get("events").and_then(JsonValue::as_array) else {
        return Ok(Vec::new());
    };

    Ok(events
        .iter()
        .take(MAX_EVENTS)
        .map(|event| {
            let venue = event
                .get("venue")
                .and_then(|venue| non_empty_str(venue, "name"));
            describe(non_empty_str(event, "title"), venue)
        })
        .collect())
}
