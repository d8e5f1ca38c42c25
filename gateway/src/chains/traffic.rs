//! Traffic is a two-step provider: geocode the city, then ask for the flow
//! segment at those coordinates.

use super::{Category, CategoryPayload, FallbackChain, Provider, lenient_f64};
use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use crate::fetcher::Fetch;
use crate::template::UrlTemplate;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Flow data, or the placeholder when the flow service answered without speeds.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrafficReport {
    Flow(FlowSegment),
    Unavailable(&'static str),
}

impl CategoryPayload for TrafficReport {
    fn has_data(&self) -> bool {
        matches!(self, TrafficReport::Flow(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowSegment {
    pub current_speed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_flow_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_travel_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_flow_travel_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub road_closure: Option<bool>,
}

pub fn chain(
    urls: &ProviderUrls,
    secrets: &HashMap<String, String>,
) -> Result<FallbackChain<TrafficReport>, ValidationError> {
    let provider = GeocodedFlow {
        geocoding: ProviderUrls::city_template("traffic_geocoding", &urls.traffic_geocoding, secrets)?,
        flow: ProviderUrls::coordinates_template("tomtom_flow", &urls.tomtom_flow, secrets)?,
    };
    let providers: Vec<Box<dyn Provider<TrafficReport>>> = vec![Box::new(provider)];
    Ok(FallbackChain::new(Category::Traffic, providers))
}

struct GeocodedFlow {
    geocoding: UrlTemplate,
    flow: UrlTemplate,
}

#[async_trait]
impl Provider<TrafficReport> for GeocodedFlow {
    fn name(&self) -> &'static str {
        "tomtom"
    }

    async fn resolve(
        &self,
        fetcher: &dyn Fetch,
        city: &str,
    ) -> Result<(TrafficReport, String), ProviderError> {
        let geocoding = self.geocoding.render_city(city);
        let places = fetcher.fetch(&geocoding.url).await?;
        let (lat, lon) = coordinates(&places)?;

        let flow = self.flow.render(&[("lat", lat.as_str()), ("lon", lon.as_str())]);
        let payload = fetcher.fetch(&flow.url).await?;

        Ok((flow_report(&payload)?, flow.label))
    }
}

/// Coordinates of the first geocoding hit, formatted for the flow URL.
fn coordinates(payload: &JsonValue) -> Result<(String, String), ProviderError> {
    let place = payload
        .as_array()
        .and_then(|places| places.first())
        .ok_or_else(|| ProviderError::normalization("geocoding: no matching place"))?;

    match (lenient_f64(place, "lat"), lenient_f64(place, "lon")) {
        (Some(lat), Some(lon)) => Ok((lat.to_string(), lon.to_string())),
        _ => Err(ProviderError::normalization("geocoding: missing coordinates")),
    }
}

/// TomTom `flowSegmentData`. A response without `currentSpeed` still counts as
/// an answer from the flow service.
pub fn flow_report(payload: &JsonValue) -> Result<TrafficReport, ProviderError> {
    if !payload.is_object() {
        return Err(ProviderError::normalization(
            "flow payload is not a JSON object",
        ));
    }

    let Some(segment) = payload.get("flowSegmentData") else {
        return Ok(TrafficReport::Unavailable(Category::Traffic.unavailable()));
    };
    let Some(current_speed) = lenient_f64(segment, "currentSpeed") else {
        return Ok(TrafficReport::Unavailable(Category::Traffic.unavailable()));
    };

    Ok(TrafficReport::Flow(FlowSegment {
        current_speed,
        free_flow_speed: lenient_f64(segment, "freeFlowSpeed"),
        current_travel_time: lenient_f64(segment, "currentTravelTime"),
        free_flow_travel_time: lenient_f64(segment, "freeFlowTravelTime"),
        confidence: lenient_f64(segment, "confidence"),
        road_closure: segment.get("roadClosure").and_then(JsonValue::as_bool),
    }))
}
