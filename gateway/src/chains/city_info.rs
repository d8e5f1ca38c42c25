use super::{Category, FallbackChain, JsonProvider, lenient_f64, non_empty_str};
use crate::config::{ProviderUrls, ValidationError};
use crate::errors::ProviderError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// City facts, shaped by the kind of source that produced them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CityInfo {
    Gazetteer {
        name: String,
        population: u64,
        country: String,
        coordinates: Coordinates,
    },
    Encyclopedia {
        name: String,
        description: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Geocoding {
        name: String,
        coordinates: Coordinates,
        #[serde(skip_serializing_if = "Option::is_none")]
        country: Option<String>,
    },
}

pub fn chain(
    urls: &ProviderUrls,
    secrets: &HashMap<String, String>,
) -> Result<FallbackChain<CityInfo>, ValidationError> {
    Ok(FallbackChain::new(
        Category::CityInfo,
        vec![
            JsonProvider::boxed("geonames", &urls.geonames, secrets, from_gazetteer)?,
            JsonProvider::boxed("wikipedia", &urls.wikipedia, secrets, from_encyclopedia)?,
            JsonProvider::boxed("nominatim", &urls.nominatim, secrets, from_geocoding)?,
        ],
    ))
}

/// First `geonames[]` entry of a GeoNames search.
pub fn from_gazetteer(payload: &JsonValue) -> Result<CityInfo, ProviderError> {
    let entry = payload
        .get("geonames")
        .and_then(JsonValue::as_array)
        .and_then(|entries| entries.first())
        .ok_or_else(|| ProviderError::normalization("geonames: no matching place"))?;

    let name = non_empty_str(entry, "name")
        .ok_or_else(|| ProviderError::normalization("geonames: missing name"))?;
    let country = non_empty_str(entry, "countryName")
        .ok_or_else(|| ProviderError::normalization("geonames: missing countryName"))?;
    let population = entry
        .get("population")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| ProviderError::normalization("geonames: missing population"))?;
    let coordinates = match (lenient_f64(entry, "lat"), lenient_f64(entry, "lng")) {
        (Some(lat), Some(lon)) => Coordinates { lat, lon },
        _ => return Err(ProviderError::normalization("geonames: missing coordinates")),
    };

    Ok(CityInfo::Gazetteer {
        name: name.to_string(),
        population,
        country: country.to_string(),
        coordinates,
    })
}

/// Wikipedia REST page summary.
pub fn from_encyclopedia(payload: &JsonValue) -> Result<CityInfo, ProviderError> {
    let name = non_empty_str(payload, "title")
        .ok_or_else(|| ProviderError::normalization("wikipedia: missing title"))?;
    let description = non_empty_str(payload, "extract")
        .ok_or_else(|| ProviderError::normalization("wikipedia: missing extract"))?;
    let image = payload
        .get("thumbnail")
        .and_then(|thumbnail| non_empty_str(thumbnail, "source"))
        .map(String::from);

    Ok(CityInfo::Encyclopedia {
        name: name.to_string(),
        description: description.to_string(),
        image,
    })
}

/// First entry of a Nominatim search.
pub fn from_geocoding(payload: &JsonValue) -> Result<CityInfo, ProviderError> {
    let entry = payload
        .as_array()
        .and_then(|entries| entries.first())
        .ok_or_else(|| ProviderError::normalization("nominatim: no matching place"))?;

    let name = non_empty_str(entry, "name")
        .or_else(|| non_empty_str(entry, "display_name"))
        .ok_or_else(|| ProviderError::normalization("nominatim: missing name"))?;
    let coordinates = match (lenient_f64(entry, "lat"), lenient_f64(entry, "lon")) {
        (Some(lat), Some(lon)) => Coordinates { lat, lon },
        _ => return Err(ProviderError::normalization("nominatim: missing coordinates")),
    };
    let country = entry
        .get("address")
        .and_then(|address| non_empty_str(address, "country"))
        .map(String::from);

    Ok(CityInfo::Geocoding {
        name: name.to_string(),
        coordinates,
        country,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::NO_SOURCE;
    use crate::config::test_secrets;
    use crate::testutils::ScriptedFetcher;
    use serde_json::json;

    const GEONAMES: &str =
        "http://api.geonames.org/searchJSON?q=Paris&maxRows=1&username=geonames_username-value";
    const WIKIPEDIA: &str = "https://en.wikipedia.org/api/rest_v1/page/summary/Paris";
    const NOMINATIM: &str = "https://nominatim.openstreetmap.org/search?q=Paris&format=json&limit=1&addressdetails=1";

    fn default_chain() -> FallbackChain<CityInfo> {
        chain(&ProviderUrls::default(), &test_secrets()).unwrap()
    }

    fn wikipedia_summary() -> JsonValue {
        json!({
            "title": "Paris",
            "extract": "Paris is the capital of France.",
            "thumbnail": {"source": "https://upload.wikimedia.org/paris.jpg"}
        })
    }

    #[test]
    fn test_gazetteer() {
        let payload = json!({"geonames": [{
            "name": "Paris",
            "population": 2138551,
            "countryName": "France",
            "lat": "48.85341",
            "lng": "2.3488"
        }]});

        let info = from_gazetteer(&payload).unwrap();
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({
                "kind": "gazetteer",
                "name": "Paris",
                "population": 2138551,
                "country": "France",
                "coordinates": {"lat": 48.85341, "lon": 2.3488}
            })
        );

        assert!(from_gazetteer(&json!({"geonames": []})).is_err());
        assert!(from_gazetteer(&json!({"status": {"message": "user does not exist"}})).is_err());
    }

    #[test]
    fn test_encyclopedia_has_no_population() {
        let info = from_encyclopedia(&wikipedia_summary()).unwrap();
        let wire = serde_json::to_value(&info).unwrap();
        assert_eq!(wire["kind"], "encyclopedia");
        assert_eq!(wire["image"], "https://upload.wikimedia.org/paris.jpg");
        assert!(wire.get("population").is_none());
        assert!(wire.get("country").is_none());

        let without_image = from_encyclopedia(&json!({"title": "Paris", "extract": "x"})).unwrap();
        assert!(
            serde_json::to_value(&without_image)
                .unwrap()
                .get("image")
                .is_none()
        );

        assert!(from_encyclopedia(&json!({"title": "Paris", "extract": ""})).is_err());
    }

    #[test]
    fn test_geocoding() {
        let payload = json!([{
            "display_name": "Paris, Île-de-France, France",
            "lat": "48.8588897",
            "lon": "2.3200410",
            "address": {"country": "France"}
        }]);

        assert_eq!(
            from_geocoding(&payload).unwrap(),
            CityInfo::Geocoding {
                name: "Paris, Île-de-France, France".to_string(),
                coordinates: Coordinates {
                    lat: 48.8588897,
                    lon: 2.3200410
                },
                country: Some("France".to_string()),
            }
        );
        assert!(from_geocoding(&json!([])).is_err());
    }

    #[tokio::test]
    async fn test_falls_back_to_encyclopedia() {
        let fetcher = ScriptedFetcher::new()
            .fail(GEONAMES)
            .respond(WIKIPEDIA, wikipedia_summary());

        let result = default_chain().run(&fetcher, "Paris").await;
        assert_eq!(result.source, WIKIPEDIA);
        assert!(matches!(
            result.data,
            crate::chains::CategoryData::Available(CityInfo::Encyclopedia { .. })
        ));
        assert!(!fetcher.was_called(NOMINATIM));
    }

    #[tokio::test]
    async fn test_gazetteer_source_is_redacted() {
        let fetcher = ScriptedFetcher::new().respond(
            GEONAMES,
            json!({"geonames": [{
                "name": "Paris", "population": 1, "countryName": "France", "lat": 1, "lng": 2
            }]}),
        );

        let result = default_chain().run(&fetcher, "Paris").await;
        assert_eq!(
            result.source,
            "http://api.geonames.org/searchJSON?q=Paris&maxRows=1&username=***"
        );
        assert_eq!(fetcher.calls(), vec![GEONAMES.to_string()]);
    }

    #[tokio::test]
    async fn test_all_fail() {
        let fetcher = ScriptedFetcher::new();
        let result = default_chain().run(&fetcher, "Paris").await;
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"data": "city info unavailable", "source": NO_SOURCE})
        );
        assert_eq!(fetcher.calls().len(), 3);
    }
}
