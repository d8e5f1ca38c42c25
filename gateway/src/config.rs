use crate::proxy_pool::ProxyCandidate;
use crate::template::UrlTemplate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("{0} must be greater than 0")]
    ZeroValue(&'static str),

    #[error("Template for {provider} is malformed: {reason}")]
    MalformedTemplate {
        provider: &'static str,
        reason: String,
    },

    #[error("Template for {provider} uses placeholder {{{placeholder}}} which it cannot receive")]
    UnknownPlaceholder {
        provider: &'static str,
        placeholder: String,
    },

    #[error("Template for {provider} references secret {secret} which is not configured")]
    MissingSecret {
        provider: &'static str,
        secret: String,
    },

    #[error("Template for {provider} does not produce a valid URL: {reason}")]
    InvalidUrl {
        provider: &'static str,
        reason: String,
    },
}

/// Whether outbound calls are routed through rotating proxies.
///
/// Production talks to providers directly; development routes every uncached
/// call through a validated proxy and fails the call when none is usable.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for city lookups
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub proxies: ProxyConfig,
    /// Values substituted into provider URL templates, e.g. API keys.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub providers: ProviderUrls,
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.timeouts.fetch_timeout_secs == 0 {
            return Err(ValidationError::ZeroValue("timeouts.fetch_timeout_secs"));
        }
        if self.timeouts.probe_timeout_secs == 0 {
            return Err(ValidationError::ZeroValue("timeouts.probe_timeout_secs"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ValidationError::ZeroValue("cache.ttl_secs"));
        }
        if self.cache.max_entries == 0 {
            return Err(ValidationError::ZeroValue("cache.max_entries"));
        }
        if self.environment == Environment::Development && self.proxies.max_retries == 0 {
            return Err(ValidationError::ZeroValue("proxies.max_retries"));
        }

        self.providers.validate(&self.secrets)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    /// Deadline for a single upstream call, including reading the body
    pub fetch_timeout_secs: u64,
    /// Deadline for a proxy probe
    pub probe_timeout_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            probe_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

/// Proxy rotation settings. Only read in development mode.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Known-good endpoint requested through a candidate to check that it works
    pub probe_url: Url,
    /// Number of random candidates probed per fetch before giving up
    pub max_retries: u32,
    pub candidates: Vec<ProxyCandidate>,
    /// Optional file with one `host:port[:username:password]` entry per line
    pub candidates_file: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            probe_url: Url::parse("https://httpbin.org/ip").expect("static probe url"),
            max_retries: 3,
            candidates: Vec::new(),
            candidates_file: None,
        }
    }
}

const CITY: &[&str] = &["city"];
const COORDINATES: &[&str] = &["lat", "lon"];

/// URL templates for every provider, in no particular order. Fallback order is
/// fixed by the chains, only the endpoints are configurable.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderUrls {
    pub geonames: String,
    pub wikipedia: String,
    pub nominatim: String,
    pub openweathermap: String,
    pub weatherapi: String,
    pub newsapi: String,
    pub gnews: String,
    pub ticketmaster: String,
    pub seatgeek: String,
    pub traffic_geocoding: String,
    pub tomtom_flow: String,
}

impl Default for ProviderUrls {
    fn default() -> Self {
        Self {
            geonames: "http://api.geonames.org/searchJSON?q={city}&maxRows=1&username={geonames_username}".into(),
            wikipedia: "https://en.wikipedia.org/api/rest_v1/page/summary/{city}".into(),
            nominatim: "https://nominatim.openstreetmap.org/search?q={city}&format=json&limit=1&addressdetails=1".into(),
            openweathermap: "https://api.openweathermap.org/data/2.5/weather?q={city}&units=metric&appid={openweather_api_key}".into(),
            weatherapi: "https://api.weatherapi.com/v1/current.json?q={city}&key={weatherapi_key}".into(),
            newsapi: "https://newsapi.org/v2/everything?q={city}&pageSize=10&apiKey={newsapi_key}".into(),
            gnews: "https://gnews.io/api/v4/search?q={city}&max=10&token={gnews_api_key}".into(),
            ticketmaster: "https://app.ticketmaster.com/discovery/v2/events.json?city={city}&size=10&apikey={ticketmaster_api_key}".into(),
            seatgeek: "https://api.seatgeek.com/2/events?venue.city={city}&per_page=10&client_id={seatgeek_client_id}".into(),
            traffic_geocoding: "https://nominatim.openstreetmap.org/search?q={city}&format=json&limit=1".into(),
            tomtom_flow: "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json?point={lat},{lon}&key={tomtom_api_key}".into(),
        }
    }
}

impl ProviderUrls {
    /// Provider name, raw template and the runtime placeholders it may use.
    fn entries(&self) -> [(&'static str, &str, &'static [&'static str]); 11] {
        [
            ("geonames", &self.geonames, CITY),
            ("wikipedia", &self.wikipedia, CITY),
            ("nominatim", &self.nominatim, CITY),
            ("openweathermap", &self.openweathermap, CITY),
            ("weatherapi", &self.weatherapi, CITY),
            ("newsapi", &self.newsapi, CITY),
            ("gnews", &self.gnews, CITY),
            ("ticketmaster", &self.ticketmaster, CITY),
            ("seatgeek", &self.seatgeek, CITY),
            ("traffic_geocoding", &self.traffic_geocoding, CITY),
            ("tomtom_flow", &self.tomtom_flow, COORDINATES),
        ]
    }

    pub fn validate(&self, secrets: &HashMap<String, String>) -> Result<(), ValidationError> {
        for (provider, raw, runtime_vars) in self.entries() {
            UrlTemplate::compile(provider, raw, secrets, runtime_vars)?;
        }
        Ok(())
    }

    /// Compiles a city-only template.
    pub(crate) fn city_template(
        provider: &'static str,
        raw: &str,
        secrets: &HashMap<String, String>,
    ) -> Result<UrlTemplate, ValidationError> {
        UrlTemplate::compile(provider, raw, secrets, CITY)
    }

    /// Compiles a template that receives `{lat}` and `{lon}`.
    pub(crate) fn coordinates_template(
        provider: &'static str,
        raw: &str,
        secrets: &HashMap<String, String>,
    ) -> Result<UrlTemplate, ValidationError> {
        UrlTemplate::compile(provider, raw, secrets, COORDINATES)
    }
}

#[cfg(test)]
pub(crate) fn test_secrets() -> HashMap<String, String> {
    [
        "geonames_username",
        "openweather_api_key",
        "weatherapi_key",
        "newsapi_key",
        "gnews_api_key",
        "ticketmaster_api_key",
        "seatgeek_client_id",
        "tomtom_api_key",
    ]
    .into_iter()
    .map(|name| (name.to_string(), format!("{name}-value")))
    .collect()
}
