//! Provider URL templates.
//!
//! Templates carry `{name}` placeholders. Secret placeholders are bound once at
//! startup from the configured secrets, runtime placeholders (`city`, `lat`,
//! `lon`) are filled per request. All substituted values are percent-encoded.

use crate::config::ValidationError;
use std::collections::HashMap;
use url::Url;

/// Placeholders that are filled per request rather than from secrets.
pub const RUNTIME_PLACEHOLDERS: &[&str] = &["city", "lat", "lon"];

const REDACTED: &str = "***";

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Literal(String),
    Secret(String),
    Var(String),
}

/// A compiled URL template with secrets already bound.
#[derive(Clone, Debug, PartialEq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

/// The outcome of rendering a template.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedUrl {
    /// URL sent upstream
    pub url: String,
    /// Same URL with secret values masked; safe to log and return to clients
    pub label: String,
}

impl UrlTemplate {
    /// Parses `raw`, binds secret placeholders and checks that only `runtime_vars`
    /// remain unbound.
    pub fn compile(
        provider: &'static str,
        raw: &str,
        secrets: &HashMap<String, String>,
        runtime_vars: &[&str],
    ) -> Result<Self, ValidationError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }

                    if !closed {
                        return Err(ValidationError::MalformedTemplate {
                            provider,
                            reason: "unclosed '{'".to_string(),
                        });
                    }
                    if name.is_empty()
                        || !name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(ValidationError::MalformedTemplate {
                            provider,
                            reason: format!("invalid placeholder name '{name}'"),
                        });
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }

                    if runtime_vars.contains(&name.as_str()) {
                        segments.push(Segment::Var(name));
                    } else if RUNTIME_PLACEHOLDERS.contains(&name.as_str()) {
                        return Err(ValidationError::UnknownPlaceholder {
                            provider,
                            placeholder: name,
                        });
                    } else {
                        let value =
                            secrets
                                .get(&name)
                                .ok_or_else(|| ValidationError::MissingSecret {
                                    provider,
                                    secret: name.clone(),
                                })?;
                        segments.push(Segment::Secret(value.clone()));
                    }
                }
                '}' => {
                    return Err(ValidationError::MalformedTemplate {
                        provider,
                        reason: "unmatched '}'".to_string(),
                    });
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let template = UrlTemplate { segments };

        // Render with sample values to catch templates that can never produce a URL
        let sample: Vec<(&str, &str)> = runtime_vars.iter().map(|v| (*v, "0")).collect();
        Url::parse(&template.render(&sample).url).map_err(|e| ValidationError::InvalidUrl {
            provider,
            reason: e.to_string(),
        })?;

        Ok(template)
    }

    /// Fills runtime placeholders. Missing values render as empty strings.
    pub fn render(&self, vars: &[(&str, &str)]) -> RenderedUrl {
        let mut url = String::new();
        let mut label = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => {
                    url.push_str(s);
                    label.push_str(s);
                }
                Segment::Secret(value) => {
                    url.push_str(&urlencoding::encode(value));
                    label.push_str(REDACTED);
                }
                Segment::Var(name) => {
                    let value = vars
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| *v)
                        .unwrap_or_default();
                    let encoded = urlencoding::encode(value);
                    url.push_str(&encoded);
                    label.push_str(&encoded);
                }
            }
        }

        RenderedUrl { url, label }
    }

    /// Shortcut for the common case of a template that only takes the city.
    pub fn render_city(&self, city: &str) -> RenderedUrl {
        self.render(&[("city", city)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> HashMap<String, String> {
        HashMap::from([("api_key".to_string(), "s3cr3t&x".to_string())])
    }

    #[test]
    fn test_render_encodes_city_and_masks_secrets() {
        let template = UrlTemplate::compile(
            "test",
            "https://api.example.com/search?q={city}&key={api_key}",
            &secrets(),
            &["city"],
        )
        .unwrap();

        let rendered = template.render_city("São Paulo");
        assert_eq!(
            rendered.url,
            "https://api.example.com/search?q=S%C3%A3o%20Paulo&key=s3cr3t%26x"
        );
        assert_eq!(
            rendered.label,
            "https://api.example.com/search?q=S%C3%A3o%20Paulo&key=***"
        );
    }

    #[test]
    fn test_label_matches_url_without_secrets() {
        let template = UrlTemplate::compile(
            "test",
            "https://en.wikipedia.org/api/rest_v1/page/summary/{city}",
            &HashMap::new(),
            &["city"],
        )
        .unwrap();

        let rendered = template.render_city("Paris");
        assert_eq!(rendered.url, rendered.label);
    }

    #[test]
    fn test_runtime_coordinates() {
        let template = UrlTemplate::compile(
            "flow",
            "http://flow.example.com/json?point={lat},{lon}",
            &HashMap::new(),
            &["lat", "lon"],
        )
        .unwrap();

        let rendered = template.render(&[("lat", "48.85"), ("lon", "-2.35")]);
        assert_eq!(rendered.url, "http://flow.example.com/json?point=48.85,-2.35");
    }

    #[test]
    fn test_compile_errors() {
        let secrets = secrets();

        assert!(matches!(
            UrlTemplate::compile("p", "http://x/{missing}", &secrets, &["city"]),
            Err(ValidationError::MissingSecret { .. })
        ));
        assert!(matches!(
            UrlTemplate::compile("p", "http://x/{lat}", &secrets, &["city"]),
            Err(ValidationError::UnknownPlaceholder { .. })
        ));
        assert!(matches!(
            UrlTemplate::compile("p", "http://x/{city", &secrets, &["city"]),
            Err(ValidationError::MalformedTemplate { .. })
        ));
        assert!(matches!(
            UrlTemplate::compile("p", "http://x/city}", &secrets, &["city"]),
            Err(ValidationError::MalformedTemplate { .. })
        ));
        assert!(matches!(
            UrlTemplate::compile("p", "http://x/{}", &secrets, &["city"]),
            Err(ValidationError::MalformedTemplate { .. })
        ));
        assert!(matches!(
            UrlTemplate::compile("p", "not a url {city}", &secrets, &["city"]),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }
}
